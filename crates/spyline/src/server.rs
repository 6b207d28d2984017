//! `SpylineServer` builder and accept loop.
//!
//! Ties the layers together: transport → handler → gateway.

use spyline_protocol::JsonCodec;
use spyline_transport::{Transport, WebSocketTransport};

use crate::actor::spawn_gateway;
use crate::handler::handle_connection;
use crate::{GatewayHandle, ServerConfig, SpylineError};

/// Builder for configuring and starting a Spyline server.
///
/// # Example
///
/// ```rust,no_run
/// use spyline::prelude::*;
///
/// # async fn demo() -> Result<(), SpylineError> {
/// let server = SpylineServer::builder()
///     .config(ServerConfig::from_env())
///     .bind("127.0.0.1:3000")
///     .build()
///     .await?;
/// server.run().await
/// # }
/// ```
#[derive(Debug, Default)]
pub struct SpylineServerBuilder {
    config: ServerConfig,
    bind_addr: Option<String>,
}

impl SpylineServerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the address to bind to, overriding `config.bind_addr`.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = Some(addr.to_string());
        self
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Binds the listener and starts the gateway task.
    ///
    /// Uses [`JsonCodec`] and [`WebSocketTransport`].
    pub async fn build(self) -> Result<SpylineServer, SpylineError> {
        let mut config = self.config.validated();
        if let Some(addr) = self.bind_addr {
            config.bind_addr = addr;
        }

        let transport = WebSocketTransport::bind(&config.bind_addr).await?;
        let gateway = spawn_gateway(&config);

        Ok(SpylineServer {
            transport,
            gateway,
            codec: JsonCodec,
        })
    }
}

/// A bound Spyline server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct SpylineServer {
    transport: WebSocketTransport,
    gateway: GatewayHandle,
    codec: JsonCodec,
}

impl SpylineServer {
    pub fn builder() -> SpylineServerBuilder {
        SpylineServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// A handle to this server's gateway, for inspection.
    pub fn gateway(&self) -> GatewayHandle {
        self.gateway.clone()
    }

    /// Runs the accept loop, spawning a handler task per connection.
    /// Runs until the process is terminated.
    pub async fn run(self) -> Result<(), SpylineError> {
        self.run_until(std::future::pending()).await
    }

    /// Runs the accept loop until `shutdown` completes, then stops the
    /// gateway and releases the listener. An already-accepted connection
    /// ends at its next action.
    pub async fn run_until<F>(mut self, shutdown: F) -> Result<(), SpylineError>
    where
        F: Future<Output = ()>,
    {
        tracing::info!("Spyline server running");
        let mut shutdown = std::pin::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = self.transport.accept() => match accepted {
                    Ok(conn) => {
                        let gateway = self.gateway.clone();
                        let codec = self.codec;
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(conn, gateway, codec).await {
                                tracing::debug!(error = %e, "connection ended with error");
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "accept failed");
                    }
                },
                () = &mut shutdown => break,
            }
        }

        tracing::info!("Spyline server shutting down");
        self.gateway.shutdown().await
    }
}
