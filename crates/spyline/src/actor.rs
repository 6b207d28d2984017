//! The gateway event loop: one Tokio task that owns the [`SessionGateway`].
//!
//! Connection handlers talk to it through a [`GatewayHandle`]. Commands,
//! countdown signals and the reclamation sweep are all multiplexed in one
//! `tokio::select!`, so no two of them ever touch session state at once.

use std::time::Duration;

use spyline_protocol::{ClientAction, ConnectionId, SessionId, SessionView};
use spyline_timer::TimerEvent;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::gateway::{Outbox, SessionGateway};
use crate::{ServerConfig, SpylineError};

/// Command channel capacity. Senders wait when it is full.
const DEFAULT_CHANNEL_SIZE: usize = 1024;

/// Commands sent to the gateway task.
///
/// Variants with a `oneshot::Sender` are request/reply; the rest are
/// fire-and-forget.
pub(crate) enum GatewayCommand {
    Attach {
        conn: ConnectionId,
        outbox: Outbox,
    },
    Act {
        conn: ConnectionId,
        action: ClientAction,
    },
    Disconnect {
        conn: ConnectionId,
        reply: oneshot::Sender<Vec<(SessionId, SessionView)>>,
    },
    Snapshot {
        session_id: SessionId,
        reply: oneshot::Sender<Option<SessionView>>,
    },
    Shutdown,
}

/// Handle to the running gateway task.
///
/// Cheap to clone: it is just an `mpsc::Sender` wrapper.
#[derive(Debug, Clone)]
pub struct GatewayHandle {
    sender: mpsc::Sender<GatewayCommand>,
}

impl GatewayHandle {
    /// Registers the channel `conn`'s outbound events are delivered to.
    pub async fn attach(&self, conn: ConnectionId, outbox: Outbox) -> Result<(), SpylineError> {
        self.send(GatewayCommand::Attach { conn, outbox }).await
    }

    /// Queues an action from `conn`. Results arrive on `conn`'s outbox.
    pub async fn act(&self, conn: ConnectionId, action: ClientAction) -> Result<(), SpylineError> {
        self.send(GatewayCommand::Act { conn, action }).await
    }

    /// Removes `conn` everywhere and returns the sessions it left behind.
    pub async fn disconnect(
        &self,
        conn: ConnectionId,
    ) -> Result<Vec<(SessionId, SessionView)>, SpylineError> {
        let (reply, rx) = oneshot::channel();
        self.send(GatewayCommand::Disconnect { conn, reply }).await?;
        rx.await.map_err(|_| SpylineError::GatewayUnavailable)
    }

    /// The public view of a session, if it exists.
    pub async fn snapshot(&self, session_id: SessionId) -> Result<Option<SessionView>, SpylineError> {
        let (reply, rx) = oneshot::channel();
        self.send(GatewayCommand::Snapshot { session_id, reply }).await?;
        rx.await.map_err(|_| SpylineError::GatewayUnavailable)
    }

    /// Stops the gateway task. Every running countdown is dropped with it.
    pub async fn shutdown(&self) -> Result<(), SpylineError> {
        self.send(GatewayCommand::Shutdown).await
    }

    async fn send(&self, command: GatewayCommand) -> Result<(), SpylineError> {
        self.sender
            .send(command)
            .await
            .map_err(|_| SpylineError::GatewayUnavailable)
    }
}

/// Spawns the gateway task and returns a handle to it.
pub fn spawn_gateway(config: &ServerConfig) -> GatewayHandle {
    let config = config.clone().validated();
    let (sender, receiver) = mpsc::channel(DEFAULT_CHANNEL_SIZE);
    let (gateway, timer_events) = SessionGateway::new(&config);

    tokio::spawn(run(gateway, receiver, timer_events, config.sweep_interval));

    GatewayHandle { sender }
}

async fn run(
    mut gateway: SessionGateway,
    mut commands: mpsc::Receiver<GatewayCommand>,
    mut timer_events: mpsc::UnboundedReceiver<TimerEvent>,
    sweep_every: Duration,
) {
    tracing::info!("gateway started");

    let mut sweep = time::interval_at(Instant::now() + sweep_every, sweep_every);
    sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else { break };
                if !dispatch(&mut gateway, command) {
                    break;
                }
            }
            Some(event) = timer_events.recv() => gateway.on_timer(event),
            _ = sweep.tick() => {
                let reclaimed = gateway.sweep();
                if reclaimed > 0 {
                    tracing::debug!(reclaimed, sessions = gateway.session_count(), "sweep finished");
                }
            }
        }
    }

    tracing::info!("gateway stopped");
}

/// Runs one command. Returns `false` when the loop should stop.
fn dispatch(gateway: &mut SessionGateway, command: GatewayCommand) -> bool {
    match command {
        GatewayCommand::Attach { conn, outbox } => gateway.attach(conn, outbox),
        GatewayCommand::Act { conn, action } => gateway.handle_action(conn, action),
        GatewayCommand::Disconnect { conn, reply } => {
            let _ = reply.send(gateway.disconnect(conn));
        }
        GatewayCommand::Snapshot { session_id, reply } => {
            let _ = reply.send(gateway.snapshot(session_id));
        }
        GatewayCommand::Shutdown => return false,
    }
    true
}
