//! # Spyline
//!
//! Session orchestrator for a social-deduction party game: lobbies, a
//! preparation countdown, timed turn rotation, and disconnect/reconnect
//! recovery for many concurrent sessions.
//!
//! ## Layers
//!
//! | Crate | Responsibility |
//! |---|---|
//! | `spyline-transport` | WebSocket connections |
//! | `spyline-protocol` | wire actions and events |
//! | `spyline-session` | session data, roster, store |
//! | `spyline-timer` | keyed countdowns |
//! | `spyline-game` | phase machine and rules |
//! | `spyline` (this crate) | gateway event loop and server |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use spyline::prelude::*;
//!
//! # async fn demo() -> Result<(), SpylineError> {
//! let server = SpylineServer::builder()
//!     .bind("0.0.0.0:3000")
//!     .build()
//!     .await?;
//! server.run().await
//! # }
//! ```

mod actor;
mod config;
mod error;
mod gateway;
mod handler;
mod server;

pub use actor::{GatewayHandle, spawn_gateway};
pub use config::ServerConfig;
pub use error::SpylineError;
pub use gateway::{Outbox, SessionGateway};
pub use server::{SpylineServer, SpylineServerBuilder};

pub mod prelude {
    pub use crate::{
        GatewayHandle, ServerConfig, SessionGateway, SpylineError, SpylineServer,
        SpylineServerBuilder, spawn_gateway,
    };
    pub use spyline_game::{CountdownPolicy, GameRules, ImpostorDeparture};
    pub use spyline_protocol::{
        ClientAction, ConnectionId, EndReason, ErrorReason, ImpostorMode, Phase, PlayerView,
        ServerEvent, SessionId, SessionView,
    };
    pub use spyline_session::SessionConfig;
    pub use spyline_timer::TimerConfig;
}
