//! Unified error type for Spyline.

use spyline_protocol::ProtocolError;
use spyline_session::SessionError;
use spyline_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant generates the `From` impls, so
/// `?` converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum SpylineError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// An action was refused.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The gateway event loop has stopped.
    #[error("gateway is not running")]
    GatewayUnavailable,
}
