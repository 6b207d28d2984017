//! Wire protocol for Spyline.
//!
//! This crate defines the "language" that clients and the session server
//! speak:
//!
//! - **Identifiers** ([`SessionId`], [`ConnectionId`]) shared by every layer.
//! - **Inbound actions** ([`ClientAction`]) a connection may request.
//! - **Outbound events** ([`ServerEvent`]) the server broadcasts, plus the
//!   public [`SessionView`] projection they carry.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how those messages are
//!   converted to and from bytes.
//! - **Errors** ([`ProtocolError`], [`ErrorReason`]).
//!
//! ```text
//! Transport (frames) → Protocol (ClientAction / ServerEvent) → Gateway
//! ```
//!
//! Every message is one JSON object tagged by `"type"`, with camelCase
//! field names, e.g. `{"type":"joinSession","sessionId":"…","playerName":"Bo"}`.

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use spyline_transport::ConnectionId;
pub use types::{
    ClientAction, EndReason, ErrorReason, ImpostorMode, Phase, PlayerView, ServerEvent, SessionId,
    SessionView,
};
