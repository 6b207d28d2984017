//! Codec trait and implementations for serializing/deserializing messages.
//!
//! The gateway never touches bytes. The connection handler decodes each
//! inbound frame into a [`ClientAction`](crate::ClientAction) and encodes
//! each [`ServerEvent`](crate::ServerEvent) through whatever implements
//! [`Codec`]. Only [`JsonCodec`] ships today.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// A codec that can encode Rust types to bytes and decode bytes back.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// Behind the `json` feature flag (enabled by default).
///
/// ```rust
/// use spyline_protocol::{ClientAction, Codec, JsonCodec};
///
/// let codec = JsonCodec;
/// let action: ClientAction = codec
///     .decode(br#"{"type":"createSession","hostName":"Ana"}"#)
///     .unwrap();
/// assert_eq!(action, ClientAction::CreateSession { host_name: "Ana".into() });
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
