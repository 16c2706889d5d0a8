//! Codec trait and the JSON implementation.
//!
//! The gateway never calls `serde_json` directly; it goes through a
//! [`Codec`], which also tells it what kind of WebSocket frame to emit.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// The WebSocket frame type a codec's output belongs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// UTF-8 text frames.
    Text,
    /// Binary frames.
    Binary,
}

/// Converts messages to and from bytes.
///
/// `Send + Sync + 'static` because one codec instance is shared by every
/// connection task for the lifetime of the server.
pub trait Codec: Send + Sync + 'static {
    /// Frame type that encoded output should travel in.
    fn frame_kind(&self) -> FrameKind;

    /// Serializes a value.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Encode`] if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes a value.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Decode`] on malformed input or a value that
    /// fails validation.
    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError>;
}

/// JSON codec backed by `serde_json`. Emits text frames so browser clients
/// can read messages without a decoder.
///
/// ```rust
/// use tandem_protocol::{ClientMessage, Codec, FrameKind, JsonCodec};
///
/// let codec = JsonCodec;
/// assert_eq!(codec.frame_kind(), FrameKind::Text);
///
/// let msg: ClientMessage = codec.decode(br#"{"type":"Heartbeat"}"#).unwrap();
/// assert_eq!(msg, ClientMessage::Heartbeat);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn frame_kind(&self) -> FrameKind {
        FrameKind::Text
    }

    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
