//! Error types for the protocol layer.

/// Errors raised while validating identities or (de)serializing messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// A caller identity was empty or consisted only of whitespace.
    ///
    /// Identities are issued by an external auth collaborator; a blank one
    /// means the collaborator (or a client) misbehaved, so it is rejected
    /// before it can reach coordinator state.
    #[error("invalid caller id: {0:?}")]
    InvalidCallerId(String),

    /// Serialization failed.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed: malformed JSON, an unknown `type` tag, or a
    /// field that fails validation (such as a blank caller id).
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The frame decoded fine but breaks a protocol rule, e.g. a second
    /// `Hello` on an established connection.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
