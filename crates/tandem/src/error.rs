//! Unified error type for the Tandem gateway.

use tandem_pairing::PairingError;
use tandem_protocol::ProtocolError;
use tokio_tungstenite::tungstenite;

use crate::ConfigError;

/// Top-level error that wraps every crate-specific error.
///
/// The `#[from]` attributes let `?` convert sub-crate errors directly.
#[derive(Debug, thiserror::Error)]
pub enum TandemError {
    /// Encoding or decoding a frame failed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The pairing coordinator rejected or could not serve a request.
    #[error(transparent)]
    Pairing(#[from] PairingError),

    /// The server configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The `Hello` token was rejected.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The client broke the handshake (wrong first message, timeout, or
    /// closed early).
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// WebSocket framing or I/O on an upgraded connection failed.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// Binding or accepting on the listener failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl TandemError {
    /// HTTP-style status code reported to the client in
    /// [`ServerMessage::Error`](tandem_protocol::ServerMessage::Error).
    pub fn code(&self) -> u16 {
        match self {
            Self::AuthFailed(_) => 401,
            Self::Pairing(PairingError::Unavailable) => 503,
            Self::Pairing(PairingError::InvariantViolated(_))
            | Self::Config(_)
            | Self::WebSocket(_)
            | Self::Io(_) => 500,
            Self::Protocol(_) | Self::Handshake(_) => 400,
        }
    }
}
