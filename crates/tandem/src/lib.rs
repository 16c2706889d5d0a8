//! # Tandem
//!
//! WebSocket gateway for two-party pairing.
//!
//! Callers connect, say `Hello` with a token, and `Join`. The first caller
//! waits; the next one is paired with it into a room both sides can look up.
//! Callers that stop heartbeating, or wait too long, are reclaimed.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tandem::prelude::*;
//!
//! # async fn run() -> Result<(), TandemError> {
//! let server = TandemServer::builder()
//!     .config(ServerConfig::from_env()?)
//!     .build(TrustedToken)
//!     .await?;
//! server.run().await
//! # }
//! ```

mod auth;
mod config;
mod error;
mod handler;
mod server;

pub use auth::{Authenticator, TrustedToken};
pub use config::{ConfigError, ServerConfig};
pub use error::TandemError;
pub use server::{TandemServer, TandemServerBuilder};

pub use tandem_pairing::{CoordinatorHandle, PairingConfig};
pub use tandem_protocol::{CallerId, ClientMessage, RoomId, RoomView, ServerMessage};

/// Everything needed to run a server or write an [`Authenticator`].
pub mod prelude {
    pub use crate::{
        Authenticator, CallerId, ClientMessage, ConfigError, PairingConfig,
        RoomId, RoomView, ServerConfig, ServerMessage, TandemError,
        TandemServer, TandemServerBuilder, TrustedToken,
    };
}
