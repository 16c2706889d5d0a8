//! Shared vocabulary for Tandem.
//!
//! This crate defines the types that both the pairing core and the
//! gateway speak:
//!
//! - **Identities** ([`CallerId`], [`RoomId`]): who is talking and which
//!   pairing they are in.
//! - **Messages** ([`ClientMessage`], [`ServerMessage`]): the JSON frames a
//!   gateway exchanges with its clients.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how messages become bytes.
//!
//! ```text
//! Gateway (frames) → Protocol (messages, ids) → Pairing core (state)
//! ```
//!
//! The pairing core only depends on the identity types; the message types
//! exist for transport-facing collaborators.

mod codec;
mod error;
mod types;

pub use codec::{Codec, FrameKind};
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    CallerId, ClientMessage, CloseReason, EvictionReason, RoomId, RoomView,
    ServerMessage,
};
