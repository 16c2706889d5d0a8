//! Two-party pairing coordinator for Tandem.
//!
//! Callers ask to be paired; the first caller waits, the second completes
//! the pair and both land in the same room. Callers prove they are still
//! around with heartbeats, and a periodic sweep reclaims anyone who went
//! quiet or waited too long.
//!
//! # Key types
//!
//! - [`PairingState`]: the state machine itself, plain data, no I/O
//! - [`spawn_coordinator`] / [`CoordinatorHandle`]: the state wrapped in an
//!   actor task that serializes every operation and runs the sweep
//! - [`Room`]: one live pairing
//! - [`PairingEvent`]: what subscribers hear when rooms open, close, or
//!   callers are evicted
//! - [`PairingConfig`]: heartbeat timeout, queue timeout, sweep interval
//!
//! # Exclusion
//!
//! All state lives inside one actor. Public operations and the sweep are
//! commands on the same channel, so a sweep can never interleave with a
//! `join` or `heartbeat`: a caller that heartbeats before the sweep runs is
//! judged on the fresh timestamp.

mod config;
mod coordinator;
mod error;
mod event;
mod room;
mod state;

pub use config::PairingConfig;
pub use coordinator::{CoordinatorHandle, spawn_coordinator};
pub use error::PairingError;
pub use event::PairingEvent;
pub use room::Room;
pub use state::{Eviction, JoinOutcome, PairingState, PairingStats};

pub use tandem_protocol::{CallerId, CloseReason, EvictionReason, RoomId};
