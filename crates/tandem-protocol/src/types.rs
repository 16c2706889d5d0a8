//! Identity types and the gateway's wire messages.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// An opaque caller identity issued by an external auth collaborator.
///
/// The coordinator never interprets the contents; it only compares, hashes
/// and orders them. The one rule enforced here is that an identity is never
/// blank, so every `CallerId` that exists is safe to key state by.
///
/// Deserialization runs through [`CallerId::new`] (`try_from = "String"`),
/// so a blank id in a JSON frame fails to decode instead of slipping past
/// validation.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct CallerId(String);

impl CallerId {
    /// Validates and wraps a raw identity token.
    ///
    /// # Errors
    /// Returns [`ProtocolError::InvalidCallerId`] if `raw` is empty or
    /// whitespace only.
    pub fn new(raw: impl Into<String>) -> Result<Self, ProtocolError> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(ProtocolError::InvalidCallerId(raw));
        }
        Ok(Self(raw))
    }

    /// The identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CallerId {
    type Error = ProtocolError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::new(raw)
    }
}

impl From<CallerId> for String {
    fn from(id: CallerId) -> Self {
        id.0
    }
}

impl fmt::Display for CallerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a room: one live pairing of two callers.
///
/// Derived, never assigned: the same two callers always produce the same
/// id regardless of who joined first, so either side can find the room
/// without knowing who initiated the match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    /// Leading tag of every room id.
    pub const PREFIX: &'static str = "room";

    /// Separator between the prefix and the two identities.
    pub const SEPARATOR: char = '_';

    /// Derives the room id for a pair: `room_<low>_<high>`, where `low` and
    /// `high` are the two identities in lexicographic order.
    pub fn for_pair(a: &CallerId, b: &CallerId) -> Self {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        let sep = Self::SEPARATOR;
        Self(format!("{}{sep}{low}{sep}{high}", Self::PREFIX))
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Reasons
// ---------------------------------------------------------------------------

/// Why a room was torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// A participant left (explicitly or by disconnecting).
    Left,
    /// A participant ended the match but stays connected.
    Ended,
    /// A participant was evicted by the reclaimer.
    Reclaimed,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Left => write!(f, "left"),
            Self::Ended => write!(f, "ended"),
            Self::Reclaimed => write!(f, "reclaimed"),
        }
    }
}

/// Which reclaimer rule flagged a caller.
///
/// When both rules fire in the same sweep the heartbeat rule wins; the
/// caller is still evicted only once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionReason {
    /// No heartbeat within the heartbeat timeout.
    HeartbeatExpired,
    /// Waited in the queue longer than the queue timeout.
    QueueExpired,
}

impl fmt::Display for EvictionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HeartbeatExpired => write!(f, "heartbeat_expired"),
            Self::QueueExpired => write!(f, "queue_expired"),
        }
    }
}

// ---------------------------------------------------------------------------
// Wire messages
// ---------------------------------------------------------------------------

/// A room as the gateway presents it to one of its participants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomView {
    /// Derived room id, identical for both participants.
    pub room_id: RoomId,
    /// Both participants, the one that waited in the queue first.
    pub participants: [CallerId; 2],
    /// The other participant, from the recipient's point of view.
    pub partner: CallerId,
    /// Milliseconds since the server started when the room was created.
    pub created_at_ms: u64,
}

/// Client → gateway frames.
///
/// Internally tagged: `{"type": "Join"}`, `{"type": "Hello", "token": "…"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// First frame on every connection. The token is handed to the
    /// gateway's authenticator to obtain a [`CallerId`].
    Hello { token: String },
    /// Ask to be paired.
    Join,
    /// Leave the queue or the current room.
    Leave,
    /// End the current match without disconnecting.
    EndMatch,
    /// Liveness signal.
    Heartbeat,
    /// Look up the current room.
    GetMatch,
    /// Ask for queue depth and this caller's wait time.
    QueueStatus,
}

/// Gateway → client frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Handshake accepted. Clients should heartbeat at least every
    /// `heartbeat_interval_ms`.
    Welcome {
        caller_id: CallerId,
        heartbeat_interval_ms: u64,
    },
    /// No partner yet; the caller waits at `position` (1-based).
    Queued { position: usize, depth: usize },
    /// The caller is in a room, either freshly matched or re-joined.
    Matched { room: RoomView },
    /// `GetMatch` found no room.
    NoMatch,
    /// The caller's room was torn down.
    RoomClosed {
        room_id: RoomId,
        closed_by: CallerId,
        reason: CloseReason,
    },
    /// The reclaimer removed this caller.
    Evicted { reason: EvictionReason },
    /// Reply to `QueueStatus`.
    QueueStatus {
        depth: usize,
        queued: bool,
        waiting_ms: Option<u64>,
    },
    /// Reply to `Leave`.
    Left,
    /// Reply to `EndMatch`.
    MatchEnded,
    /// Reply to `Heartbeat`.
    HeartbeatAck,
    /// Something went wrong. `code` follows HTTP conventions.
    Error { code: u16, message: String },
}
