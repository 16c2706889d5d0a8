//! A room: one live pairing of two callers.

use tandem_protocol::{CallerId, RoomId};
use tokio::time::Instant;

/// One live pairing.
///
/// A room exists exactly as long as its pair does: it is created the
/// instant the second caller arrives and removed when either side leaves,
/// ends the match, or is reclaimed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Room {
    room_id: RoomId,
    participants: [CallerId; 2],
    created_at: Instant,
}

impl Room {
    /// Pairs the caller that was waiting with the one that just arrived.
    pub(crate) fn pair(
        waiting: CallerId,
        arriving: CallerId,
        now: Instant,
    ) -> Self {
        Self {
            room_id: RoomId::for_pair(&waiting, &arriving),
            participants: [waiting, arriving],
            created_at: now,
        }
    }

    /// The derived room id.
    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    /// Both participants, the one that waited first.
    pub fn participants(&self) -> &[CallerId; 2] {
        &self.participants
    }

    /// When the pair was formed.
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Returns `true` if `caller` is one of the two participants.
    pub fn contains(&self, caller: &CallerId) -> bool {
        self.participants.contains(caller)
    }

    /// The other participant, or `None` if `caller` is not in this room.
    pub fn partner_of(&self, caller: &CallerId) -> Option<&CallerId> {
        let [first, second] = &self.participants;
        if first == caller {
            Some(second)
        } else if second == caller {
            Some(first)
        } else {
            None
        }
    }
}
