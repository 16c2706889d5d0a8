//! Notifications broadcast by the coordinator.

use tandem_protocol::{CallerId, CloseReason, EvictionReason};

use crate::Room;

/// Something changed that a participant other than the requester may need
/// to hear about.
///
/// The caller whose request caused the change already has the answer in its
/// reply; events carry the originator (`joined_by`, `closed_by`) so
/// subscribers can skip the ones they caused themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingEvent {
    /// A room was created by `joined_by`'s join.
    Matched { room: Room, joined_by: CallerId },

    /// A room was torn down because `closed_by` left, ended the match, or
    /// was reclaimed.
    RoomClosed {
        room: Room,
        closed_by: CallerId,
        reason: CloseReason,
    },

    /// The sweep removed `caller`.
    Evicted {
        caller: CallerId,
        reason: EvictionReason,
    },
}

impl PairingEvent {
    /// Returns `true` if `caller` should be told about this event: it is a
    /// participant or the evicted caller, and did not cause it.
    pub fn notifies(&self, caller: &CallerId) -> bool {
        match self {
            Self::Matched { room, joined_by } => {
                room.contains(caller) && joined_by != caller
            }
            Self::RoomClosed {
                room, closed_by, ..
            } => room.contains(caller) && closed_by != caller,
            Self::Evicted { caller: evicted, .. } => evicted == caller,
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::time::Instant;

    use super::*;
    use crate::{PairingConfig, PairingState};

    fn cid(raw: &str) -> CallerId {
        CallerId::new(raw).unwrap()
    }

    fn room_ab() -> Room {
        let mut st = PairingState::new(PairingConfig::default());
        let now = Instant::now();
        st.join(cid("a"), now);
        st.join(cid("b"), now).into_room().unwrap()
    }

    #[test]
    fn test_matched_notifies_waiting_side_only() {
        let event = PairingEvent::Matched {
            room: room_ab(),
            joined_by: cid("b"),
        };
        assert!(event.notifies(&cid("a")));
        assert!(!event.notifies(&cid("b")));
        assert!(!event.notifies(&cid("c")));
    }

    #[test]
    fn test_room_closed_notifies_partner_only() {
        let event = PairingEvent::RoomClosed {
            room: room_ab(),
            closed_by: cid("a"),
            reason: CloseReason::Left,
        };
        assert!(!event.notifies(&cid("a")));
        assert!(event.notifies(&cid("b")));
    }

    #[test]
    fn test_evicted_notifies_evicted_caller() {
        let event = PairingEvent::Evicted {
            caller: cid("c"),
            reason: EvictionReason::QueueExpired,
        };
        assert!(event.notifies(&cid("c")));
        assert!(!event.notifies(&cid("a")));
    }
}
