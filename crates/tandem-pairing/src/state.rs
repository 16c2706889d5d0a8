//! The pairing state machine.
//!
//! `PairingState` owns the five structures that make up coordinator state:
//!
//! ```text
//! queue        VecDeque<CallerId>           FIFO of unmatched callers
//! queued_at    CallerId → Instant           when each queued caller arrived
//! partners     CallerId → CallerId          active pairs, both directions
//! rooms        (CallerId, CallerId) → Room  one room per active pair
//! heartbeats   CallerId → Instant           last sign of life
//! ```
//!
//! It is plain data with no locking and no clock: every method that cares
//! about time takes `now`. Thread-safety comes from the layer above, which
//! owns the state inside a single actor (see
//! [`spawn_coordinator`](crate::spawn_coordinator)).
//!
//! # Invariants
//!
//! - A caller is in at most one of {queue, partners}, never twice in either.
//! - `partners` is symmetric: `a → b` implies `b → a`.
//! - Every pair has exactly one room, keyed by the sorted pair of ids.
//!   `RoomId` is only a label: distinct pairs may render the same string.
//! - `queue` and `queued_at` hold the same callers.
//!
//! [`PairingState::check_invariants`] verifies all of them.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::time::Duration;

use tandem_protocol::{CallerId, EvictionReason};
use tokio::time::Instant;

use crate::{PairingConfig, PairingError, Room};

/// Result of [`PairingState::join`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    /// Nobody was waiting; the caller is now at `position` (1-based).
    Queued { position: usize },
    /// The caller was already waiting. Its place and queue-entry time are
    /// unchanged; only its heartbeat was refreshed.
    AlreadyQueued { position: usize },
    /// The caller was paired with the head of the queue.
    Matched(Room),
    /// The caller was already paired; this is its existing room.
    Rejoined(Room),
}

impl JoinOutcome {
    /// The room the caller is in after the join, if any.
    pub fn room(&self) -> Option<&Room> {
        match self {
            Self::Matched(room) | Self::Rejoined(room) => Some(room),
            Self::Queued { .. } | Self::AlreadyQueued { .. } => None,
        }
    }

    /// Consumes the outcome, keeping only the room.
    pub fn into_room(self) -> Option<Room> {
        match self {
            Self::Matched(room) | Self::Rejoined(room) => Some(room),
            Self::Queued { .. } | Self::AlreadyQueued { .. } => None,
        }
    }
}

/// One caller removed by a sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eviction {
    /// Who was removed.
    pub caller: CallerId,
    /// Which rule flagged them.
    pub reason: EvictionReason,
    /// The room torn down with them, if they were paired.
    pub closed_room: Option<Room>,
}

/// Point-in-time counts, for status endpoints and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PairingStats {
    /// Callers waiting for a partner.
    pub queued: usize,
    /// Live rooms.
    pub rooms: usize,
    /// Callers with a liveness record.
    pub tracked: usize,
}

/// Coordinator state. See the module docs for layout and invariants.
#[derive(Debug)]
pub struct PairingState {
    config: PairingConfig,
    queue: VecDeque<CallerId>,
    queued_at: HashMap<CallerId, Instant>,
    partners: HashMap<CallerId, CallerId>,
    rooms: HashMap<PairKey, Room>,
    heartbeats: HashMap<CallerId, Instant>,
}

impl PairingState {
    /// Creates empty state. The config is validated first.
    pub fn new(config: PairingConfig) -> Self {
        Self {
            config: config.validated(),
            queue: VecDeque::new(),
            queued_at: HashMap::new(),
            partners: HashMap::new(),
            rooms: HashMap::new(),
            heartbeats: HashMap::new(),
        }
    }

    /// The effective (validated) config.
    pub fn config(&self) -> &PairingConfig {
        &self.config
    }

    // -----------------------------------------------------------------
    // Operations
    // -----------------------------------------------------------------

    /// Pairs `caller` with the head of the queue, or queues it.
    ///
    /// The heartbeat is refreshed unconditionally. A caller that is already
    /// paired gets its room back; one that is already queued keeps its
    /// place (and its original queue-entry time, so re-joining cannot
    /// extend the queue timeout).
    pub fn join(&mut self, caller: CallerId, now: Instant) -> JoinOutcome {
        self.heartbeats.insert(caller.clone(), now);

        if let Some(room) = self.room_of(&caller) {
            tracing::debug!(%caller, room_id = %room.room_id(), "re-join while paired");
            return JoinOutcome::Rejoined(room.clone());
        }

        if let Some(position) = self.queue_position(&caller) {
            tracing::debug!(%caller, position, "re-join while queued");
            return JoinOutcome::AlreadyQueued { position };
        }

        if let Some(waiting) = self.queue.pop_front() {
            self.queued_at.remove(&waiting);

            let room = Room::pair(waiting.clone(), caller.clone(), now);
            self.partners.insert(caller.clone(), waiting.clone());
            self.partners.insert(waiting.clone(), caller.clone());
            self.rooms.insert(pair_key(&waiting, &caller), room.clone());

            tracing::info!(
                room_id = %room.room_id(),
                %waiting,
                arriving = %caller,
                depth = self.queue.len(),
                "room created"
            );
            return JoinOutcome::Matched(room);
        }

        self.queue.push_back(caller.clone());
        self.queued_at.insert(caller.clone(), now);
        let position = self.queue.len();
        tracing::info!(%caller, depth = position, "caller queued");
        JoinOutcome::Queued { position }
    }

    /// Forgets `caller` entirely: queue slot, queue-entry time, liveness,
    /// and pair. Returns the room that was torn down, if any.
    ///
    /// Unknown callers are a no-op.
    pub fn leave(&mut self, caller: &CallerId) -> Option<Room> {
        let was_queued = self.remove_from_queue(caller);
        let was_tracked = self.heartbeats.remove(caller).is_some();
        let room = self.unpair(caller);

        match &room {
            Some(room) => tracing::info!(
                %caller,
                room_id = %room.room_id(),
                "caller left, room closed"
            ),
            None if was_queued => {
                tracing::info!(%caller, depth = self.queue.len(), "caller left queue");
            }
            None if was_tracked => tracing::debug!(%caller, "idle caller left"),
            None => tracing::debug!(%caller, "leave for unknown caller ignored"),
        }
        room
    }

    /// Ends `caller`'s match and drops its liveness record. The queue is
    /// not touched. Returns the room that was torn down, if any.
    ///
    /// The partner keeps its liveness record: it is still connected, just
    /// no longer paired, and is reclaimed only if it stops heartbeating.
    pub fn end_match(&mut self, caller: &CallerId) -> Option<Room> {
        let room = self.unpair(caller);
        self.heartbeats.remove(caller);

        match &room {
            Some(room) => tracing::info!(
                %caller,
                room_id = %room.room_id(),
                "match ended"
            ),
            None => tracing::debug!(%caller, "end_match without a match"),
        }
        room
    }

    /// The room `caller` is currently in. Read-only.
    pub fn get_match(&self, caller: &CallerId) -> Option<&Room> {
        self.room_of(caller)
    }

    /// Refreshes `caller`'s liveness timestamp.
    ///
    /// Returns `false` (and does nothing) for a caller the coordinator does
    /// not know, such as one reclaimed a moment ago.
    pub fn heartbeat(&mut self, caller: &CallerId, now: Instant) -> bool {
        let known = self.heartbeats.contains_key(caller)
            || self.queued_at.contains_key(caller)
            || self.partners.contains_key(caller);
        if known {
            self.heartbeats.insert(caller.clone(), now);
        } else {
            tracing::debug!(%caller, "heartbeat from unknown caller ignored");
        }
        known
    }

    // -----------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------

    /// Number of callers waiting for a partner.
    pub fn queue_depth(&self) -> usize {
        self.queue.len()
    }

    /// Returns `true` if `caller` is waiting in the queue.
    pub fn is_queued(&self, caller: &CallerId) -> bool {
        self.queued_at.contains_key(caller)
    }

    /// 1-based position of `caller` in the queue.
    pub fn queue_position(&self, caller: &CallerId) -> Option<usize> {
        if !self.is_queued(caller) {
            return None;
        }
        self.queue.iter().position(|c| c == caller).map(|i| i + 1)
    }

    /// How long `caller` has been waiting, if it is queued.
    pub fn waiting_time(
        &self,
        caller: &CallerId,
        now: Instant,
    ) -> Option<Duration> {
        self.queued_at
            .get(caller)
            .map(|since| now.saturating_duration_since(*since))
    }

    /// Returns `true` if `caller` has been queued longer than the queue
    /// timeout. Always `false` for callers that are not queued.
    pub fn is_queue_timed_out(&self, caller: &CallerId, now: Instant) -> bool {
        self.waiting_time(caller, now)
            .is_some_and(|waited| waited > self.config.queue_timeout)
    }

    /// Point-in-time counts.
    pub fn stats(&self) -> PairingStats {
        PairingStats {
            queued: self.queue.len(),
            rooms: self.rooms.len(),
            tracked: self.heartbeats.len(),
        }
    }

    // -----------------------------------------------------------------
    // Reclaiming
    // -----------------------------------------------------------------

    /// Callers a sweep at `now` would evict, sorted by id, each listed once.
    ///
    /// The heartbeat rule covers every tracked caller, paired ones
    /// included. The queue rule covers queued callers only. A caller
    /// flagged by both is reported with [`EvictionReason::HeartbeatExpired`].
    pub fn stale_callers(
        &self,
        now: Instant,
    ) -> Vec<(CallerId, EvictionReason)> {
        let mut flagged = BTreeMap::new();

        for (caller, last) in &self.heartbeats {
            if now.saturating_duration_since(*last) > self.config.heartbeat_timeout {
                flagged.insert(caller.clone(), EvictionReason::HeartbeatExpired);
            }
        }
        for (caller, since) in &self.queued_at {
            if now.saturating_duration_since(*since) > self.config.queue_timeout {
                flagged
                    .entry(caller.clone())
                    .or_insert(EvictionReason::QueueExpired);
            }
        }

        flagged.into_iter().collect()
    }

    /// Evicts every stale caller through [`leave`](Self::leave).
    ///
    /// Scan and eviction happen in one `&mut self` borrow, so nothing can
    /// refresh a flagged caller in between.
    pub fn sweep(&mut self, now: Instant) -> Vec<Eviction> {
        let stale = self.stale_callers(now);
        let mut evictions = Vec::with_capacity(stale.len());

        for (caller, reason) in stale {
            let closed_room = self.leave(&caller);
            tracing::info!(%caller, %reason, "stale caller reclaimed");
            evictions.push(Eviction {
                caller,
                reason,
                closed_room,
            });
        }

        if !evictions.is_empty() {
            tracing::info!(
                evicted = evictions.len(),
                depth = self.queue.len(),
                rooms = self.rooms.len(),
                "sweep finished"
            );
        }
        evictions
    }

    // -----------------------------------------------------------------
    // Invariants
    // -----------------------------------------------------------------

    /// Verifies the structural invariants listed in the module docs.
    ///
    /// # Errors
    /// Returns [`PairingError::InvariantViolated`] describing the first
    /// violation found.
    pub fn check_invariants(&self) -> Result<(), PairingError> {
        let violated = |msg: String| Err(PairingError::InvariantViolated(msg));

        let mut seen = HashSet::with_capacity(self.queue.len());
        for caller in &self.queue {
            if !seen.insert(caller) {
                return violated(format!("{caller} queued twice"));
            }
            if !self.queued_at.contains_key(caller) {
                return violated(format!("{caller} queued without entry time"));
            }
            if self.partners.contains_key(caller) {
                return violated(format!("{caller} both queued and paired"));
            }
        }
        if self.queued_at.len() != self.queue.len() {
            return violated(format!(
                "queue holds {} callers but {} entry times",
                self.queue.len(),
                self.queued_at.len()
            ));
        }

        for (caller, partner) in &self.partners {
            if caller == partner {
                return violated(format!("{caller} paired with itself"));
            }
            if self.partners.get(partner) != Some(caller) {
                return violated(format!(
                    "{caller} → {partner} has no reverse mapping"
                ));
            }
            match self.rooms.get(&pair_key(caller, partner)) {
                Some(room) if room.partner_of(caller) == Some(partner) => {}
                Some(room) => {
                    return violated(format!(
                        "{} has wrong participants",
                        room.room_id()
                    ));
                }
                None => {
                    return violated(format!(
                        "pair {caller}/{partner} has no room"
                    ));
                }
            }
        }
        if self.rooms.len() * 2 != self.partners.len() {
            return violated(format!(
                "{} rooms for {} paired callers",
                self.rooms.len(),
                self.partners.len()
            ));
        }

        Ok(())
    }

    // -----------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------

    fn room_of(&self, caller: &CallerId) -> Option<&Room> {
        let partner = self.partners.get(caller)?;
        self.rooms.get(&pair_key(caller, partner))
    }

    /// Removes `caller` from the queue. Linear in queue length.
    fn remove_from_queue(&mut self, caller: &CallerId) -> bool {
        if self.queued_at.remove(caller).is_none() {
            return false;
        }
        self.queue.retain(|c| c != caller);
        true
    }

    /// Removes both directions of `caller`'s pair and its room.
    fn unpair(&mut self, caller: &CallerId) -> Option<Room> {
        let partner = self.partners.remove(caller)?;
        self.partners.remove(&partner);
        self.rooms.remove(&pair_key(caller, &partner))
    }
}

/// Room registry key: both ids, smaller first.
type PairKey = (CallerId, CallerId);

fn pair_key(a: &CallerId, b: &CallerId) -> PairKey {
    if a <= b {
        (a.clone(), b.clone())
    } else {
        (b.clone(), a.clone())
    }
}

// =========================================================================
// Tests
// =========================================================================
