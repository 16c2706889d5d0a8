//! Coordinator actor: a Tokio task that owns the [`PairingState`].
//!
//! Every operation is a command on one mpsc channel, and the periodic
//! sweep runs in the same `select!` loop. That gives one exclusion domain
//! for all five structures without a lock: nothing interleaves with a
//! `join`, and a sweep always sees the latest heartbeats.
//!
//! ```text
//! CoordinatorHandle ──Command──▶ Coordinator task ──PairingEvent──▶ subscribers
//!        ▲                          │   ▲
//!        └──────── oneshot reply ───┘   └── sweep interval
//! ```

use std::time::Duration;

use tandem_protocol::{CallerId, CloseReason};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::{
    Eviction, JoinOutcome, PairingConfig, PairingError, PairingEvent,
    PairingState, PairingStats, Room,
};

/// Command channel size. Senders wait when it fills up.
const COMMAND_CHANNEL_SIZE: usize = 256;

/// Event channel size. Subscribers that fall further behind than this
/// miss events and see `RecvError::Lagged`.
const EVENT_CHANNEL_SIZE: usize = 1024;

/// Commands sent to the coordinator task.
///
/// Variants with a `reply` are request/response; the rest are
/// fire-and-forget.
enum Command {
    Join {
        caller: CallerId,
        reply: oneshot::Sender<JoinOutcome>,
    },
    Leave {
        caller: CallerId,
        reply: oneshot::Sender<Option<Room>>,
    },
    EndMatch {
        caller: CallerId,
        reply: oneshot::Sender<Option<Room>>,
    },
    GetMatch {
        caller: CallerId,
        reply: oneshot::Sender<Option<Room>>,
    },
    Heartbeat {
        caller: CallerId,
    },
    QueueDepth {
        reply: oneshot::Sender<usize>,
    },
    IsQueued {
        caller: CallerId,
        reply: oneshot::Sender<bool>,
    },
    WaitingTime {
        caller: CallerId,
        reply: oneshot::Sender<Option<Duration>>,
    },
    Stats {
        reply: oneshot::Sender<PairingStats>,
    },
    Sweep {
        reply: oneshot::Sender<Vec<Eviction>>,
    },
    CheckInvariants {
        reply: oneshot::Sender<Result<(), PairingError>>,
    },
    Shutdown,
}

/// Handle to the running coordinator.
///
/// Cheap to clone: an `mpsc::Sender` and a `broadcast::Sender`. Every
/// method fails with [`PairingError::Unavailable`] once the coordinator
/// has shut down.
#[derive(Clone)]
pub struct CoordinatorHandle {
    sender: mpsc::Sender<Command>,
    events: broadcast::Sender<PairingEvent>,
}

impl CoordinatorHandle {
    /// Pairs `caller` with whoever is waiting, or queues it.
    pub async fn join(
        &self,
        caller: CallerId,
    ) -> Result<JoinOutcome, PairingError> {
        self.request(|reply| Command::Join { caller, reply }).await
    }

    /// Removes `caller` from everything. Returns the room torn down, if any.
    pub async fn leave(
        &self,
        caller: CallerId,
    ) -> Result<Option<Room>, PairingError> {
        self.request(|reply| Command::Leave { caller, reply }).await
    }

    /// Ends `caller`'s match. Returns the room torn down, if any.
    pub async fn end_match(
        &self,
        caller: CallerId,
    ) -> Result<Option<Room>, PairingError> {
        self.request(|reply| Command::EndMatch { caller, reply }).await
    }

    /// Looks up `caller`'s current room.
    pub async fn get_match(
        &self,
        caller: CallerId,
    ) -> Result<Option<Room>, PairingError> {
        self.request(|reply| Command::GetMatch { caller, reply }).await
    }

    /// Records a heartbeat (fire-and-forget).
    ///
    /// Commands from one handle are processed in order, so a query sent
    /// after this call observes the refreshed timestamp.
    pub async fn heartbeat(&self, caller: CallerId) -> Result<(), PairingError> {
        self.sender
            .send(Command::Heartbeat { caller })
            .await
            .map_err(|_| PairingError::Unavailable)
    }

    /// Number of callers waiting.
    pub async fn queue_depth(&self) -> Result<usize, PairingError> {
        self.request(|reply| Command::QueueDepth { reply }).await
    }

    /// Whether `caller` is waiting.
    pub async fn is_queued(&self, caller: CallerId) -> Result<bool, PairingError> {
        self.request(|reply| Command::IsQueued { caller, reply }).await
    }

    /// How long `caller` has been waiting, if queued.
    pub async fn waiting_time(
        &self,
        caller: CallerId,
    ) -> Result<Option<Duration>, PairingError> {
        self.request(|reply| Command::WaitingTime { caller, reply })
            .await
    }

    /// Point-in-time counts.
    pub async fn stats(&self) -> Result<PairingStats, PairingError> {
        self.request(|reply| Command::Stats { reply }).await
    }

    /// Runs a sweep immediately, outside the regular interval.
    pub async fn sweep_now(&self) -> Result<Vec<Eviction>, PairingError> {
        self.request(|reply| Command::Sweep { reply }).await
    }

    /// Verifies the state's structural invariants.
    pub async fn check_invariants(&self) -> Result<(), PairingError> {
        self.request(|reply| Command::CheckInvariants { reply })
            .await?
    }

    /// Subscribes to [`PairingEvent`]s emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<PairingEvent> {
        self.events.subscribe()
    }

    /// Stops the coordinator. Pending commands behind this one are dropped.
    pub async fn shutdown(&self) -> Result<(), PairingError> {
        self.sender
            .send(Command::Shutdown)
            .await
            .map_err(|_| PairingError::Unavailable)
    }

    /// Returns `true` once the coordinator task has stopped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Completes when the coordinator task stops.
    ///
    /// Subscribers cannot rely on `RecvError::Closed` for this: every
    /// handle keeps the event channel open.
    pub async fn closed(&self) {
        self.sender.closed().await;
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, PairingError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(build(reply_tx))
            .await
            .map_err(|_| PairingError::Unavailable)?;
        reply_rx.await.map_err(|_| PairingError::Unavailable)
    }
}

/// The actor. Lives inside the task spawned by [`spawn_coordinator`].
struct Coordinator {
    state: PairingState,
    receiver: mpsc::Receiver<Command>,
    events: broadcast::Sender<PairingEvent>,
}

impl Coordinator {
    /// Processes commands and sweeps until shutdown or until every handle
    /// is dropped.
    async fn run(mut self) {
        let period = self.state.config().sweep_interval;
        tracing::info!(
            heartbeat_timeout_ms = self.state.config().heartbeat_timeout.as_millis() as u64,
            queue_timeout_ms = self.state.config().queue_timeout.as_millis() as u64,
            sweep_interval_ms = period.as_millis() as u64,
            "pairing coordinator started"
        );

        // First sweep one full period after start, then every period.
        // Missed ticks are skipped rather than replayed in a burst.
        let now = Instant::now();
        let first = now.checked_add(period).unwrap_or(now);
        let mut sweeps = time::interval_at(first, period);
        sweeps.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                cmd = self.receiver.recv() => match cmd {
                    Some(Command::Shutdown) => {
                        tracing::info!("pairing coordinator shutting down");
                        break;
                    }
                    Some(cmd) => self.handle(cmd),
                    None => break,
                },
                _ = sweeps.tick() => {
                    self.sweep();
                }
            }
        }

        let stats = self.state.stats();
        tracing::info!(
            queued = stats.queued,
            rooms = stats.rooms,
            "pairing coordinator stopped"
        );
    }

    fn handle(&mut self, cmd: Command) {
        let now = Instant::now();
        match cmd {
            Command::Join { caller, reply } => {
                let outcome = self.state.join(caller.clone(), now);
                if let JoinOutcome::Matched(room) = &outcome {
                    self.emit(PairingEvent::Matched {
                        room: room.clone(),
                        joined_by: caller,
                    });
                }
                let _ = reply.send(outcome);
            }
            Command::Leave { caller, reply } => {
                let room = self.state.leave(&caller);
                self.emit_closed(room.as_ref(), caller, CloseReason::Left);
                let _ = reply.send(room);
            }
            Command::EndMatch { caller, reply } => {
                let room = self.state.end_match(&caller);
                self.emit_closed(room.as_ref(), caller, CloseReason::Ended);
                let _ = reply.send(room);
            }
            Command::GetMatch { caller, reply } => {
                let _ = reply.send(self.state.get_match(&caller).cloned());
            }
            Command::Heartbeat { caller } => {
                self.state.heartbeat(&caller, now);
            }
            Command::QueueDepth { reply } => {
                let _ = reply.send(self.state.queue_depth());
            }
            Command::IsQueued { caller, reply } => {
                let _ = reply.send(self.state.is_queued(&caller));
            }
            Command::WaitingTime { caller, reply } => {
                let _ = reply.send(self.state.waiting_time(&caller, now));
            }
            Command::Stats { reply } => {
                let _ = reply.send(self.state.stats());
            }
            Command::Sweep { reply } => {
                let _ = reply.send(self.sweep());
            }
            Command::CheckInvariants { reply } => {
                let _ = reply.send(self.state.check_invariants());
            }
            // Handled by the run loop before dispatch.
            Command::Shutdown => {}
        }
    }

    fn sweep(&mut self) -> Vec<Eviction> {
        let evictions = self.state.sweep(Instant::now());
        for eviction in &evictions {
            self.emit(PairingEvent::Evicted {
                caller: eviction.caller.clone(),
                reason: eviction.reason,
            });
            self.emit_closed(
                eviction.closed_room.as_ref(),
                eviction.caller.clone(),
                CloseReason::Reclaimed,
            );
        }
        evictions
    }

    fn emit_closed(
        &self,
        room: Option<&Room>,
        closed_by: CallerId,
        reason: CloseReason,
    ) {
        if let Some(room) = room {
            self.emit(PairingEvent::RoomClosed {
                room: room.clone(),
                closed_by,
                reason,
            });
        }
    }

    /// Broadcasts an event. Having no subscribers is not an error.
    fn emit(&self, event: PairingEvent) {
        let _ = self.events.send(event);
    }
}

/// Spawns the coordinator task and returns a handle to it.
///
/// Must be called from within a Tokio runtime. The task stops on
/// [`CoordinatorHandle::shutdown`] or when the last handle is dropped.
pub fn spawn_coordinator(config: PairingConfig) -> CoordinatorHandle {
    let (tx, rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
    let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);

    let coordinator = Coordinator {
        state: PairingState::new(config),
        receiver: rx,
        events: events.clone(),
    };

    tokio::spawn(coordinator.run());

    CoordinatorHandle { sender: tx, events }
}
