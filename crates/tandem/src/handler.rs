//! Per-connection handler: WebSocket upgrade, `Hello`, and message routing.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Upgrade to WebSocket
//!   2. Receive `Hello` → authenticate token → send `Welcome`
//!   3. Loop: client frames become coordinator calls; coordinator events
//!      addressed to this caller become pushes
//!   4. On exit, the caller leaves (disconnect = leave)

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tandem_pairing::{JoinOutcome, PairingError, PairingEvent, Room};
use tandem_protocol::{
    CallerId, ClientMessage, Codec, FrameKind, ProtocolError, RoomView,
    ServerMessage,
};
use tokio::net::TcpStream;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;

use crate::server::ServerState;
use crate::{Authenticator, TandemError};

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;
type WsSource = SplitStream<WebSocketStream<TcpStream>>;

/// Drop guard that removes the caller from the coordinator when the
/// handler exits, including by panic.
///
/// `Drop` is synchronous, so the leave is a fire-and-forget task. It is
/// skipped when a newer connection has since authenticated as the same
/// caller.
struct LeaveGuard<A: Authenticator, C: Codec> {
    caller: CallerId,
    generation: u64,
    state: Arc<ServerState<A, C>>,
}

impl<A: Authenticator, C: Codec> Drop for LeaveGuard<A, C> {
    fn drop(&mut self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let caller = self.caller.clone();
        let generation = self.generation;
        let state = Arc::clone(&self.state);
        runtime.spawn(async move {
            state.release(&caller, generation).await;
        });
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<A, C>(
    stream: TcpStream,
    peer: SocketAddr,
    state: Arc<ServerState<A, C>>,
) -> Result<(), TandemError>
where
    A: Authenticator,
    C: Codec,
{
    let ws = tokio_tungstenite::accept_async(stream).await?;
    tracing::debug!(%peer, "websocket connection accepted");
    let (sink, mut source) = ws.split();
    let mut conn = Connection { sink, state };

    // --- Step 1: Hello ---
    let caller = conn.hello(&mut source).await?;
    tracing::info!(%peer, %caller, "caller connected");

    // Subscribe before replying so nothing addressed to this caller is
    // missed between Welcome and the first Join.
    let generation = conn.state.register(&caller).await;
    let coordinator = conn.state.coordinator.clone();
    let mut events = coordinator.subscribe();
    let _guard = LeaveGuard {
        caller: caller.clone(),
        generation,
        state: Arc::clone(&conn.state),
    };

    conn.send(&ServerMessage::Welcome {
        caller_id: caller.clone(),
        heartbeat_interval_ms: conn.state.heartbeat_interval.as_millis() as u64,
    })
    .await?;

    // --- Step 2: Message loop ---
    loop {
        tokio::select! {
            frame = next_payload(&mut source) => {
                let data = match frame {
                    Ok(Some(data)) => data,
                    Ok(None) => {
                        tracing::info!(%caller, "connection closed cleanly");
                        break;
                    }
                    Err(e) => {
                        tracing::debug!(%caller, error = %e, "recv error");
                        break;
                    }
                };

                let msg: ClientMessage = match conn.state.codec.decode(&data) {
                    Ok(msg) => msg,
                    Err(e) => {
                        tracing::debug!(%caller, error = %e, "failed to decode frame");
                        conn.send_error(&TandemError::Protocol(e)).await?;
                        continue;
                    }
                };

                match conn.dispatch(&caller, msg).await {
                    Ok(reply) => conn.send(&reply).await?,
                    Err(e @ TandemError::Pairing(PairingError::Unavailable)) => {
                        conn.send_error(&e).await?;
                        break;
                    }
                    Err(e) => {
                        tracing::debug!(%caller, error = %e, "request rejected");
                        conn.send_error(&e).await?;
                    }
                }
            }

            event = events.recv() => match event {
                Ok(event) => {
                    if event.notifies(&caller) {
                        let push = conn.push_for(&caller, event);
                        conn.send(&push).await?;
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!(%caller, missed, "connection fell behind on pairing events");
                }
                Err(RecvError::Closed) => {
                    tracing::info!(%caller, "coordinator stopped, closing connection");
                    break;
                }
            },

            () = coordinator.closed() => {
                tracing::info!(%caller, "coordinator stopped, closing connection");
                break;
            }
        }
    }

    let _ = conn.sink.close().await;
    // _guard drops here → leave fires.
    Ok(())
}

/// The write half plus the shared state a handler needs.
struct Connection<A: Authenticator, C: Codec> {
    sink: WsSink,
    state: Arc<ServerState<A, C>>,
}

impl<A, C> Connection<A, C>
where
    A: Authenticator,
    C: Codec,
{
    /// Waits for `Hello`, authenticates its token, and returns the caller.
    ///
    /// Every failure is reported to the client before it is returned.
    async fn hello(&mut self, source: &mut WsSource) -> Result<CallerId, TandemError> {
        let first = match tokio::time::timeout(self.state.hello_timeout, next_payload(source)).await {
            Ok(Ok(Some(data))) => data,
            Ok(Ok(None)) => {
                return Err(TandemError::Handshake(
                    "connection closed before hello".into(),
                ));
            }
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                let err = TandemError::Handshake("hello timed out".into());
                self.send_error(&err).await?;
                return Err(err);
            }
        };

        let token = match self.state.codec.decode(&first) {
            Ok(ClientMessage::Hello { token }) => token,
            Ok(_) | Err(_) => {
                let err = TandemError::Handshake("first message must be Hello".into());
                self.send_error(&err).await?;
                return Err(err);
            }
        };

        match self.state.auth.authenticate(&token).await {
            Ok(caller) => Ok(caller),
            Err(e) => {
                self.send_error(&e).await?;
                Err(e)
            }
        }
    }

    /// Runs one client request against the coordinator and builds the
    /// reply.
    async fn dispatch(
        &self,
        caller: &CallerId,
        msg: ClientMessage,
    ) -> Result<ServerMessage, TandemError> {
        let coordinator = &self.state.coordinator;

        let reply = match msg {
            ClientMessage::Hello { .. } => {
                return Err(TandemError::Handshake("already said hello".into()));
            }
            ClientMessage::Join => match coordinator.join(caller.clone()).await? {
                JoinOutcome::Queued { position }
                | JoinOutcome::AlreadyQueued { position } => ServerMessage::Queued {
                    position,
                    depth: coordinator.queue_depth().await?,
                },
                JoinOutcome::Matched(room) | JoinOutcome::Rejoined(room) => {
                    matched(&room, caller, self.state.started)
                }
            },
            ClientMessage::Leave => {
                coordinator.leave(caller.clone()).await?;
                ServerMessage::Left
            }
            ClientMessage::EndMatch => {
                coordinator.end_match(caller.clone()).await?;
                ServerMessage::MatchEnded
            }
            ClientMessage::Heartbeat => {
                coordinator.heartbeat(caller.clone()).await?;
                ServerMessage::HeartbeatAck
            }
            ClientMessage::GetMatch => match coordinator.get_match(caller.clone()).await? {
                Some(room) => matched(&room, caller, self.state.started),
                None => ServerMessage::NoMatch,
            },
            ClientMessage::QueueStatus => ServerMessage::QueueStatus {
                depth: coordinator.queue_depth().await?,
                queued: coordinator.is_queued(caller.clone()).await?,
                waiting_ms: coordinator
                    .waiting_time(caller.clone())
                    .await?
                    .map(|waited| waited.as_millis() as u64),
            },
        };
        Ok(reply)
    }

    /// Translates a coordinator event into the push `caller` receives.
    fn push_for(&self, caller: &CallerId, event: PairingEvent) -> ServerMessage {
        match event {
            PairingEvent::Matched { room, .. } => matched(&room, caller, self.state.started),
            PairingEvent::RoomClosed {
                room,
                closed_by,
                reason,
            } => ServerMessage::RoomClosed {
                room_id: room.room_id().clone(),
                closed_by,
                reason,
            },
            PairingEvent::Evicted { reason, .. } => ServerMessage::Evicted { reason },
        }
    }

    async fn send(&mut self, msg: &ServerMessage) -> Result<(), TandemError> {
        let bytes = self.state.codec.encode(msg)?;
        let frame = match self.state.codec.frame_kind() {
            FrameKind::Text => Message::text(
                String::from_utf8(bytes)
                    .map_err(|e| ProtocolError::InvalidMessage(e.to_string()))?,
            ),
            FrameKind::Binary => Message::binary(bytes),
        };
        self.sink.send(frame).await?;
        Ok(())
    }

    async fn send_error(&mut self, err: &TandemError) -> Result<(), TandemError> {
        self.send(&ServerMessage::Error {
            code: err.code(),
            message: err.to_string(),
        })
        .await
    }
}

/// `Matched` for `viewer`, or `NoMatch` (logged) if `viewer` is not in
/// `room`.
fn matched(room: &Room, viewer: &CallerId, started: Instant) -> ServerMessage {
    match room_view(room, viewer, started) {
        Some(room) => ServerMessage::Matched { room },
        None => {
            tracing::warn!(
                caller = %viewer,
                room_id = %room.room_id(),
                "coordinator returned a room the caller is not in"
            );
            ServerMessage::NoMatch
        }
    }
}

/// Projects `room` as seen by `viewer`. `None` if `viewer` is not in it.
fn room_view(room: &Room, viewer: &CallerId, started: Instant) -> Option<RoomView> {
    let partner = room.partner_of(viewer)?.clone();
    Some(RoomView {
        room_id: room.room_id().clone(),
        participants: room.participants().clone(),
        partner,
        created_at_ms: room.created_at().saturating_duration_since(started).as_millis() as u64,
    })
}

/// Reads the next data frame, skipping control frames.
///
/// Returns `Ok(None)` when the peer closes the connection.
async fn next_payload(source: &mut WsSource) -> Result<Option<Vec<u8>>, TandemError> {
    loop {
        match source.next().await {
            Some(Ok(Message::Text(text))) => return Ok(Some(text.as_bytes().to_vec())),
            Some(Ok(Message::Binary(data))) => return Ok(Some(data.to_vec())),
            Some(Ok(Message::Close(_))) | None => return Ok(None),
            Some(Ok(_)) => continue, // ping/pong/frame
            Some(Err(e)) => return Err(e.into()),
        }
    }
}
