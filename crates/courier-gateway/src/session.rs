//! Connection sessions.
//!
//! One session per WebSocket: authenticate strictly first, bind the
//! connection into its personal room, then relay until disconnect. Inbound
//! frames decode into typed [`ClientEvent`]s dispatched in the session
//! loop; outbound room traffic reaches the socket through a per-connection
//! channel, so ordering is per-connection transport FIFO and nothing more.

use crate::auth;
use crate::metrics;
use crate::state::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use courier_core::{PresenceTransition, RegistryError, RoomId};
use courier_events::{codec, codes, ClientEvent, ServerEvent};
use courier_store::Store;
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// WebSocket upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<HashMap<String, String>>,
    State(state): State<Arc<AppState>>,
) -> Response {
    if state.registry.stats().connection_count >= state.config.limits.max_connections {
        metrics::record_error("capacity");
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    let token = params.get("token").cloned();
    ws.on_upgrade(move |socket| handle_socket(socket, state, token))
}

/// Drive one connection from handshake to disconnect.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>, query_token: Option<String>) {
    let _metrics_guard = metrics::ConnectionMetricsGuard::new();

    let connection_id = format!(
        "conn_{:x}",
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    );

    debug!(connection = %connection_id, "WebSocket connected");

    let (mut sender, mut receiver) = socket.split();

    // Credential: upgrade-URL query parameter, or a connect event inside
    // the handshake window.
    let token = match query_token {
        Some(token) => Some(token),
        None => {
            let window = Duration::from_millis(state.config.transport.handshake_timeout_ms);
            await_handshake_token(&mut receiver, window).await
        }
    };

    // Authentication is evaluated before any room or presence mutation; a
    // refused handshake leaves no observable side effect.
    let identity = match auth::authenticate(
        state.verifier.as_ref(),
        state.store.as_ref(),
        token.as_deref(),
    )
    .await
    {
        Ok(identity) => identity,
        Err(e) => {
            metrics::record_handshake_failure();
            warn!(connection = %connection_id, error = %e, "Handshake refused");
            let refusal = ServerEvent::error(codes::UNAUTHENTICATED, e.to_string());
            if let Ok(frame) = codec::encode(&refusal) {
                let _ = sender.send(Message::Text(frame)).await;
            }
            let _ = sender.close().await;
            return;
        }
    };

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<Arc<ServerEvent>>();

    let mut session = Session {
        connection_id,
        user_id: identity.user_id,
        state: state.clone(),
        forward_tasks: HashMap::new(),
        event_tx,
    };

    // Personal room first, then presence.
    if let Err(e) = session.join_room(RoomId::personal(session.user_id.as_str())) {
        error!(connection = %session.connection_id, error = %e, "Personal room join failed");
        return;
    }

    if state.presence.connected(&session.user_id) == PresenceTransition::WentOnline {
        touch_presence_best_effort(&state, &session.user_id, true);
    }

    let hello = ServerEvent::connected(
        session.connection_id.as_str(),
        session.user_id.as_str(),
        state.config.heartbeat.interval_ms,
    );
    if send_event(&mut sender, &hello).await.is_err() {
        session.shutdown();
        return;
    }

    // Relay loop.
    loop {
        tokio::select! {
            biased;

            // Room traffic toward the client.
            Some(event) = event_rx.recv() => {
                if send_event(&mut sender, &event).await.is_err() {
                    break;
                }
            }

            // Client frames.
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let start = Instant::now();
                        metrics::record_event(text.len(), "inbound");

                        match codec::decode(&text) {
                            Ok(event) => {
                                if let Err(e) = session.handle_event(event, &mut sender).await {
                                    error!(connection = %session.connection_id, error = %e, "Event handling error");
                                    break;
                                }
                            }
                            Err(e) => {
                                metrics::record_error("decode");
                                warn!(connection = %session.connection_id, error = %e, "Undecodable frame");
                                let reply = ServerEvent::error(codes::MALFORMED, e.to_string());
                                if send_event(&mut sender, &reply).await.is_err() {
                                    break;
                                }
                            }
                        }

                        metrics::record_latency(start.elapsed().as_secs_f64());
                    }
                    Some(Ok(Message::Binary(_))) => {
                        warn!(connection = %session.connection_id, "Unexpected binary frame");
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        // Ignore pongs
                    }
                    Some(Ok(Message::Close(_))) => {
                        debug!(connection = %session.connection_id, "Received close frame");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(connection = %session.connection_id, error = %e, "WebSocket error");
                        metrics::record_error("websocket");
                        break;
                    }
                    None => {
                        debug!(connection = %session.connection_id, "WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    session.shutdown();
}

/// Wait for a `connect` event carrying the credential.
///
/// Returns `None` if the window elapses or the first data frame is
/// anything else; the handshake then fails as missing-credential.
async fn await_handshake_token(
    receiver: &mut SplitStream<WebSocket>,
    window: Duration,
) -> Option<String> {
    let first_frame = tokio::time::timeout(window, async {
        loop {
            match receiver.next().await {
                Some(Ok(Message::Text(text))) => return Some(text),
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                _ => return None,
            }
        }
    })
    .await
    .ok()
    .flatten()?;

    match codec::decode(&first_frame) {
        Ok(ClientEvent::Connect { token }) => Some(token),
        _ => None,
    }
}

/// Per-connection session state.
struct Session {
    connection_id: String,
    user_id: String,
    state: Arc<AppState>,
    /// Forwarder task per joined room, for cleanup.
    forward_tasks: HashMap<RoomId, JoinHandle<()>>,
    event_tx: mpsc::UnboundedSender<Arc<ServerEvent>>,
}

impl Session {
    /// Join a room and forward its broadcasts into this session's channel.
    fn join_room(&mut self, room_id: RoomId) -> Result<(), RegistryError> {
        let mut rx = self.state.registry.join(&self.connection_id, room_id.clone())?;

        let tx = self.event_tx.clone();
        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        if tx.send(event).is_err() {
                            break; // Session dropped
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                }
            }
        });
        self.forward_tasks.insert(room_id, handle);

        metrics::set_active_rooms(self.state.registry.stats().room_count);
        Ok(())
    }

    /// Leave a room and stop its forwarder.
    fn leave_room(&mut self, room_id: &RoomId) -> Result<(), RegistryError> {
        if let Some(handle) = self.forward_tasks.remove(room_id) {
            handle.abort();
        }
        let result = self.state.registry.leave(&self.connection_id, room_id);
        metrics::set_active_rooms(self.state.registry.stats().room_count);
        result
    }

    /// Dispatch one decoded client event.
    ///
    /// Store and authorization failures are handled here: logged, answered
    /// with an `error` event where the client asked for something, and never
    /// fatal to the connection. Only a dead socket propagates as `Err`.
    async fn handle_event(
        &mut self,
        event: ClientEvent,
        sender: &mut SplitSink<WebSocket, Message>,
    ) -> anyhow::Result<()> {
        match event {
            ClientEvent::Connect { .. } => {
                debug!(connection = %self.connection_id, "Connect event (already connected)");
            }

            ClientEvent::JoinConversation { conversation_id } => {
                if let Err(refusal) = self.authorize_and_join(&conversation_id).await {
                    send_event(sender, &refusal).await?;
                }
            }

            ClientEvent::LeaveConversation { conversation_id } => {
                let room = RoomId::conversation(conversation_id.as_str());
                match self.leave_room(&room) {
                    Ok(()) => {
                        debug!(connection = %self.connection_id, room = %room, "Left conversation");
                    }
                    Err(RegistryError::NotJoined(_)) => {
                        debug!(connection = %self.connection_id, room = %room, "Leave without membership");
                    }
                    Err(e) => {
                        warn!(connection = %self.connection_id, error = %e, "Leave failed");
                    }
                }
            }

            ClientEvent::TypingStart {
                conversation_id,
                receiver_id,
            } => {
                self.state
                    .typing
                    .start(&conversation_id, &self.user_id, &receiver_id);
            }

            ClientEvent::TypingStop {
                conversation_id,
                receiver_id,
            } => {
                self.state
                    .typing
                    .stop(&conversation_id, &self.user_id, &receiver_id);
            }

            ClientEvent::MessageRead {
                message_id,
                conversation_id,
            } => {
                match self
                    .state
                    .receipts
                    .mark_read(&message_id, &conversation_id, &self.user_id)
                    .await
                {
                    Ok(()) => {}
                    Err(e) if e.is_not_found() => {
                        debug!(connection = %self.connection_id, message = %message_id, "Read of unknown message");
                    }
                    Err(e) => {
                        metrics::record_error("storage");
                        warn!(connection = %self.connection_id, error = %e, "Read receipt skipped");
                    }
                }
            }

            ClientEvent::NotificationRead { notification_id } => {
                match self.state.store.mark_notification_read(&notification_id).await {
                    Ok(()) => {
                        debug!(connection = %self.connection_id, notification = %notification_id, "Notification acknowledged");
                    }
                    Err(e) if e.is_not_found() => {
                        debug!(connection = %self.connection_id, notification = %notification_id, "Ack of unknown notification");
                    }
                    Err(e) => {
                        metrics::record_error("storage");
                        warn!(connection = %self.connection_id, error = %e, "Notification ack failed");
                    }
                }
            }
        }

        Ok(())
    }

    /// Verify participation, then join — one step, never optimistic.
    ///
    /// On refusal, returns the `error` event to relay; no membership exists
    /// in that case.
    async fn authorize_and_join(&mut self, conversation_id: &str) -> Result<(), ServerEvent> {
        let participants = match self
            .state
            .store
            .conversation_participants(conversation_id)
            .await
        {
            Ok(participants) => participants,
            Err(e) => {
                let code = if e.is_not_found() {
                    codes::NOT_FOUND
                } else {
                    metrics::record_error("storage");
                    codes::UNAVAILABLE
                };
                warn!(connection = %self.connection_id, error = %e, "Participant check failed");
                return Err(ServerEvent::error(code, e.to_string()));
            }
        };

        if !participants.contains(&self.user_id) {
            metrics::record_error("authorization");
            warn!(
                connection = %self.connection_id,
                user = %self.user_id,
                conversation = %conversation_id,
                "Join refused: not a participant"
            );
            return Err(ServerEvent::error(
                codes::FORBIDDEN,
                format!("Not a participant of conversation {conversation_id}"),
            ));
        }

        match self.join_room(RoomId::conversation(conversation_id)) {
            Ok(()) => {
                debug!(
                    connection = %self.connection_id,
                    conversation = %conversation_id,
                    "Joined conversation"
                );
                Ok(())
            }
            Err(RegistryError::AlreadyJoined(_)) => {
                debug!(connection = %self.connection_id, conversation = %conversation_id, "Duplicate join");
                Ok(())
            }
            Err(e) => {
                warn!(connection = %self.connection_id, error = %e, "Join failed");
                Err(ServerEvent::error(codes::LIMIT_EXCEEDED, e.to_string()))
            }
        }
    }

    /// Tear down room membership and presence for this connection.
    ///
    /// External writes already committed stay committed; only the in-flight
    /// relay dies with the socket.
    fn shutdown(&mut self) {
        for (_, handle) in self.forward_tasks.drain() {
            handle.abort();
        }

        self.state.registry.leave_all(&self.connection_id);
        metrics::set_active_rooms(self.state.registry.stats().room_count);

        if self.state.presence.disconnected(&self.user_id) == PresenceTransition::WentOffline {
            touch_presence_best_effort(&self.state, &self.user_id, false);
        }

        debug!(connection = %self.connection_id, "WebSocket disconnected");
    }
}

/// Fire-and-forget presence write; a failure never blocks the
/// connect/disconnect path.
fn touch_presence_best_effort(state: &Arc<AppState>, user_id: &str, online: bool) {
    let store = state.store.clone();
    let user_id = user_id.to_string();
    tokio::spawn(async move {
        if let Err(e) = store.touch_presence(&user_id, online).await {
            metrics::record_error("presence");
            warn!(user = %user_id, online, error = %e, "Presence touch failed");
        }
    });
}

/// Send a server event to the socket.
async fn send_event(
    sender: &mut SplitSink<WebSocket, Message>,
    event: &ServerEvent,
) -> anyhow::Result<()> {
    let frame = codec::encode(event)?;
    metrics::record_event(frame.len(), "outbound");
    sender.send(Message::Text(frame)).await?;
    Ok(())
}
