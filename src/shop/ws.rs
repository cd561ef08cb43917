use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink, stream::SplitStream};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::api::AppState;
use super::models::{BoardSnapshot, ServiceRequestView};

/// How often to send WebSocket Ping frames.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// How long a push client may stay silent after a Ping before it is dropped.
const PONG_TIMEOUT: Duration = Duration::from_secs(60);

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

// ── Push message types ───────────────────────────────────────────────

/// Outbound frames on the workflow channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushEvent {
    /// Full snapshot; clients replace their board with it.
    BoardUpdate { data: BoardSnapshot },
    /// A move was applied; clients re-fetch.
    CardMoved { success: bool },
}

/// Outbound frames on the appointments channel, sent after any request
/// is created, moved or deleted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppointmentEvent {
    PendingCount { count: i64 },
    TodayAppointments { appointments: Vec<ServiceRequestView> },
}

/// The two broadcast groups a push client can join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushChannel {
    Workflow,
    Appointments,
}

impl PushChannel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Workflow => "workflow",
            Self::Appointments => "appointments",
        }
    }

    fn sender(self, state: &AppState) -> &broadcast::Sender<String> {
        match self {
            Self::Workflow => &state.ws_tx,
            Self::Appointments => &state.appointments_tx,
        }
    }
}

impl fmt::Display for PushChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── WebSocket handlers ───────────────────────────────────────────────

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, PushChannel::Workflow))
}

pub async fn appointments_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, PushChannel::Appointments))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, channel: PushChannel) {
    let tx = channel.sender(&state);
    let rx = tx.subscribe();
    let mut client = PushClient::new(channel);
    info!(
        %channel,
        client = client.id,
        subscribers = tx.receiver_count(),
        "push client connected"
    );

    let (sender, receiver) = socket.split();
    let reason = client.serve(sender, receiver, rx).await;
    info!(
        %channel,
        client = client.id,
        %reason,
        forwarded = client.forwarded,
        skipped = client.skipped,
        "push client disconnected"
    );
}

/// Why a push client's socket loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    ClientClosed,
    MissedPong,
    SendFailed,
    ReadFailed,
    ChannelClosed,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ClientClosed => "client closed",
            Self::MissedPong => "missed pong",
            Self::SendFailed => "send failed",
            Self::ReadFailed => "read failed",
            Self::ChannelClosed => "broadcast closed",
        })
    }
}

/// One connected push subscriber and its delivery counters.
struct PushClient {
    id: u64,
    channel: PushChannel,
    forwarded: u64,
    skipped: u64,
}

impl PushClient {
    fn new(channel: PushChannel) -> Self {
        Self {
            id: NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed),
            channel,
            forwarded: 0,
            skipped: 0,
        }
    }

    /// Forward broadcast frames to the client until it goes away.
    ///
    /// Pings go out every [`PING_INTERVAL`]; a client that has not answered
    /// within [`PONG_TIMEOUT`] is dropped. Frames lost to a lagging receiver
    /// are counted, not replayed: every frame carries complete state, so the
    /// next one catches the client up.
    async fn serve(
        &mut self,
        mut sender: SplitSink<WebSocket, Message>,
        mut receiver: SplitStream<WebSocket>,
        mut rx: broadcast::Receiver<String>,
    ) -> CloseReason {
        let mut ping_interval = tokio::time::interval(PING_INTERVAL);
        // First tick completes immediately.
        ping_interval.tick().await;

        let mut last_pong = Instant::now();
        let mut awaiting_pong = false;

        let reason = loop {
            tokio::select! {
                _ = ping_interval.tick() => {
                    if awaiting_pong && last_pong.elapsed() > PONG_TIMEOUT {
                        break CloseReason::MissedPong;
                    }
                    if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                        break CloseReason::SendFailed;
                    }
                    awaiting_pong = true;
                }

                frame = rx.recv() => match frame {
                    Ok(text) => {
                        if sender.send(Message::Text(text.into())).await.is_err() {
                            break CloseReason::SendFailed;
                        }
                        self.forwarded += 1;
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        self.skipped += n;
                        warn!(
                            channel = %self.channel,
                            client = self.id,
                            skipped = n,
                            "push client fell behind, frames skipped"
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => break CloseReason::ChannelClosed,
                },

                msg = receiver.next() => match msg {
                    Some(Ok(Message::Pong(_))) => {
                        last_pong = Instant::now();
                        awaiting_pong = false;
                    }
                    Some(Ok(Message::Close(_))) | None => break CloseReason::ClientClosed,
                    Some(Ok(_)) => {
                        debug!(channel = %self.channel, client = self.id, "ignoring inbound frame");
                    }
                    Some(Err(_)) => break CloseReason::ReadFailed,
                },
            }
        };

        let _ = sender.send(Message::Close(None)).await;
        reason
    }
}

// ── Broadcast helpers ────────────────────────────────────────────────

fn broadcast_json<T: Serialize>(tx: &broadcast::Sender<String>, event: &T) {
    match serde_json::to_string(event) {
        Ok(json) => {
            // Err only means nobody is subscribed.
            let _ = tx.send(json);
        }
        Err(e) => {
            error!(error = %e, "failed to serialize push event");
        }
    }
}

/// Broadcast a board event to every workflow client.
pub fn broadcast_event(tx: &broadcast::Sender<String>, event: &PushEvent) {
    broadcast_json(tx, event);
}

/// Broadcast an appointments event to every appointments client.
pub fn broadcast_appointments(tx: &broadcast::Sender<String>, event: &AppointmentEvent) {
    broadcast_json(tx, event);
}
