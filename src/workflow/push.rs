//! Push Listener: turns push-channel traffic into store actions.
//!
//! The transport (`WsTransport`) owns the socket and reconnects on its
//! own; it only reports [`TransportEvent`]s. [`PushListener`] validates
//! each frame, applies the debounce window and decides what the session
//! should do with it.

use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use super::models::Board;
use super::payload::{PushMessage, parse_push_message};

/// Default minimum spacing between applied push updates.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(1000);

/// Drop-based rate limiter: at most one admitted event per window,
/// measured from the last admitted one. Rejected events are discarded.
#[derive(Debug, Clone)]
pub struct Debounce {
    window: Duration,
    last_applied: Option<Instant>,
}

impl Debounce {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_applied: None,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Admit and stamp `now`, or reject without touching state.
    pub fn admit(&mut self, now: Instant) -> bool {
        let open = match self.last_applied {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.window,
        };
        if open {
            self.last_applied = Some(now);
        }
        open
    }
}

/// What the transport reports.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Connected,
    Disconnected(String),
    Message(String),
}

/// What the session should do in response to a push.
#[derive(Debug, Clone, PartialEq)]
pub enum PushAction {
    Replace(Board),
    Refetch,
}

#[derive(Debug)]
pub struct PushListener {
    debounce: Debounce,
    connected: bool,
}

impl Default for PushListener {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}

impl PushListener {
    pub fn new(window: Duration) -> Self {
        Self {
            debounce: Debounce::new(window),
            connected: false,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn handle(&mut self, event: TransportEvent, now: Instant) -> Option<PushAction> {
        match event {
            TransportEvent::Connected => {
                info!("push channel connected");
                self.connected = true;
                None
            }
            TransportEvent::Disconnected(reason) => {
                if self.connected {
                    warn!(%reason, "push channel disconnected");
                }
                self.connected = false;
                None
            }
            TransportEvent::Message(text) => self.handle_message(&text, now),
        }
    }

    fn handle_message(&mut self, text: &str, now: Instant) -> Option<PushAction> {
        let message = match parse_push_message(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "dropping malformed push message");
                return None;
            }
        };
        if !self.debounce.admit(now) {
            debug!("push update inside debounce window, dropped");
            return None;
        }
        match message {
            PushMessage::BoardUpdate(parsed) => {
                debug!(
                    cards = parsed.board.card_count(),
                    dropped = parsed.dropped,
                    "applying pushed snapshot"
                );
                Some(PushAction::Replace(parsed.board))
            }
            PushMessage::CardMoved { success } => {
                debug!(success, "card_moved signal, refetching");
                Some(PushAction::Refetch)
            }
        }
    }
}

/// Build the push URL from an http(s) base URL and a path.
pub fn push_url(base_url: &str, path: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let ws_base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        base.to_string()
    };
    format!("{}{}", ws_base, path)
}

/// WebSocket transport with fixed-delay reconnection.
pub struct WsTransport;

impl WsTransport {
    /// Spawn the connection task. It runs until the receiver is dropped.
    pub fn spawn(
        url: String,
        reconnect_delay: Duration,
    ) -> (mpsc::Receiver<TransportEvent>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(64);
        let handle = tokio::spawn(async move {
            loop {
                let reason = match tokio_tungstenite::connect_async(url.as_str()).await {
                    Ok((mut stream, _)) => {
                        if tx.send(TransportEvent::Connected).await.is_err() {
                            return;
                        }
                        loop {
                            match stream.next().await {
                                Some(Ok(Message::Text(text))) => {
                                    let event = TransportEvent::Message(text.as_str().to_string());
                                    if tx.send(event).await.is_err() {
                                        return;
                                    }
                                }
                                Some(Ok(Message::Close(frame))) => {
                                    break frame
                                        .map(|f| format!("close:{} {}", f.code, f.reason))
                                        .unwrap_or_else(|| "closed".to_string());
                                }
                                Some(Ok(_)) => {}
                                Some(Err(e)) => break e.to_string(),
                                None => break "eof".to_string(),
                            }
                        }
                    }
                    Err(e) => e.to_string(),
                };
                debug!(%url, %reason, "push connection ended");
                if tx.send(TransportEvent::Disconnected(reason)).await.is_err() {
                    return;
                }
                tokio::time::sleep(reconnect_delay).await;
            }
        });
        (rx, handle)
    }
}
