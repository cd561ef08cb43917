//! Board session: the single owner of board state.
//!
//! Gestures, fetch results and push events all funnel through one
//! `BoardSession`, so the store only ever has one writer. Authoritative
//! data always replaces; failed moves are compensated by a full re-fetch.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::drag::{DragController, DragEnd, DragOver, DragStart, MoveCommand};
use super::models::Board;
use super::push::{DEFAULT_DEBOUNCE, PushAction, PushListener, TransportEvent};
use super::store::BoardStore;
use super::sync::BoardApi;
use crate::errors::{GENERIC_LOAD_ERROR, SyncError};

pub const DEFAULT_TOAST_TTL: Duration = Duration::from_millis(4000);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    Idle,
    Loading,
    Ready,
    /// No board is shown; the user can retry.
    Failed { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastKind {
    Error,
    Info,
}

#[derive(Debug, Clone)]
pub struct Toast {
    pub kind: ToastKind,
    pub message: String,
    pub shown_at: Instant,
}

/// Most toasts kept at once; older ones are dropped first.
pub const MAX_TOASTS: usize = 5;

pub const PUSH_RECONNECTED: &str = "Live updates reconnected";

/// Transient notifications that expire after a fixed ttl.
///
/// Every push prunes expired entries and caps the queue at
/// [`MAX_TOASTS`]. The newest toast is also published on a watch channel
/// for renderers that do not own the session.
#[derive(Debug)]
pub struct Toasts {
    items: VecDeque<Toast>,
    ttl: Duration,
    latest_tx: watch::Sender<Option<Toast>>,
}

impl Toasts {
    pub fn new(ttl: Duration) -> Self {
        let (latest_tx, _) = watch::channel(None);
        Self {
            items: VecDeque::new(),
            ttl,
            latest_tx,
        }
    }

    pub fn push(&mut self, kind: ToastKind, message: impl Into<String>, now: Instant) {
        self.prune(now);
        while self.items.len() >= MAX_TOASTS {
            self.items.pop_front();
        }
        let toast = Toast {
            kind,
            message: message.into(),
            shown_at: now,
        };
        self.latest_tx.send_replace(Some(toast.clone()));
        self.items.push_back(toast);
    }

    fn prune(&mut self, now: Instant) {
        let ttl = self.ttl;
        self.items
            .retain(|t| now.saturating_duration_since(t.shown_at) < ttl);
    }

    /// Drop expired toasts and return what is still visible.
    pub fn visible(&mut self, now: Instant) -> Vec<Toast> {
        self.prune(now);
        self.items.iter().cloned().collect()
    }

    pub fn latest(&self) -> Option<&Toast> {
        self.items.back()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Toast>> {
        self.latest_tx.subscribe()
    }
}

/// Result of a completed drop gesture.
#[derive(Debug, Clone, PartialEq)]
pub enum DropOutcome {
    /// No valid drop target; the board was rolled back locally.
    NoTarget,
    /// The backend accepted the move; the optimistic state stands.
    Confirmed(MoveCommand),
    /// The backend refused or could not be reached; the board was
    /// re-fetched.
    Rejected { command: MoveCommand, message: String },
}

/// Gesture input for [`BoardSession::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Gesture {
    Start(DragStart),
    Over(DragOver),
    End(DragEnd),
}

pub struct BoardSession {
    store: BoardStore,
    api: Arc<dyn BoardApi>,
    drag: DragController,
    push: PushListener,
    load_state: LoadState,
    toasts: Toasts,
    push_lost: bool,
}

impl BoardSession {
    pub fn new(api: Arc<dyn BoardApi>, debounce: Duration, toast_ttl: Duration) -> Self {
        Self {
            store: BoardStore::default(),
            api,
            drag: DragController::new(),
            push: PushListener::new(debounce),
            load_state: LoadState::Idle,
            toasts: Toasts::new(toast_ttl),
            push_lost: false,
        }
    }

    pub fn with_defaults(api: Arc<dyn BoardApi>) -> Self {
        Self::new(api, DEFAULT_DEBOUNCE, DEFAULT_TOAST_TTL)
    }

    pub fn store(&self) -> &BoardStore {
        &self.store
    }

    pub fn board(&self) -> Board {
        self.store.board()
    }

    pub fn subscribe(&self) -> watch::Receiver<Board> {
        self.store.subscribe()
    }

    pub fn load_state(&self) -> &LoadState {
        &self.load_state
    }

    pub fn toasts(&mut self) -> &mut Toasts {
        &mut self.toasts
    }

    pub fn subscribe_toasts(&self) -> watch::Receiver<Option<Toast>> {
        self.toasts.subscribe()
    }

    pub fn is_push_connected(&self) -> bool {
        self.push.is_connected()
    }

    /// Initial load. On failure the board is left as it was and the
    /// session enters `Failed`.
    pub async fn load(&mut self) -> Result<(), SyncError> {
        self.load_state = LoadState::Loading;
        match self.api.fetch_board().await {
            Ok(parsed) => {
                info!(
                    cards = parsed.board.card_count(),
                    dropped = parsed.dropped,
                    "board loaded"
                );
                self.store.replace(parsed.board);
                self.load_state = LoadState::Ready;
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "failed to load board");
                self.load_state = LoadState::Failed {
                    message: GENERIC_LOAD_ERROR.to_string(),
                };
                Err(e)
            }
        }
    }

    pub async fn retry(&mut self) -> Result<(), SyncError> {
        self.load().await
    }

    /// Compensating full re-fetch. A failure keeps the current board and
    /// raises a toast rather than tearing down the view.
    pub async fn refresh(&mut self) -> Result<(), SyncError> {
        match self.api.fetch_board().await {
            Ok(parsed) => {
                self.store.replace(parsed.board);
                self.load_state = LoadState::Ready;
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "refresh failed");
                self.toasts
                    .push(ToastKind::Error, GENERIC_LOAD_ERROR, Instant::now());
                Err(e)
            }
        }
    }

    pub fn start_drag(&mut self, event: DragStart) {
        self.drag.start(&self.store, event);
    }

    pub fn drag_over(&mut self, event: DragOver) -> bool {
        self.drag.over(&mut self.store, event)
    }

    /// End the gesture and confirm it with the backend.
    pub async fn finish_drag(&mut self, event: DragEnd) -> DropOutcome {
        let Some(command) = self.drag.end(&mut self.store, event) else {
            return DropOutcome::NoTarget;
        };
        match self
            .api
            .move_card(&command.card_id, command.target_column, command.target_index)
            .await
        {
            Ok(()) => {
                debug!(card_id = %command.card_id, "move confirmed");
                DropOutcome::Confirmed(command)
            }
            Err(e) => {
                let message = e.user_message();
                warn!(card_id = %command.card_id, error = %e, "move failed, refetching");
                self.toasts
                    .push(ToastKind::Error, message.clone(), Instant::now());
                // The refresh failure is already surfaced as its own toast.
                let _ = self.refresh().await;
                DropOutcome::Rejected { command, message }
            }
        }
    }

    /// Whole gesture in one call: pick up `card_id`, hover `over_id`, drop.
    pub async fn drop_card(&mut self, card_id: &str, over_id: &str) -> DropOutcome {
        self.start_drag(DragStart {
            active_id: card_id.to_string(),
        });
        self.drag_over(DragOver {
            active_id: card_id.to_string(),
            over_id: Some(over_id.to_string()),
        });
        self.finish_drag(DragEnd {
            active_id: card_id.to_string(),
            over_id: Some(over_id.to_string()),
        })
        .await
    }

    pub async fn handle_transport(&mut self, event: TransportEvent) {
        let now = Instant::now();
        match &event {
            TransportEvent::Disconnected(_) if self.push.is_connected() => self.push_lost = true,
            TransportEvent::Connected if self.push_lost => {
                self.push_lost = false;
                self.toasts.push(ToastKind::Info, PUSH_RECONNECTED, now);
            }
            _ => {}
        }
        match self.push.handle(event, now) {
            Some(PushAction::Replace(board)) => {
                self.store.replace(board);
                self.load_state = LoadState::Ready;
            }
            Some(PushAction::Refetch) => {
                let _ = self.refresh().await;
            }
            None => {}
        }
    }

    pub async fn handle_gesture(&mut self, gesture: Gesture) -> Option<DropOutcome> {
        match gesture {
            Gesture::Start(ev) => {
                self.start_drag(ev);
                None
            }
            Gesture::Over(ev) => {
                self.drag_over(ev);
                None
            }
            Gesture::End(ev) => Some(self.finish_drag(ev).await),
        }
    }

    /// Event loop. Runs until `shutdown` resolves or the transport
    /// channel closes. A closed gesture channel only disables gestures.
    pub async fn run(
        &mut self,
        mut transport: mpsc::Receiver<TransportEvent>,
        mut gestures: mpsc::Receiver<Gesture>,
        shutdown: impl Future<Output = ()>,
    ) {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    debug!("session shutting down");
                    break;
                }
                event = transport.recv() => match event {
                    Some(event) => self.handle_transport(event).await,
                    None => {
                        debug!("transport closed");
                        break;
                    }
                },
                Some(gesture) = gestures.recv() => {
                    self.handle_gesture(gesture).await;
                }
            }
        }
    }
}
