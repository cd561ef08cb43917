use chrono::{DateTime, Utc};
use tokio::sync::watch;

use super::models::{Board, CardId, ColumnId};

/// Single source of truth for the rendered board.
///
/// Observers subscribe through a `watch` channel and see every effective
/// change. Authoritative snapshots go through [`replace`](Self::replace),
/// which always swaps the whole board; optimistic edits go through
/// [`move_card`](Self::move_card).
pub struct BoardStore {
    tx: watch::Sender<Board>,
    last_synced_at: Option<DateTime<Utc>>,
}

impl Default for BoardStore {
    fn default() -> Self {
        Self::new(Board::default())
    }
}

impl BoardStore {
    pub fn new(board: Board) -> Self {
        let (tx, _rx) = watch::channel(board);
        Self {
            tx,
            last_synced_at: None,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Board> {
        self.tx.subscribe()
    }

    /// Clone of the current board.
    pub fn board(&self) -> Board {
        self.tx.borrow().clone()
    }

    /// Run `f` against the current board without cloning it.
    pub fn with_board<R>(&self, f: impl FnOnce(&Board) -> R) -> R {
        f(&self.tx.borrow())
    }

    /// When the last authoritative snapshot was applied.
    pub fn last_synced_at(&self) -> Option<DateTime<Utc>> {
        self.last_synced_at
    }

    /// Swap in an authoritative snapshot wholesale.
    pub fn replace(&mut self, board: Board) {
        self.tx.send_replace(board);
        self.last_synced_at = Some(Utc::now());
        tracing::debug!("board replaced from authoritative snapshot");
    }

    /// Put back a locally held board (drag rollback). Unlike `replace` this
    /// is not a sync, so the sync timestamp is left alone.
    pub fn restore(&mut self, board: Board) {
        self.tx.send_replace(board);
    }

    /// Optimistic move. Silently a no-op when `id` is not in `from`.
    /// Returns whether anything changed; observers are notified only then.
    pub fn move_card(
        &mut self,
        id: &CardId,
        from: ColumnId,
        to: ColumnId,
        target_index: usize,
    ) -> bool {
        self.tx
            .send_if_modified(|board| board.move_card(id, from, to, target_index))
    }
}
