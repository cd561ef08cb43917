//! Drag-Interaction Controller.
//!
//! Pointer gestures arrive as raw string ids: the dragged card, and
//! whatever is under the pointer (another card or a column drop area).
//! `over` events mutate the store optimistically; `end` settles the
//! final spot and hands back the single [`MoveCommand`] to confirm
//! remotely.

use std::str::FromStr;

use tracing::debug;

use super::models::{Board, CardId, ColumnId};
use super::store::BoardStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DragStart {
    pub active_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DragOver {
    pub active_id: String,
    pub over_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DragEnd {
    pub active_id: String,
    pub over_id: Option<String>,
}

/// The card being dragged and where it was picked up.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveCard {
    pub card_id: CardId,
    pub source_column: ColumnId,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum DragState {
    #[default]
    Idle,
    Dragging {
        raw_active_id: String,
        /// `None` when the gesture started on something that is not a card.
        active: Option<ActiveCard>,
        /// Board as it was at drag start, for local rollback.
        origin: Board,
        /// Last target the projection was computed for, trimmed.
        hovered: Option<String>,
    },
}

/// Authoritative move to confirm with the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct MoveCommand {
    pub card_id: CardId,
    pub target_column: ColumnId,
    pub target_index: usize,
}

/// Where a pointer target lands a card: a column and an insertion index.
///
/// A column id means "append"; a card id means "insert before that card".
/// Returns `None` for ids that match neither, or for the active card
/// itself.
fn resolve_target(board: &Board, active: &CardId, over_id: &str) -> Option<(ColumnId, usize)> {
    if let Ok(column) = ColumnId::from_str(over_id.trim()) {
        if board.has_column(column) {
            return Some((column, board.column(column).len()));
        }
    }
    let over = CardId::new(over_id);
    if &over == active {
        return None;
    }
    board.find_card(&over)
}

/// Move `card_id` to wherever `over_id` points, measured from where the
/// card sits in `board`.
fn project(board: &mut Board, card_id: &CardId, over_id: &str) {
    let from = board.find_card(card_id).map(|(column, _)| column);
    let target = resolve_target(board, card_id, over_id);
    if let (Some(from), Some((to, index))) = (from, target) {
        board.move_card(card_id, from, to, index);
    }
}

#[derive(Debug, Default)]
pub struct DragController {
    state: DragState,
}

impl DragController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &DragState {
        &self.state
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.state, DragState::Dragging { .. })
    }

    /// Idle → Dragging. A start on an unknown id still enters Dragging,
    /// with no active card.
    pub fn start(&mut self, store: &BoardStore, event: DragStart) {
        let card_id = CardId::new(&event.active_id);
        let (active, origin) = store.with_board(|board| {
            let active = board.find_card(&card_id).map(|(column, _)| ActiveCard {
                card_id: card_id.clone(),
                source_column: column,
            });
            (active, board.clone())
        });
        if active.is_none() {
            debug!(active_id = %event.active_id, "drag started on unknown card");
        }
        self.state = DragState::Dragging {
            raw_active_id: event.active_id,
            active,
            origin,
            hovered: None,
        };
    }

    /// Recompute the optimistic projection when the pointer reaches a new
    /// target. Hovering the same target again is a no-op. Returns whether
    /// the store changed.
    pub fn over(&mut self, store: &mut BoardStore, event: DragOver) -> bool {
        let DragState::Dragging {
            active: Some(active),
            hovered,
            ..
        } = &mut self.state
        else {
            return false;
        };
        let Some(over_id) = event.over_id.as_deref().map(str::trim) else {
            return false;
        };
        if hovered.as_deref() == Some(over_id) {
            return false;
        }
        let plan = store.with_board(|board| {
            let (from, _) = board.find_card(&active.card_id)?;
            let (to, index) = resolve_target(board, &active.card_id, over_id)?;
            Some((from, to, index))
        });
        let Some((from, to, index)) = plan else {
            return false;
        };
        *hovered = Some(over_id.to_string());
        store.move_card(&active.card_id, from, to, index)
    }

    /// Dragging → Idle. Returns the command to confirm remotely, or
    /// `None` when there is nothing to confirm (the board is then rolled
    /// back to its drag-start state).
    ///
    /// A drop on the last hovered target, or on the dragged card itself,
    /// keeps the current projection. A drop on any other target is
    /// resolved against the drag-start board.
    pub fn end(&mut self, store: &mut BoardStore, event: DragEnd) -> Option<MoveCommand> {
        let DragState::Dragging {
            active,
            origin,
            hovered,
            ..
        } = std::mem::take(&mut self.state)
        else {
            return None;
        };
        let active = active?;

        let over_id = event.over_id.as_deref().map(str::trim);
        let keeps_projection = over_id.is_some_and(|id| {
            CardId::new(id) == active.card_id || hovered.as_deref() == Some(id)
        });
        if !keeps_projection {
            let target = over_id.filter(|id| resolve_target(&origin, &active.card_id, id).is_some());
            let Some(target) = target else {
                debug!(card_id = %active.card_id, "drop without target, rolling back");
                store.restore(origin);
                return None;
            };
            let mut projected = origin.clone();
            project(&mut projected, &active.card_id, target);
            store.restore(projected);
        }

        let Some((target_column, target_index)) =
            store.with_board(|b| b.find_card(&active.card_id))
        else {
            store.restore(origin);
            return None;
        };
        debug!(
            card_id = %active.card_id,
            from = %active.source_column,
            to = %target_column,
            index = target_index,
            "drop settled"
        );
        Some(MoveCommand {
            card_id: active.card_id,
            target_column,
            target_index,
        })
    }
}
