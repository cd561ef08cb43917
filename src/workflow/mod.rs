//! Workflow board client core.
//!
//! ## Overview
//!
//! A headless Kanban board for service requests. The board is loaded from
//! the shop backend, kept live by push messages, and rearranged by drag
//! gestures that apply locally first and are then confirmed remotely.
//!
//! ## Module Map
//!
//! ```text
//!  gestures ──> drag.rs (DragController) ──optimistic──┐
//!                   │ MoveCommand                      v
//!                   v                            store.rs (BoardStore) ──watch──> renderers
//!  session.rs (BoardSession) ──────────────replace───> ^
//!      │   │                                          │
//!      │   └─ sync.rs (BoardApi / HttpBoardClient) ───┘  fetch + move over HTTP
//!      └───── push.rs (PushListener, WsTransport)        debounced push frames
//! ```
//!
//! | Module     | Responsibility                                          |
//! |------------|---------------------------------------------------------|
//! | `models`   | `ColumnId`, `CardId`, `Card`, `Board`                   |
//! | `payload`  | Loose JSON → strict entities; move DTOs                 |
//! | `store`    | `BoardStore`, observer notification                     |
//! | `sync`     | `BoardApi` trait + reqwest implementation               |
//! | `push`     | Debounce, push message handling, WebSocket transport    |
//! | `drag`     | Drag state machine and optimistic projection            |
//! | `session`  | Load state, toasts, compensating re-fetch, event loop   |
//!
//! ## Failed move
//!
//! 1. `drag::DragController::end()` returns a `MoveCommand`; the store
//!    already shows the card at its new spot.
//! 2. `BoardApi::move_card()` fails.
//! 3. The session raises a toast with `SyncError::user_message()` and
//!    re-fetches the full board, which replaces the optimistic state.

pub mod drag;
pub mod models;
pub mod payload;
pub mod push;
pub mod session;
pub mod store;
pub mod sync;

pub use drag::{DragController, DragEnd, DragOver, DragStart, MoveCommand};
pub use models::{Board, Card, CardId, ColumnId};
pub use session::{BoardSession, DropOutcome, Gesture, LoadState, Toast, ToastKind};
pub use store::BoardStore;
pub use sync::{BoardApi, HttpBoardClient};
