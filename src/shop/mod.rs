//! Shop backend: the authoritative side of the workflow board.
//!
//! ```text
//! ┌──────────┐   HTTP   ┌────────────────────────────────────────────┐
//! │  Board   │ ───────> │  server.rs  (axum Router, ServerConfig)    │
//! │  client  │ <─────── │    ├─ api.rs   (handlers, AppState)        │
//! └──────────┘ WebSocket│    └─ ws.rs    (PushEvent, socket loop)    │
//!                       │         │                                  │
//!                       │  cache.rs (TtlCache)   db.rs (DbHandle)    │
//!                       └────────────────────────────────────────────┘
//! ```
//!
//! | Module   | Responsibility                                            |
//! |----------|-----------------------------------------------------------|
//! | `models` | Customers, vehicles, service requests, board views         |
//! | `db`     | SQLite access via `DbHandle` (thin `Arc<Mutex<_>>`)        |
//! | `cache`  | Snapshot and pending-count caching, invalidated on writes  |
//! | `api`    | REST handlers and error mapping                            |
//! | `ws`     | Push fan-out over a broadcast channel                      |
//! | `server` | Router assembly and lifecycle                              |
//!
//! A successful move broadcasts `card_moved`; creating or deleting a
//! request broadcasts a full `board_update`.

pub mod api;
pub mod cache;
pub mod db;
pub mod models;
pub mod server;
pub mod ws;
