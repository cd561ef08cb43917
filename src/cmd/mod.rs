//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module    | Commands handled             |
//! |-----------|------------------------------|
//! | `serve`   | `Serve`                      |
//! | `project` | `Init`                       |
//! | `board`   | `Board`, `Move`, `Watch`     |
//! | `config`  | `Config`                     |

pub mod board;
pub mod config;
pub mod project;
pub mod serve;

pub use board::{cmd_board, cmd_move, cmd_watch};
pub use config::cmd_config;
pub use project::cmd_init;
pub use serve::cmd_serve;
