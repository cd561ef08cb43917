//! Board client commands — `shopflow board`, `shopflow move`, `shopflow watch`.

use anyhow::{Context, Result, bail};
use console::style;
use std::sync::Arc;
use tokio::sync::mpsc;

use shopflow::config::ShopflowConfig;
use shopflow::workflow::push::{WsTransport, push_url};
use shopflow::workflow::{
    Board, BoardApi, BoardSession, DropOutcome, HttpBoardClient, Toast, ToastKind,
};

fn client(config: &ShopflowConfig, base_url: Option<&str>) -> Result<HttpBoardClient> {
    let base_url = base_url.unwrap_or(&config.toml.client.base_url);
    HttpBoardClient::new(base_url, config.toml.client.request_timeout())
}

fn session(config: &ShopflowConfig, api: HttpBoardClient) -> BoardSession {
    let client = &config.toml.client;
    BoardSession::new(Arc::new(api), client.debounce(), client.toast_ttl())
}

/// Plain-text rendering of the board, one section per column.
pub fn render_board(board: &Board) -> String {
    let mut out = String::new();
    for (column, cards) in board.columns() {
        out.push_str(&format!(
            "{} {}\n",
            style(column.label()).bold(),
            style(format!("({})", cards.len())).dim()
        ));
        if cards.is_empty() {
            out.push_str(&format!("  {}\n", style("(empty)").dim()));
        }
        for card in cards {
            let when = match (&card.appointment_date, &card.appointment_time) {
                (Some(date), Some(time)) => format!("{} {}", date, time),
                (Some(date), None) => date.clone(),
                _ => String::new(),
            };
            out.push_str(&format!(
                "  {:<6} {:<20} {:<24} {}\n",
                style(format!("#{}", card.id)).cyan(),
                card.customer.display_name(),
                card.vehicle.to_string(),
                style(when).dim()
            ));
        }
        out.push('\n');
    }
    out
}

/// One-line rendering of a toast for the watch output.
pub fn render_toast(toast: &Toast) -> String {
    match toast.kind {
        ToastKind::Error => format!("{} {}", style("✗").red(), toast.message),
        ToastKind::Info => format!("{} {}", style("•").cyan(), toast.message),
    }
}

pub async fn cmd_board(config: &ShopflowConfig, base_url: Option<&str>) -> Result<()> {
    let api = client(config, base_url)?;
    let parsed = api
        .fetch_board()
        .await
        .with_context(|| format!("Failed to load board from {}", api.base_url()))?;
    if parsed.dropped > 0 {
        tracing::warn!(dropped = parsed.dropped, "some cards were malformed and skipped");
    }
    print!("{}", render_board(&parsed.board));
    Ok(())
}

pub async fn cmd_move(
    config: &ShopflowConfig,
    card_id: &str,
    over_id: &str,
    base_url: Option<&str>,
) -> Result<()> {
    let api = client(config, base_url)?;
    let mut session = session(config, api);
    session.load().await.context("Failed to load board")?;

    match session.drop_card(card_id, over_id).await {
        DropOutcome::NoTarget => {
            bail!(
                "Nothing to drop: '{}' is not a card on the board or '{}' is not a column or card",
                card_id,
                over_id
            );
        }
        DropOutcome::Confirmed(command) => {
            println!(
                "{} card #{} to {} at position {}",
                style("Moved").green(),
                command.card_id,
                command.target_column.label(),
                command.target_index
            );
            println!();
            print!("{}", render_board(&session.board()));
            Ok(())
        }
        DropOutcome::Rejected { message, .. } => {
            eprintln!("{} {}", style("✗").red(), message);
            println!();
            print!("{}", render_board(&session.board()));
            bail!(message);
        }
    }
}

pub async fn cmd_watch(config: &ShopflowConfig, base_url: Option<&str>) -> Result<()> {
    let api = client(config, base_url)?;
    let push_url = push_url(api.base_url(), &config.toml.client.push_path);
    let mut session = session(config, api);
    session.load().await.context("Failed to load board")?;
    print!("{}", render_board(&session.board()));

    let mut updates = session.subscribe();
    let mut toasts = session.subscribe_toasts();
    let printer = tokio::spawn(async move {
        loop {
            tokio::select! {
                changed = updates.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let board = updates.borrow_and_update().clone();
                    println!("{}", style("── board updated ──").dim());
                    print!("{}", render_board(&board));
                }
                changed = toasts.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    if let Some(toast) = toasts.borrow_and_update().clone() {
                        eprintln!("{}", render_toast(&toast));
                    }
                }
            }
        }
    });

    let (transport_rx, transport) =
        WsTransport::spawn(push_url.clone(), config.toml.client.reconnect_delay());
    tracing::info!(url = %push_url, "watching for board updates");

    // Gestures are not driven from the terminal.
    let (_, gesture_rx) = mpsc::channel(1);
    session
        .run(transport_rx, gesture_rx, async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await;

    transport.abort();
    printer.abort();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use shopflow::workflow::models::{Card, CardId, ColumnId, Customer, Vehicle};

    fn card(id: i64, first: &str) -> Card {
        Card {
            id: CardId::from(id),
            column: ColumnId::Estimates,
            position: 0,
            customer: Customer {
                first_name: first.into(),
                last_name: "Doe".into(),
                ..Default::default()
            },
            vehicle: Vehicle {
                year: Some(2018),
                make: Some("Honda".into()),
                model: Some("Fit".into()),
                ..Default::default()
            },
            status: None,
            appointment_date: Some("2026-10-19".into()),
            appointment_time: Some("09:30".into()),
        }
    }

    #[test]
    fn test_render_lists_columns_in_order() {
        let mut board = Board::standard();
        board.push_card(ColumnId::InProgress, card(7, "Jane"));
        let text = console::strip_ansi_codes(&render_board(&board)).to_string();

        let estimates = text.find("ESTIMATES").unwrap();
        let in_progress = text.find("IN PROGRESS").unwrap();
        let completed = text.find("COMPLETED").unwrap();
        assert!(estimates < in_progress && in_progress < completed);
        assert!(text.contains("#7"));
        assert!(text.contains("Jane Doe"));
        assert!(text.contains("2018 Honda Fit"));
        assert!(text.contains("2026-10-19 09:30"));
    }

    #[test]
    fn test_render_toast_marks_kind() {
        let toast = |kind, message: &str| Toast {
            kind,
            message: message.into(),
            shown_at: tokio::time::Instant::now(),
        };
        let error = render_toast(&toast(ToastKind::Error, "Card already moved"));
        let info = render_toast(&toast(ToastKind::Info, "Live updates reconnected"));
        assert_eq!(
            console::strip_ansi_codes(&error).to_string(),
            "✗ Card already moved"
        );
        assert_eq!(
            console::strip_ansi_codes(&info).to_string(),
            "• Live updates reconnected"
        );
    }

    #[test]
    fn test_render_marks_empty_columns() {
        let text = console::strip_ansi_codes(&render_board(&Board::standard())).to_string();
        assert_eq!(text.matches("(empty)").count(), 4);
    }
}
