//! Boundary validation between loosely-typed JSON and board entities.
//!
//! Snapshots and push messages arrive as untyped objects. Everything that
//! enters the store passes through [`parse_board`] or
//! [`parse_push_message`] first; shapes that do not fit are rejected (whole
//! message) or filtered (single card) here rather than deeper in.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::models::{Board, Card, CardId, ColumnId, Customer, Vehicle};
use crate::errors::PayloadError;

/// A validated snapshot plus how many cards were filtered out.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedBoard {
    pub board: Board,
    pub dropped: usize,
}

/// Inbound push message after validation.
#[derive(Debug, Clone, PartialEq)]
pub enum PushMessage {
    BoardUpdate(ParsedBoard),
    CardMoved { success: bool },
}

/// Move command body: `{ cardId, targetColumn, targetIndex }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveRequest {
    pub card_id: CardId,
    pub target_column: String,
    pub target_index: i64,
}

/// Move command reply: `{ success, error? }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MoveResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
        }
    }

    /// Lenient read of a reply body: anything other than `success: true`
    /// counts as failure, and `error` is kept only when it is a string.
    pub fn from_value(value: &Value) -> Self {
        Self {
            success: value.get("success").and_then(Value::as_bool) == Some(true),
            error: value
                .get("error")
                .and_then(Value::as_str)
                .map(str::to_string),
        }
    }
}

/// Convert a snapshot `{ columns: {id: [card]}, column_order?: [id] }`.
///
/// When `column_order` is absent the order follows the key iteration of
/// the decoded `columns` object. That order is an artifact of the JSON
/// map implementation and must not be relied on; backends should send
/// `column_order` explicitly.
pub fn parse_board(value: &Value) -> Result<ParsedBoard, PayloadError> {
    let obj = value.as_object().ok_or(PayloadError::NotAnObject {
        what: "board snapshot",
    })?;
    let columns = obj
        .get("columns")
        .ok_or(PayloadError::MissingField { field: "columns" })?
        .as_object()
        .ok_or(PayloadError::NotAnObject { what: "columns" })?;

    let order = resolve_order(obj.get("column_order"), columns);
    let mut board = Board::new(order);
    let mut dropped = 0usize;

    for (key, cards) in columns {
        let Ok(column) = ColumnId::from_str(key) else {
            let count = cards.as_array().map(Vec::len).unwrap_or(0);
            warn!(column = %key, cards = count, "skipping unknown column in snapshot");
            dropped += count;
            continue;
        };
        let Some(cards) = cards.as_array() else {
            warn!(column = %key, "column value is not an array; treating as empty");
            continue;
        };
        for raw in cards {
            match parse_card(raw) {
                Some(card) if board.find_card(&card.id).is_none() => board.push_card(column, card),
                Some(card) => {
                    warn!(card_id = %card.id, column = %key, "duplicate card id in snapshot");
                    dropped += 1;
                }
                None => {
                    debug!(column = %key, "dropping card without id, customer.user or vehicle");
                    dropped += 1;
                }
            }
        }
    }

    Ok(ParsedBoard { board, dropped })
}

/// Parse one raw push frame.
pub fn parse_push_message(text: &str) -> Result<PushMessage, PayloadError> {
    let value: Value = serde_json::from_str(text)?;
    let obj = value.as_object().ok_or(PayloadError::NotAnObject {
        what: "push message",
    })?;
    let kind = obj
        .get("type")
        .and_then(Value::as_str)
        .ok_or(PayloadError::MissingField { field: "type" })?;

    match kind {
        "board_update" => {
            let data = obj
                .get("data")
                .ok_or(PayloadError::MissingField { field: "data" })?;
            Ok(PushMessage::BoardUpdate(parse_board(data)?))
        }
        "card_moved" => {
            let success = obj
                .get("success")
                .and_then(Value::as_bool)
                .ok_or(PayloadError::MissingField { field: "success" })?;
            Ok(PushMessage::CardMoved { success })
        }
        other => Err(PayloadError::UnknownMessageType(other.to_string())),
    }
}

fn resolve_order(raw: Option<&Value>, columns: &Map<String, Value>) -> Vec<ColumnId> {
    let mut order: Vec<ColumnId> = Vec::new();
    if let Some(Value::Array(entries)) = raw {
        for entry in entries {
            match entry.as_str().map(ColumnId::from_str) {
                Some(Ok(id)) if !order.contains(&id) => order.push(id),
                Some(Ok(_)) => {}
                _ => warn!(entry = %entry, "ignoring invalid column_order entry"),
            }
        }
    }
    for key in columns.keys() {
        if let Ok(id) = ColumnId::from_str(key) {
            if !order.contains(&id) {
                order.push(id);
            }
        }
    }
    order
}

/// A card is ready only with an id, a customer with a linked user, and a
/// vehicle. Anything else is treated as not-yet-ready and filtered.
fn parse_card(raw: &Value) -> Option<Card> {
    let obj = raw.as_object()?;
    let id = obj.get("id").and_then(CardId::from_json)?;
    let customer = obj.get("customer")?.as_object()?;
    let user = customer.get("user")?.as_object()?;
    let vehicle = parse_vehicle(obj.get("vehicle")?)?;

    Some(Card {
        id,
        // Column and position are assigned by the containing column.
        column: ColumnId::Estimates,
        position: 0,
        customer: Customer {
            id: customer.get("id").and_then(Value::as_i64),
            first_name: str_field(user, "first_name").unwrap_or_default(),
            last_name: str_field(user, "last_name").unwrap_or_default(),
            email: str_field(user, "email"),
            phone: str_field(customer, "phone"),
        },
        vehicle,
        status: str_field(obj, "status"),
        appointment_date: str_field(obj, "appointment_date"),
        appointment_time: str_field(obj, "appointment_time"),
    })
}

fn parse_vehicle(raw: &Value) -> Option<Vehicle> {
    match raw {
        Value::Object(v) => Some(Vehicle {
            id: v.get("id").and_then(Value::as_i64),
            year: v.get("year").and_then(|y| {
                y.as_i64()
                    .or_else(|| y.as_str().and_then(|s| s.parse().ok()))
            }),
            make: str_field(v, "make"),
            model: str_field(v, "model"),
        }),
        Value::Number(n) => n.as_i64().map(|id| Vehicle {
            id: Some(id),
            ..Vehicle::default()
        }),
        _ => None,
    }
}

fn str_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(str::to_string)
}
