use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

/// Workflow stage a service request sits in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnId {
    Estimates,
    InProgress,
    WaitingParts,
    Completed,
}

impl ColumnId {
    /// Canonical display order used when the backend does not send one.
    pub const ALL: [ColumnId; 4] = [
        ColumnId::Estimates,
        ColumnId::InProgress,
        ColumnId::WaitingParts,
        ColumnId::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Estimates => "estimates",
            Self::InProgress => "in_progress",
            Self::WaitingParts => "waiting_parts",
            Self::Completed => "completed",
        }
    }

    /// Header text: every underscore becomes a space, then upper-cased.
    pub fn label(&self) -> String {
        self.as_str().replace('_', " ").to_uppercase()
    }
}

impl fmt::Display for ColumnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColumnId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "estimates" => Ok(Self::Estimates),
            "in_progress" => Ok(Self::InProgress),
            "waiting_parts" => Ok(Self::WaitingParts),
            "completed" => Ok(Self::Completed),
            _ => Err(format!("Invalid column: {}", s)),
        }
    }
}

/// Card identity in normalized string form.
///
/// The backend emits integer ids while gesture payloads carry strings;
/// both normalize to the same `CardId` so comparisons never miss on type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct CardId(String);

impl CardId {
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Normalize a JSON scalar. Returns `None` for anything that cannot
    /// identify a card (null, empty string, objects, floats).
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::String(s) if !s.trim().is_empty() => Some(Self::new(s)),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(|i| i.to_string())
                .or_else(|| n.as_u64().map(|u| u.to_string()))
                .map(CardId),
            _ => None,
        }
    }
}

impl fmt::Display for CardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<i64> for CardId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for CardId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for CardId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

impl<'de> Deserialize<'de> for CardId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        CardId::from_json(&value)
            .ok_or_else(|| serde::de::Error::custom("card id must be a non-empty string or integer"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Customer {
    pub id: Option<i64>,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl Customer {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// Vehicle reference. Backends may send a full object or only an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Vehicle {
    pub id: Option<i64>,
    pub year: Option<i64>,
    pub make: Option<String>,
    pub model: Option<String>,
}

impl fmt::Display for Vehicle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = [
            self.year.map(|y| y.to_string()),
            self.make.clone(),
            self.model.clone(),
        ]
        .into_iter()
        .flatten()
        .filter(|p| !p.is_empty())
        .collect();
        if parts.is_empty() {
            match self.id {
                Some(id) => write!(f, "vehicle #{}", id),
                None => f.write_str("unknown vehicle"),
            }
        } else {
            f.write_str(&parts.join(" "))
        }
    }
}

/// One service request on the board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub id: CardId,
    pub column: ColumnId,
    pub position: usize,
    pub customer: Customer,
    pub vehicle: Vehicle,
    pub status: Option<String>,
    pub appointment_date: Option<String>,
    pub appointment_time: Option<String>,
}

/// Full board state: ordered columns of ordered cards.
///
/// Invariants held by every constructor and mutator:
/// - `order` has no duplicates and every entry has a column (possibly empty);
/// - every card's `column` equals the key of the column holding it;
/// - every card's `position` equals its index in that column.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Board {
    columns: HashMap<ColumnId, Vec<Card>>,
    order: Vec<ColumnId>,
}

impl Board {
    /// Empty board with the given display order. Duplicates are dropped.
    pub fn new(order: impl IntoIterator<Item = ColumnId>) -> Self {
        let mut board = Board::default();
        for id in order {
            board.ensure_column(id);
        }
        board
    }

    /// Empty board with the four standard columns in canonical order.
    pub fn standard() -> Self {
        Self::new(ColumnId::ALL)
    }

    fn ensure_column(&mut self, id: ColumnId) {
        if !self.order.contains(&id) {
            self.order.push(id);
        }
        self.columns.entry(id).or_default();
    }

    /// Append a card to `column`, creating the column at the end of the
    /// display order if needed. The card's column and position are set.
    pub fn push_card(&mut self, column: ColumnId, mut card: Card) {
        self.ensure_column(column);
        let cards = self.columns.entry(column).or_default();
        card.column = column;
        card.position = cards.len();
        cards.push(card);
    }

    pub fn order(&self) -> &[ColumnId] {
        &self.order
    }

    pub fn has_column(&self, id: ColumnId) -> bool {
        self.columns.contains_key(&id)
    }

    /// Cards of a column in display order; empty for unknown columns.
    pub fn column(&self, id: ColumnId) -> &[Card] {
        self.columns.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Columns paired with their cards, in display order.
    pub fn columns(&self) -> impl Iterator<Item = (ColumnId, &[Card])> + '_ {
        self.order.iter().map(move |id| (*id, self.column(*id)))
    }

    /// Locate a card: its column and index.
    pub fn find_card(&self, id: &CardId) -> Option<(ColumnId, usize)> {
        self.order.iter().find_map(|col| {
            self.column(*col)
                .iter()
                .position(|c| &c.id == id)
                .map(|idx| (*col, idx))
        })
    }

    pub fn card(&self, id: &CardId) -> Option<&Card> {
        self.find_card(id)
            .and_then(|(col, idx)| self.column(col).get(idx))
    }

    pub fn card_count(&self) -> usize {
        self.columns.values().map(Vec::len).sum()
    }

    /// Remove `id` from `from` and insert it into `to` at `target_index`
    /// (clamped to the target length, measured after removal).
    ///
    /// Returns `false` without touching anything when the card is not in
    /// `from` or `to` is not a board column.
    pub fn move_card(
        &mut self,
        id: &CardId,
        from: ColumnId,
        to: ColumnId,
        target_index: usize,
    ) -> bool {
        if !self.has_column(to) {
            return false;
        }
        let Some(source) = self.columns.get_mut(&from) else {
            return false;
        };
        let Some(current) = source.iter().position(|c| &c.id == id) else {
            return false;
        };
        let mut card = source.remove(current);
        reindex(source, from);

        let target = self.columns.entry(to).or_default();
        let index = target_index.min(target.len());
        card.column = to;
        target.insert(index, card);
        reindex(target, to);
        true
    }
}

fn reindex(cards: &mut [Card], column: ColumnId) {
    for (idx, card) in cards.iter_mut().enumerate() {
        card.position = idx;
        card.column = column;
    }
}

#[cfg(test)]
pub(crate) fn test_card(id: i64, first_name: &str) -> Card {
    Card {
        id: CardId::from(id),
        column: ColumnId::Estimates,
        position: 0,
        customer: Customer {
            id: Some(id),
            first_name: first_name.to_string(),
            last_name: "Driver".to_string(),
            email: None,
            phone: None,
        },
        vehicle: Vehicle {
            id: Some(id),
            year: Some(2019),
            make: Some("Subaru".to_string()),
            model: Some("Outback".to_string()),
        },
        status: None,
        appointment_date: None,
        appointment_time: None,
    }
}
