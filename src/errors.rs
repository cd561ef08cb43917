//! Typed error hierarchy for shopflow.
//!
//! Three top-level enums cover the three boundaries:
//! - `PayloadError` — loosely-typed JSON that failed boundary validation
//! - `SyncError` — Remote Sync Client failures (fetch and move)
//! - `ShopError` — backend API and storage failures

use thiserror::Error;

/// Generic toast text for a move that failed without a server message.
pub const GENERIC_MOVE_ERROR: &str = "Failed to move card";

/// Generic text for a snapshot that could not be loaded.
pub const GENERIC_LOAD_ERROR: &str = "Failed to load board";

/// Errors raised while converting untyped input into board entities.
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("Expected a JSON object for {what}")]
    NotAnObject { what: &'static str },

    #[error("Missing required field '{field}'")]
    MissingField { field: &'static str },

    #[error("Unknown push message type '{0}'")]
    UnknownMessageType(String),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors from the Remote Sync Client.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Request failed: {0}")]
    Network(#[source] reqwest::Error),

    #[error("Server responded with {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid board payload: {0}")]
    Payload(#[from] PayloadError),

    #[error("Move rejected: {message}")]
    MoveRejected { message: String },
}

impl SyncError {
    /// Text suitable for a transient user-visible notification.
    ///
    /// A rejected move carries the server's own message verbatim; every
    /// other failure collapses to a generic sentence.
    pub fn user_message(&self) -> String {
        match self {
            SyncError::MoveRejected { message } => message.clone(),
            SyncError::Payload(_) => GENERIC_LOAD_ERROR.to_string(),
            SyncError::Network(_) | SyncError::Status { .. } => GENERIC_MOVE_ERROR.to_string(),
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        SyncError::Network(err)
    }
}

/// Errors from the backend API and storage layer.
#[derive(Debug, Error)]
pub enum ShopError {
    #[error("Service request {id} not found")]
    RequestNotFound { id: i64 },

    #[error("Customer {id} not found")]
    CustomerNotFound { id: i64 },

    #[error("Vehicle {id} not found")]
    VehicleNotFound { id: i64 },

    #[error("Invalid column '{column}': {message}")]
    InvalidColumn { column: String, message: String },

    #[error(
        "Items in the completed column cannot be moved back to other columns. \
         This is to maintain the integrity of the workflow history."
    )]
    InvalidTransition { from: String, to: String },

    #[error("Database lock poisoned")]
    LockPoisoned,

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_error_missing_field_names_field() {
        let err = PayloadError::MissingField { field: "columns" };
        assert!(err.to_string().contains("columns"));
    }

    #[test]
    fn payload_error_converts_from_serde_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: PayloadError = json_err.into();
        assert!(matches!(err, PayloadError::Json(_)));
    }

    #[test]
    fn sync_error_move_rejected_user_message_is_verbatim() {
        let err = SyncError::MoveRejected {
            message: "Card already moved".to_string(),
        };
        assert_eq!(err.user_message(), "Card already moved");
    }

    #[test]
    fn sync_error_status_user_message_is_generic() {
        let err = SyncError::Status {
            status: 502,
            body: "bad gateway".to_string(),
        };
        assert_eq!(err.user_message(), GENERIC_MOVE_ERROR);
        assert!(err.to_string().contains("502"));
    }

    #[test]
    fn sync_error_converts_from_payload_error() {
        let inner = PayloadError::NotAnObject { what: "board" };
        let err: SyncError = inner.into();
        match &err {
            SyncError::Payload(PayloadError::NotAnObject { what }) => assert_eq!(*what, "board"),
            _ => panic!("Expected SyncError::Payload(NotAnObject)"),
        }
    }

    #[test]
    fn shop_error_request_not_found_carries_id() {
        let err = ShopError::RequestNotFound { id: 42 };
        match &err {
            ShopError::RequestNotFound { id } => assert_eq!(*id, 42),
            _ => panic!("Expected RequestNotFound"),
        }
        assert!(err.to_string().contains("42"));
    }

    #[test]
    fn shop_error_invalid_transition_message() {
        let err = ShopError::InvalidTransition {
            from: "completed".into(),
            to: "estimates".into(),
        };
        assert!(err.to_string().starts_with("Items in the completed column"));
    }

    #[test]
    fn shop_error_survives_anyhow_roundtrip() {
        let err: anyhow::Error = ShopError::VehicleNotFound { id: 7 }.into();
        let recovered = err.downcast_ref::<ShopError>();
        assert!(matches!(recovered, Some(ShopError::VehicleNotFound { id: 7 })));
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&PayloadError::UnknownMessageType("x".into()));
        assert_std_error(&SyncError::MoveRejected { message: "x".into() });
        assert_std_error(&ShopError::LockPoisoned);
    }
}
