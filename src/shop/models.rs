use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::workflow::models::ColumnId;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Pending,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
}

impl ServiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Status a request takes on when it enters `column`.
    pub fn for_column(column: ColumnId) -> Self {
        match column {
            ColumnId::Estimates => Self::Confirmed,
            ColumnId::InProgress | ColumnId::WaitingParts => Self::InProgress,
            ColumnId::Completed => Self::Completed,
        }
    }
}

impl FromStr for ServiceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "confirmed" => Ok(Self::Confirmed),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Invalid status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Customer {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub preferred_contact: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Vehicle {
    pub id: i64,
    pub year: i64,
    pub make: String,
    pub model: String,
    pub vin: Option<String>,
}

/// One entry of a request's column history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowTransition {
    pub from_column: ColumnId,
    pub to_column: ColumnId,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceRequest {
    pub id: i64,
    pub customer_id: i64,
    pub vehicle_id: i64,
    pub status: ServiceStatus,
    pub workflow_column: ColumnId,
    pub workflow_position: i64,
    pub workflow_history: Vec<WorkflowTransition>,
    pub appointment_date: String,
    pub appointment_time: String,
    pub after_hours_dropoff: bool,
    pub created_at: String,
    pub updated_at: String,
}

// ── Inputs ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct NewCustomer {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: String,
    pub preferred_contact: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewVehicle {
    pub year: i64,
    pub make: String,
    pub model: String,
    pub vin: Option<String>,
    /// Link the vehicle to this customer on creation.
    pub customer_id: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewServiceRequest {
    pub customer_id: i64,
    pub vehicle_id: i64,
    pub appointment_date: String,
    pub appointment_time: String,
    #[serde(default)]
    pub after_hours_dropoff: bool,
    pub workflow_column: Option<ColumnId>,
}

// ── Board views ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserView {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CustomerView {
    pub id: i64,
    pub phone: String,
    pub user: UserView,
}

/// A request as it appears on the board: customer and vehicle joined in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceRequestView {
    pub id: i64,
    pub status: ServiceStatus,
    pub workflow_column: ColumnId,
    pub workflow_position: i64,
    pub appointment_date: String,
    pub appointment_time: String,
    pub after_hours_dropoff: bool,
    pub customer: CustomerView,
    pub vehicle: Vehicle,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct BoardSnapshot {
    pub columns: BTreeMap<String, Vec<ServiceRequestView>>,
    pub column_order: Vec<String>,
}
