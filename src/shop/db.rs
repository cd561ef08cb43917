use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveTime, Utc};
use rusqlite::{Connection, OptionalExtension, ToSql, params};

use super::models::*;
use crate::errors::ShopError;
use crate::workflow::models::ColumnId;

/// Async-safe handle to the shop database.
///
/// Wraps `ShopDb` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<ShopDb>>,
}

impl DbHandle {
    pub fn new(db: ShopDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&ShopDb) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db.lock().map_err(|_| ShopError::LockPoisoned)?;
            f(&guard)
        })
        .await
        .context("DB task panicked")?
    }
}

pub struct ShopDb {
    conn: Connection,
}

fn parse_column(s: &str) -> Result<ColumnId> {
    ColumnId::from_str(s).map_err(|e| anyhow::anyhow!(e))
}

fn parse_status(s: &str) -> Result<ServiceStatus> {
    ServiceStatus::from_str(s).map_err(|e| anyhow::anyhow!(e))
}

/// Rewrite positions so `ids` occupy `0..n` in the given order.
fn renumber(conn: &Connection, ids: &[i64]) -> Result<()> {
    for (position, id) in ids.iter().enumerate() {
        conn.execute(
            "UPDATE service_requests SET workflow_position = ?1 WHERE id = ?2",
            params![position as i64, id],
        )
        .context("Failed to renumber column")?;
    }
    Ok(())
}

struct RequestRow {
    id: i64,
    customer_id: i64,
    vehicle_id: i64,
    status: String,
    workflow_column: String,
    workflow_position: i64,
    workflow_history: String,
    appointment_date: String,
    appointment_time: String,
    after_hours_dropoff: bool,
    created_at: String,
    updated_at: String,
}

impl RequestRow {
    fn into_request(self) -> Result<ServiceRequest> {
        Ok(ServiceRequest {
            id: self.id,
            customer_id: self.customer_id,
            vehicle_id: self.vehicle_id,
            status: parse_status(&self.status)?,
            workflow_column: parse_column(&self.workflow_column)?,
            workflow_position: self.workflow_position,
            workflow_history: serde_json::from_str(&self.workflow_history)
                .context("Corrupt workflow history")?,
            appointment_date: self.appointment_date,
            appointment_time: self.appointment_time,
            after_hours_dropoff: self.after_hours_dropoff,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl ShopDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS customers (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    first_name TEXT NOT NULL,
                    last_name TEXT NOT NULL,
                    email TEXT NOT NULL,
                    phone TEXT NOT NULL DEFAULT '',
                    preferred_contact TEXT NOT NULL DEFAULT 'email',
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS vehicles (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    year INTEGER NOT NULL,
                    make TEXT NOT NULL,
                    model TEXT NOT NULL,
                    vin TEXT UNIQUE
                );

                CREATE TABLE IF NOT EXISTS customer_vehicles (
                    customer_id INTEGER NOT NULL REFERENCES customers(id) ON DELETE CASCADE,
                    vehicle_id INTEGER NOT NULL REFERENCES vehicles(id) ON DELETE CASCADE,
                    PRIMARY KEY (customer_id, vehicle_id)
                );

                CREATE TABLE IF NOT EXISTS service_requests (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    customer_id INTEGER NOT NULL REFERENCES customers(id) ON DELETE CASCADE,
                    vehicle_id INTEGER NOT NULL REFERENCES vehicles(id) ON DELETE CASCADE,
                    status TEXT NOT NULL DEFAULT 'pending',
                    workflow_column TEXT NOT NULL DEFAULT 'estimates',
                    workflow_position INTEGER NOT NULL DEFAULT 0,
                    workflow_history TEXT NOT NULL DEFAULT '[]',
                    appointment_date TEXT NOT NULL,
                    appointment_time TEXT NOT NULL,
                    after_hours_dropoff INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE INDEX IF NOT EXISTS idx_service_requests_workflow
                    ON service_requests(workflow_column, workflow_position);
                CREATE INDEX IF NOT EXISTS idx_service_requests_status
                    ON service_requests(status);
                ",
            )
            .context("Failed to create tables")?;
        Ok(())
    }

    // ── Customers & vehicles ──────────────────────────────────────────

    pub fn create_customer(&self, new: &NewCustomer) -> Result<Customer> {
        if new.first_name.trim().is_empty() || new.email.trim().is_empty() {
            return Err(ShopError::BadRequest("first_name and email are required".into()).into());
        }
        let preferred = new.preferred_contact.as_deref().unwrap_or("email");
        if preferred != "email" && preferred != "phone" {
            return Err(ShopError::BadRequest(format!(
                "preferred_contact must be 'email' or 'phone', got '{}'",
                preferred
            ))
            .into());
        }
        self.conn
            .execute(
                "INSERT INTO customers (first_name, last_name, email, phone, preferred_contact)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![new.first_name, new.last_name, new.email, new.phone, preferred],
            )
            .context("Failed to insert customer")?;
        let id = self.conn.last_insert_rowid();
        self.get_customer(id)?.context("Customer not found after insert")
    }

    pub fn get_customer(&self, id: i64) -> Result<Option<Customer>> {
        self.conn
            .query_row(
                "SELECT id, first_name, last_name, email, phone, preferred_contact, created_at
                 FROM customers WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Customer {
                        id: row.get(0)?,
                        first_name: row.get(1)?,
                        last_name: row.get(2)?,
                        email: row.get(3)?,
                        phone: row.get(4)?,
                        preferred_contact: row.get(5)?,
                        created_at: row.get(6)?,
                    })
                },
            )
            .optional()
            .context("Failed to query customer")
    }

    pub fn create_vehicle(&self, new: &NewVehicle) -> Result<Vehicle> {
        if let Some(customer_id) = new.customer_id {
            if self.get_customer(customer_id)?.is_none() {
                return Err(ShopError::CustomerNotFound { id: customer_id }.into());
            }
        }
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        tx.execute(
            "INSERT INTO vehicles (year, make, model, vin) VALUES (?1, ?2, ?3, ?4)",
            params![new.year, new.make, new.model, new.vin],
        )
        .context("Failed to insert vehicle")?;
        let id = tx.last_insert_rowid();
        if let Some(customer_id) = new.customer_id {
            tx.execute(
                "INSERT INTO customer_vehicles (customer_id, vehicle_id) VALUES (?1, ?2)",
                params![customer_id, id],
            )
            .context("Failed to link vehicle to customer")?;
        }
        tx.commit().context("Failed to commit vehicle")?;
        self.get_vehicle(id)?.context("Vehicle not found after insert")
    }

    pub fn get_vehicle(&self, id: i64) -> Result<Option<Vehicle>> {
        self.conn
            .query_row(
                "SELECT id, year, make, model, vin FROM vehicles WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Vehicle {
                        id: row.get(0)?,
                        year: row.get(1)?,
                        make: row.get(2)?,
                        model: row.get(3)?,
                        vin: row.get(4)?,
                    })
                },
            )
            .optional()
            .context("Failed to query vehicle")
    }

    // ── Service requests ──────────────────────────────────────────────

    pub fn create_service_request(&self, new: &NewServiceRequest) -> Result<ServiceRequest> {
        NaiveDate::parse_from_str(&new.appointment_date, "%Y-%m-%d").map_err(|e| {
            ShopError::BadRequest(format!("Invalid appointment_date: {}", e))
        })?;
        NaiveTime::parse_from_str(&new.appointment_time, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(&new.appointment_time, "%H:%M:%S"))
            .map_err(|e| ShopError::BadRequest(format!("Invalid appointment_time: {}", e)))?;
        if self.get_customer(new.customer_id)?.is_none() {
            return Err(ShopError::CustomerNotFound {
                id: new.customer_id,
            }
            .into());
        }
        if self.get_vehicle(new.vehicle_id)?.is_none() {
            return Err(ShopError::VehicleNotFound { id: new.vehicle_id }.into());
        }

        let column = new.workflow_column.unwrap_or(ColumnId::Estimates);
        let max_pos: i64 = self
            .conn
            .query_row(
                "SELECT COALESCE(MAX(workflow_position), -1) FROM service_requests WHERE workflow_column = ?1",
                params![column.as_str()],
                |row| row.get(0),
            )
            .context("Failed to get max position")?;

        self.conn
            .execute(
                "INSERT INTO service_requests
                    (customer_id, vehicle_id, status, workflow_column, workflow_position,
                     appointment_date, appointment_time, after_hours_dropoff)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    new.customer_id,
                    new.vehicle_id,
                    ServiceStatus::Pending.as_str(),
                    column.as_str(),
                    max_pos + 1,
                    new.appointment_date,
                    new.appointment_time,
                    new.after_hours_dropoff,
                ],
            )
            .context("Failed to insert service request")?;
        let id = self.conn.last_insert_rowid();
        self.get_service_request(id)?
            .context("Service request not found after insert")
    }

    pub fn get_service_request(&self, id: i64) -> Result<Option<ServiceRequest>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, customer_id, vehicle_id, status, workflow_column, workflow_position,
                        workflow_history, appointment_date, appointment_time, after_hours_dropoff,
                        created_at, updated_at
                 FROM service_requests WHERE id = ?1",
                params![id],
                |row| {
                    Ok(RequestRow {
                        id: row.get(0)?,
                        customer_id: row.get(1)?,
                        vehicle_id: row.get(2)?,
                        status: row.get(3)?,
                        workflow_column: row.get(4)?,
                        workflow_position: row.get(5)?,
                        workflow_history: row.get(6)?,
                        appointment_date: row.get(7)?,
                        appointment_time: row.get(8)?,
                        after_hours_dropoff: row.get(9)?,
                        created_at: row.get(10)?,
                        updated_at: row.get(11)?,
                    })
                },
            )
            .optional()
            .context("Failed to query service request")?;
        row.map(RequestRow::into_request).transpose()
    }

    /// Delete a request and close the gap it leaves in its column.
    pub fn delete_service_request(&self, id: i64) -> Result<bool> {
        let Some(existing) = self.get_service_request(id)? else {
            return Ok(false);
        };
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        tx.execute("DELETE FROM service_requests WHERE id = ?1", params![id])
            .context("Failed to delete service request")?;
        let remaining = self.column_ids(existing.workflow_column)?;
        renumber(&tx, &remaining)?;
        tx.commit().context("Failed to commit delete")?;
        Ok(true)
    }

    pub fn pending_count(&self) -> Result<i64> {
        self.conn
            .query_row(
                "SELECT COUNT(*) FROM service_requests WHERE status = ?1",
                params![ServiceStatus::Pending.as_str()],
                |row| row.get(0),
            )
            .context("Failed to count pending requests")
    }

    /// Ids in `column`, in board order.
    fn column_ids(&self, column: ColumnId) -> Result<Vec<i64>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id FROM service_requests WHERE workflow_column = ?1
                 ORDER BY workflow_position, id",
            )
            .context("Failed to prepare column_ids")?;
        let rows = stmt
            .query_map(params![column.as_str()], |row| row.get::<_, i64>(0))
            .context("Failed to query column ids")?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(row.context("Failed to read column id")?);
        }
        Ok(ids)
    }

    /// Move a request to `target` at `target_index` (clamped).
    ///
    /// Requests in `completed` may only be reordered within it. A column
    /// change records a history entry and updates the status; both
    /// affected columns end up numbered `0..n`.
    pub fn move_service_request(
        &self,
        id: i64,
        target: ColumnId,
        target_index: usize,
    ) -> Result<ServiceRequest> {
        let current = self
            .get_service_request(id)?
            .ok_or(ShopError::RequestNotFound { id })?;
        let from = current.workflow_column;
        if from == ColumnId::Completed && target != ColumnId::Completed {
            return Err(ShopError::InvalidTransition {
                from: from.as_str().to_string(),
                to: target.as_str().to_string(),
            }
            .into());
        }

        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;

        if from != target {
            let mut history = current.workflow_history;
            history.push(WorkflowTransition {
                from_column: from,
                to_column: target,
                timestamp: Utc::now().to_rfc3339(),
            });
            let history = serde_json::to_string(&history).context("Failed to encode history")?;
            tx.execute(
                "UPDATE service_requests
                 SET workflow_column = ?1, status = ?2, workflow_history = ?3,
                     updated_at = datetime('now')
                 WHERE id = ?4",
                params![
                    target.as_str(),
                    ServiceStatus::for_column(target).as_str(),
                    history,
                    id
                ],
            )
            .context("Failed to move service request")?;
            let remaining = self.column_ids(from)?;
            renumber(&tx, &remaining)?;
        } else {
            tx.execute(
                "UPDATE service_requests SET updated_at = datetime('now') WHERE id = ?1",
                params![id],
            )
            .context("Failed to touch service request")?;
        }

        let mut order = self.column_ids(target)?;
        order.retain(|other| *other != id);
        let index = target_index.min(order.len());
        order.insert(index, id);
        renumber(&tx, &order)?;

        tx.commit().context("Failed to commit move")?;
        self.get_service_request(id)?
            .context("Service request not found after move")
    }

    // ── Board view ────────────────────────────────────────────────────

    /// Joined request views; `tail` supplies the WHERE/ORDER BY clause.
    fn request_views(&self, tail: &str, args: &[&dyn ToSql]) -> Result<Vec<ServiceRequestView>> {
        let sql = format!(
            "SELECT sr.id, sr.status, sr.workflow_column, sr.workflow_position,
                    sr.appointment_date, sr.appointment_time, sr.after_hours_dropoff,
                    c.id, c.phone, c.first_name, c.last_name, c.email,
                    v.id, v.year, v.make, v.model, v.vin
             FROM service_requests sr
             JOIN customers c ON c.id = sr.customer_id
             JOIN vehicles v ON v.id = sr.vehicle_id
             {}",
            tail
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .context("Failed to prepare request view query")?;
        let rows = stmt
            .query_map(args, |row| {
                let status: String = row.get(1)?;
                let column: String = row.get(2)?;
                let view = ServiceRequestView {
                    id: row.get(0)?,
                    // Placeholders; replaced below once the strings are validated.
                    status: ServiceStatus::Pending,
                    workflow_column: ColumnId::Estimates,
                    workflow_position: row.get(3)?,
                    appointment_date: row.get(4)?,
                    appointment_time: row.get(5)?,
                    after_hours_dropoff: row.get(6)?,
                    customer: CustomerView {
                        id: row.get(7)?,
                        phone: row.get(8)?,
                        user: UserView {
                            first_name: row.get(9)?,
                            last_name: row.get(10)?,
                            email: row.get(11)?,
                        },
                    },
                    vehicle: Vehicle {
                        id: row.get(12)?,
                        year: row.get(13)?,
                        make: row.get(14)?,
                        model: row.get(15)?,
                        vin: row.get(16)?,
                    },
                };
                Ok((status, column, view))
            })
            .context("Failed to query request views")?;

        let mut views = Vec::new();
        for row in rows {
            let (status, column, mut view) = row.context("Failed to read request view row")?;
            view.status = parse_status(&status)?;
            view.workflow_column = parse_column(&column)?;
            views.push(view);
        }
        Ok(views)
    }

    pub fn board_snapshot(&self) -> Result<BoardSnapshot> {
        let mut snapshot = BoardSnapshot {
            columns: ColumnId::ALL
                .iter()
                .map(|c| (c.as_str().to_string(), Vec::new()))
                .collect(),
            column_order: ColumnId::ALL.iter().map(|c| c.as_str().to_string()).collect(),
        };
        let views = self.request_views(
            "ORDER BY sr.workflow_column, sr.workflow_position, sr.id",
            &[],
        )?;
        for view in views {
            snapshot
                .columns
                .entry(view.workflow_column.as_str().to_string())
                .or_default()
                .push(view);
        }
        Ok(snapshot)
    }

    /// Requests booked on `date` (`%Y-%m-%d`), earliest appointment first.
    /// Every status is included.
    pub fn appointments_on(&self, date: &str) -> Result<Vec<ServiceRequestView>> {
        self.request_views(
            "WHERE sr.appointment_date = ?1 ORDER BY sr.appointment_time, sr.id",
            &[&date],
        )
    }

    pub fn today_appointments(&self) -> Result<Vec<ServiceRequestView>> {
        self.appointments_on(&Utc::now().format("%Y-%m-%d").to_string())
    }

    /// Insert a handful of customers, vehicles and requests spread across
    /// the columns. Returns the number of requests created.
    pub fn seed_demo(&self) -> Result<usize> {
        let people = [
            ("Mai", "Nguyen", "mai@example.com", "555-0101", 2017, "Honda", "Civic", ColumnId::Estimates, "13:00"),
            ("Tom", "Baker", "tom@example.com", "555-0102", 2019, "Subaru", "Outback", ColumnId::Estimates, "09:30"),
            ("Ana", "Silva", "ana@example.com", "555-0103", 2015, "Ford", "F-150", ColumnId::InProgress, "11:00"),
            ("Raj", "Patel", "raj@example.com", "555-0104", 2021, "Toyota", "RAV4", ColumnId::WaitingParts, "10:00"),
            ("Eve", "Moreau", "eve@example.com", "555-0105", 2012, "Mazda", "3", ColumnId::Completed, "15:30"),
        ];
        let mut created = 0usize;
        for (first, last, email, phone, year, make, model, column, time) in people {
            let customer = self.create_customer(&NewCustomer {
                first_name: first.into(),
                last_name: last.into(),
                email: email.into(),
                phone: phone.into(),
                preferred_contact: None,
            })?;
            let vehicle = self.create_vehicle(&NewVehicle {
                year,
                make: make.into(),
                model: model.into(),
                vin: None,
                customer_id: Some(customer.id),
            })?;
            self.create_service_request(&NewServiceRequest {
                customer_id: customer.id,
                vehicle_id: vehicle.id,
                appointment_date: Utc::now().format("%Y-%m-%d").to_string(),
                appointment_time: time.into(),
                after_hours_dropoff: false,
                workflow_column: Some(column),
            })?;
            created += 1;
        }
        Ok(created)
    }
}
