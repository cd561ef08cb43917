use std::str::FromStr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use super::cache::TtlCache;
use super::db::DbHandle;
#[cfg(test)]
use super::db::ShopDb;
use super::models::{
    BoardSnapshot, NewCustomer, NewServiceRequest, NewVehicle, ServiceRequestView,
};
use super::ws::{AppointmentEvent, PushEvent, broadcast_appointments, broadcast_event};
use crate::errors::ShopError;
use crate::workflow::models::ColumnId;
use crate::workflow::payload::{MoveRequest, MoveResponse};

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub db: DbHandle,
    /// Workflow channel: `board_update` and `card_moved`.
    pub ws_tx: broadcast::Sender<String>,
    /// Appointments channel: `pending_count` and `today_appointments`.
    pub appointments_tx: broadcast::Sender<String>,
    pub board_cache: TtlCache<BoardSnapshot>,
    pub pending_cache: TtlCache<i64>,
    pub today_cache: TtlCache<Vec<ServiceRequestView>>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(
        db: DbHandle,
        ws_tx: broadcast::Sender<String>,
        appointments_tx: broadcast::Sender<String>,
        cache_ttl: std::time::Duration,
    ) -> Self {
        Self {
            db,
            ws_tx,
            appointments_tx,
            board_cache: TtlCache::new(cache_ttl),
            pending_cache: TtlCache::new(cache_ttl),
            today_cache: TtlCache::new(cache_ttl),
        }
    }

    fn invalidate_caches(&self) {
        self.board_cache.invalidate();
        self.pending_cache.invalidate();
        self.today_cache.invalidate();
    }
}

// ── Error handling ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (
            status,
            Json(serde_json::json!({"success": false, "error": message})),
        )
            .into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast_ref::<ShopError>() {
            Some(
                ShopError::RequestNotFound { .. }
                | ShopError::CustomerNotFound { .. }
                | ShopError::VehicleNotFound { .. },
            ) => ApiError::NotFound(err.to_string()),
            Some(
                ShopError::InvalidColumn { .. }
                | ShopError::InvalidTransition { .. }
                | ShopError::BadRequest(_),
            ) => ApiError::BadRequest(err.to_string()),
            _ => {
                error!(error = %format!("{:#}", err), "request failed");
                ApiError::Internal(err.to_string())
            }
        }
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/api/admin/workflow/board/", get(get_board))
        .route("/api/admin/workflow/move/", post(move_card))
        .route("/api/customers", post(create_customer))
        .route("/api/vehicles", post(create_vehicle))
        .route("/api/service-requests", post(create_service_request))
        .route(
            "/api/service-requests/{id}",
            get(get_service_request).delete(delete_service_request),
        )
        .route("/api/service-requests/pending/count", get(pending_count))
        .route("/api/service-requests/today", get(today_appointments))
        .route("/health", get(health_check))
}

// ── Helpers ───────────────────────────────────────────────────────────

async fn load_board(state: &SharedState) -> Result<BoardSnapshot, ApiError> {
    if let Some(snapshot) = state.board_cache.get() {
        return Ok(snapshot);
    }
    let snapshot = state.db.call(|db| db.board_snapshot()).await?;
    state.board_cache.put(snapshot.clone());
    Ok(snapshot)
}

/// Push a fresh snapshot to every client after a structural change.
async fn broadcast_board(state: &SharedState) {
    match load_board(state).await {
        Ok(data) => broadcast_event(&state.ws_tx, &PushEvent::BoardUpdate { data }),
        Err(e) => warn!(error = ?e, "could not build snapshot for broadcast"),
    }
}

async fn load_pending(state: &SharedState) -> Result<i64, ApiError> {
    if let Some(count) = state.pending_cache.get() {
        return Ok(count);
    }
    let count = state.db.call(|db| db.pending_count()).await?;
    state.pending_cache.put(count);
    Ok(count)
}

async fn load_today(state: &SharedState) -> Result<Vec<ServiceRequestView>, ApiError> {
    if let Some(today) = state.today_cache.get() {
        return Ok(today);
    }
    let today = state.db.call(|db| db.today_appointments()).await?;
    state.today_cache.put(today.clone());
    Ok(today)
}

/// Refill the appointment caches and push both to appointments clients.
async fn broadcast_appointment_state(state: &SharedState) {
    match load_pending(state).await {
        Ok(count) => broadcast_appointments(
            &state.appointments_tx,
            &AppointmentEvent::PendingCount { count },
        ),
        Err(e) => warn!(error = ?e, "could not count pending requests for broadcast"),
    }
    match load_today(state).await {
        Ok(appointments) => broadcast_appointments(
            &state.appointments_tx,
            &AppointmentEvent::TodayAppointments { appointments },
        ),
        Err(e) => warn!(error = ?e, "could not list today's appointments for broadcast"),
    }
}

fn parse_move(body: Value) -> Result<(i64, ColumnId, usize), ShopError> {
    let req: MoveRequest = serde_json::from_value(body)
        .map_err(|e| ShopError::BadRequest(format!("Invalid move request: {}", e)))?;
    let id = req
        .card_id
        .as_str()
        .parse::<i64>()
        .map_err(|_| ShopError::BadRequest(format!("Invalid card id '{}'", req.card_id)))?;
    let column = ColumnId::from_str(&req.target_column).map_err(|message| {
        ShopError::InvalidColumn {
            column: req.target_column.clone(),
            message,
        }
    })?;
    let index = usize::try_from(req.target_index)
        .map_err(|_| ShopError::BadRequest("targetIndex must not be negative".into()))?;
    Ok((id, column, index))
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

async fn get_board(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(load_board(&state).await?))
}

async fn move_card(
    State(state): State<SharedState>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, ApiError> {
    let (id, column, index) = parse_move(body).map_err(anyhow::Error::from)?;
    let moved = state
        .db
        .call(move |db| db.move_service_request(id, column, index))
        .await?;
    state.invalidate_caches();
    info!(
        id,
        column = %moved.workflow_column,
        position = moved.workflow_position,
        "service request moved"
    );
    broadcast_event(&state.ws_tx, &PushEvent::CardMoved { success: true });
    broadcast_appointment_state(&state).await;
    Ok(Json(MoveResponse::ok()))
}

async fn create_customer(
    State(state): State<SharedState>,
    Json(req): Json<NewCustomer>,
) -> Result<impl IntoResponse, ApiError> {
    let customer = state.db.call(move |db| db.create_customer(&req)).await?;
    Ok((StatusCode::CREATED, Json(customer)))
}

async fn create_vehicle(
    State(state): State<SharedState>,
    Json(req): Json<NewVehicle>,
) -> Result<impl IntoResponse, ApiError> {
    let vehicle = state.db.call(move |db| db.create_vehicle(&req)).await?;
    Ok((StatusCode::CREATED, Json(vehicle)))
}

async fn create_service_request(
    State(state): State<SharedState>,
    Json(req): Json<NewServiceRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let request = state
        .db
        .call(move |db| db.create_service_request(&req))
        .await?;
    state.invalidate_caches();
    broadcast_board(&state).await;
    broadcast_appointment_state(&state).await;
    Ok((StatusCode::CREATED, Json(request)))
}

async fn get_service_request(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let request = state.db.call(move |db| db.get_service_request(id)).await?;
    match request {
        Some(request) => Ok(Json(request)),
        None => Err(ApiError::NotFound(format!("Service request {} not found", id))),
    }
}

async fn delete_service_request(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = state
        .db
        .call(move |db| db.delete_service_request(id))
        .await?;
    if !deleted {
        return Err(ApiError::NotFound(format!("Service request {} not found", id)));
    }
    state.invalidate_caches();
    broadcast_board(&state).await;
    broadcast_appointment_state(&state).await;
    Ok(StatusCode::NO_CONTENT)
}

async fn pending_count(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let count = load_pending(&state).await?;
    Ok(Json(serde_json::json!({ "count": count })))
}

/// Today's requests, every status, ordered by appointment time.
async fn today_appointments(
    State(state): State<SharedState>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(load_today(&state).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use std::time::Duration;
    use tower::ServiceExt;

    fn test_state() -> SharedState {
        let db = ShopDb::new_in_memory().unwrap();
        db.seed_demo().unwrap();
        let (ws_tx, _) = broadcast::channel(16);
        let (appointments_tx, _) = broadcast::channel(16);
        Arc::new(AppState::new(
            DbHandle::new(db),
            ws_tx,
            appointments_tx,
            Duration::from_secs(60),
        ))
    }

    fn app(state: &SharedState) -> Router {
        api_router().with_state(state.clone())
    }

    async fn body_json(body: Body) -> Value {
        let bytes = body.collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn first_id(state: &SharedState, column: &str) -> i64 {
        let resp = app(state)
            .oneshot(get_req("/api/admin/workflow/board/"))
            .await
            .unwrap();
        let board = body_json(resp.into_body()).await;
        board["columns"][column][0]["id"].as_i64().unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let state = test_state();
        let response = app(&state).oneshot(get_req("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"ok");
    }

    #[tokio::test]
    async fn test_board_snapshot_shape() {
        let state = test_state();
        let response = app(&state)
            .oneshot(get_req("/api/admin/workflow/board/"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let board = body_json(response.into_body()).await;
        assert_eq!(
            board["column_order"],
            serde_json::json!(["estimates", "in_progress", "waiting_parts", "completed"])
        );
        let card = &board["columns"]["estimates"][0];
        assert!(card["customer"]["user"]["first_name"].is_string());
        assert!(card["vehicle"]["make"].is_string());
        assert_eq!(card["workflow_column"], "estimates");
    }

    #[tokio::test]
    async fn test_move_card_success_broadcasts_card_moved() {
        let state = test_state();
        let mut rx = state.ws_tx.subscribe();
        let id = first_id(&state, "estimates").await;

        let response = app(&state)
            .oneshot(post_json(
                "/api/admin/workflow/move/",
                serde_json::json!({"cardId": id.to_string(), "targetColumn": "in_progress", "targetIndex": 0}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response.into_body()).await,
            serde_json::json!({"success": true})
        );

        let pushed: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(pushed, serde_json::json!({"type": "card_moved", "success": true}));

        // Cache was invalidated: the board reflects the move.
        assert_eq!(first_id(&state, "in_progress").await, id);
    }

    #[tokio::test]
    async fn test_move_out_of_completed_rejected_with_message() {
        let state = test_state();
        let id = first_id(&state, "completed").await;

        let response = app(&state)
            .oneshot(post_json(
                "/api/admin/workflow/move/",
                serde_json::json!({"cardId": id, "targetColumn": "estimates", "targetIndex": 0}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response.into_body()).await;
        assert_eq!(body["success"], false);
        assert!(
            body["error"]
                .as_str()
                .unwrap()
                .starts_with("Items in the completed column cannot be moved back")
        );
    }

    #[tokio::test]
    async fn test_move_invalid_column() {
        let state = test_state();
        let response = app(&state)
            .oneshot(post_json(
                "/api/admin/workflow/move/",
                serde_json::json!({"cardId": 1, "targetColumn": "archived", "targetIndex": 0}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response.into_body()).await;
        assert!(body["error"].as_str().unwrap().contains("archived"));
    }

    #[tokio::test]
    async fn test_move_negative_index_and_missing_fields() {
        let state = test_state();
        let response = app(&state)
            .oneshot(post_json(
                "/api/admin/workflow/move/",
                serde_json::json!({"cardId": 1, "targetColumn": "estimates", "targetIndex": -1}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app(&state)
            .oneshot(post_json(
                "/api/admin/workflow/move/",
                serde_json::json!({"cardId": 1}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response.into_body()).await["success"], false);
    }

    #[tokio::test]
    async fn test_move_unknown_card_is_not_found() {
        let state = test_state();
        let response = app(&state)
            .oneshot(post_json(
                "/api/admin/workflow/move/",
                serde_json::json!({"cardId": 9999, "targetColumn": "estimates", "targetIndex": 0}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_create_request_flow_broadcasts_board_update() {
        let state = test_state();
        let mut rx = state.ws_tx.subscribe();

        let resp = app(&state)
            .oneshot(post_json(
                "/api/customers",
                serde_json::json!({"first_name": "Lin", "last_name": "Ho", "email": "lin@example.com", "phone": "555-0199"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let customer_id = body_json(resp.into_body()).await["id"].as_i64().unwrap();

        let resp = app(&state)
            .oneshot(post_json(
                "/api/vehicles",
                serde_json::json!({"year": 2020, "make": "Kia", "model": "Soul", "customer_id": customer_id}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let vehicle_id = body_json(resp.into_body()).await["id"].as_i64().unwrap();

        let resp = app(&state)
            .oneshot(post_json(
                "/api/service-requests",
                serde_json::json!({
                    "customer_id": customer_id,
                    "vehicle_id": vehicle_id,
                    "appointment_date": "2024-06-03",
                    "appointment_time": "11:00"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let created = body_json(resp.into_body()).await;
        assert_eq!(created["status"], "pending");
        assert_eq!(created["workflow_column"], "estimates");

        let pushed: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(pushed["type"], "board_update");
        let ids: Vec<i64> = pushed["data"]["columns"]["estimates"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["id"].as_i64().unwrap())
            .collect();
        assert!(ids.contains(&created["id"].as_i64().unwrap()));
    }

    #[tokio::test]
    async fn test_create_request_for_unknown_customer() {
        let state = test_state();
        let resp = app(&state)
            .oneshot(post_json(
                "/api/service-requests",
                serde_json::json!({
                    "customer_id": 777,
                    "vehicle_id": 1,
                    "appointment_date": "2024-06-03",
                    "appointment_time": "11:00"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_get_and_delete_service_request() {
        let state = test_state();
        let id = first_id(&state, "estimates").await;

        let resp = app(&state)
            .oneshot(get_req(&format!("/api/service-requests/{}", id)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let delete = Request::builder()
            .method("DELETE")
            .uri(format!("/api/service-requests/{}", id))
            .body(Body::empty())
            .unwrap();
        let resp = app(&state).oneshot(delete).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);

        let resp = app(&state)
            .oneshot(get_req(&format!("/api/service-requests/{}", id)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_pending_count() {
        let state = test_state();
        let resp = app(&state)
            .oneshot(get_req("/api/service-requests/pending/count"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp.into_body()).await["count"], 5);
    }

    #[test]
    fn test_api_error_from_shop_errors() {
        let err: ApiError = anyhow::Error::from(ShopError::VehicleNotFound { id: 3 }).into();
        assert!(matches!(err, ApiError::NotFound(_)));
        let err: ApiError = anyhow::Error::from(ShopError::BadRequest("x".into())).into();
        assert!(matches!(err, ApiError::BadRequest(_)));
        let err: ApiError = anyhow::anyhow!("disk on fire").into();
        assert!(matches!(err, ApiError::Internal(_)));
    }

    fn today() -> String {
        chrono::Utc::now().format("%Y-%m-%d").to_string()
    }

    async fn create_request_today(state: &SharedState, time: &str) -> Value {
        let id = first_id(state, "estimates").await;
        let existing = state
            .db
            .call(move |db| db.get_service_request(id))
            .await
            .unwrap()
            .unwrap();
        let resp = app(state)
            .oneshot(post_json(
                "/api/service-requests",
                serde_json::json!({
                    "customer_id": existing.customer_id,
                    "vehicle_id": existing.vehicle_id,
                    "appointment_date": today(),
                    "appointment_time": time
                }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        body_json(resp.into_body()).await
    }

    async fn today_times(state: &SharedState) -> Vec<String> {
        let resp = app(state)
            .oneshot(get_req("/api/service-requests/today"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        body_json(resp.into_body())
            .await
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["appointment_time"].as_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_today_lists_requests_by_appointment_time() {
        let state = test_state();
        assert_eq!(
            today_times(&state).await,
            vec!["09:30", "10:00", "11:00", "13:00", "15:30"]
        );
    }

    #[tokio::test]
    async fn test_today_cache_invalidated_on_create() {
        let state = test_state();
        assert_eq!(today_times(&state).await.len(), 5);
        assert!(state.today_cache.get().is_some());

        create_request_today(&state, "08:10").await;
        let times = today_times(&state).await;
        assert_eq!(times.len(), 6);
        assert_eq!(times[0], "08:10");
    }

    #[tokio::test]
    async fn test_create_request_pushes_appointment_state() {
        let state = test_state();
        let mut rx = state.appointments_tx.subscribe();

        create_request_today(&state, "12:00").await;

        let first: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(first, serde_json::json!({"type": "pending_count", "count": 6}));
        let second: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(second["type"], "today_appointments");
        let times: Vec<_> = second["appointments"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["appointment_time"].as_str().unwrap())
            .collect();
        assert_eq!(times, vec!["09:30", "10:00", "11:00", "12:00", "13:00", "15:30"]);
    }

    #[tokio::test]
    async fn test_move_pushes_updated_pending_count() {
        let state = test_state();
        let mut rx = state.appointments_tx.subscribe();
        let id = first_id(&state, "estimates").await;

        let response = app(&state)
            .oneshot(post_json(
                "/api/admin/workflow/move/",
                serde_json::json!({"cardId": id.to_string(), "targetColumn": "in_progress", "targetIndex": 0}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let pushed: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(pushed, serde_json::json!({"type": "pending_count", "count": 4}));
        let pushed: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        let moved = pushed["appointments"]
            .as_array()
            .unwrap()
            .iter()
            .find(|r| r["id"] == id)
            .cloned()
            .unwrap();
        assert_eq!(moved["status"], "in_progress");
    }

    #[tokio::test]
    async fn test_delete_pushes_appointment_state() {
        let state = test_state();
        let mut rx = state.appointments_tx.subscribe();
        let id = first_id(&state, "estimates").await;

        let delete = Request::builder()
            .method("DELETE")
            .uri(format!("/api/service-requests/{}", id))
            .body(Body::empty())
            .unwrap();
        let resp = app(&state).oneshot(delete).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);

        let pushed: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(pushed["count"], 4);
        let pushed: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(pushed["appointments"].as_array().unwrap().len(), 4);
        assert_eq!(today_times(&state).await.len(), 4);
    }
}
