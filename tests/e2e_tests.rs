//! End-to-end tests: a live shop server on an ephemeral port, the HTTP
//! board client, and the push socket.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::time::{Instant, timeout};
use tokio_tungstenite::tungstenite::Message;

use shopflow::errors::SyncError;
use shopflow::shop::cache::DEFAULT_TTL;
use shopflow::shop::db::ShopDb;
use shopflow::shop::server::{APPOINTMENTS_PATH, PUSH_PATH, build_router, build_state, serve};
use shopflow::workflow::payload::{PushMessage, parse_push_message};
use shopflow::workflow::push::{PushAction, PushListener, TransportEvent, WsTransport, push_url};
use shopflow::workflow::{
    BoardApi, BoardSession, CardId, ColumnId, DropOutcome, HttpBoardClient, LoadState,
};

const COMPLETED_LOCKED: &str = "Items in the completed column cannot be moved back to other columns. \
     This is to maintain the integrity of the workflow history.";

struct TestServer {
    base_url: String,
    _shutdown: oneshot::Sender<()>,
}

impl TestServer {
    /// Serve a freshly seeded in-memory shop.
    async fn start() -> Self {
        let db = ShopDb::new_in_memory().unwrap();
        db.seed_demo().unwrap();
        let router = build_router(build_state(db, DEFAULT_TTL), false);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel::<()>();
        tokio::spawn(serve(listener, router, async {
            let _ = rx.await;
        }));

        Self {
            base_url: format!("http://{}", addr),
            _shutdown: tx,
        }
    }

    fn client(&self) -> HttpBoardClient {
        HttpBoardClient::new(&self.base_url, Duration::from_secs(5)).unwrap()
    }

    fn push_url(&self) -> String {
        push_url(&self.base_url, PUSH_PATH)
    }

    async fn snapshot_json(&self) -> Value {
        reqwest::get(format!("{}/api/admin/workflow/board/", self.base_url))
            .await
            .unwrap()
            .json()
            .await
            .unwrap()
    }
}

/// First card id in `column` of the live board.
async fn first_in(api: &HttpBoardClient, column: ColumnId) -> CardId {
    let parsed = api.fetch_board().await.unwrap();
    parsed.board.column(column)[0].id.clone()
}

#[tokio::test]
async fn test_client_loads_seeded_board() {
    let server = TestServer::start().await;
    let parsed = server.client().fetch_board().await.unwrap();

    assert_eq!(parsed.dropped, 0);
    assert_eq!(parsed.board.card_count(), 5);
    assert_eq!(parsed.board.order(), &ColumnId::ALL);
    assert_eq!(parsed.board.column(ColumnId::Estimates).len(), 2);
    assert_eq!(parsed.board.column(ColumnId::Completed).len(), 1);

    let card = &parsed.board.column(ColumnId::Estimates)[0];
    assert_eq!(card.position, 0);
    assert!(!card.customer.display_name().is_empty());
}

#[tokio::test]
async fn test_drop_on_column_is_confirmed_by_backend() {
    let server = TestServer::start().await;
    let api = server.client();
    let card = first_in(&api, ColumnId::InProgress).await;

    let mut session = BoardSession::with_defaults(Arc::new(api.clone()));
    session.load().await.unwrap();
    assert_eq!(session.load_state(), &LoadState::Ready);

    let outcome = session.drop_card(card.as_str(), "completed").await;
    let DropOutcome::Confirmed(command) = outcome else {
        panic!("expected confirmed move, got {:?}", outcome);
    };
    assert_eq!(command.target_column, ColumnId::Completed);
    assert_eq!(command.target_index, 1);

    // Local projection and server agree.
    assert_eq!(
        session.board().find_card(&card),
        Some((ColumnId::Completed, 1))
    );
    let remote = api.fetch_board().await.unwrap().board;
    assert_eq!(remote.find_card(&card), Some((ColumnId::Completed, 1)));
    assert!(remote.column(ColumnId::InProgress).is_empty());
}

#[tokio::test]
async fn test_drop_before_card_reorders_within_column() {
    let server = TestServer::start().await;
    let api = server.client();
    let board = api.fetch_board().await.unwrap().board;
    let first = board.column(ColumnId::Estimates)[0].id.clone();
    let second = board.column(ColumnId::Estimates)[1].id.clone();

    let mut session = BoardSession::with_defaults(Arc::new(api.clone()));
    session.load().await.unwrap();
    let outcome = session.drop_card(second.as_str(), first.as_str()).await;
    assert!(matches!(outcome, DropOutcome::Confirmed(_)));

    let remote = api.fetch_board().await.unwrap().board;
    let ids: Vec<_> = remote
        .column(ColumnId::Estimates)
        .iter()
        .map(|c| c.id.clone())
        .collect();
    assert_eq!(ids, vec![second, first]);
}

#[tokio::test]
async fn test_rejected_move_shows_server_error_and_restores_board() {
    let server = TestServer::start().await;
    let api = server.client();
    let done = first_in(&api, ColumnId::Completed).await;

    let mut session = BoardSession::with_defaults(Arc::new(api));
    session.load().await.unwrap();

    let outcome = session.drop_card(done.as_str(), "estimates").await;
    let DropOutcome::Rejected { message, .. } = outcome else {
        panic!("expected rejected move, got {:?}", outcome);
    };
    assert_eq!(message, COMPLETED_LOCKED);
    assert_eq!(
        session.toasts().latest().map(|t| t.message.clone()),
        Some(COMPLETED_LOCKED.to_string())
    );
    // Compensating re-fetch put the card back.
    assert_eq!(
        session.board().find_card(&done),
        Some((ColumnId::Completed, 0))
    );
    assert_eq!(session.board().column(ColumnId::Estimates).len(), 2);
}

#[tokio::test]
async fn test_move_of_unknown_card_is_rejected() {
    let server = TestServer::start().await;
    let err = server
        .client()
        .move_card(&CardId::from(9999), ColumnId::Completed, 0)
        .await
        .unwrap_err();
    match err {
        SyncError::MoveRejected { message } => assert!(message.contains("9999")),
        other => panic!("expected MoveRejected, got {:?}", other),
    }
}

#[tokio::test]
async fn test_load_failure_leaves_session_failed() {
    let api = HttpBoardClient::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
    let mut session = BoardSession::with_defaults(Arc::new(api));

    assert!(session.load().await.is_err());
    assert!(matches!(session.load_state(), LoadState::Failed { .. }));
    assert_eq!(session.board().card_count(), 0);
}

#[tokio::test]
async fn test_move_broadcasts_card_moved() {
    let server = TestServer::start().await;
    let api = server.client();
    let card = first_in(&api, ColumnId::Estimates).await;

    let (mut ws, _) = tokio_tungstenite::connect_async(server.push_url())
        .await
        .unwrap();

    // The server subscribes just after the handshake; retry until the
    // subscription is live.
    let mut received = None;
    for _ in 0..20 {
        api.move_card(&card, ColumnId::InProgress, 0).await.unwrap();
        if let Ok(Some(Ok(Message::Text(text)))) =
            timeout(Duration::from_millis(250), ws.next()).await
        {
            received = Some(text.as_str().to_string());
            break;
        }
    }

    let text = received.expect("no push frame received");
    assert_eq!(
        parse_push_message(&text).unwrap(),
        PushMessage::CardMoved { success: true }
    );
}

#[tokio::test]
async fn test_new_request_pushes_board_update_through_transport() {
    let server = TestServer::start().await;
    let snapshot = server.snapshot_json().await;
    let existing = &snapshot["columns"]["estimates"][0];
    let body = json!({
        "customer_id": existing["customer"]["id"],
        "vehicle_id": existing["vehicle"]["id"],
        "appointment_date": "2026-11-02",
        "appointment_time": "09:00",
    });

    let (mut events, handle) = WsTransport::spawn(server.push_url(), Duration::from_millis(50));
    let connected = timeout(Duration::from_secs(5), events.recv()).await.unwrap();
    assert_eq!(connected, Some(TransportEvent::Connected));

    let http = reqwest::Client::new();
    let mut frame = None;
    for _ in 0..20 {
        let resp = http
            .post(format!("{}/api/service-requests", server.base_url))
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::CREATED);
        if let Ok(Some(TransportEvent::Message(text))) =
            timeout(Duration::from_millis(250), events.recv()).await
        {
            frame = Some(text);
            break;
        }
    }
    handle.abort();

    let text = frame.expect("no board_update received");
    let mut listener = PushListener::default();
    listener.handle(TransportEvent::Connected, Instant::now());
    match listener.handle(TransportEvent::Message(text), Instant::now()) {
        Some(PushAction::Replace(board)) => {
            assert!(board.card_count() >= 6);
            assert!(board.column(ColumnId::Estimates).len() >= 3);
        }
        other => panic!("expected Replace, got {:?}", other),
    }
}

#[tokio::test]
async fn test_move_pushes_pending_count_on_appointments_channel() {
    let server = TestServer::start().await;
    let api = server.client();
    let card = first_in(&api, ColumnId::Estimates).await;

    let url = push_url(&server.base_url, APPOINTMENTS_PATH);
    let (mut ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();

    // Bounce the card between two non-completed columns until the
    // subscription is live and a frame arrives.
    let mut received = None;
    for attempt in 0..20 {
        let column = if attempt % 2 == 0 {
            ColumnId::InProgress
        } else {
            ColumnId::Estimates
        };
        api.move_card(&card, column, 0).await.unwrap();
        if let Ok(Some(Ok(Message::Text(text)))) =
            timeout(Duration::from_millis(250), ws.next()).await
        {
            received = Some(text.as_str().to_string());
            break;
        }
    }

    // A frame from an earlier move may be the first one seen; read until
    // the count has been followed by today's list.
    let mut frame: Value = serde_json::from_str(&received.expect("no appointments frame")).unwrap();
    let mut pending = None;
    loop {
        match frame["type"].as_str() {
            Some("pending_count") => pending = frame["count"].as_i64(),
            Some("today_appointments") if pending.is_some() => break,
            _ => {}
        }
        let next = timeout(Duration::from_secs(2), ws.next()).await.unwrap();
        let Some(Ok(Message::Text(text))) = next else {
            panic!("expected an appointments frame, got {:?}", next);
        };
        frame = serde_json::from_str(text.as_str()).unwrap();
    }

    assert!(pending.unwrap() < 5);
    assert_eq!(frame["appointments"].as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn test_today_endpoint_orders_by_time() {
    let server = TestServer::start().await;
    let today: Value = reqwest::get(format!("{}/api/service-requests/today", server.base_url))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let times: Vec<_> = today
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["appointment_time"].as_str().unwrap().to_string())
        .collect();
    let mut sorted = times.clone();
    sorted.sort();
    assert_eq!(times.len(), 5);
    assert_eq!(times, sorted);
}
