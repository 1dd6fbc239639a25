//! Integration tests for the HTTP API and the server-sent event streams.
//!
//! Each test serves the router on an ephemeral port and drives it with
//! reqwest, reading the event streams frame by frame.

use std::{collections::VecDeque, time::Duration};

use checkers_server::{app::build_server, config::HubConfig};
use checkers_shared::protocol::{
    Envelope, EventType,
    api::{GameSnapshot, GameStatus, MoveRejection, MoveRequest, MoveResponse},
    events::GameMovePayload,
    sse::SseDecoder,
};
use reqwest::StatusCode;
use tokio::{net::TcpListener, sync::oneshot, task::JoinHandle};
use uuid::Uuid;

const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Helper struct to manage the in-process server lifecycle
struct TestServer {
    base_url: String,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl TestServer {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test listener");
        let addr = listener.local_addr().expect("Failed to read local addr");
        let (tx, rx) = oneshot::channel::<()>();

        let server = build_server(HubConfig::default());
        let handle = tokio::spawn(async move {
            let _ = server
                .serve(listener, async move {
                    let _ = rx.await;
                })
                .await;
        });

        TestServer {
            base_url: format!("http://{}", addr),
            shutdown: Some(tx),
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = tokio::time::timeout(READ_TIMEOUT, &mut self.handle).await;
    }
}

/// Reads envelopes off one event stream response
struct EventReader {
    response: reqwest::Response,
    decoder: SseDecoder,
    pending: VecDeque<Envelope>,
}

impl EventReader {
    async fn open(client: &reqwest::Client, url: String, user: &str) -> Self {
        let response = client
            .get(url)
            .header("x-user-id", user)
            .send()
            .await
            .expect("Failed to open event stream");
        assert_eq!(response.status(), StatusCode::OK);
        EventReader {
            response,
            decoder: SseDecoder::new(),
            pending: VecDeque::new(),
        }
    }

    /// Next envelope, or `None` once the server closed the stream.
    async fn next(&mut self) -> Option<Envelope> {
        loop {
            if let Some(envelope) = self.pending.pop_front() {
                return Some(envelope);
            }
            let chunk = tokio::time::timeout(READ_TIMEOUT, self.response.chunk())
                .await
                .expect("Timed out waiting for an event")
                .expect("Event stream failed")?;
            for data in self.decoder.push(&chunk) {
                self.pending
                    .push_back(Envelope::from_json(&data).expect("Invalid envelope"));
            }
        }
    }

    /// Skip envelopes until one of `event_type` arrives.
    async fn next_of(&mut self, event_type: EventType) -> Envelope {
        loop {
            let envelope = self.next().await.expect("Stream closed early");
            if envelope.r#type == event_type {
                return envelope;
            }
        }
    }
}

async fn create_active_game(server: &TestServer, client: &reqwest::Client) -> GameSnapshot {
    let created: GameSnapshot = client
        .post(server.url("/api/games"))
        .header("x-user-id", "alice")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    client
        .post(server.url(&format!("/api/games/{}/join", created.game_id)))
        .header("x-user-id", "bob")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

async fn submit_move(
    server: &TestServer,
    client: &reqwest::Client,
    game_id: Uuid,
    user: &str,
    mv: &str,
    expected_version: u64,
) -> (StatusCode, MoveResponse) {
    let request = MoveRequest {
        game_id,
        mv: mv.parse().unwrap(),
        expected_version,
        optimistic_id: Some(Uuid::new_v4()),
    };
    let response = client
        .post(server.url(&format!("/api/games/{}/moves", game_id)))
        .header("x-user-id", user)
        .json(&request)
        .send()
        .await
        .unwrap();
    let status = response.status();
    (status, response.json().await.unwrap())
}

#[tokio::test]
async fn test_health_check() {
    // テスト項目: ヘルスチェックが 200 を返す
    // given (前提条件):
    let server = TestServer::start().await;
    let client = reqwest::Client::new();

    // when (操作):
    let response = client.get(server.url("/api/health")).send().await.unwrap();

    // then (期待する結果):
    assert_eq!(response.status(), StatusCode::OK);
    server.stop().await;
}

#[tokio::test]
async fn test_requests_without_identity_are_rejected() {
    // テスト項目: ユーザー ID の無いゲーム作成は 401 になる
    // given (前提条件):
    let server = TestServer::start().await;
    let client = reqwest::Client::new();

    // when (操作):
    let response = client.post(server.url("/api/games")).send().await.unwrap();

    // then (期待する結果):
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    server.stop().await;
}

#[tokio::test]
async fn test_move_is_pushed_to_subscribers() {
    // テスト項目: 購読直後にスナップショットが届き、受理された手が GAME_MOVE として配信される
    // given (前提条件):
    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    let game = create_active_game(&server, &client).await;
    assert_eq!(game.status, GameStatus::Active);
    let mut bob = EventReader::open(
        &client,
        server.url(&format!("/api/events/games/{}?tab_id=tab-1", game.game_id)),
        "bob",
    )
    .await;
    let status = bob.next().await.unwrap();
    let state = bob.next().await.unwrap();
    assert_eq!(status.r#type, EventType::ConnectionStatus);
    assert_eq!(state.r#type, EventType::GameState);

    // when (操作):
    let (code, response) = submit_move(&server, &client, game.game_id, "alice", "c3-d4", 0).await;

    // then (期待する結果):
    assert_eq!(code, StatusCode::OK);
    assert!(response.success);
    assert_eq!(response.new_game_state.unwrap().version, 1);
    let pushed = bob.next_of(EventType::GameMove).await;
    let payload: GameMovePayload = pushed.payload_as().unwrap();
    assert_eq!(payload.version, 1);
    assert_eq!(payload.moved_by, "alice");
    assert!(pushed.sequence_number.is_some());
    server.stop().await;
}

#[tokio::test]
async fn test_stale_version_is_rejected_with_conflict() {
    // テスト項目: 古い expectedVersion の手は 409 と現在のバージョンで拒否される
    // given (前提条件):
    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    let game = create_active_game(&server, &client).await;
    submit_move(&server, &client, game.game_id, "alice", "c3-d4", 0).await;

    // when (操作):
    let (code, response) = submit_move(&server, &client, game.game_id, "bob", "f6-e5", 0).await;

    // then (期待する結果):
    assert_eq!(code, StatusCode::CONFLICT);
    assert!(!response.success);
    assert_eq!(response.reason, Some(MoveRejection::VersionConflict));
    assert_eq!(response.current_version, Some(1));
    server.stop().await;
}

#[tokio::test]
async fn test_out_of_turn_move_is_unprocessable() {
    // テスト項目: 手番でないプレイヤーの手は 422 で拒否される
    // given (前提条件):
    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    let game = create_active_game(&server, &client).await;

    // when (操作):
    let (code, response) = submit_move(&server, &client, game.game_id, "bob", "f6-e5", 0).await;

    // then (期待する結果):
    assert_eq!(code, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response.reason, Some(MoveRejection::NotYourTurn));
    server.stop().await;
}

#[tokio::test]
async fn test_off_board_move_body_is_refused() {
    // テスト項目: 盤外の座標を含む手は本文の時点で 422 になり、サーバーは動き続ける
    // given (前提条件):
    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    let game = create_active_game(&server, &client).await;
    let body = serde_json::json!({
        "gameId": game.game_id,
        "move": {"from": {"row": 9, "col": 0}, "to": {"row": 0, "col": 0}},
        "expectedVersion": 0,
    });

    // when (操作):
    let response = client
        .post(server.url(&format!("/api/games/{}/moves", game.game_id)))
        .header("x-user-id", "alice")
        .json(&body)
        .send()
        .await
        .unwrap();

    // then (期待する結果):
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let (code, accepted) = submit_move(&server, &client, game.game_id, "alice", "c3-d4", 0).await;
    assert_eq!(code, StatusCode::OK);
    assert!(accepted.success);
    server.stop().await;
}

#[tokio::test]
async fn test_second_tab_evicts_first() {
    // テスト項目: 同じユーザーが別タブで購読すると古いタブに connection_closed が届き、ストリームが閉じる
    // given (前提条件):
    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    let game = create_active_game(&server, &client).await;
    let stream_url = |tab: &str| {
        server.url(&format!(
            "/api/events/games/{}?tab_id={}",
            game.game_id, tab
        ))
    };
    let mut first = EventReader::open(&client, stream_url("tab-a"), "alice").await;
    first.next_of(EventType::GameState).await;

    // when (操作):
    let mut second = EventReader::open(&client, stream_url("tab-b"), "alice").await;

    // then (期待する結果):
    first.next_of(EventType::ConnectionClosed).await;
    let mut rest = Vec::new();
    while let Some(envelope) = first.next().await {
        rest.push(envelope.r#type);
    }
    assert!(!rest.contains(&EventType::GameState));
    assert_eq!(second.next().await.unwrap().r#type, EventType::ConnectionStatus);

    let stats: serde_json::Value = client
        .get(server.url("/debug/hub"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["totalConnections"], 1);
    server.stop().await;
}

#[tokio::test]
async fn test_user_channel_of_someone_else_is_forbidden() {
    // テスト項目: 他人のユーザーチャネルの購読は 403 になる
    // given (前提条件):
    let server = TestServer::start().await;
    let client = reqwest::Client::new();

    // when (操作):
    let response = client
        .get(server.url("/api/events/users/bob?tab_id=tab-1"))
        .header("x-user-id", "alice")
        .send()
        .await
        .unwrap();

    // then (期待する結果):
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    server.stop().await;
}

#[tokio::test]
async fn test_join_notification_reaches_user_channel() {
    // テスト項目: 対戦相手の参加がユーザーチャネルに通知される（クエリの user_id でも認証できる）
    // given (前提条件):
    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    let created: GameSnapshot = client
        .post(server.url("/api/games"))
        .header("x-user-id", "alice")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let response = client
        .get(server.url("/api/events/users/alice?tab_id=tab-1&user_id=alice"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let mut inbox = EventReader {
        response,
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
    };
    inbox.next_of(EventType::ConnectionStatus).await;

    // when (操作):
    client
        .post(server.url(&format!("/api/games/{}/join", created.game_id)))
        .header("x-user-id", "bob")
        .send()
        .await
        .unwrap();

    // then (期待する結果):
    let notification = inbox.next_of(EventType::NotificationCreated).await;
    assert_eq!(notification.payload.unwrap()["userId"], "alice");
    server.stop().await;
}
