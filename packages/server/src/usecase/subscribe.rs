//! UseCase: イベントストリームの購読と切断
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - ゲームチャネル / ユーザーチャネルへの購読と切断
//!
//! ### どのような状況を想定しているか
//! - 正常系：購読直後に CONNECTION_STATUS と GAME_STATE が届き、在席が通知される
//! - 異常系：存在しないゲーム、他人のユーザーチャネル
//! - エッジケース：追い出された古い接続の切断では離席を通知しない

use std::sync::Arc;

use checkers_shared::{
    protocol::{
        Envelope, EventType,
        events::{ConnectionStatusPayload, PresencePayload},
    },
    time::Clock,
};

use crate::domain::{
    AddOptions, ClientId, ConnectionId, ConnectionMetadata, EventHub, EventPublisher, EventSink,
    GameId, GameRepository, GroupKey, Namespace, UserId,
};

use super::{error::SubscribeError, event::publish};

/// 登録済みの購読。切断時に `disconnect` へ渡す。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionHandle {
    pub group: GroupKey,
    pub client_id: ClientId,
    pub connection_id: ConnectionId,
    pub user_id: UserId,
}

/// 購読のユースケース
pub struct SubscribeUseCase {
    repository: Arc<dyn GameRepository>,
    /// EventHub（接続レジストリの抽象化）
    hub: Arc<dyn EventHub>,
    publisher: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
}

impl SubscribeUseCase {
    pub fn new(
        repository: Arc<dyn GameRepository>,
        hub: Arc<dyn EventHub>,
        publisher: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repository,
            hub,
            publisher,
            clock,
        }
    }

    /// `game:<id>` を購読する。同じユーザーの他タブの接続は追い出される。
    pub async fn subscribe_game(
        &self,
        game_id: GameId,
        user: UserId,
        client_id: ClientId,
        sink: EventSink,
    ) -> Result<SubscriptionHandle, SubscribeError> {
        // 存在確認
        self.repository.get(&game_id).await?;

        let metadata = ConnectionMetadata {
            user_id: Some(user.clone()),
            game_id: Some(game_id),
        };
        let handle = self
            .register(
                GroupKey::game(&game_id),
                user,
                client_id,
                sink,
                metadata,
                AddOptions {
                    enforce_single_client: true,
                },
            )
            .await;

        // 登録後に取得した状態を送るので、以降の GAME_MOVE を取りこぼさない
        let session = self.repository.get(&game_id).await?;
        let now = self.clock.now_millis();
        match Envelope::with_payload(EventType::GameState, &session.to_snapshot(), now) {
            Ok(envelope) => {
                self.hub
                    .send_to(&handle.group, &handle.client_id, &envelope)
                    .await;
            }
            Err(e) => tracing::error!("Failed to serialize game snapshot: {}", e),
        }

        self.publish_presence(&handle, game_id, true);
        Ok(handle)
    }

    /// `user:<id>` を購読する。自分のチャネルのみ購読できる。
    pub async fn subscribe_user(
        &self,
        target: UserId,
        user: UserId,
        client_id: ClientId,
        sink: EventSink,
    ) -> Result<SubscriptionHandle, SubscribeError> {
        if target != user {
            return Err(SubscribeError::Forbidden {
                requester: user.to_string(),
                target: target.to_string(),
            });
        }

        let metadata = ConnectionMetadata {
            user_id: Some(user.clone()),
            game_id: None,
        };
        Ok(self
            .register(
                GroupKey::user(&target),
                user,
                client_id,
                sink,
                metadata,
                AddOptions::default(),
            )
            .await)
    }

    /// 購読を解除する
    ///
    /// 既に置き換えられた接続の場合は何もしない。ゲームチャネルで
    /// そのユーザーの接続が無くなったら離席を通知する。
    pub async fn disconnect(&self, handle: &SubscriptionHandle) {
        let removed = self
            .hub
            .remove_connection(&handle.group, &handle.client_id, Some(handle.connection_id))
            .await;
        if !removed {
            return;
        }
        tracing::info!(
            "'{}' ({}) unsubscribed from {}",
            handle.user_id,
            handle.client_id,
            handle.group
        );

        if handle.group.namespace != Namespace::Game {
            return;
        }
        let still_present = self
            .hub
            .connections_in(&handle.group)
            .await
            .iter()
            .any(|c| c.metadata.user_id.as_ref() == Some(&handle.user_id));
        if still_present {
            return;
        }
        if let Ok(game_id) = handle.group.key.parse::<GameId>() {
            self.publish_presence(handle, game_id, false);
        }
    }

    async fn register(
        &self,
        group: GroupKey,
        user: UserId,
        client_id: ClientId,
        sink: EventSink,
        metadata: ConnectionMetadata,
        options: AddOptions,
    ) -> SubscriptionHandle {
        let connection_id = self
            .hub
            .add_connection(group.clone(), client_id.clone(), sink, metadata, options)
            .await;

        let status = ConnectionStatusPayload {
            connection_id: connection_id.as_uuid(),
            group: group.to_string(),
            client_id: client_id.to_string(),
            status: "connected".to_string(),
        };
        match Envelope::with_payload(EventType::ConnectionStatus, &status, self.clock.now_millis()) {
            Ok(envelope) => {
                self.hub.send_to(&group, &client_id, &envelope).await;
            }
            Err(e) => tracing::error!("Failed to serialize connection status: {}", e),
        }
        tracing::info!("'{}' ({}) subscribed to {}", user, client_id, group);

        SubscriptionHandle {
            group,
            client_id,
            connection_id,
            user_id: user,
        }
    }

    fn publish_presence(&self, handle: &SubscriptionHandle, game_id: GameId, online: bool) {
        let payload = PresencePayload {
            user_id: handle.user_id.to_string(),
            game_id: Some(game_id.as_uuid()),
            online,
        };
        publish(
            self.publisher.as_ref(),
            &handle.group,
            EventType::PresenceUpdate,
            &payload,
            self.clock.now_millis(),
        );
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        infrastructure::{hub::InMemoryEventHub, repository::InMemoryGameRepository},
        usecase::test_support::{RecordingPublisher, clock, seed_active_game, user},
    };
    use checkers_shared::protocol::api::GameSnapshot;
    use tokio::sync::mpsc;

    struct Fixture {
        usecase: SubscribeUseCase,
        repository: Arc<InMemoryGameRepository>,
        hub: Arc<InMemoryEventHub>,
        publisher: Arc<RecordingPublisher>,
    }

    fn create_fixture() -> Fixture {
        let repository = Arc::new(InMemoryGameRepository::new());
        let hub = Arc::new(InMemoryEventHub::new(clock(), Duration::from_secs(60)));
        let publisher = Arc::new(RecordingPublisher::default());
        let usecase = SubscribeUseCase::new(
            repository.clone(),
            hub.clone(),
            publisher.clone(),
            clock(),
        );
        Fixture {
            usecase,
            repository,
            hub,
            publisher,
        }
    }

    fn tab(id: &str) -> ClientId {
        ClientId::new(id.to_string()).unwrap()
    }

    #[tokio::test]
    async fn test_subscribe_game_sends_status_then_snapshot() {
        // テスト項目: 購読直後に CONNECTION_STATUS と GAME_STATE がこの順で届き、在席が発行される
        // given (前提条件):
        let fixture = create_fixture();
        let game = seed_active_game(&fixture.repository).await;
        let (tx, mut rx) = mpsc::unbounded_channel();

        // when (操作):
        let handle = fixture
            .usecase
            .subscribe_game(game.id, user("alice"), tab("tab-a"), tx)
            .await
            .unwrap();

        // then (期待する結果):
        let status = Envelope::from_json(&rx.recv().await.unwrap()).unwrap();
        let state = Envelope::from_json(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(status.r#type, EventType::ConnectionStatus);
        assert_eq!(state.r#type, EventType::GameState);
        let snapshot: GameSnapshot = state.payload_as().unwrap();
        assert_eq!(snapshot.version, game.version);
        assert_eq!(handle.group, GroupKey::game(&game.id));
        assert_eq!(
            fixture.publisher.types_on(&handle.group),
            vec![EventType::PresenceUpdate]
        );
    }

    #[tokio::test]
    async fn test_subscribe_missing_game_registers_nothing() {
        // テスト項目: 存在しないゲームは購読できず、Hub に何も登録されない
        // given (前提条件):
        let fixture = create_fixture();
        let (tx, _rx) = mpsc::unbounded_channel();
        let game_id = GameId::generate();

        // when (操作):
        let result = fixture
            .usecase
            .subscribe_game(game_id, user("alice"), tab("tab-a"), tx)
            .await;

        // then (期待する結果):
        assert_eq!(result, Err(SubscribeError::GameNotFound(game_id.to_string())));
        assert_eq!(fixture.hub.stats().await.total_connections, 0);
    }

    #[tokio::test]
    async fn test_subscribe_other_users_channel_is_forbidden() {
        // テスト項目: 他人のユーザーチャネルは購読できない
        // given (前提条件):
        let fixture = create_fixture();
        let (tx, _rx) = mpsc::unbounded_channel();

        // when (操作):
        let result = fixture
            .usecase
            .subscribe_user(user("bob"), user("alice"), tab("tab-a"), tx)
            .await;

        // then (期待する結果):
        assert!(matches!(result, Err(SubscribeError::Forbidden { .. })));
    }

    #[tokio::test]
    async fn test_disconnect_publishes_offline() {
        // テスト項目: 最後の接続が切れると離席が発行される
        // given (前提条件):
        let fixture = create_fixture();
        let game = seed_active_game(&fixture.repository).await;
        let (tx, _rx) = mpsc::unbounded_channel();
        let handle = fixture
            .usecase
            .subscribe_game(game.id, user("alice"), tab("tab-a"), tx)
            .await
            .unwrap();

        // when (操作):
        fixture.usecase.disconnect(&handle).await;

        // then (期待する結果):
        let presence: Vec<PresencePayload> = fixture
            .publisher
            .events()
            .iter()
            .map(|(_, e)| e.payload_as().unwrap())
            .collect();
        assert_eq!(presence.len(), 2);
        assert!(presence[0].online);
        assert!(!presence[1].online);
        assert_eq!(fixture.hub.stats().await.total_connections, 0);
    }

    #[tokio::test]
    async fn test_disconnect_of_evicted_tab_keeps_presence() {
        // テスト項目: 別タブに追い出された接続の切断では離席を発行せず、新しい接続も残る
        // given (前提条件):
        let fixture = create_fixture();
        let game = seed_active_game(&fixture.repository).await;
        let (tx_a, _rx_a) = mpsc::unbounded_channel();
        let (tx_b, _rx_b) = mpsc::unbounded_channel();
        let first = fixture
            .usecase
            .subscribe_game(game.id, user("alice"), tab("tab-a"), tx_a)
            .await
            .unwrap();
        fixture
            .usecase
            .subscribe_game(game.id, user("alice"), tab("tab-b"), tx_b)
            .await
            .unwrap();

        // when (操作):
        fixture.usecase.disconnect(&first).await;

        // then (期待する結果):
        let connections = fixture.hub.connections_in(&first.group).await;
        assert_eq!(connections.len(), 1);
        assert_eq!(connections[0].client_id, tab("tab-b"));
        let offline = fixture
            .publisher
            .events()
            .iter()
            .filter(|(_, e)| !e.payload_as::<PresencePayload>().unwrap().online)
            .count();
        assert_eq!(offline, 0);
    }
}
