//! UseCase: 引き分けの提案と応答

use std::sync::Arc;

use checkers_shared::{
    protocol::{
        EventType,
        api::DrawAction,
        events::{
            DrawRequestPayload, DrawResponsePayload, GameOverPayload, GameOverReason,
            NotificationKind,
        },
    },
    time::Clock,
};

use crate::domain::{EventPublisher, GameId, GameRepository, GameSession, GroupKey, UserId};

use super::{
    error::GameError,
    event::{notify, publish},
};

/// 引き分けのユースケース
///
/// - `Offer`: DRAW_REQUEST を発行し、相手に通知する
/// - `Accept` / `Decline`: DRAW_RESPONSE を発行する。受諾ならゲームは勝者なしで終了する
pub struct RespondDrawUseCase {
    repository: Arc<dyn GameRepository>,
    publisher: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
}

impl RespondDrawUseCase {
    pub fn new(
        repository: Arc<dyn GameRepository>,
        publisher: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repository,
            publisher,
            clock,
        }
    }

    pub async fn execute(
        &self,
        game_id: GameId,
        user: UserId,
        action: DrawAction,
    ) -> Result<GameSession, GameError> {
        let now = self.clock.now_millis();
        let session = self.repository.get(&game_id).await?;
        let next = match action {
            DrawAction::Offer => session.offer_draw(&user, now)?,
            DrawAction::Accept => session.answer_draw(&user, true, now)?,
            DrawAction::Decline => session.answer_draw(&user, false, now)?,
        };
        self.repository
            .save_if_version(next.clone(), session.version)
            .await?;
        tracing::info!("Game {}: '{}' {:?} draw", game_id, user, action);

        let channel = GroupKey::game(&game_id);
        match action {
            DrawAction::Offer => {
                let payload = DrawRequestPayload {
                    game_id: game_id.as_uuid(),
                    from_user: user.to_string(),
                };
                publish(
                    self.publisher.as_ref(),
                    &channel,
                    EventType::DrawRequest,
                    &payload,
                    now,
                );
                if let Some(opponent) = next.opponent_of(&user) {
                    notify(
                        self.publisher.as_ref(),
                        opponent,
                        NotificationKind::DrawOffered,
                        format!("{} offered a draw", user),
                        Some(game_id),
                        now,
                    );
                }
            }
            DrawAction::Accept | DrawAction::Decline => {
                let accepted = action == DrawAction::Accept;
                let payload = DrawResponsePayload {
                    game_id: game_id.as_uuid(),
                    from_user: user.to_string(),
                    accepted,
                };
                publish(
                    self.publisher.as_ref(),
                    &channel,
                    EventType::DrawResponse,
                    &payload,
                    now,
                );
                if accepted {
                    let game_over = GameOverPayload {
                        game_id: game_id.as_uuid(),
                        winner: None,
                        reason: GameOverReason::DrawAgreed,
                        version: next.version,
                    };
                    publish(
                        self.publisher.as_ref(),
                        &channel,
                        EventType::GameOver,
                        &game_over,
                        now,
                    );
                }
            }
        }

        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::DomainError,
        infrastructure::repository::InMemoryGameRepository,
        usecase::test_support::{RecordingPublisher, clock, seed_active_game, user},
    };
    use checkers_shared::protocol::api::GameStatus;

    fn create_usecase(
        repository: &Arc<InMemoryGameRepository>,
    ) -> (RespondDrawUseCase, Arc<RecordingPublisher>) {
        let publisher = Arc::new(RecordingPublisher::default());
        let usecase = RespondDrawUseCase::new(repository.clone(), publisher.clone(), clock());
        (usecase, publisher)
    }

    #[tokio::test]
    async fn test_offer_then_accept_ends_in_draw() {
        // テスト項目: 提案と受諾で DRAW_REQUEST / DRAW_RESPONSE / GAME_OVER が順に発行される
        // given (前提条件):
        let repository = Arc::new(InMemoryGameRepository::new());
        let game = seed_active_game(&repository).await;
        let (usecase, publisher) = create_usecase(&repository);

        // when (操作):
        usecase
            .execute(game.id, user("alice"), DrawAction::Offer)
            .await
            .unwrap();
        let finished = usecase
            .execute(game.id, user("bob"), DrawAction::Accept)
            .await
            .unwrap();

        // then (期待する結果):
        assert_eq!(finished.status, GameStatus::Completed);
        assert_eq!(finished.winner, None);
        assert_eq!(
            publisher.types_on(&GroupKey::game(&game.id)),
            vec![
                EventType::DrawRequest,
                EventType::DrawResponse,
                EventType::GameOver
            ]
        );
        assert_eq!(
            publisher.types_on(&GroupKey::user(&user("bob"))),
            vec![EventType::NotificationCreated]
        );
    }

    #[tokio::test]
    async fn test_decline_keeps_game_active() {
        // テスト項目: 拒否するとゲームは続行し、提案は取り消される
        // given (前提条件):
        let repository = Arc::new(InMemoryGameRepository::new());
        let game = seed_active_game(&repository).await;
        let (usecase, _publisher) = create_usecase(&repository);
        usecase
            .execute(game.id, user("alice"), DrawAction::Offer)
            .await
            .unwrap();

        // when (操作):
        let declined = usecase
            .execute(game.id, user("bob"), DrawAction::Decline)
            .await
            .unwrap();

        // then (期待する結果):
        assert_eq!(declined.status, GameStatus::Active);
        assert_eq!(declined.draw_offered_by, None);
        assert_eq!(declined.version, game.version);
    }

    #[tokio::test]
    async fn test_accept_without_offer_is_rejected() {
        // テスト項目: 提案がない状態での受諾は拒否される
        // given (前提条件):
        let repository = Arc::new(InMemoryGameRepository::new());
        let game = seed_active_game(&repository).await;
        let (usecase, _publisher) = create_usecase(&repository);

        // when (操作):
        let result = usecase
            .execute(game.id, user("bob"), DrawAction::Accept)
            .await;

        // then (期待する結果):
        assert_eq!(result, Err(GameError::Domain(DomainError::NoDrawOffer)));
    }
}
