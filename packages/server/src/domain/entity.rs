//! Game session entity.
//!
//! All transitions are pure: they take `&self` and return the next session.
//! Persisting the result is the repository's job and is guarded by a
//! compare-and-set on `version`.

use checkers_shared::{
    game::{Board, Move, MoveOutcome, Player, apply_move},
    protocol::api::{GameSnapshot, GameStatus, NewGameState},
};

use super::{
    error::DomainError,
    value_object::{GameId, UserId},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameSession {
    pub id: GameId,
    pub board: Board,
    pub current_player: Player,
    pub move_count: u32,
    pub winner: Option<Player>,
    pub status: GameStatus,
    /// Starts at 0, incremented exactly once per accepted move.
    pub version: u64,
    pub red_player: UserId,
    pub black_player: Option<UserId>,
    pub draw_offered_by: Option<UserId>,
    /// 書き込みごとに 1 増えるリビジョン。リポジトリの競合検出に使う。
    pub revision: u64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// An accepted move and the session it produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMove {
    pub session: GameSession,
    pub player: Player,
    pub outcome: MoveOutcome,
}

impl GameSession {
    /// New game in `Waiting`, with the creator playing red.
    pub fn new(id: GameId, creator: UserId, now: i64) -> Self {
        Self {
            id,
            board: Board::initial(),
            current_player: Player::Red,
            move_count: 0,
            winner: None,
            status: GameStatus::Waiting,
            version: 0,
            red_player: creator,
            black_player: None,
            draw_offered_by: None,
            revision: 0,
            created_at: now,
            updated_at: now,
        }
    }

    fn successor(&self, now: i64) -> GameSession {
        let mut next = self.clone();
        next.revision += 1;
        next.updated_at = now;
        next
    }

    pub fn color_of(&self, user: &UserId) -> Option<Player> {
        if &self.red_player == user {
            Some(Player::Red)
        } else if self.black_player.as_ref() == Some(user) {
            Some(Player::Black)
        } else {
            None
        }
    }

    pub fn player_of(&self, color: Player) -> Option<&UserId> {
        match color {
            Player::Red => Some(&self.red_player),
            Player::Black => self.black_player.as_ref(),
        }
    }

    /// Opponent of `user`, if seated.
    pub fn opponent_of(&self, user: &UserId) -> Option<&UserId> {
        self.color_of(user)
            .and_then(|color| self.player_of(color.opponent()))
    }

    pub fn players(&self) -> Vec<UserId> {
        std::iter::once(self.red_player.clone())
            .chain(self.black_player.clone())
            .collect()
    }

    /// Second player takes black; the game becomes active.
    pub fn join(&self, user: UserId, now: i64) -> Result<GameSession, DomainError> {
        if self.color_of(&user).is_some() {
            return Err(DomainError::AlreadyJoined);
        }
        if self.black_player.is_some() || self.status != GameStatus::Waiting {
            return Err(DomainError::GameFull);
        }
        let mut next = self.successor(now);
        next.black_player = Some(user);
        next.status = GameStatus::Active;
        Ok(next)
    }

    /// Apply `mv` for `user` under the version check.
    ///
    /// A move is accepted iff `expected_version == self.version`.
    pub fn play(
        &self,
        user: &UserId,
        mv: Move,
        expected_version: u64,
        now: i64,
    ) -> Result<AppliedMove, DomainError> {
        if expected_version != self.version {
            return Err(DomainError::VersionConflict {
                expected: expected_version,
                current: self.version,
            });
        }
        if self.status != GameStatus::Active {
            return Err(DomainError::GameNotActive);
        }
        let player = self.color_of(user).ok_or(DomainError::NotAPlayer)?;
        if player != self.current_player {
            return Err(DomainError::NotYourTurn);
        }

        let outcome = apply_move(&self.board, player, mv)?;

        let mut next = self.successor(now);
        next.board = outcome.board.clone();
        next.current_player = outcome.next_player;
        next.move_count += 1;
        next.version += 1;
        next.draw_offered_by = None;
        if let Some(winner) = outcome.winner {
            next.winner = Some(winner);
            next.status = GameStatus::Completed;
        }

        Ok(AppliedMove {
            session: next,
            player,
            outcome,
        })
    }

    /// `user` resigns; the opponent wins.
    pub fn resign(&self, user: &UserId, now: i64) -> Result<GameSession, DomainError> {
        if self.status != GameStatus::Active {
            return Err(DomainError::GameNotActive);
        }
        let player = self.color_of(user).ok_or(DomainError::NotAPlayer)?;
        let mut next = self.successor(now);
        next.winner = Some(player.opponent());
        next.status = GameStatus::Completed;
        next.draw_offered_by = None;
        next.version += 1;
        Ok(next)
    }

    pub fn offer_draw(&self, user: &UserId, now: i64) -> Result<GameSession, DomainError> {
        if self.status != GameStatus::Active {
            return Err(DomainError::GameNotActive);
        }
        self.color_of(user).ok_or(DomainError::NotAPlayer)?;
        let mut next = self.successor(now);
        next.draw_offered_by = Some(user.clone());
        Ok(next)
    }

    /// Answer the opponent's pending draw offer. Accepting completes the game
    /// without a winner.
    pub fn answer_draw(
        &self,
        user: &UserId,
        accept: bool,
        now: i64,
    ) -> Result<GameSession, DomainError> {
        if self.status != GameStatus::Active {
            return Err(DomainError::GameNotActive);
        }
        self.color_of(user).ok_or(DomainError::NotAPlayer)?;
        match &self.draw_offered_by {
            Some(offerer) if offerer != user => {}
            _ => return Err(DomainError::NoDrawOffer),
        }
        let mut next = self.successor(now);
        next.draw_offered_by = None;
        if accept {
            next.status = GameStatus::Completed;
            next.winner = None;
            next.version += 1;
        }
        Ok(next)
    }

    pub fn to_snapshot(&self) -> GameSnapshot {
        GameSnapshot {
            game_id: self.id.as_uuid(),
            version: self.version,
            board: self.board.clone(),
            current_player: self.current_player,
            move_count: self.move_count,
            winner: self.winner,
            status: self.status,
            red_player: Some(self.red_player.as_str().to_string()),
            black_player: self
                .black_player
                .as_ref()
                .map(|u| u.as_str().to_string()),
            draw_offered_by: self
                .draw_offered_by
                .as_ref()
                .map(|u| u.as_str().to_string()),
        }
    }

    pub fn to_new_state(&self) -> NewGameState {
        NewGameState {
            version: self.version,
            board: self.board.clone(),
            current_player: self.current_player,
            winner: self.winner,
            move_count: self.move_count,
            status: self.status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(name: &str) -> UserId {
        UserId::new(name.to_string()).unwrap()
    }

    fn active_game() -> GameSession {
        GameSession::new(GameId::generate(), user("alice"), 0)
            .join(user("bob"), 1)
            .unwrap()
    }

    #[test]
    fn test_join_activates_game() {
        // テスト項目: 2 人目が参加するとゲームがアクティブになる
        // given (前提条件):
        let game = GameSession::new(GameId::generate(), user("alice"), 0);

        // when (操作):
        let joined = game.join(user("bob"), 1).unwrap();

        // then (期待する結果):
        assert_eq!(joined.status, GameStatus::Active);
        assert_eq!(joined.color_of(&user("bob")), Some(Player::Black));
        assert_eq!(joined.version, 0);
    }

    #[test]
    fn test_join_twice_is_rejected() {
        // テスト項目: 作成者自身は参加できず、3 人目も参加できない
        // given (前提条件):
        let game = active_game();

        // when (操作):
        let creator = game.join(user("alice"), 2);
        let third = game.join(user("carol"), 2);

        // then (期待する結果):
        assert_eq!(creator, Err(DomainError::AlreadyJoined));
        assert_eq!(third, Err(DomainError::GameFull));
    }

    #[test]
    fn test_sequence_of_correct_versions_increments_by_one() {
        // テスト項目: 正しい期待バージョンの手は全て受理され、1 手ごとに 1 増える
        // given (前提条件):
        let mut game = active_game();
        let moves = [
            ("alice", "c3-d4"),
            ("bob", "f6-e5"),
            ("alice", "g3-h4"),
            ("bob", "b6-a5"),
        ];

        // when (操作) / then (期待する結果):
        for (i, (who, mv)) in moves.iter().enumerate() {
            let applied = game
                .play(&user(who), mv.parse().unwrap(), i as u64, 10)
                .unwrap();
            assert_eq!(applied.session.version, i as u64 + 1);
            game = applied.session;
        }
        assert_eq!(game.move_count, 4);
    }

    #[test]
    fn test_stale_version_is_rejected_without_change() {
        // テスト項目: 期待バージョンが古い手は拒否され、バージョンは変わらない
        // given (前提条件):
        let game = active_game()
            .play(&user("alice"), "c3-d4".parse().unwrap(), 0, 10)
            .unwrap()
            .session;

        // when (操作):
        let result = game.play(&user("bob"), "f6-e5".parse().unwrap(), 0, 11);

        // then (期待する結果):
        assert_eq!(
            result,
            Err(DomainError::VersionConflict {
                expected: 0,
                current: 1
            })
        );
        assert_eq!(game.version, 1);
    }

    #[test]
    fn test_wrong_turn_is_rejected() {
        // テスト項目: 手番でないプレイヤーの手は拒否される
        // given (前提条件):
        let game = active_game();

        // when (操作):
        let result = game.play(&user("bob"), "f6-e5".parse().unwrap(), 0, 10);

        // then (期待する結果):
        assert_eq!(result, Err(DomainError::NotYourTurn));
    }

    #[test]
    fn test_resign_gives_win_to_opponent() {
        // テスト項目: 投了すると相手の勝ちになりバージョンが進む
        // given (前提条件):
        let game = active_game();

        // when (操作):
        let resigned = game.resign(&user("alice"), 5).unwrap();

        // then (期待する結果):
        assert_eq!(resigned.winner, Some(Player::Black));
        assert_eq!(resigned.status, GameStatus::Completed);
        assert_eq!(resigned.version, 1);
    }

    #[test]
    fn test_draw_offer_and_accept() {
        // テスト項目: 引き分け提案を相手が受諾すると勝者なしで終了する
        // given (前提条件):
        let game = active_game().offer_draw(&user("alice"), 3).unwrap();

        // when (操作):
        let self_answer = game.answer_draw(&user("alice"), true, 4);
        let accepted = game.answer_draw(&user("bob"), true, 4).unwrap();

        // then (期待する結果):
        assert_eq!(self_answer, Err(DomainError::NoDrawOffer));
        assert_eq!(accepted.status, GameStatus::Completed);
        assert_eq!(accepted.winner, None);
    }
}
