//! UseCase テスト用の共通部品

use std::sync::{Arc, Mutex};

use checkers_shared::{
    protocol::{Envelope, EventType},
    time::FixedClock,
};

use crate::{
    domain::{EventPublisher, GameId, GameRepository, GameSession, GroupKey, UserId},
    infrastructure::repository::InMemoryGameRepository,
};

pub const NOW: i64 = 1_700_000_000_000;

/// 発行されたイベントを記録するだけの EventPublisher
#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<(GroupKey, Envelope)>>,
}

impl RecordingPublisher {
    pub fn events(&self) -> Vec<(GroupKey, Envelope)> {
        self.events.lock().unwrap().clone()
    }

    pub fn types_on(&self, channel: &GroupKey) -> Vec<EventType> {
        self.events()
            .into_iter()
            .filter(|(c, _)| c == channel)
            .map(|(_, e)| e.r#type)
            .collect()
    }
}

impl EventPublisher for RecordingPublisher {
    fn emit_to_user(&self, user_id: &UserId, envelope: Envelope) -> Envelope {
        self.emit_to_channel(&GroupKey::user(user_id), envelope)
    }

    fn emit_to_channel(&self, channel: &GroupKey, mut envelope: Envelope) -> Envelope {
        let mut events = self.events.lock().unwrap();
        envelope.sequence_number = Some(events.len() as u64 + 1);
        events.push((channel.clone(), envelope.clone()));
        envelope
    }
}

pub fn user(name: &str) -> UserId {
    UserId::new(name.to_string()).unwrap()
}

pub fn clock() -> Arc<FixedClock> {
    Arc::new(FixedClock::new(NOW))
}

/// alice（赤）と bob（黒）が着席済みのゲームを保存して返す
pub async fn seed_active_game(repository: &InMemoryGameRepository) -> GameSession {
    let game = GameSession::new(GameId::generate(), user("alice"), NOW);
    repository.create(game.clone()).await.unwrap();
    let joined = game.join(user("bob"), NOW).unwrap();
    repository.save_if_version(joined.clone(), 0).await.unwrap();
    joined
}
