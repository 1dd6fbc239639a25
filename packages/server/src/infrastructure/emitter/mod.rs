//! Event Emitter / Channel Router
//!
//! ## 責務
//!
//! - 発行されるエンベロープへのシーケンス番号の割り当て
//! - チャネル（`user:<id>`, `game:<id>` など）ごとのプロセス内購読
//! - 全イベントの流れ（firehose）を Hub ブリッジへ渡す
//!
//! 番号の割り当てと送信は同じロックの中で行うため、どの購読者から見ても
//! 番号順に届く。バスはプロセス内に閉じている。

pub mod bridge;

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use checkers_shared::protocol::Envelope;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::domain::{EventPublisher, GroupKey, UserId};

pub use bridge::spawn_hub_bridge;

/// チャネル情報付きのエンベロープ（firehose 用）
#[derive(Debug, Clone)]
pub struct RoutedEnvelope {
    pub channel: GroupKey,
    pub envelope: Arc<Envelope>,
}

struct EmitterState {
    /// 次に割り当てるシーケンス番号（1 始まり、再起動でリセット）
    next_sequence: u64,
    channels: HashMap<GroupKey, broadcast::Sender<Arc<Envelope>>>,
}

pub struct EventEmitter {
    state: Mutex<EmitterState>,
    firehose: broadcast::Sender<RoutedEnvelope>,
    capacity: usize,
}

impl EventEmitter {
    pub fn new(capacity: usize) -> Self {
        let (firehose, _) = broadcast::channel(capacity);
        Self {
            state: Mutex::new(EmitterState {
                next_sequence: 1,
                channels: HashMap::new(),
            }),
            firehose,
            capacity,
        }
    }

    /// `user:<id>` チャネルを購読する
    pub fn on_user_event(&self, user_id: &UserId) -> EventSubscription {
        self.on_channel_event(&GroupKey::user(user_id))
    }

    pub fn on_channel_event(&self, channel: &GroupKey) -> EventSubscription {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let receiver = state
            .channels
            .entry(channel.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe();
        tracing::debug!("New listener on {}", channel);

        EventSubscription {
            channel: channel.clone(),
            receiver,
        }
    }

    /// 全チャネルのイベントを発行順に受け取る
    pub fn subscribe_all(&self) -> broadcast::Receiver<RoutedEnvelope> {
        self.firehose.subscribe()
    }

    /// ユーザーチャネルの購読者を全て切り離す
    pub fn cleanup_user(&self, user_id: &UserId) {
        self.cleanup_channel(&GroupKey::user(user_id));
    }

    pub fn cleanup_channel(&self, channel: &GroupKey) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.channels.remove(channel).is_some() {
            tracing::debug!("Channel {} cleaned up", channel);
        }
    }

    pub fn listener_count(&self, channel: &GroupKey) -> usize {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state
            .channels
            .get(channel)
            .map(broadcast::Sender::receiver_count)
            .unwrap_or(0)
    }
}

impl EventPublisher for EventEmitter {
    fn emit_to_user(&self, user_id: &UserId, envelope: Envelope) -> Envelope {
        self.emit_to_channel(&GroupKey::user(user_id), envelope)
    }

    fn emit_to_channel(&self, channel: &GroupKey, mut envelope: Envelope) -> Envelope {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        envelope.sequence_number = Some(state.next_sequence);
        state.next_sequence += 1;
        let shared = Arc::new(envelope.clone());

        let orphaned = state
            .channels
            .get(channel)
            .is_some_and(|sender| sender.send(shared.clone()).is_err());
        if orphaned {
            // 購読者がいなくなったチャネルは遅延削除
            state.channels.remove(channel);
        }

        // firehose に購読者がいなくてもエラーにしない
        let _ = self.firehose.send(RoutedEnvelope {
            channel: channel.clone(),
            envelope: shared,
        });

        tracing::debug!(
            "Emitted {:?} #{:?} to {}",
            envelope.r#type,
            envelope.sequence_number,
            channel
        );
        envelope
    }
}

/// チャネル購読。drop するか `unsubscribe()` で解除される。
pub struct EventSubscription {
    channel: GroupKey,
    receiver: broadcast::Receiver<Arc<Envelope>>,
}

impl EventSubscription {
    pub fn channel(&self) -> &GroupKey {
        &self.channel
    }

    /// 次のイベントを待つ。チャネルが片付けられたら `None`。
    ///
    /// 取りこぼしは警告を出して読み飛ばす。
    pub async fn recv(&mut self) -> Option<Arc<Envelope>> {
        loop {
            match self.receiver.recv().await {
                Ok(envelope) => return Some(envelope),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Listener on {} lagged, {} event(s) skipped", self.channel, skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    pub fn unsubscribe(self) {}
}
