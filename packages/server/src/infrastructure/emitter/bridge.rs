//! Emitter から Hub への転送タスク

use std::sync::Arc;

use tokio::{sync::broadcast::error::RecvError, task::JoinHandle};

use crate::domain::EventHub;

use super::EventEmitter;

/// Forward every emitted envelope to the hub group with the same key, in
/// emit order. Abort the returned handle to stop forwarding.
pub fn spawn_hub_bridge(emitter: &EventEmitter, hub: Arc<dyn EventHub>) -> JoinHandle<()> {
    let mut events = emitter.subscribe_all();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(routed) => {
                    hub.broadcast(&routed.channel, &routed.envelope).await;
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Hub bridge lagged, {} event(s) dropped", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
        tracing::debug!("Hub bridge stopped");
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use checkers_shared::{
        protocol::{Envelope, EventType},
        time::SystemClock,
    };
    use tokio::sync::mpsc;

    use super::*;
    use crate::{
        domain::{AddOptions, ClientId, ConnectionMetadata, EventPublisher, GameId, GroupKey},
        infrastructure::hub::InMemoryEventHub,
    };

    #[tokio::test]
    async fn test_bridge_forwards_emitted_events_to_hub_group() {
        // テスト項目: Emitter で発行したイベントが Hub の同じグループへ番号順に届く
        // given (前提条件):
        let emitter = EventEmitter::new(16);
        let hub = Arc::new(InMemoryEventHub::new(
            Arc::new(SystemClock),
            Duration::from_secs(60),
        ));
        let game = GroupKey::game(&GameId::generate());
        let (tx, mut rx) = mpsc::unbounded_channel();
        hub.add_connection(
            game.clone(),
            ClientId::new("tab-a".to_string()).unwrap(),
            tx,
            ConnectionMetadata::default(),
            AddOptions::default(),
        )
        .await;
        let handle = spawn_hub_bridge(&emitter, hub.clone());

        // when (操作):
        emitter.emit_to_channel(&game, Envelope::bare(EventType::GameMove, 1));
        emitter.emit_to_channel(&game, Envelope::bare(EventType::GameOver, 2));

        // then (期待する結果):
        let first = Envelope::from_json(&rx.recv().await.unwrap()).unwrap();
        let second = Envelope::from_json(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(first.r#type, EventType::GameMove);
        assert_eq!(first.sequence_number, Some(1));
        assert_eq!(second.r#type, EventType::GameOver);
        assert_eq!(second.sequence_number, Some(2));
        handle.abort();
    }
}
