//! Hub の定期メンテナンスタスク（HEARTBEAT 送信と古い接続の掃除）

use std::sync::Arc;

use tokio::{
    task::JoinHandle,
    time::{Instant, interval_at},
};

use crate::{config::HubConfig, domain::EventHub};

/// Spawn the heartbeat/sweep loop. Abort the returned handle to stop it.
pub fn spawn_maintenance(hub: Arc<dyn EventHub>, config: HubConfig) -> JoinHandle<()> {
    tokio::spawn(async move {
        let start = Instant::now();
        let mut heartbeat = interval_at(
            start + config.heartbeat_interval,
            config.heartbeat_interval,
        );
        let mut sweep = interval_at(start + config.sweep_interval, config.sweep_interval);

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    let delivered = hub.heartbeat().await;
                    tracing::trace!("Heartbeat sent to {} connection(s)", delivered);
                }
                _ = sweep.tick() => {
                    let removed = hub.sweep_stale().await;
                    if removed > 0 {
                        tracing::info!("Swept {} stale connection(s)", removed);
                    }
                }
            }
        }
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
        domain::{AddOptions, ClientId, ConnectionMetadata, GroupKey, Namespace},
        infrastructure::hub::InMemoryEventHub,
    };

    #[tokio::test(start_paused = true)]
    async fn test_maintenance_sends_periodic_heartbeats() {
        // テスト項目: heartbeat_interval ごとに HEARTBEAT が届き、停止後は届かない
        // given (前提条件):
        let hub = Arc::new(InMemoryEventHub::new(
            Arc::new(SystemClock),
            Duration::from_secs(60),
        ));
        let (tx, mut rx) = mpsc::unbounded_channel();
        hub.add_connection(
            GroupKey::new(Namespace::Game, "42"),
            ClientId::new("tab-a".to_string()).unwrap(),
            tx,
            ConnectionMetadata::default(),
            AddOptions::default(),
        )
        .await;
        let config = HubConfig {
            heartbeat_interval: Duration::from_secs(1),
            ..HubConfig::default()
        };

        // when (操作):
        let handle = spawn_maintenance(hub.clone(), config);
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        handle.abort();

        // then (期待する結果):
        let mut heartbeats = 0;
        while let Ok(frame) = rx.try_recv() {
            assert_eq!(Envelope::from_json(&frame).unwrap().r#type, EventType::Heartbeat);
            heartbeats += 1;
        }
        assert_eq!(heartbeats, 2);
    }
}
