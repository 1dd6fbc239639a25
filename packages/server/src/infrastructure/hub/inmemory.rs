//! インメモリ EventHub 実装
//!
//! ## 責務
//!
//! - 接続（`EventSink`）をグループ単位で保持する
//! - グループへのファンアウト、単一クライアントポリシーによる追い出し
//! - HEARTBEAT 送信と古い接続の掃除
//!
//! レジストリの変更は 1 回のロック取得の中で完結させる。
//! `EventSink` は同期的に送信できるので、ロック中に `.await` は挟まない。

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use checkers_shared::{
    protocol::{Envelope, EventType, events::ConnectionClosedPayload},
    time::Clock,
};
use tokio::sync::Mutex;

use crate::domain::{
    AddOptions, ClientId, ConnectionId, ConnectionInfo, ConnectionMetadata, EventHub, EventSink,
    GroupKey, GroupStats, HubStats, Namespace,
};

/// レジストリが保持する接続
struct Connection {
    id: ConnectionId,
    sink: EventSink,
    metadata: ConnectionMetadata,
    connected_at: i64,
    last_seen: i64,
}

impl Connection {
    fn send(&self, frame: &str) -> bool {
        self.sink.send(frame.to_string()).is_ok()
    }

    fn info(&self, group: &GroupKey, client_id: &ClientId) -> ConnectionInfo {
        ConnectionInfo {
            id: self.id,
            group: group.to_string(),
            client_id: client_id.clone(),
            metadata: self.metadata.clone(),
            connected_at: self.connected_at,
            last_seen: self.last_seen,
        }
    }
}

type Registry = HashMap<GroupKey, HashMap<ClientId, Connection>>;

fn encode(envelope: &Envelope) -> Option<String> {
    match envelope.to_json() {
        Ok(frame) => Some(frame),
        Err(e) => {
            tracing::error!("Failed to serialize {:?} envelope: {}", envelope.r#type, e);
            None
        }
    }
}

/// Process-local connection registry.
pub struct InMemoryEventHub {
    /// Key: グループ, Value: タブ ID ごとの接続
    groups: Mutex<Registry>,
    clock: Arc<dyn Clock>,
    stale_timeout: Duration,
    destroyed: AtomicBool,
}

impl InMemoryEventHub {
    pub fn new(clock: Arc<dyn Clock>, stale_timeout: Duration) -> Self {
        Self {
            groups: Mutex::new(HashMap::new()),
            clock,
            stale_timeout,
            destroyed: AtomicBool::new(false),
        }
    }

    fn closed_frame(&self, reason: &str) -> Option<String> {
        let payload = ConnectionClosedPayload {
            reason: reason.to_string(),
        };
        Envelope::with_payload(EventType::ConnectionClosed, &payload, self.clock.now_millis())
            .ok()
            .and_then(|envelope| encode(&envelope))
    }

    /// `frame` をグループ内の全接続に送り、失敗した接続を取り除く
    fn fan_out(registry: &mut Registry, group: &GroupKey, frame: &str) -> usize {
        let Some(connections) = registry.get_mut(group) else {
            return 0;
        };

        let mut delivered = 0;
        let mut failed = Vec::new();
        for (client_id, connection) in connections.iter() {
            if connection.send(frame) {
                delivered += 1;
            } else {
                failed.push(client_id.clone());
            }
        }

        for client_id in failed {
            tracing::warn!("Send to '{}' in {} failed, removing connection", client_id, group);
            connections.remove(&client_id);
        }
        if connections.is_empty() {
            registry.remove(group);
        }

        delivered
    }
}

#[async_trait]
impl EventHub for InMemoryEventHub {
    async fn add_connection(
        &self,
        group: GroupKey,
        client_id: ClientId,
        sink: EventSink,
        metadata: ConnectionMetadata,
        options: AddOptions,
    ) -> ConnectionId {
        let now = self.clock.now_millis();
        let id = ConnectionId::generate();
        let closed_frame = self.closed_frame("replaced");

        let mut groups = self.groups.lock().await;
        if self.destroyed.load(Ordering::SeqCst) {
            tracing::warn!("Hub is shut down, refusing connection '{}'", client_id);
            return id;
        }

        let connections = groups.entry(group.clone()).or_default();

        let mut evicted: Vec<(ClientId, Connection)> = Vec::new();
        if let Some(previous) = connections.remove(&client_id) {
            evicted.push((client_id.clone(), previous));
        }
        if options.enforce_single_client {
            let victims: Vec<ClientId> = connections
                .iter()
                .filter(|(_, existing)| match &metadata.user_id {
                    Some(user_id) => existing.metadata.user_id.as_ref() == Some(user_id),
                    None => true,
                })
                .map(|(other, _)| other.clone())
                .collect();
            for victim in victims {
                if let Some(connection) = connections.remove(&victim) {
                    evicted.push((victim, connection));
                }
            }
        }

        for (evicted_client, connection) in evicted {
            if let Some(frame) = &closed_frame {
                // 相手がすでに切断済みでも追い出しは続行する
                let _ = connection.send(frame);
            }
            tracing::info!(
                "Evicted connection '{}' ({}) from {}",
                evicted_client,
                connection.id,
                group
            );
        }

        connections.insert(
            client_id.clone(),
            Connection {
                id,
                sink,
                metadata,
                connected_at: now,
                last_seen: now,
            },
        );
        tracing::info!("Connection '{}' ({}) added to {}", client_id, id, group);

        id
    }

    async fn remove_connection(
        &self,
        group: &GroupKey,
        client_id: &ClientId,
        connection_id: Option<ConnectionId>,
    ) -> bool {
        let mut groups = self.groups.lock().await;
        let Some(connections) = groups.get_mut(group) else {
            return false;
        };

        let matches = match (connections.get(client_id), connection_id) {
            (Some(existing), Some(expected)) => existing.id == expected,
            (Some(_), None) => true,
            (None, _) => false,
        };
        if matches {
            connections.remove(client_id);
            tracing::info!("Connection '{}' removed from {}", client_id, group);
        }
        if connections.is_empty() {
            groups.remove(group);
        }

        matches
    }

    async fn send_to(&self, group: &GroupKey, client_id: &ClientId, envelope: &Envelope) -> bool {
        let Some(frame) = encode(envelope) else {
            return false;
        };

        let mut groups = self.groups.lock().await;
        let Some(connections) = groups.get_mut(group) else {
            return false;
        };
        let Some(connection) = connections.get(client_id) else {
            return false;
        };

        if connection.send(&frame) {
            return true;
        }

        tracing::warn!("Send to '{}' in {} failed, removing connection", client_id, group);
        connections.remove(client_id);
        if connections.is_empty() {
            groups.remove(group);
        }
        false
    }

    async fn broadcast(&self, group: &GroupKey, envelope: &Envelope) -> usize {
        let Some(frame) = encode(envelope) else {
            return 0;
        };

        let mut groups = self.groups.lock().await;
        let delivered = Self::fan_out(&mut groups, group, &frame);
        tracing::debug!(
            "Broadcast {:?} to {}: {} delivered",
            envelope.r#type,
            group,
            delivered
        );
        delivered
    }

    async fn broadcast_many(
        &self,
        namespace: Namespace,
        keys: &[String],
        envelope: &Envelope,
    ) -> usize {
        let Some(frame) = encode(envelope) else {
            return 0;
        };

        let mut groups = self.groups.lock().await;
        keys.iter()
            .map(|key| Self::fan_out(&mut groups, &GroupKey::new(namespace, key.clone()), &frame))
            .sum()
    }

    async fn touch(&self, group: &GroupKey, client_id: &ClientId) -> bool {
        let now = self.clock.now_millis();
        let mut groups = self.groups.lock().await;
        match groups
            .get_mut(group)
            .and_then(|connections| connections.get_mut(client_id))
        {
            Some(connection) => {
                connection.last_seen = now;
                true
            }
            None => false,
        }
    }

    async fn connections_in(&self, group: &GroupKey) -> Vec<ConnectionInfo> {
        let groups = self.groups.lock().await;
        groups
            .get(group)
            .map(|connections| {
                connections
                    .iter()
                    .map(|(client_id, connection)| connection.info(group, client_id))
                    .collect()
            })
            .unwrap_or_default()
    }

    async fn stats(&self) -> HubStats {
        let groups = self.groups.lock().await;
        let mut group_stats: Vec<GroupStats> = groups
            .iter()
            .map(|(group, connections)| GroupStats {
                group: group.to_string(),
                connections: connections.len(),
            })
            .collect();
        group_stats.sort_by(|a, b| a.group.cmp(&b.group));

        HubStats {
            total_groups: groups.len(),
            total_connections: groups.values().map(HashMap::len).sum(),
            groups: group_stats,
        }
    }

    async fn sweep_stale(&self) -> usize {
        let now = self.clock.now_millis();
        let timeout = i64::try_from(self.stale_timeout.as_millis()).unwrap_or(i64::MAX);
        let closed_frame = self.closed_frame("stale");

        let mut groups = self.groups.lock().await;
        let mut removed = 0;
        for (group, connections) in groups.iter_mut() {
            connections.retain(|client_id, connection| {
                let stale = now.saturating_sub(connection.last_seen) > timeout;
                if stale {
                    if let Some(frame) = &closed_frame {
                        let _ = connection.send(frame);
                    }
                    tracing::info!("Removing stale connection '{}' from {}", client_id, group);
                    removed += 1;
                }
                !stale
            });
        }
        groups.retain(|_, connections| !connections.is_empty());

        removed
    }

    async fn heartbeat(&self) -> usize {
        let now = self.clock.now_millis();
        let Some(frame) = encode(&Envelope::bare(EventType::Heartbeat, now)) else {
            return 0;
        };

        let mut groups = self.groups.lock().await;
        let mut delivered = 0;
        for (group, connections) in groups.iter_mut() {
            connections.retain(|client_id, connection| {
                if connection.send(&frame) {
                    connection.last_seen = now;
                    delivered += 1;
                    true
                } else {
                    tracing::warn!("Heartbeat to '{}' in {} failed", client_id, group);
                    false
                }
            });
        }
        groups.retain(|_, connections| !connections.is_empty());

        delivered
    }

    async fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }

        let frame = encode(&Envelope::bare(
            EventType::ServerShutdown,
            self.clock.now_millis(),
        ));

        let mut groups = self.groups.lock().await;
        let total: usize = groups.values().map(HashMap::len).sum();
        if let Some(frame) = frame {
            for connection in groups.values().flat_map(HashMap::values) {
                let _ = connection.send(&frame);
            }
        }
        groups.clear();

        tracing::info!("Hub destroyed, {} connection(s) notified", total);
    }
}
