//! EventHub trait 定義
//!
//! サーバープッシュ接続の登録・ファンアウトのインターフェース。
//! UseCase 層と UI 層はこの trait に依存し、具体的なレジストリ実装には依存しない。

use async_trait::async_trait;
use checkers_shared::protocol::Envelope;
use serde::Serialize;
use tokio::sync::mpsc;

use super::value_object::{ClientId, ConnectionId, GameId, GroupKey, Namespace, UserId};

/// 接続ごとの送信チャネル
///
/// 送信側は同期的に書き込めるため、レジストリのロック中に `.await` を挟まずに送信できる。
/// 受信側は SSE ストリームが 1 本だけ保持する。
pub type EventSink = mpsc::UnboundedSender<String>;

/// 接続に付随するメタデータ
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionMetadata {
    pub user_id: Option<UserId>,
    pub game_id: Option<GameId>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AddOptions {
    /// 同一グループ内で同じユーザーの他の接続を追い出す
    pub enforce_single_client: bool,
}

/// 登録済み接続の読み取り専用ビュー
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub group: String,
    pub client_id: ClientId,
    pub metadata: ConnectionMetadata,
    pub connected_at: i64,
    pub last_seen: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupStats {
    pub group: String,
    pub connections: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HubStats {
    pub total_groups: usize,
    pub total_connections: usize,
    pub groups: Vec<GroupStats>,
}

/// Event Hub trait
///
/// 送信に失敗した接続はその場でレジストリから取り除かれる。
/// ブロードキャストは途中の失敗で中断しない。
#[async_trait]
pub trait EventHub: Send + Sync {
    /// 接続を登録し、新しい接続 ID を返す
    ///
    /// 同じ `(group, client_id)` の既存接続は `connection_closed` を送ってから置き換える。
    async fn add_connection(
        &self,
        group: GroupKey,
        client_id: ClientId,
        sink: EventSink,
        metadata: ConnectionMetadata,
        options: AddOptions,
    ) -> ConnectionId;

    /// 接続を削除する。`connection_id` を渡した場合は ID が一致するときだけ削除する。
    ///
    /// 削除したら `true`。空になったグループも削除される。
    async fn remove_connection(
        &self,
        group: &GroupKey,
        client_id: &ClientId,
        connection_id: Option<ConnectionId>,
    ) -> bool;

    /// 1 接続にだけ送信する
    async fn send_to(&self, group: &GroupKey, client_id: &ClientId, envelope: &Envelope) -> bool;

    /// グループ内の全接続に送信し、送信できた数を返す
    async fn broadcast(&self, group: &GroupKey, envelope: &Envelope) -> usize;

    /// 同じ namespace の複数グループに送信する
    async fn broadcast_many(&self, namespace: Namespace, keys: &[String], envelope: &Envelope)
    -> usize;

    /// 最終受信時刻を更新する
    async fn touch(&self, group: &GroupKey, client_id: &ClientId) -> bool;

    async fn connections_in(&self, group: &GroupKey) -> Vec<ConnectionInfo>;

    async fn stats(&self) -> HubStats;

    /// `last_seen` がタイムアウトを超えた接続を削除し、削除数を返す
    async fn sweep_stale(&self) -> usize;

    /// 全接続に HEARTBEAT を送る。成功した接続は touch され、失敗した接続は削除される。
    async fn heartbeat(&self) -> usize;

    /// 全接続にシャットダウンを通知してレジストリを空にする
    async fn destroy(&self);
}
