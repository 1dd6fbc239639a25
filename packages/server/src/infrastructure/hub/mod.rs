//! EventHub の実装
//!
//! - `inmemory`: プロセス内のレジストリ
//! - `maintenance`: HEARTBEAT と掃除の定期タスク
//!
//! 複数プロセスへのファンアウトは扱わない。スケールアウトする場合は
//! 共有ブローカーを使う実装をここに追加する。

pub mod inmemory;
pub mod maintenance;

pub use inmemory::InMemoryEventHub;
pub use maintenance::spawn_maintenance;
