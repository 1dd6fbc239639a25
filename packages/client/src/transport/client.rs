//! Reconnecting event stream client.
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - 接続状態の遷移（connect / disconnect / reconnect / destroy）
//! - ハートビート監視による stale 判定と再接続
//!
//! ### どのような状況を想定しているか
//! - 正常系：接続してイベントを受け取る。HEARTBEAT はアプリに届かない
//! - 異常系：接続失敗が続き、試行回数の上限で Disconnected に落ち着く
//! - エッジケース：destroy 後は下層のストリームが何を送ってもイベントは出ない

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use checkers_shared::protocol::{Envelope, EventType};
use futures_util::StreamExt;
use tokio::{sync::mpsc, task::JoinHandle};

use crate::error::TransportError;

use super::{
    backoff::ReconnectStrategy,
    source::{EventSource, FrameStream},
    state::{ConnectionState, LifecycleEvent},
};

/// Transport settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Resource-scoped stream URL, including the tab id query parameter.
    pub url: String,
    /// The connection is stale when no frame arrives for this long.
    pub heartbeat_timeout: Duration,
    pub strategy: ReconnectStrategy,
}

impl TransportConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            heartbeat_timeout: Duration::from_secs(45),
            strategy: ReconnectStrategy::default(),
        }
    }
}

/// What the client reports to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    StateChanged(ConnectionState),
    /// An application envelope. Heartbeats never show up here.
    Message(Envelope),
}

/// Why a stream stopped being read.
enum StreamEnd {
    Stale,
    Closed,
    Failed(TransportError),
    /// The server replaced this connection with another tab.
    Evicted,
    /// `disconnect` / `reconnect` / `destroy` took over.
    Superseded,
}

struct Shared {
    state: ConnectionState,
    attempts: u32,
    /// Bumped whenever the running task is replaced; a task only acts while
    /// its generation is current.
    generation: u64,
    task: Option<JoinHandle<()>>,
    events: Option<mpsc::UnboundedSender<TransportEvent>>,
    destroyed: bool,
}

struct Inner {
    config: TransportConfig,
    source: Arc<dyn EventSource>,
    shared: Mutex<Shared>,
}

/// Event stream client
///
/// Owns at most one underlying stream at a time. State changes and messages
/// are delivered through the receiver returned by [`TransportClient::new`];
/// the receiver closes once the client is destroyed.
pub struct TransportClient {
    inner: Arc<Inner>,
}

impl TransportClient {
    pub fn new(
        config: TransportConfig,
        source: Arc<dyn EventSource>,
    ) -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            config,
            source,
            shared: Mutex::new(Shared {
                state: ConnectionState::Disconnected,
                attempts: 0,
                generation: 0,
                task: None,
                events: Some(tx),
                destroyed: false,
            }),
        });
        (Self { inner }, rx)
    }

    /// Open the stream. No-op while a connection is active or after an
    /// intentional disconnect (use [`reconnect`](Self::reconnect)).
    pub fn connect(&self) {
        let mut shared = self.inner.lock();
        if shared.destroyed {
            return;
        }
        match shared.state {
            ConnectionState::Disconnected => self.start(&mut shared),
            ConnectionState::IntentionallyDisconnected => {
                tracing::debug!("connect() ignored after an intentional disconnect");
            }
            _ => {}
        }
    }

    /// Close the stream without any further automatic retry.
    pub fn disconnect(&self) {
        let mut shared = self.inner.lock();
        if shared.destroyed {
            return;
        }
        halt(&mut shared);
        transition(&mut shared, ConnectionState::IntentionallyDisconnected);
    }

    /// Manual reconnect: resets the retry counter and connects from any state.
    pub fn reconnect(&self) {
        let mut shared = self.inner.lock();
        if shared.destroyed {
            return;
        }
        shared.attempts = 0;
        self.start(&mut shared);
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Failed reconnect attempts since the last successful open.
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.lock().attempts
    }

    /// Permanent teardown. Idempotent; nothing is delivered afterwards.
    pub fn destroy(&self) {
        let mut shared = self.inner.lock();
        if shared.destroyed {
            return;
        }
        shared.destroyed = true;
        halt(&mut shared);
        shared.state = ConnectionState::IntentionallyDisconnected;
        shared.events = None;
        tracing::debug!("Transport for {} destroyed", self.inner.config.url);
    }

    /// React to a page lifecycle signal.
    pub fn handle_lifecycle(&self, event: LifecycleEvent) {
        let mut shared = self.inner.lock();
        if shared.destroyed {
            return;
        }
        match event {
            LifecycleEvent::Hidden => {}
            LifecycleEvent::Visible => {
                // 待機中のバックオフを飛ばしてすぐに再接続する
                if matches!(
                    shared.state,
                    ConnectionState::Disconnected | ConnectionState::Reconnecting
                ) {
                    shared.attempts = 0;
                    self.start(&mut shared);
                }
            }
            LifecycleEvent::PageHide => {
                halt(&mut shared);
                transition(&mut shared, ConnectionState::IntentionallyDisconnected);
            }
            LifecycleEvent::Resumed => {
                halt(&mut shared);
                shared.attempts = 0;
                transition(&mut shared, ConnectionState::Disconnected);
            }
        }
    }

    fn start(&self, shared: &mut Shared) {
        halt(shared);
        transition(shared, ConnectionState::Connecting);
        let generation = shared.generation;
        let inner = self.inner.clone();
        shared.task = Some(tokio::spawn(run(inner, generation)));
    }
}

impl Drop for TransportClient {
    fn drop(&mut self) {
        self.destroy();
    }
}

fn halt(shared: &mut Shared) {
    shared.generation += 1;
    if let Some(task) = shared.task.take() {
        task.abort();
    }
}

fn transition(shared: &mut Shared, state: ConnectionState) {
    if shared.state == state {
        return;
    }
    tracing::debug!("Transport state: {} -> {}", shared.state, state);
    shared.state = state;
    if let Some(events) = &shared.events {
        let _ = events.send(TransportEvent::StateChanged(state));
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The shared state, if `generation` is still the running one.
    fn current(&self, generation: u64) -> Option<MutexGuard<'_, Shared>> {
        let shared = self.lock();
        (shared.generation == generation && !shared.destroyed).then_some(shared)
    }

    fn set_state(&self, generation: u64, state: ConnectionState) -> bool {
        let Some(mut shared) = self.current(generation) else {
            return false;
        };
        transition(&mut shared, state);
        true
    }

    fn on_open(&self, generation: u64) -> bool {
        let Some(mut shared) = self.current(generation) else {
            return false;
        };
        shared.attempts = 0;
        transition(&mut shared, ConnectionState::Connected);
        true
    }

    fn deliver(&self, generation: u64, envelope: Envelope) -> bool {
        let Some(shared) = self.current(generation) else {
            return false;
        };
        if let Some(events) = &shared.events {
            let _ = events.send(TransportEvent::Message(envelope));
        }
        true
    }

    /// Move to `Reconnecting` and return the delay, or settle in
    /// `Disconnected` once the strategy gives up.
    fn schedule_retry(&self, generation: u64) -> Option<Duration> {
        let mut shared = self.current(generation)?;
        match self.config.strategy.next_delay(shared.attempts) {
            Some(delay) => {
                shared.attempts += 1;
                transition(&mut shared, ConnectionState::Reconnecting);
                Some(delay)
            }
            None => {
                tracing::error!(
                    "Giving up on {} after {} attempts; manual reconnect required",
                    self.config.url,
                    shared.attempts
                );
                transition(&mut shared, ConnectionState::Disconnected);
                None
            }
        }
    }

    async fn pump(&self, generation: u64, mut stream: FrameStream) -> StreamEnd {
        loop {
            // 受信のたびにウォッチドッグを張り直す
            let frame =
                match tokio::time::timeout(self.config.heartbeat_timeout, stream.next()).await {
                    Err(_) => return StreamEnd::Stale,
                    Ok(None) => return StreamEnd::Closed,
                    Ok(Some(Err(e))) => return StreamEnd::Failed(e),
                    Ok(Some(Ok(frame))) => frame,
                };

            let envelope = match Envelope::from_json(&frame) {
                Ok(envelope) => envelope,
                Err(e) => {
                    tracing::warn!("Dropping malformed frame: {}", e);
                    continue;
                }
            };
            if envelope.r#type.is_heartbeat() {
                tracing::trace!("Heartbeat received");
                continue;
            }

            let evicted = envelope.r#type == EventType::ConnectionClosed;
            if !self.deliver(generation, envelope) {
                return StreamEnd::Superseded;
            }
            if evicted {
                return StreamEnd::Evicted;
            }
        }
    }
}

async fn run(inner: Arc<Inner>, generation: u64) {
    loop {
        match inner.source.open(&inner.config.url).await {
            Ok(stream) => {
                if !inner.on_open(generation) {
                    return;
                }
                tracing::info!("Event stream connected: {}", inner.config.url);

                match inner.pump(generation, stream).await {
                    StreamEnd::Superseded => return,
                    StreamEnd::Evicted => {
                        tracing::warn!("Connection replaced by another tab; not reconnecting");
                        inner.set_state(generation, ConnectionState::IntentionallyDisconnected);
                        return;
                    }
                    StreamEnd::Stale => tracing::warn!(
                        "No frame within {:?}; connection is stale",
                        inner.config.heartbeat_timeout
                    ),
                    StreamEnd::Closed => tracing::info!("Event stream closed by the server"),
                    StreamEnd::Failed(e) => tracing::warn!("Event stream failed: {}", e),
                }
            }
            Err(e) => tracing::warn!("Failed to open event stream: {}", e),
        }

        let Some(delay) = inner.schedule_retry(generation) else {
            return;
        };
        tracing::info!("Reconnecting in {:?}", delay);
        tokio::time::sleep(delay).await;

        if !inner.set_state(generation, ConnectionState::Connecting) {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::atomic::{AtomicUsize, Ordering},
    };

    use async_trait::async_trait;
    use futures_util::stream;

    use super::*;
    use crate::transport::backoff::BackoffConfig;

    /// Hands out pre-arranged streams in order; fails once they run out.
    #[derive(Default)]
    struct FakeEventSource {
        streams: Mutex<VecDeque<mpsc::UnboundedReceiver<String>>>,
        opened: AtomicUsize,
    }

    impl FakeEventSource {
        fn push_stream(&self) -> mpsc::UnboundedSender<String> {
            let (tx, rx) = mpsc::unbounded_channel();
            self.streams.lock().unwrap().push_back(rx);
            tx
        }

        fn opened(&self) -> usize {
            self.opened.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl EventSource for FakeEventSource {
        async fn open(&self, _url: &str) -> Result<FrameStream, TransportError> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            let Some(rx) = self.streams.lock().unwrap().pop_front() else {
                return Err(TransportError::Connect("refused".to_string()));
            };
            Ok(Box::pin(stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|frame| (Ok(frame), rx))
            })))
        }
    }

    fn config(max_attempts: u32) -> TransportConfig {
        TransportConfig {
            url: "http://test/api/events/games/42?tab_id=tab-1".to_string(),
            heartbeat_timeout: Duration::from_secs(5),
            strategy: ReconnectStrategy::Backoff(BackoffConfig {
                max_attempts,
                ..BackoffConfig::default()
            }),
        }
    }

    fn frame(event_type: EventType) -> String {
        Envelope::bare(event_type, 0).to_json().unwrap()
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<TransportEvent>) -> TransportEvent {
        tokio::time::timeout(Duration::from_secs(600), rx.recv())
            .await
            .expect("timed out waiting for a transport event")
            .expect("transport event channel closed")
    }

    async fn wait_for_state(
        rx: &mut mpsc::UnboundedReceiver<TransportEvent>,
        state: ConnectionState,
    ) -> Vec<TransportEvent> {
        let mut seen = Vec::new();
        loop {
            let event = next_event(rx).await;
            let done = event == TransportEvent::StateChanged(state);
            seen.push(event);
            if done {
                return seen;
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_delivers_messages_without_heartbeats() {
        // テスト項目: 接続後にメッセージが届き、HEARTBEAT はアプリに届かない
        // given (前提条件):
        let source = Arc::new(FakeEventSource::default());
        let tx = source.push_stream();
        let (client, mut rx) = TransportClient::new(config(3), source.clone());

        // when (操作):
        client.connect();
        tx.send(frame(EventType::Heartbeat)).unwrap();
        tx.send(frame(EventType::GameMove)).unwrap();

        // then (期待する結果):
        assert_eq!(
            next_event(&mut rx).await,
            TransportEvent::StateChanged(ConnectionState::Connecting)
        );
        assert_eq!(
            next_event(&mut rx).await,
            TransportEvent::StateChanged(ConnectionState::Connected)
        );
        match next_event(&mut rx).await {
            TransportEvent::Message(envelope) => assert_eq!(envelope.r#type, EventType::GameMove),
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(client.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_stream_becomes_stale() {
        // テスト項目: ハートビートタイムアウト内に何も届かないと Connected から Reconnecting に遷移する
        // given (前提条件):
        let source = Arc::new(FakeEventSource::default());
        let _tx = source.push_stream();
        let (client, mut rx) = TransportClient::new(config(3), source.clone());
        client.connect();
        wait_for_state(&mut rx, ConnectionState::Connected).await;
        let connected_at = tokio::time::Instant::now();

        // when (操作):
        wait_for_state(&mut rx, ConnectionState::Reconnecting).await;

        // then (期待する結果):
        assert!(connected_at.elapsed() >= Duration::from_secs(5));
        assert_eq!(client.reconnect_attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeats_keep_connection_alive() {
        // テスト項目: タイムアウトより短い間隔で HEARTBEAT が届く限り Connected のまま
        // given (前提条件):
        let source = Arc::new(FakeEventSource::default());
        let tx = source.push_stream();
        let (client, mut rx) = TransportClient::new(config(3), source.clone());
        client.connect();
        wait_for_state(&mut rx, ConnectionState::Connected).await;

        // when (操作):
        for _ in 0..4 {
            tokio::time::sleep(Duration::from_secs(3)).await;
            tx.send(frame(EventType::Heartbeat)).unwrap();
        }
        tokio::time::sleep(Duration::from_secs(1)).await;

        // then (期待する結果):
        assert_eq!(client.state(), ConnectionState::Connected);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_events_after_destroy() {
        // テスト項目: destroy 後は下層ストリームにフレームが届いてもイベントは出ず、チャネルが閉じる
        // given (前提条件):
        let source = Arc::new(FakeEventSource::default());
        let tx = source.push_stream();
        let (client, mut rx) = TransportClient::new(config(3), source.clone());
        client.connect();
        wait_for_state(&mut rx, ConnectionState::Connected).await;

        // when (操作):
        client.destroy();
        client.destroy();
        let _ = tx.send(frame(EventType::GameMove));
        client.connect();
        client.reconnect();

        // then (期待する結果):
        assert_eq!(rx.recv().await, None);
        assert_eq!(client.state(), ConnectionState::IntentionallyDisconnected);
        assert_eq!(source.opened(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_backoff_settles_disconnected() {
        // テスト項目: 接続失敗が上限回数続くと Disconnected に落ち着き、reconnect で再開できる
        // given (前提条件):
        let source = Arc::new(FakeEventSource::default());
        let (client, mut rx) = TransportClient::new(config(2), source.clone());

        // when (操作):
        client.connect();
        let seen = wait_for_state(&mut rx, ConnectionState::Disconnected).await;

        // then (期待する結果):
        use ConnectionState::*;
        let expected: Vec<TransportEvent> = [
            Connecting,
            Reconnecting,
            Connecting,
            Reconnecting,
            Connecting,
            Disconnected,
        ]
        .into_iter()
        .map(TransportEvent::StateChanged)
        .collect();
        assert_eq!(seen, expected);
        assert_eq!(source.opened(), 3);

        let _tx = source.push_stream();
        client.reconnect();
        wait_for_state(&mut rx, Connected).await;
        assert_eq!(client.reconnect_attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_is_intentional() {
        // テスト項目: disconnect 後は自動再接続せず connect も無視され、reconnect でのみ抜けられる
        // given (前提条件):
        let source = Arc::new(FakeEventSource::default());
        let _first = source.push_stream();
        let (client, mut rx) = TransportClient::new(config(3), source.clone());
        client.connect();
        wait_for_state(&mut rx, ConnectionState::Connected).await;

        // when (操作):
        client.disconnect();
        client.connect();
        tokio::time::sleep(Duration::from_secs(120)).await;

        // then (期待する結果):
        assert_eq!(client.state(), ConnectionState::IntentionallyDisconnected);
        assert_eq!(source.opened(), 1);

        let _second = source.push_stream();
        client.reconnect();
        wait_for_state(&mut rx, ConnectionState::Connected).await;
        assert_eq!(source.opened(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_frame_is_dropped() {
        // テスト項目: JSON として不正なフレームは捨てられ、接続は維持される
        // given (前提条件):
        let source = Arc::new(FakeEventSource::default());
        let tx = source.push_stream();
        let (client, mut rx) = TransportClient::new(config(3), source.clone());
        client.connect();
        wait_for_state(&mut rx, ConnectionState::Connected).await;

        // when (操作):
        tx.send("{not json".to_string()).unwrap();
        tx.send(frame(EventType::MessageSent)).unwrap();

        // then (期待する結果):
        match next_event(&mut rx).await {
            TransportEvent::Message(envelope) => {
                assert_eq!(envelope.r#type, EventType::MessageSent)
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(client.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_eviction_stops_reconnecting() {
        // テスト項目: connection_closed を受け取ると通知後に IntentionallyDisconnected になり、再接続しない
        // given (前提条件):
        let source = Arc::new(FakeEventSource::default());
        let tx = source.push_stream();
        let (client, mut rx) = TransportClient::new(config(3), source.clone());
        client.connect();
        wait_for_state(&mut rx, ConnectionState::Connected).await;

        // when (操作):
        tx.send(frame(EventType::ConnectionClosed)).unwrap();

        // then (期待する結果):
        let seen = wait_for_state(&mut rx, ConnectionState::IntentionallyDisconnected).await;
        assert!(matches!(
            &seen[0],
            TransportEvent::Message(envelope) if envelope.r#type == EventType::ConnectionClosed
        ));
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(source.opened(), 1);
        assert_eq!(client.state(), ConnectionState::IntentionallyDisconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_close_triggers_reconnect() {
        // テスト項目: サーバーがストリームを閉じると再接続し、次のストリームで Connected に戻る
        // given (前提条件):
        let source = Arc::new(FakeEventSource::default());
        let first = source.push_stream();
        let _second = source.push_stream();
        let (client, mut rx) = TransportClient::new(config(3), source.clone());
        client.connect();
        wait_for_state(&mut rx, ConnectionState::Connected).await;

        // when (操作):
        drop(first);

        // then (期待する結果):
        wait_for_state(&mut rx, ConnectionState::Reconnecting).await;
        wait_for_state(&mut rx, ConnectionState::Connected).await;
        assert_eq!(source.opened(), 2);
        assert_eq!(client.reconnect_attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lifecycle_page_hide_and_resume() {
        // テスト項目: PageHide で切断され、Resumed で Disconnected に戻って connect できる
        // given (前提条件):
        let source = Arc::new(FakeEventSource::default());
        let _first = source.push_stream();
        let (client, mut rx) = TransportClient::new(config(3), source.clone());
        client.connect();
        wait_for_state(&mut rx, ConnectionState::Connected).await;

        // when (操作):
        client.handle_lifecycle(LifecycleEvent::PageHide);
        let hidden = client.state();
        client.handle_lifecycle(LifecycleEvent::Resumed);
        let resumed = client.state();

        // then (期待する結果):
        assert_eq!(hidden, ConnectionState::IntentionallyDisconnected);
        assert_eq!(resumed, ConnectionState::Disconnected);
        let _second = source.push_stream();
        client.connect();
        wait_for_state(&mut rx, ConnectionState::Connected).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_visible_skips_pending_backoff() {
        // テスト項目: Reconnecting 中に Visible を受けると、バックオフを待たずに再接続し試行回数が 0 に戻る
        // given (前提条件):
        let source = Arc::new(FakeEventSource::default());
        let (client, mut rx) = TransportClient::new(config(5), source.clone());
        client.connect();
        wait_for_state(&mut rx, ConnectionState::Reconnecting).await;
        let attempts_before = client.reconnect_attempts();
        let _tx = source.push_stream();
        let visible_at = tokio::time::Instant::now();

        // when (操作):
        client.handle_lifecycle(LifecycleEvent::Visible);
        let attempts_after = client.reconnect_attempts();

        // then (期待する結果):
        assert_eq!(attempts_before, 1);
        assert_eq!(attempts_after, 0);
        wait_for_state(&mut rx, ConnectionState::Connected).await;
        // 最初のバックオフは 1 秒以上なので、それより前に繋がっていればよい
        assert!(visible_at.elapsed() < Duration::from_secs(1));
        assert_eq!(source.opened(), 2);
        assert!(client.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_visible_leaves_live_connection_alone() {
        // テスト項目: Connected のまま Visible を受けても接続は張り直されない
        // given (前提条件):
        let source = Arc::new(FakeEventSource::default());
        let _tx = source.push_stream();
        let (client, mut rx) = TransportClient::new(config(3), source.clone());
        client.connect();
        wait_for_state(&mut rx, ConnectionState::Connected).await;

        // when (操作):
        client.handle_lifecycle(LifecycleEvent::Visible);
        tokio::time::sleep(Duration::from_secs(1)).await;

        // then (期待する結果):
        assert_eq!(client.state(), ConnectionState::Connected);
        assert_eq!(source.opened(), 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_native_strategy_retries_forever() {
        // テスト項目: Native 戦略は固定間隔で上限なく再試行する
        // given (前提条件):
        let source = Arc::new(FakeEventSource::default());
        let mut config = config(1);
        config.strategy = ReconnectStrategy::Native {
            retry_interval: Duration::from_secs(3),
        };
        let (client, _rx) = TransportClient::new(config, source.clone());

        // when (操作):
        client.connect();
        tokio::time::sleep(Duration::from_secs(31)).await;

        // then (期待する結果):
        assert!(source.opened() >= 10);
        assert_eq!(client.state(), ConnectionState::Reconnecting);
    }
}
