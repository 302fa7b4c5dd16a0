//! 推送通道适配器 - 把后端推送的通知送进 Store
//!
//! 连接状态机: `Disconnected → Connecting → Connected → Disconnected`
//! （网络丢失）`→ Connecting`（重试）...
//!
//! 入站 payload 在到达 Store 之前完成校验：缺少必填字段的消息记一条
//! 诊断日志后丢弃，一条坏消息不会破坏 Store 状态。连接失败只表现为
//! `Disconnected` 事件，从不向 UI 抛异常，掉线后缓存的通知仍然可用。

pub mod backoff;
pub mod http;

pub use backoff::BackoffPolicy;
pub use http::HttpPollingSource;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::event_bus::{BusEvent, EventBus};
use crate::notification::IncomingNotification;
use crate::preferences::PreferenceManager;
use crate::store::NotificationStore;

/// 连接凭据
#[derive(Debug, Clone)]
pub struct Credentials {
    pub endpoint: String,
    pub token: Option<String>,
}

impl Credentials {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            token: None,
        }
    }

    /// 设置 bearer token（链式调用）
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

/// 连接状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// 底层推送通道抽象（WebSocket 或轮询）
pub trait TransportSource: Send + Sync {
    /// 建立底层通道
    fn connect(&self, credentials: &Credentials) -> Result<()>;
    /// 拉取一批待投递的原始 payload
    fn fetch(&self) -> Result<Vec<Value>>;
    /// 关闭底层通道
    fn disconnect(&self);
}

/// 适配器配置
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// 轮询间隔
    pub poll_interval: Duration,
    /// 重连退避策略
    pub backoff: BackoffPolicy,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(3),
            backoff: BackoffPolicy::default(),
        }
    }
}

/// 推送通道适配器（可克隆，克隆共享同一连接）
#[derive(Clone)]
pub struct TransportAdapter {
    source: Arc<dyn TransportSource>,
    store: Arc<NotificationStore>,
    preferences: Arc<PreferenceManager>,
    bus: EventBus,
    config: Arc<TransportConfig>,
    state: Arc<Mutex<ConnectionState>>,
    /// 连接代数；递增使旧的轮询任务失效
    epoch: Arc<AtomicU64>,
}

impl TransportAdapter {
    pub fn new(
        source: Arc<dyn TransportSource>,
        store: Arc<NotificationStore>,
        preferences: Arc<PreferenceManager>,
        bus: EventBus,
    ) -> Self {
        Self {
            source,
            store,
            preferences,
            bus,
            config: Arc::new(TransportConfig::default()),
            state: Arc::new(Mutex::new(ConnectionState::Disconnected)),
            epoch: Arc::new(AtomicU64::new(0)),
        }
    }

    /// 自定义轮询间隔与退避策略
    pub fn with_config(mut self, config: TransportConfig) -> Self {
        self.config = Arc::new(config);
        self
    }

    /// 当前连接状态（供连接指示点渲染）
    pub fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap()
    }

    /// 发起连接并在后台任务中驱动轮询
    ///
    /// 已连接或连接中时是幂等 no-op，不会建立重复通道。
    /// 需要在 tokio 运行时内调用，否则返回错误且状态保持 `Disconnected`。
    pub fn connect(&self, credentials: Credentials) -> Result<()> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|_| anyhow!("transport connect requires a tokio runtime"))?;

        {
            let mut state = self.state.lock().unwrap();
            if *state != ConnectionState::Disconnected {
                debug!(state = ?*state, "connect called while channel active, ignoring");
                return Ok(());
            }
            *state = ConnectionState::Connecting;
        }

        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let adapter = self.clone();
        handle.spawn(async move {
            adapter.run(credentials, epoch).await;
        });
        Ok(())
    }

    /// 停止轮询并关闭底层通道
    pub fn shutdown(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.source.disconnect();
        self.set_state(ConnectionState::Disconnected);
    }

    fn cancelled(&self, epoch: u64) -> bool {
        self.epoch.load(Ordering::SeqCst) != epoch
    }

    async fn run(self, credentials: Credentials, epoch: u64) {
        let mut attempt: u32 = 0;

        loop {
            if self.cancelled(epoch) {
                return;
            }

            let source = self.source.clone();
            let creds = credentials.clone();
            let connected = tokio::task::spawn_blocking(move || source.connect(&creds)).await;

            match connected {
                Ok(Ok(())) => {
                    attempt = 0;
                    info!(endpoint = %credentials.endpoint, "Transport connected");
                    self.set_state(ConnectionState::Connected);

                    self.poll_loop(epoch).await;
                    if self.cancelled(epoch) {
                        return;
                    }

                    // 意外掉线：上报后进入重试
                    self.set_state(ConnectionState::Disconnected);
                    self.set_state(ConnectionState::Connecting);
                }
                Ok(Err(e)) => {
                    warn!(error = %e, attempt, "Transport connect failed");
                }
                Err(e) => {
                    warn!(error = %e, "Transport connect task failed");
                }
            }

            if self.config.backoff.exhausted(attempt) {
                warn!(
                    retries = attempt,
                    "Transport retry budget exhausted, staying offline"
                );
                self.set_state(ConnectionState::Disconnected);
                return;
            }

            tokio::time::sleep(self.config.backoff.delay(attempt)).await;
            attempt += 1;
        }
    }

    /// 轮询循环；fetch 出错时返回，由外层走重连
    async fn poll_loop(&self, epoch: u64) {
        loop {
            if self.cancelled(epoch) {
                return;
            }

            let source = self.source.clone();
            match tokio::task::spawn_blocking(move || source.fetch()).await {
                Ok(Ok(payloads)) => {
                    for payload in payloads {
                        self.ingest(payload);
                    }
                }
                Ok(Err(e)) => {
                    warn!(error = %e, "Transport fetch failed, reconnecting");
                    return;
                }
                Err(e) => {
                    warn!(error = %e, "Transport fetch task failed, reconnecting");
                    return;
                }
            }

            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    /// 校验并入库一条原始 payload
    fn ingest(&self, payload: Value) {
        let incoming: IncomingNotification = match serde_json::from_value(payload) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "Dropping malformed notification payload");
                return;
            }
        };

        if !self.preferences.current().category_enabled(incoming.kind) {
            debug!(kind = %incoming.kind, "Notification category disabled, dropping");
            return;
        }

        self.store.add(incoming);
    }

    fn set_state(&self, new: ConnectionState) {
        let changed = {
            let mut state = self.state.lock().unwrap();
            if *state == new {
                false
            } else {
                *state = new;
                true
            }
        };
        if !changed {
            return;
        }

        match new {
            ConnectionState::Connected => self.bus.emit(BusEvent::Connected),
            ConnectionState::Disconnected => self.bus.emit(BusEvent::Disconnected),
            ConnectionState::Connecting => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_bus::Topic;
    use crate::preferences::{MemoryBackend, PreferenceUpdate};
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicU32;

    /// 脚本化的测试源
    struct MockSource {
        /// 前 N 次 connect 失败
        connect_failures: AtomicU32,
        connects: AtomicU32,
        batches: Mutex<VecDeque<Result<Vec<Value>>>>,
    }

    impl MockSource {
        fn new(connect_failures: u32, batches: Vec<Result<Vec<Value>>>) -> Self {
            Self {
                connect_failures: AtomicU32::new(connect_failures),
                connects: AtomicU32::new(0),
                batches: Mutex::new(batches.into_iter().collect()),
            }
        }

        fn connect_count(&self) -> u32 {
            self.connects.load(Ordering::SeqCst)
        }
    }

    impl TransportSource for MockSource {
        fn connect(&self, _credentials: &Credentials) -> Result<()> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            let remaining = self.connect_failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.connect_failures.fetch_sub(1, Ordering::SeqCst);
                anyhow::bail!("connection refused");
            }
            Ok(())
        }

        fn fetch(&self) -> Result<Vec<Value>> {
            match self.batches.lock().unwrap().pop_front() {
                Some(batch) => batch,
                None => Ok(Vec::new()),
            }
        }

        fn disconnect(&self) {}
    }

    struct Fixture {
        bus: EventBus,
        store: Arc<NotificationStore>,
        preferences: Arc<PreferenceManager>,
        connected: Arc<AtomicU32>,
        disconnected: Arc<AtomicU32>,
    }

    fn fixture() -> Fixture {
        let bus = EventBus::new();
        let connected = Arc::new(AtomicU32::new(0));
        let disconnected = Arc::new(AtomicU32::new(0));
        {
            let connected = connected.clone();
            bus.subscribe(Topic::Connected, move |_| {
                connected.fetch_add(1, Ordering::SeqCst);
            });
        }
        {
            let disconnected = disconnected.clone();
            bus.subscribe(Topic::Disconnected, move |_| {
                disconnected.fetch_add(1, Ordering::SeqCst);
            });
        }

        let store = Arc::new(NotificationStore::new(bus.clone()));
        let preferences = Arc::new(PreferenceManager::new(Box::new(MemoryBackend::new())));
        preferences.load().unwrap();

        Fixture {
            bus,
            store,
            preferences,
            connected,
            disconnected,
        }
    }

    fn fast_config(max_retries: u32) -> TransportConfig {
        TransportConfig {
            poll_interval: Duration::from_millis(10),
            backoff: BackoffPolicy {
                max_retries,
                initial_backoff_ms: 5,
                max_backoff_ms: 20,
                backoff_multiplier: 2.0,
            },
        }
    }

    fn adapter(f: &Fixture, source: Arc<MockSource>, max_retries: u32) -> TransportAdapter {
        TransportAdapter::new(
            source,
            f.store.clone(),
            f.preferences.clone(),
            f.bus.clone(),
        )
        .with_config(fast_config(max_retries))
    }

    fn valid_payload(title: &str) -> Value {
        serde_json::json!({
            "kind": "achievement",
            "title": title,
            "message": "well done"
        })
    }

    #[tokio::test]
    async fn test_connect_ingests_pushed_notifications() {
        let f = fixture();
        let source = Arc::new(MockSource::new(
            0,
            vec![Ok(vec![valid_payload("a"), valid_payload("b")])],
        ));
        let adapter = adapter(&f, source, 2);

        adapter.connect(Credentials::new("http://localhost/notifications")).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(adapter.state(), ConnectionState::Connected);
        assert_eq!(f.connected.load(Ordering::SeqCst), 1);
        assert_eq!(f.store.len(), 2);
        assert_eq!(f.store.get_all()[0].title, "b");

        adapter.shutdown();
    }

    #[tokio::test]
    async fn test_connect_is_idempotent_while_active() {
        let f = fixture();
        let source = Arc::new(MockSource::new(0, vec![]));
        let adapter = adapter(&f, source.clone(), 2);

        adapter.connect(Credentials::new("http://localhost")).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        // 已连接时再调用不会建立重复通道
        adapter.connect(Credentials::new("http://localhost")).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(source.connect_count(), 1);
        assert_eq!(f.connected.load(Ordering::SeqCst), 1);

        adapter.shutdown();
    }

    #[tokio::test]
    async fn test_malformed_payload_dropped_before_store() {
        let f = fixture();
        let source = Arc::new(MockSource::new(
            0,
            vec![Ok(vec![
                serde_json::json!({"kind": "achievement"}),
                serde_json::json!("not even an object"),
                valid_payload("good"),
            ])],
        ));
        let adapter = adapter(&f, source, 2);

        adapter.connect(Credentials::new("http://localhost")).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        // 坏消息被丢弃，好消息正常入库
        assert_eq!(f.store.len(), 1);
        assert_eq!(f.store.get_all()[0].title, "good");

        adapter.shutdown();
    }

    #[tokio::test]
    async fn test_disabled_category_dropped_before_store() {
        let f = fixture();
        f.preferences
            .update(PreferenceUpdate {
                achievements: Some(false),
                ..Default::default()
            })
            .unwrap();

        let source = Arc::new(MockSource::new(0, vec![Ok(vec![valid_payload("muted")])]));
        let adapter = adapter(&f, source, 2);

        adapter.connect(Credentials::new("http://localhost")).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(f.store.is_empty());

        adapter.shutdown();
    }

    #[tokio::test]
    async fn test_fetch_failure_triggers_reconnect() {
        let f = fixture();
        let source = Arc::new(MockSource::new(
            0,
            vec![
                Ok(vec![valid_payload("before")]),
                Err(anyhow::anyhow!("socket closed")),
                Ok(vec![valid_payload("after")]),
            ],
        ));
        let adapter = adapter(&f, source.clone(), 3);

        adapter.connect(Credentials::new("http://localhost")).unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        // 掉线上报过一次，然后重连成功并继续收消息
        assert!(f.disconnected.load(Ordering::SeqCst) >= 1);
        assert_eq!(f.connected.load(Ordering::SeqCst), 2);
        assert!(source.connect_count() >= 2);
        assert_eq!(f.store.len(), 2);
        assert_eq!(adapter.state(), ConnectionState::Connected);

        adapter.shutdown();
    }

    #[tokio::test]
    async fn test_retry_budget_exhaustion_reports_disconnected() {
        let f = fixture();
        let source = Arc::new(MockSource::new(u32::MAX, vec![]));
        let adapter = adapter(&f, source.clone(), 2);

        adapter.connect(Credentials::new("http://localhost")).unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(adapter.state(), ConnectionState::Disconnected);
        assert_eq!(f.disconnected.load(Ordering::SeqCst), 1);
        assert_eq!(f.connected.load(Ordering::SeqCst), 0);
        // 初次尝试 + 2 次重试
        assert_eq!(source.connect_count(), 3);
    }

    #[test]
    fn test_connect_outside_runtime_errors_without_panic() {
        let f = fixture();
        let source = Arc::new(MockSource::new(0, vec![]));
        let adapter = adapter(&f, source.clone(), 2);

        let result = adapter.connect(Credentials::new("http://localhost"));
        assert!(result.is_err());
        // 状态未被污染，进入运行时后仍可正常连接
        assert_eq!(adapter.state(), ConnectionState::Disconnected);
        assert_eq!(source.connect_count(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_stops_polling() {
        let f = fixture();
        let source = Arc::new(MockSource::new(0, vec![]));
        let adapter = adapter(&f, source, 2);

        adapter.connect(Credentials::new("http://localhost")).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(adapter.state(), ConnectionState::Connected);

        adapter.shutdown();
        assert_eq!(adapter.state(), ConnectionState::Disconnected);
        assert_eq!(f.disconnected.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(50)).await;
        // 停止后可以重新 connect
        adapter.connect(Credentials::new("http://localhost")).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(adapter.state(), ConnectionState::Connected);
        adapter.shutdown();
    }
}
