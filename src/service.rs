//! 组合根 - 显式构造的通知中心实例
//!
//! 不做隐式全局单例：宿主创建实例、调用 `initialize`、把各组件注入
//! 消费方，测试之间不会互相污染，生命周期一目了然。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use tracing::info;

use crate::event_bus::{BusEvent, EventBus, Subscription, Topic};
use crate::notification::NotificationKind;
use crate::preferences::{PreferenceBackend, PreferenceManager};
use crate::scheduler::EphemeralAlertScheduler;
use crate::store::NotificationStore;
use crate::transport::{TransportAdapter, TransportSource};

/// 瞬时弹窗默认展示时长
const DEFAULT_ALERT_DURATION: Duration = Duration::from_secs(5);

/// 通知中心
pub struct NotificationCenter {
    bus: EventBus,
    store: Arc<NotificationStore>,
    preferences: Arc<PreferenceManager>,
    scheduler: EphemeralAlertScheduler,
    subscriptions: Mutex<Vec<Subscription>>,
    initialized: AtomicBool,
    alert_duration: Duration,
}

impl NotificationCenter {
    pub fn new(backend: Box<dyn PreferenceBackend>) -> Self {
        let bus = EventBus::new();
        Self {
            store: Arc::new(NotificationStore::new(bus.clone())),
            preferences: Arc::new(PreferenceManager::new(backend)),
            scheduler: EphemeralAlertScheduler::new(),
            subscriptions: Mutex::new(Vec::new()),
            initialized: AtomicBool::new(false),
            bus,
            alert_duration: DEFAULT_ALERT_DURATION,
        }
    }

    /// 自定义弹窗展示时长
    pub fn with_alert_duration(mut self, duration: Duration) -> Self {
        self.alert_duration = duration;
        self
    }

    /// 加载偏好并接线弹窗订阅
    ///
    /// 成就和目标进度通知入库时自动弹出瞬时横幅。重复调用是 no-op。
    pub fn initialize(&self) -> Result<()> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        // 加载失败时回退标记，让宿主可以重试
        if let Err(e) = self.preferences.load() {
            self.initialized.store(false, Ordering::SeqCst);
            return Err(e);
        }

        let scheduler = self.scheduler.clone();
        let duration = self.alert_duration;
        let subscription = self.bus.subscribe(Topic::NotificationAdded, move |event| {
            if let BusEvent::NotificationAdded(n) = event {
                if matches!(
                    n.kind,
                    NotificationKind::Achievement | NotificationKind::GoalProgress
                ) {
                    scheduler.show(n.clone(), Some(duration));
                }
            }
        });
        self.subscriptions.lock().unwrap().push(subscription);

        info!("Notification center initialized");
        Ok(())
    }

    /// 构建接到本实例的推送适配器
    pub fn transport(&self, source: Arc<dyn TransportSource>) -> TransportAdapter {
        TransportAdapter::new(
            source,
            self.store.clone(),
            self.preferences.clone(),
            self.bus.clone(),
        )
    }

    /// 退订、清掉所有弹窗并允许再次 initialize
    pub fn shutdown(&self) {
        for subscription in self.subscriptions.lock().unwrap().drain(..) {
            subscription.unsubscribe();
        }
        self.scheduler.dismiss_all();
        self.initialized.store(false, Ordering::SeqCst);
        info!("Notification center shut down");
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn store(&self) -> &NotificationStore {
        &self.store
    }

    pub fn preferences(&self) -> &PreferenceManager {
        &self.preferences
    }

    pub fn scheduler(&self) -> &EphemeralAlertScheduler {
        &self.scheduler
    }
}
