//! Notify Center - 客户端通知中心核心
//!
//! 通知铃铛、通知面板、成就横幅和进度提醒共用的数据与事件模型：
//! Store 持有会话内的通知集合，事件总线做发布/订阅扇出，推送适配器
//! 把后端消息送进 Store，偏好管理器控制类别与渠道开关，弹窗调度器
//! 管理瞬时横幅的自动消失计时。展示层只订阅事件并渲染。

pub mod event_bus;
pub mod logging;
pub mod notification;
pub mod preferences;
pub mod priority;
pub mod scheduler;
pub mod service;
pub mod store;
pub mod transport;

pub use event_bus::{BusEvent, EventBus, Subscription, Topic};
pub use notification::{
    IncomingNotification, IncomingNotificationBuilder, Notification, NotificationAction,
    NotificationKind,
};
pub use preferences::{
    FileBackend, MemoryBackend, NotificationPreferences, PreferenceBackend, PreferenceManager,
    PreferenceUpdate,
};
pub use priority::Priority;
pub use scheduler::{AlertState, EphemeralAlert, EphemeralAlertScheduler};
pub use service::NotificationCenter;
pub use store::{NotificationFilter, NotificationStats, NotificationStore};
pub use transport::{
    BackoffPolicy, ConnectionState, Credentials, HttpPollingSource, TransportAdapter,
    TransportConfig, TransportSource,
};
