//! 类型化事件总线
//!
//! 主题是封闭枚举，payload 形状由 `BusEvent` 定义，避免字符串主题名
//! 拼写错误导致的静默丢失。分发是同步的：`emit` 在调用方的执行轮次内
//! 按订阅顺序依次调用各 handler，不排队。

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use tracing::trace;

use crate::notification::Notification;

/// 事件主题
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    NotificationAdded,
    NotificationRead,
    NotificationsCleared,
    Connected,
    Disconnected,
}

/// 事件及其 payload
#[derive(Debug, Clone)]
pub enum BusEvent {
    /// 新通知入库
    NotificationAdded(Notification),
    /// 通知从未读变为已读
    NotificationRead { id: u64 },
    /// 全部通知已清空
    NotificationsCleared,
    /// 推送通道已连接
    Connected,
    /// 推送通道已断开
    Disconnected,
}

impl BusEvent {
    /// 事件所属主题
    pub fn topic(&self) -> Topic {
        match self {
            BusEvent::NotificationAdded(_) => Topic::NotificationAdded,
            BusEvent::NotificationRead { .. } => Topic::NotificationRead,
            BusEvent::NotificationsCleared => Topic::NotificationsCleared,
            BusEvent::Connected => Topic::Connected,
            BusEvent::Disconnected => Topic::Disconnected,
        }
    }
}

type Handler = Arc<dyn Fn(&BusEvent) + Send + Sync>;

#[derive(Default)]
struct BusInner {
    next_id: u64,
    handlers: HashMap<Topic, Vec<(u64, Handler)>>,
}

/// 事件总线（可克隆，克隆共享同一订阅表）
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Mutex<BusInner>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// 订阅主题，返回可显式退订的句柄
    pub fn subscribe<F>(&self, topic: Topic, handler: F) -> Subscription
    where
        F: Fn(&BusEvent) + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_id;
        inner.next_id += 1;
        inner
            .handlers
            .entry(topic)
            .or_default()
            .push((id, Arc::new(handler)));

        Subscription {
            inner: Arc::downgrade(&self.inner),
            topic,
            id,
        }
    }

    /// 同步派发事件给当前主题的所有 handler
    ///
    /// 迭代前对 handler 列表做快照，并在每次调用前复核订阅仍然有效：
    /// 同一轮派发中被前序 handler 退订的 handler 不会被调用。
    pub fn emit(&self, event: BusEvent) {
        let topic = event.topic();
        let snapshot: Vec<(u64, Handler)> = {
            let inner = self.inner.lock().unwrap();
            match inner.handlers.get(&topic) {
                Some(list) => list.clone(),
                // 无订阅者是 no-op，不是错误
                None => return,
            }
        };

        trace!(?topic, handlers = snapshot.len(), "Dispatching bus event");

        for (id, handler) in snapshot {
            if self.is_subscribed(topic, id) {
                handler(&event);
            }
        }
    }

    /// 当前主题的订阅数量
    pub fn handler_count(&self, topic: Topic) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.handlers.get(&topic).map_or(0, |list| list.len())
    }

    fn is_subscribed(&self, topic: Topic, id: u64) -> bool {
        let inner = self.inner.lock().unwrap();
        inner
            .handlers
            .get(&topic)
            .is_some_and(|list| list.iter().any(|(hid, _)| *hid == id))
    }
}

/// 订阅句柄
///
/// 丢弃句柄不会退订（宿主可以订阅后不保留句柄），只有显式调用
/// `unsubscribe` 才移除 handler。
pub struct Subscription {
    inner: Weak<Mutex<BusInner>>,
    topic: Topic,
    id: u64,
}

impl Subscription {
    /// 退订；总线已销毁时是 no-op
    pub fn unsubscribe(&self) {
        if let Some(inner) = self.inner.upgrade() {
            let mut inner = inner.lock().unwrap();
            if let Some(list) = inner.handlers.get_mut(&self.topic) {
                list.retain(|(id, _)| *id != self.id);
            }
        }
    }
}
