//! 通知存储 - 会话内有序通知集合
//!
//! 所有变更只允许通过本模块的方法进行，外部代码不得直接修改底层集合。
//! 每次变更后统计信息立即重算，跨变更边界不缓存过期值。

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;
use serde::Serialize;
use tracing::debug;

use crate::event_bus::{BusEvent, EventBus};
use crate::notification::{IncomingNotification, Notification, NotificationKind};

/// 保留上限：超过后裁剪到 `KEEP_AFTER_PRUNE` 条
const MAX_NOTIFICATIONS: usize = 200;
const KEEP_AFTER_PRUNE: usize = 100;

/// 查询过滤条件
#[derive(Debug, Clone, Default)]
pub struct NotificationFilter {
    /// 只返回未读
    pub unread_only: bool,
    /// 只返回指定类别
    pub kind: Option<NotificationKind>,
}

impl NotificationFilter {
    /// 只看未读
    pub fn unread() -> Self {
        Self {
            unread_only: true,
            kind: None,
        }
    }

    /// 只看指定类别
    pub fn of_kind(kind: NotificationKind) -> Self {
        Self {
            unread_only: false,
            kind: Some(kind),
        }
    }
}

/// 统计信息（调用时刻的精确快照）
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NotificationStats {
    pub total: usize,
    pub unread: usize,
    pub by_kind: HashMap<NotificationKind, usize>,
}

struct StoreInner {
    /// 最新在前
    items: Vec<Notification>,
    next_id: u64,
    stats: NotificationStats,
}

/// 通知存储
///
/// 每个会话一个实例，由组合根显式创建并注入消费方。
pub struct NotificationStore {
    inner: Mutex<StoreInner>,
    bus: EventBus,
    max_retained: usize,
    keep_after_prune: usize,
}

impl NotificationStore {
    pub fn new(bus: EventBus) -> Self {
        Self::with_retention(bus, MAX_NOTIFICATIONS, KEEP_AFTER_PRUNE)
    }

    /// 自定义保留窗口
    pub fn with_retention(bus: EventBus, max_retained: usize, keep_after_prune: usize) -> Self {
        Self {
            inner: Mutex::new(StoreInner {
                items: Vec::new(),
                next_id: 1,
                stats: NotificationStats::default(),
            }),
            bus,
            max_retained,
            keep_after_prune: keep_after_prune.min(max_retained),
        }
    }

    /// 入库新通知
    ///
    /// `id`/`timestamp` 缺失时在此分配；插入头部（最新在前）。入库后
    /// 发出 `NotificationAdded`。超出保留上限时裁掉最旧的记录。
    pub fn add(&self, incoming: IncomingNotification) -> Notification {
        let notification = {
            let mut guard = self.inner.lock().unwrap();
            let inner = &mut *guard;

            let id = match incoming.id {
                // 客户端提供的 id 已被占用或顶到 u64 上限时重新分配，
                // 保证唯一性且计数器不溢出
                Some(id) if id < u64::MAX && !inner.items.iter().any(|n| n.id == id) => {
                    inner.next_id = inner.next_id.max(id + 1);
                    id
                }
                _ => {
                    let id = inner.next_id;
                    inner.next_id = inner.next_id.saturating_add(1);
                    id
                }
            };

            let notification = Notification {
                id,
                kind: incoming.kind,
                title: incoming.title,
                message: incoming.message,
                priority: incoming.priority,
                timestamp: incoming.timestamp.unwrap_or_else(Utc::now),
                read: false,
                actions: incoming.actions,
                data: incoming.data,
            };

            inner.items.insert(0, notification.clone());

            if inner.items.len() > self.max_retained {
                let keep = self.keep_after_prune;
                debug!(
                    dropped = inner.items.len() - keep,
                    "Pruning notification store to retention window"
                );
                inner.items.truncate(keep);
            }
            inner.stats = Self::compute_stats(&inner.items);

            notification
        };

        self.bus.emit(BusEvent::NotificationAdded(notification.clone()));
        notification
    }

    /// 查询快照（克隆，不是底层集合的活引用），最新在前
    pub fn get_all(&self) -> Vec<Notification> {
        self.get_filtered(&NotificationFilter::default())
    }

    /// 按条件查询快照，保持与 `get_all` 相同的相对顺序
    pub fn get_filtered(&self, filter: &NotificationFilter) -> Vec<Notification> {
        let inner = self.inner.lock().unwrap();
        inner
            .items
            .iter()
            .filter(|n| !filter.unread_only || !n.read)
            .filter(|n| filter.kind.map_or(true, |kind| n.kind == kind))
            .cloned()
            .collect()
    }

    /// 标记为已读
    ///
    /// 幂等：已读或不存在的 id 都是 no-op（可能已被其他端清除，按良性
    /// 竞争处理）。仅在 false → true 转换时发出 `NotificationRead`。
    pub fn mark_as_read(&self, id: u64) -> bool {
        let transitioned = {
            let mut guard = self.inner.lock().unwrap();
            let inner = &mut *guard;
            match inner.items.iter_mut().find(|n| n.id == id) {
                Some(n) if !n.read => {
                    n.read = true;
                    inner.stats.unread -= 1;
                    true
                }
                Some(_) => false,
                None => {
                    debug!(id, "mark_as_read on unknown notification, ignoring");
                    false
                }
            }
        };

        if transitioned {
            self.bus.emit(BusEvent::NotificationRead { id });
        }
        transitioned
    }

    /// 手动标记回未读
    ///
    /// 展示层提供的显式切换操作，与自动的单向已读转换区分开。
    /// 不发事件，展示层自行重读统计。
    pub fn mark_as_unread(&self, id: u64) -> bool {
        let mut guard = self.inner.lock().unwrap();
        let inner = &mut *guard;
        match inner.items.iter_mut().find(|n| n.id == id) {
            Some(n) if n.read => {
                n.read = false;
                inner.stats.unread += 1;
                true
            }
            _ => false,
        }
    }

    /// 全部标记为已读，每个实际转换各发一次 `NotificationRead`
    pub fn mark_all_read(&self) -> usize {
        let transitioned: Vec<u64> = {
            let mut guard = self.inner.lock().unwrap();
            let inner = &mut *guard;
            let ids: Vec<u64> = inner
                .items
                .iter_mut()
                .filter(|n| !n.read)
                .map(|n| {
                    n.read = true;
                    n.id
                })
                .collect();
            inner.stats.unread = 0;
            ids
        };

        for id in &transitioned {
            self.bus.emit(BusEvent::NotificationRead { id: *id });
        }
        transitioned.len()
    }

    /// 清空全部通知（不可撤销），发出 `NotificationsCleared`
    pub fn clear_all(&self) {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.items.clear();
            inner.stats = NotificationStats::default();
        }
        self.bus.emit(BusEvent::NotificationsCleared);
    }

    /// 当前统计信息
    pub fn get_stats(&self) -> NotificationStats {
        self.inner.lock().unwrap().stats.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn compute_stats(items: &[Notification]) -> NotificationStats {
        let mut stats = NotificationStats {
            total: items.len(),
            ..Default::default()
        };
        for n in items {
            if !n.read {
                stats.unread += 1;
            }
            *stats.by_kind.entry(n.kind).or_insert(0) += 1;
        }
        stats
    }
}
