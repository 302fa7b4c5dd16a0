//! 统一通知数据结构
//!
//! 定义 Store、Transport 和 Scheduler 共用的通知记录，解决各 UI 组件
//! 数据格式不一致问题。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::priority::Priority;

/// 通知类别（决定图标和路由）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// 成就解锁
    Achievement,
    /// 目标进度
    GoalProgress,
    /// 系统提醒
    SystemAlert,
    /// 用户动态
    UserActivity,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Achievement => "achievement",
            NotificationKind::GoalProgress => "goal_progress",
            NotificationKind::SystemAlert => "system_alert",
            NotificationKind::UserActivity => "user_activity",
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 用户可触发的操作描述符（副作用由展示层执行）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationAction {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

/// 通知记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    /// 单调递增 ID，由 Store 分配，创建后不可变
    pub id: u64,
    /// 通知类别
    pub kind: NotificationKind,
    /// 标题
    pub title: String,
    /// 正文
    pub message: String,
    /// 优先级
    #[serde(default)]
    pub priority: Priority,
    /// 创建时间，不可变
    pub timestamp: DateTime<Utc>,
    /// 已读标记（自动转换只允许 false → true）
    #[serde(default)]
    pub read: bool,
    /// 操作列表
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<NotificationAction>,
    /// 类别相关的不透明 payload（如目标快照、成就描述）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// 后端推送的通知 payload（`id`/`timestamp` 缺失时由客户端分配）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingNotification {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<NotificationAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl IncomingNotification {
    /// 创建新的 payload
    pub fn new(
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            kind,
            title: title.into(),
            message: message.into(),
            priority: Priority::Normal,
            timestamp: None,
            actions: Vec::new(),
            data: None,
        }
    }

    /// 设置优先级（链式调用）
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// 设置 payload（链式调用）
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// 添加操作（链式调用）
    pub fn with_action(mut self, action: NotificationAction) -> Self {
        self.actions.push(action);
        self
    }

    /// 设置时间戳（链式调用）
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// 便捷构造函数
impl IncomingNotification {
    /// 创建成就通知
    pub fn achievement(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NotificationKind::Achievement, title, message)
    }

    /// 创建目标进度通知
    pub fn goal_progress(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NotificationKind::GoalProgress, title, message)
    }

    /// 创建系统提醒
    pub fn system_alert(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NotificationKind::SystemAlert, title, message)
    }

    /// 创建用户动态通知
    pub fn user_activity(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NotificationKind::UserActivity, title, message)
    }
}

/// 通知构建器
#[derive(Debug, Default)]
pub struct IncomingNotificationBuilder {
    kind: Option<NotificationKind>,
    title: Option<String>,
    message: Option<String>,
    priority: Option<Priority>,
    timestamp: Option<DateTime<Utc>>,
    actions: Vec<NotificationAction>,
    data: Option<Value>,
}

impl IncomingNotificationBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kind(mut self, kind: NotificationKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn action(mut self, action: NotificationAction) -> Self {
        self.actions.push(action);
        self
    }

    pub fn data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// 构建 payload
    pub fn build(self) -> Result<IncomingNotification, &'static str> {
        let kind = self.kind.ok_or("kind is required")?;
        let title = self.title.ok_or("title is required")?;
        let message = self.message.ok_or("message is required")?;

        Ok(IncomingNotification {
            id: None,
            kind,
            title,
            message,
            priority: self.priority.unwrap_or_default(),
            timestamp: self.timestamp,
            actions: self.actions,
            data: self.data,
        })
    }
}
