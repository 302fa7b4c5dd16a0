//! 瞬时弹窗调度器 - 成就横幅 / 进度提醒的自动消失计时
//!
//! 定时器句柄由调度器集中持有，展示层不自己管 `setTimeout` 式的散落
//! 计时。每个弹窗的生命周期:
//!
//! ```text
//! show → Visible → (到期 或 手动 dismiss) → Closing → 移除
//! ```
//!
//! 多个弹窗各自独立计时，关闭或到期互不影响。移除是幂等的：到期回调
//! 晚于手动移除到达时不会二次移除或报错。

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::notification::Notification;

/// 关闭过渡窗口（给展示层留出动画时间）
pub const CLOSING_WINDOW: Duration = Duration::from_millis(300);

/// 弹窗状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertState {
    /// 正在展示
    Visible,
    /// 关闭动画中，过渡窗口结束后移除
    Closing,
}

/// 瞬时弹窗
#[derive(Debug, Clone)]
pub struct EphemeralAlert {
    pub id: u64,
    pub notification: Notification,
    pub state: AlertState,
    shown_at: Instant,
    duration: Option<Duration>,
}

impl EphemeralAlert {
    /// 倒计时进度（0.0 - 100.0，随时间单调递增）
    ///
    /// 无自动消失的弹窗返回 `None`。
    pub fn progress(&self) -> Option<f64> {
        self.duration.map(|d| {
            let elapsed = self.shown_at.elapsed().as_secs_f64();
            (elapsed / d.as_secs_f64() * 100.0).min(100.0)
        })
    }

    /// 是否会自动消失
    pub fn auto_dismisses(&self) -> bool {
        self.duration.is_some()
    }
}

struct AlertEntry {
    alert: EphemeralAlert,
    expiry_timer: Option<JoinHandle<()>>,
    closing_timer: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct SchedulerInner {
    next_id: u64,
    alerts: HashMap<u64, AlertEntry>,
}

/// 瞬时弹窗调度器（可克隆，克隆共享同一活动集合）
#[derive(Clone, Default)]
pub struct EphemeralAlertScheduler {
    inner: Arc<Mutex<SchedulerInner>>,
}

impl EphemeralAlertScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// 展示弹窗，返回弹窗 id
    ///
    /// `duration` 为 `None` 或零表示不自动消失，只能手动关闭。
    /// High / Critical 优先级的通知无论请求什么时长都不自动消失。
    pub fn show(&self, notification: Notification, duration: Option<Duration>) -> u64 {
        let effective = match duration {
            Some(d) if d.is_zero() => None,
            Some(_) if notification.priority.suppresses_auto_dismiss() => {
                debug!(
                    priority = %notification.priority,
                    "Auto-dismiss suppressed for high-priority alert"
                );
                None
            }
            other => other,
        };

        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        let id = inner.next_id;

        let mut entry = AlertEntry {
            alert: EphemeralAlert {
                id,
                notification,
                state: AlertState::Visible,
                shown_at: Instant::now(),
                duration: effective,
            },
            expiry_timer: None,
            closing_timer: None,
        };

        if let Some(d) = effective {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let scheduler = self.clone();
                    // 到期时刻以 show 时刻为基准，与 progress 的计算一致；
                    // 计时任务首次被轮询的时间不影响 deadline
                    let deadline = entry.alert.shown_at + d;
                    entry.expiry_timer = Some(handle.spawn(async move {
                        tokio::time::sleep_until(deadline).await;
                        scheduler.begin_close(id);
                    }));
                }
                Err(_) => {
                    warn!(id, "No async runtime, alert will not auto-dismiss");
                }
            }
        }

        debug!(id, auto_dismiss = effective.is_some(), "Alert shown");
        inner.alerts.insert(id, entry);
        id
    }

    /// 手动关闭：无论剩余时间直接进入 Closing
    ///
    /// 已在关闭中或已移除的 id 是 no-op。
    pub fn dismiss(&self, id: u64) {
        self.begin_close(id);
    }

    /// Visible → Closing 转换，取消到期计时并安排过渡后的移除
    fn begin_close(&self, id: u64) {
        let mut inner = self.inner.lock().unwrap();
        let Some(entry) = inner.alerts.get_mut(&id) else {
            return;
        };
        if entry.alert.state == AlertState::Closing {
            return;
        }

        entry.alert.state = AlertState::Closing;
        if let Some(timer) = entry.expiry_timer.take() {
            timer.abort();
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let scheduler = self.clone();
                // 过渡窗口从状态转换时刻起算
                let deadline = Instant::now() + CLOSING_WINDOW;
                entry.closing_timer = Some(handle.spawn(async move {
                    tokio::time::sleep_until(deadline).await;
                    scheduler.remove(id);
                }));
            }
            Err(_) => {
                // 无运行时就跳过过渡窗口直接移除
                drop(inner);
                self.remove(id);
            }
        }
    }

    /// 从活动集合移除（幂等）
    fn remove(&self, id: u64) {
        let removed = self.inner.lock().unwrap().alerts.remove(&id);
        if removed.is_some() {
            debug!(id, "Alert removed");
        }
    }

    /// 查询单个弹窗的倒计时进度
    pub fn progress(&self, id: u64) -> Option<f64> {
        let inner = self.inner.lock().unwrap();
        inner.alerts.get(&id).and_then(|entry| entry.alert.progress())
    }

    /// 当前活动弹窗快照（含关闭动画中的），展示顺序为创建顺序
    pub fn active_alerts(&self) -> Vec<EphemeralAlert> {
        let inner = self.inner.lock().unwrap();
        let mut alerts: Vec<EphemeralAlert> =
            inner.alerts.values().map(|e| e.alert.clone()).collect();
        alerts.sort_by_key(|a| a.id);
        alerts
    }

    /// 关闭并移除所有弹窗，取消全部计时器
    pub fn dismiss_all(&self) {
        let mut inner = self.inner.lock().unwrap();
        for (_, entry) in inner.alerts.drain() {
            if let Some(timer) = entry.expiry_timer {
                timer.abort();
            }
            if let Some(timer) = entry.closing_timer {
                timer.abort();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
