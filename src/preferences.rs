//! 用户通知偏好 - 类别开关与投递渠道开关
//!
//! 持久化交给 `PreferenceBackend` 协作方（设置 API 或本地文件）。
//! `update` 先持久化、成功后才提交内存状态：持久化失败时内存保持
//! 最后一次已知的有效值，错误向调用方传播，不静默吞掉。

use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::notification::NotificationKind;

/// 类别开关
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryPreferences {
    pub achievements: bool,
    pub goal_progress: bool,
    pub system_alerts: bool,
    pub social_activity: bool,
}

impl Default for CategoryPreferences {
    /// 默认全部开启
    fn default() -> Self {
        Self {
            achievements: true,
            goal_progress: true,
            system_alerts: true,
            social_activity: true,
        }
    }
}

/// 投递渠道开关
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelPreferences {
    pub desktop: bool,
    pub sound: bool,
    pub push: bool,
    pub email_digest: bool,
}

impl Default for ChannelPreferences {
    /// 默认全部开启
    fn default() -> Self {
        Self {
            desktop: true,
            sound: true,
            push: true,
            email_digest: true,
        }
    }
}

/// 通知偏好
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationPreferences {
    #[serde(default)]
    pub categories: CategoryPreferences,
    #[serde(default)]
    pub channels: ChannelPreferences,
}

impl NotificationPreferences {
    /// 指定类别的通知是否开启
    pub fn category_enabled(&self, kind: NotificationKind) -> bool {
        match kind {
            NotificationKind::Achievement => self.categories.achievements,
            NotificationKind::GoalProgress => self.categories.goal_progress,
            NotificationKind::SystemAlert => self.categories.system_alerts,
            NotificationKind::UserActivity => self.categories.social_activity,
        }
    }
}

/// 部分更新（`None` 字段保持原值）
#[derive(Debug, Clone, Default)]
pub struct PreferenceUpdate {
    pub achievements: Option<bool>,
    pub goal_progress: Option<bool>,
    pub system_alerts: Option<bool>,
    pub social_activity: Option<bool>,
    pub desktop: Option<bool>,
    pub sound: Option<bool>,
    pub push: Option<bool>,
    pub email_digest: Option<bool>,
}

impl PreferenceUpdate {
    fn apply(&self, prefs: &mut NotificationPreferences) {
        if let Some(v) = self.achievements {
            prefs.categories.achievements = v;
        }
        if let Some(v) = self.goal_progress {
            prefs.categories.goal_progress = v;
        }
        if let Some(v) = self.system_alerts {
            prefs.categories.system_alerts = v;
        }
        if let Some(v) = self.social_activity {
            prefs.categories.social_activity = v;
        }
        if let Some(v) = self.desktop {
            prefs.channels.desktop = v;
        }
        if let Some(v) = self.sound {
            prefs.channels.sound = v;
        }
        if let Some(v) = self.push {
            prefs.channels.push = v;
        }
        if let Some(v) = self.email_digest {
            prefs.channels.email_digest = v;
        }
    }
}

/// 持久化协作方
pub trait PreferenceBackend: Send + Sync {
    /// 读取已存偏好；从未保存过时返回 `Ok(None)`
    fn load(&self) -> Result<Option<NotificationPreferences>>;
    /// 保存偏好
    fn save(&self, prefs: &NotificationPreferences) -> Result<()>;
}

/// 本地 JSON 文件后端
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    /// 默认存储路径下的后端
    pub fn new() -> Self {
        Self {
            path: Self::default_path(),
        }
    }

    /// 自定义路径（测试用）
    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    /// 获取默认存储文件路径
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("notify-center")
            .join("preferences.json")
    }
}

impl Default for FileBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl PreferenceBackend for FileBackend {
    fn load(&self) -> Result<Option<NotificationPreferences>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("reading {}", self.path.display()))?;

        match serde_json::from_str(&content) {
            Ok(prefs) => Ok(Some(prefs)),
            Err(e) => {
                // 文件损坏按未保存处理，回到默认值
                warn!(path = %self.path.display(), error = %e, "Preference file corrupted, using defaults");
                Ok(None)
            }
        }
    }

    fn save(&self, prefs: &NotificationPreferences) -> Result<()> {
        use fs2::FileExt;
        use std::io::Write;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)?;

        file.lock_exclusive()?;
        let mut file = file;
        file.write_all(serde_json::to_string_pretty(prefs)?.as_bytes())?;
        file.unlock()?;

        Ok(())
    }
}

/// 内存后端（无持久化宿主或测试环境用）
#[derive(Default)]
pub struct MemoryBackend {
    stored: Mutex<Option<NotificationPreferences>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceBackend for MemoryBackend {
    fn load(&self) -> Result<Option<NotificationPreferences>> {
        Ok(self.stored.lock().unwrap().clone())
    }

    fn save(&self, prefs: &NotificationPreferences) -> Result<()> {
        *self.stored.lock().unwrap() = Some(prefs.clone());
        Ok(())
    }
}

/// 偏好管理器
///
/// 单实例共享；并发 `update` 以内部锁串行化，按 key 后写覆盖。
pub struct PreferenceManager {
    backend: Box<dyn PreferenceBackend>,
    current: Mutex<NotificationPreferences>,
}

impl PreferenceManager {
    pub fn new(backend: Box<dyn PreferenceBackend>) -> Self {
        Self {
            backend,
            current: Mutex::new(NotificationPreferences::default()),
        }
    }

    /// 加载已存偏好，没有则用默认值
    pub fn load(&self) -> Result<NotificationPreferences> {
        let prefs = self.backend.load()?.unwrap_or_default();
        debug!(?prefs, "Loaded notification preferences");
        *self.current.lock().unwrap() = prefs.clone();
        Ok(prefs)
    }

    /// 当前内存中的偏好
    pub fn current(&self) -> NotificationPreferences {
        self.current.lock().unwrap().clone()
    }

    /// 合并部分更新并持久化
    ///
    /// 先保存后提交：保存失败时内存状态不变，错误返回给调用方。
    pub fn update(&self, update: PreferenceUpdate) -> Result<NotificationPreferences> {
        let mut current = self.current.lock().unwrap();

        let mut candidate = current.clone();
        update.apply(&mut candidate);

        self.backend
            .save(&candidate)
            .context("persisting notification preferences")?;

        *current = candidate.clone();
        Ok(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    /// 保存总是失败的后端，用于验证回滚
    struct FailingBackend;

    impl PreferenceBackend for FailingBackend {
        fn load(&self) -> Result<Option<NotificationPreferences>> {
            Ok(None)
        }

        fn save(&self, _prefs: &NotificationPreferences) -> Result<()> {
            Err(anyhow!("settings API rejected the update"))
        }
    }

    #[test]
    fn test_defaults_all_true() {
        let prefs = NotificationPreferences::default();
        assert!(prefs.categories.achievements);
        assert!(prefs.categories.goal_progress);
        assert!(prefs.categories.system_alerts);
        assert!(prefs.categories.social_activity);
        assert!(prefs.channels.desktop);
        assert!(prefs.channels.sound);
        assert!(prefs.channels.push);
        assert!(prefs.channels.email_digest);
    }

    #[test]
    fn test_load_returns_defaults_when_unsaved() {
        let manager = PreferenceManager::new(Box::new(MemoryBackend::new()));
        let prefs = manager.load().unwrap();
        assert_eq!(prefs, NotificationPreferences::default());
    }

    #[test]
    fn test_update_merges_and_persists() {
        let manager = PreferenceManager::new(Box::new(MemoryBackend::new()));
        manager.load().unwrap();

        let updated = manager
            .update(PreferenceUpdate {
                achievements: Some(false),
                sound: Some(false),
                ..Default::default()
            })
            .unwrap();

        assert!(!updated.categories.achievements);
        assert!(!updated.channels.sound);
        // 未提及的字段保持原值
        assert!(updated.categories.goal_progress);
        assert!(updated.channels.desktop);
        assert_eq!(manager.current(), updated);
    }

    #[test]
    fn test_update_rolls_back_on_persistence_failure() {
        let manager = PreferenceManager::new(Box::new(FailingBackend));
        manager.load().unwrap();
        let before = manager.current();

        let result = manager.update(PreferenceUpdate {
            system_alerts: Some(false),
            ..Default::default()
        });

        assert!(result.is_err());
        // 内存状态回到更新前的值
        assert_eq!(manager.current(), before);
        assert!(manager.current().categories.system_alerts);
    }

    #[test]
    fn test_category_enabled_mapping() {
        let mut prefs = NotificationPreferences::default();
        prefs.categories.goal_progress = false;

        assert!(prefs.category_enabled(NotificationKind::Achievement));
        assert!(!prefs.category_enabled(NotificationKind::GoalProgress));
        assert!(prefs.category_enabled(NotificationKind::SystemAlert));
        assert!(prefs.category_enabled(NotificationKind::UserActivity));
    }

    #[test]
    fn test_file_backend_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::with_path(dir.path().join("preferences.json"));

        assert!(backend.load().unwrap().is_none());

        let mut prefs = NotificationPreferences::default();
        prefs.channels.email_digest = false;
        backend.save(&prefs).unwrap();

        let loaded = backend.load().unwrap().unwrap();
        assert_eq!(loaded, prefs);
    }

    #[test]
    fn test_file_backend_corrupted_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preferences.json");
        std::fs::write(&path, "{not json").unwrap();

        let backend = FileBackend::with_path(path);
        assert!(backend.load().unwrap().is_none());
    }

    #[test]
    fn test_manager_with_file_backend() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preferences.json");

        {
            let manager =
                PreferenceManager::new(Box::new(FileBackend::with_path(path.clone())));
            manager.load().unwrap();
            manager
                .update(PreferenceUpdate {
                    push: Some(false),
                    ..Default::default()
                })
                .unwrap();
        }

        // 新实例读回持久化的值
        let manager = PreferenceManager::new(Box::new(FileBackend::with_path(path)));
        let prefs = manager.load().unwrap();
        assert!(!prefs.channels.push);
        assert!(prefs.channels.desktop);
    }
}
