//! Priority classification for notifications
//!
//! The priority level determines visual weight in the presentation layer
//! and whether an ephemeral alert may auto-dismiss:
//! - CRITICAL / HIGH: auto-dismiss is suppressed, manual close only
//! - NORMAL: default weight, auto-dismiss allowed
//! - LOW: optional/silent, auto-dismiss allowed

use serde::{Deserialize, Serialize};

/// Priority level for notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
    Critical,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "LOW",
            Priority::Normal => "NORMAL",
            Priority::High => "HIGH",
            Priority::Critical => "CRITICAL",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Priority::Low => 0,
            Priority::Normal => 1,
            Priority::High => 2,
            Priority::Critical => 3,
        }
    }

    /// Whether this priority meets a minimum requirement
    pub fn meets_threshold(&self, min: Priority) -> bool {
        self.rank() >= min.rank()
    }

    /// High and Critical notifications stay on screen until closed manually
    pub fn suppresses_auto_dismiss(&self) -> bool {
        self.meets_threshold(Priority::High)
    }
}
