//! Session tuning and its environment overrides.

use std::time::Duration;

use crate::error::ConfigError;

/// How often the current document is copied to the backup sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackupSchedule {
    EveryMinute,
    EveryFiveMinutes,
    #[default]
    EveryTenMinutes,
    EveryThirtyMinutes,
}

impl BackupSchedule {
    /// Time between two backups.
    pub fn period(&self) -> Duration {
        Duration::from_secs(60 * self.minutes())
    }

    pub fn minutes(&self) -> u64 {
        match self {
            BackupSchedule::EveryMinute => 1,
            BackupSchedule::EveryFiveMinutes => 5,
            BackupSchedule::EveryTenMinutes => 10,
            BackupSchedule::EveryThirtyMinutes => 30,
        }
    }

    /// The schedule for a period in minutes, if it is one of the supported ones.
    pub fn from_minutes(minutes: u64) -> Option<Self> {
        match minutes {
            1 => Some(BackupSchedule::EveryMinute),
            5 => Some(BackupSchedule::EveryFiveMinutes),
            10 => Some(BackupSchedule::EveryTenMinutes),
            30 => Some(BackupSchedule::EveryThirtyMinutes),
            _ => None,
        }
    }
}

/// Document session tuning.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Quiet period after the last edit before a save starts.
    pub save_debounce: Duration,
    /// Number of recently saved values remembered for echo suppression.
    pub history_capacity: usize,
    pub backup_schedule: BackupSchedule,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            save_debounce: Self::DEFAULT_SAVE_DEBOUNCE,
            history_capacity: Self::DEFAULT_HISTORY_CAPACITY,
            backup_schedule: BackupSchedule::default(),
        }
    }
}

impl SessionConfig {
    pub const DEFAULT_SAVE_DEBOUNCE: Duration = Duration::from_millis(1500);
    pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

    /// Load configuration from environment variables.
    ///
    /// Optional env vars:
    /// - `OUTLINE_SAVE_DEBOUNCE_MS`: save quiet period in milliseconds (default: 1500)
    /// - `OUTLINE_SAVE_HISTORY`: saved values remembered (default: 100)
    /// - `OUTLINE_BACKUP_MINUTES`: 1, 5, 10 or 30 (default: 10)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env`, reading values through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(raw) = lookup("OUTLINE_SAVE_DEBOUNCE_MS") {
            let millis: u64 = raw.trim().parse().map_err(|e| ConfigError::Invalid {
                field: "OUTLINE_SAVE_DEBOUNCE_MS",
                message: format!("{raw:?}: {e}"),
            })?;
            config.save_debounce = Duration::from_millis(millis);
        }

        if let Some(raw) = lookup("OUTLINE_SAVE_HISTORY") {
            let capacity: usize = raw.trim().parse().map_err(|e| ConfigError::Invalid {
                field: "OUTLINE_SAVE_HISTORY",
                message: format!("{raw:?}: {e}"),
            })?;
            if capacity == 0 {
                return Err(ConfigError::Invalid {
                    field: "OUTLINE_SAVE_HISTORY",
                    message: "must be at least 1".to_string(),
                });
            }
            config.history_capacity = capacity;
        }

        if let Some(raw) = lookup("OUTLINE_BACKUP_MINUTES") {
            config.backup_schedule = raw
                .trim()
                .parse()
                .ok()
                .and_then(BackupSchedule::from_minutes)
                .ok_or_else(|| ConfigError::Invalid {
                    field: "OUTLINE_BACKUP_MINUTES",
                    message: format!("{raw:?} is not one of 1, 5, 10, 30"),
                })?;
        }

        Ok(config)
    }
}
