//! Configuration system: TOML file + env var overrides + smart defaults.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::errors::{Result, RkError};
use crate::recycle::restore::ConflictPolicy;
use crate::recycle::retention::{RetentionPolicy, RetentionPolicyInput};
use crate::recycle::stats::DEFAULT_SIZE_CONCURRENCY;

/// Full rk configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    /// Raw retention policy; normalized leniently by [`Config::retention_policy`].
    pub retention: RetentionPolicyInput,
    pub schedule: ScheduleConfig,
    pub index: IndexConfig,
    pub stats: StatsConfig,
    pub restore: RestoreConfig,
}

/// Filesystem paths used by rk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub config_file: PathBuf,
    pub recycle_root: PathBuf,
    pub index_path: PathBuf,
    pub state_file: PathBuf,
}

/// Automatic maintenance cadence for `maintain --if-due`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ScheduleConfig {
    pub interval_hours: u64,
}

/// Index append behavior.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct IndexConfig {
    pub fsync_on_append: bool,
}

/// Stats collector tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StatsConfig {
    pub size_concurrency: usize,
}

/// Restore defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RestoreConfig {
    pub conflict: ConflictPolicy,
}

impl Default for PathsConfig {
    fn default() -> Self {
        let home_dir = env::var_os("HOME").map_or_else(
            || {
                eprintln!("[RK-CONFIG] WARNING: HOME not set, falling back to /tmp for data paths");
                PathBuf::from("/tmp")
            },
            PathBuf::from,
        );
        let cfg = home_dir.join(".config").join("rk").join("config.toml");
        let data = home_dir.join(".local").join("share").join("rk");
        Self {
            config_file: cfg,
            recycle_root: data.join("recycle"),
            index_path: data.join("index.jsonl"),
            state_file: data.join("state.json"),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self { interval_hours: 24 }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            fsync_on_append: true,
        }
    }
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            size_concurrency: DEFAULT_SIZE_CONCURRENCY,
        }
    }
}

impl ScheduleConfig {
    #[must_use]
    pub fn interval_ms(&self) -> i64 {
        i64::try_from(self.interval_hours.saturating_mul(3_600_000)).unwrap_or(i64::MAX)
    }
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathsConfig::default().config_file
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from default path; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);
        let is_explicit_path = path.is_some();

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|e| RkError::io(&path_buf, e))?;
            let parsed: Self = toml::from_str(&raw)?;
            parsed
        } else if is_explicit_path {
            return Err(RkError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.paths.config_file = path_buf;
        cfg.apply_env_overrides_from(env_var)?;
        cfg.normalize_paths();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Effective retention policy: configured values normalized over defaults.
    #[must_use]
    pub fn retention_policy(&self) -> RetentionPolicy {
        RetentionPolicy::normalize(&self.retention, &RetentionPolicy::default())
    }

    /// Deterministic hash of the effective config, recorded next to audit output.
    ///
    /// FNV-1a so the value is stable across processes and toolchains.
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }

    fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        // paths
        if let Some(raw) = lookup("RK_RECYCLE_ROOT") {
            self.paths.recycle_root = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("RK_INDEX_PATH") {
            self.paths.index_path = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("RK_STATE_FILE") {
            self.paths.state_file = PathBuf::from(raw);
        }

        // retention: kept raw, the policy normalizer decides what is usable.
        for (name, slot) in [
            ("RK_RETENTION_ENABLED", &mut self.retention.enabled),
            ("RK_RETENTION_MAX_AGE_DAYS", &mut self.retention.max_age_days),
            (
                "RK_RETENTION_MIN_KEEP_BATCHES",
                &mut self.retention.min_keep_batches,
            ),
            (
                "RK_RETENTION_SIZE_THRESHOLD_GB",
                &mut self.retention.size_threshold_gb,
            ),
        ] {
            if let Some(raw) = lookup(name) {
                *slot = Some(Value::String(raw));
            }
        }

        if let Some(raw) = lookup("RK_SCHEDULE_INTERVAL_HOURS") {
            self.schedule.interval_hours = parse_env("RK_SCHEDULE_INTERVAL_HOURS", &raw)?;
        }
        if let Some(raw) = lookup("RK_INDEX_FSYNC_ON_APPEND") {
            self.index.fsync_on_append = parse_env("RK_INDEX_FSYNC_ON_APPEND", &raw)?;
        }
        if let Some(raw) = lookup("RK_STATS_SIZE_CONCURRENCY") {
            self.stats.size_concurrency = parse_env("RK_STATS_SIZE_CONCURRENCY", &raw)?;
        }
        if let Some(raw) = lookup("RK_RESTORE_CONFLICT") {
            self.restore.conflict =
                raw.parse::<ConflictPolicy>()
                    .map_err(|error| RkError::ConfigParse {
                        context: "env",
                        details: format!("RK_RESTORE_CONFLICT={raw:?}: {error}"),
                    })?;
        }

        Ok(())
    }

    /// Expand a leading `~` and strip trailing slashes so root comparisons
    /// are stable.
    fn normalize_paths(&mut self) {
        let home = env::var_os("HOME").map(PathBuf::from);
        for path in [
            &mut self.paths.recycle_root,
            &mut self.paths.index_path,
            &mut self.paths.state_file,
        ] {
            if let Some(expanded) = expand_home(path, home.as_deref()) {
                *path = expanded;
            }
            let s = path.to_string_lossy();
            if s.len() > 1
                && let Some(stripped) = s.strip_suffix('/')
            {
                *path = PathBuf::from(stripped);
            }
        }
    }

    fn validate(&self) -> Result<()> {
        for (name, path) in [
            ("paths.recycle_root", &self.paths.recycle_root),
            ("paths.index_path", &self.paths.index_path),
            ("paths.state_file", &self.paths.state_file),
        ] {
            if path.as_os_str().is_empty() {
                return Err(RkError::InvalidConfig {
                    details: format!("{name} must not be empty"),
                });
            }
        }

        if self.paths.recycle_root.parent().is_none() {
            return Err(RkError::InvalidConfig {
                details: format!(
                    "paths.recycle_root must not be a filesystem root, got {}",
                    self.paths.recycle_root.display()
                ),
            });
        }

        // Anything under the recycle root is sized, listed, and eventually evicted.
        for (name, path) in [
            ("paths.index_path", &self.paths.index_path),
            ("paths.state_file", &self.paths.state_file),
        ] {
            if path.starts_with(&self.paths.recycle_root) {
                return Err(RkError::InvalidConfig {
                    details: format!("{name} must not live under paths.recycle_root"),
                });
            }
        }

        if self.stats.size_concurrency == 0 {
            return Err(RkError::InvalidConfig {
                details: "stats.size_concurrency must be >= 1".to_string(),
            });
        }
        if self.schedule.interval_hours == 0 {
            return Err(RkError::InvalidConfig {
                details: "schedule.interval_hours must be >= 1".to_string(),
            });
        }

        Ok(())
    }
}

/// `~` or `~/rest` resolved against `home`; `None` when nothing to expand.
fn expand_home(path: &Path, home: Option<&Path>) -> Option<PathBuf> {
    let home = home?;
    let rest = path.strip_prefix("~").ok()?;
    Some(home.join(rest))
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn parse_env<T>(name: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|error| RkError::ConfigParse {
        context: "env",
        details: format!("{name}={raw:?}: {error}"),
    })
}
