//! Daemon configuration.

use pkd_core::CoreResult;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Where backend role methods execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// On the main loop, inside the call that starts the run.
    Inline,
    /// On a dedicated worker thread per run.
    #[default]
    Worker,
}

/// Debounce tier of a `StateHasChanged` reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateChangedTier {
    /// Short delay.
    Priority,
    /// Long delay, used for reasons that happen at busy moments such as resume.
    Normal,
}

/// Timers used by the backend, the scheduler and the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimingConfig {
    /// How long a backend may take between `error_code` and `finished`.
    pub error_finish_timeout: Duration,
    /// Delay between `finished` and the externally visible Finished event.
    pub finished_grace: Duration,
    /// Debounce for the UpdatesChanged notification.
    pub updates_changed_delay: Duration,
    /// Debounce for priority `StateHasChanged` reasons.
    pub state_changed_priority: Duration,
    /// Debounce for normal `StateHasChanged` reasons.
    pub state_changed_normal: Duration,
    /// How long a finished transaction stays queryable.
    pub keep_finished: Duration,
    /// How long an uncommitted transaction shell survives.
    pub unused_timeout: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            error_finish_timeout: Duration::from_millis(500),
            finished_grace: Duration::from_millis(10),
            updates_changed_delay: Duration::from_millis(100),
            state_changed_priority: Duration::from_secs(5),
            state_changed_normal: Duration::from_secs(600),
            keep_finished: Duration::from_secs(5),
            unused_timeout: Duration::from_secs(300),
        }
    }
}

/// Configuration for starting the daemon.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Name of the backend to load from the registry.
    pub backend: String,

    /// State directory for the ledger and id counter. `None` keeps both in
    /// memory.
    pub state_dir: Option<PathBuf>,

    /// Root for per-transaction download directories.
    pub cache_dir: PathBuf,

    /// Forward BackendError and DaemonError messages to clients.
    pub developer_mode: bool,

    /// Check running processes against updated files after updates.
    pub update_check_processes: bool,

    /// Regenerate the package list after a cache refresh.
    pub refresh_cache_update_package_list: bool,

    /// Scan desktop files after a cache refresh.
    pub refresh_cache_scan_desktop_files: bool,

    /// Estimate remaining time from percentage updates.
    pub use_remaining_time: bool,

    /// HTTP proxy passed to the backend.
    pub proxy_http: Option<String>,

    /// FTP proxy passed to the backend.
    pub proxy_ftp: Option<String>,

    /// Where backend role methods execute.
    pub execution: ExecutionMode,

    /// Timers.
    pub timing: TimingConfig,

    /// Debounce tier per `StateHasChanged` reason. Unknown reasons are
    /// priority.
    pub state_changed_tiers: HashMap<String, StateChangedTier>,

    /// Configuration file to watch; a change asks the daemon to shut down.
    pub config_file: Option<PathBuf>,

    /// Daemon binary to watch; a change schedules a restart.
    pub binary_file: Option<PathBuf>,

    /// How often watched files are checked.
    pub monitor_interval: Duration,

    /// Quit after this much idle time.
    pub exit_on_idle: Option<Duration>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        let mut state_changed_tiers = HashMap::new();
        state_changed_tiers.insert("resume".to_string(), StateChangedTier::Normal);
        Self {
            backend: "dummy".to_string(),
            state_dir: None,
            cache_dir: std::env::temp_dir().join("pkd"),
            developer_mode: false,
            update_check_processes: false,
            refresh_cache_update_package_list: true,
            refresh_cache_scan_desktop_files: false,
            use_remaining_time: true,
            proxy_http: None,
            proxy_ftp: None,
            execution: ExecutionMode::Worker,
            timing: TimingConfig::default(),
            state_changed_tiers,
            config_file: None,
            binary_file: None,
            monitor_interval: Duration::from_secs(2),
            exit_on_idle: None,
        }
    }
}

impl DaemonConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a JSON configuration file. Absent keys keep their defaults and
    /// durations are given in milliseconds.
    pub fn load(path: &Path) -> CoreResult<Self> {
        let text = fs::read_to_string(path)?;
        let file: ConfigFile = serde_json::from_str(&text)?;
        let mut config = Self::default();
        file.apply(&mut config);
        config.config_file.get_or_insert_with(|| path.to_path_buf());
        Ok(config)
    }

    /// Sets the backend name.
    #[must_use]
    pub fn backend(mut self, name: impl Into<String>) -> Self {
        self.backend = name.into();
        self
    }

    /// Sets the state directory.
    #[must_use]
    pub fn state_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_dir = Some(path.into());
        self
    }

    /// Sets the download cache root.
    #[must_use]
    pub fn cache_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_dir = path.into();
        self
    }

    /// Sets developer mode.
    #[must_use]
    pub const fn developer_mode(mut self, value: bool) -> Self {
        self.developer_mode = value;
        self
    }

    /// Sets whether running processes are checked after updates.
    #[must_use]
    pub const fn update_check_processes(mut self, value: bool) -> Self {
        self.update_check_processes = value;
        self
    }

    /// Sets the execution mode.
    #[must_use]
    pub const fn execution(mut self, mode: ExecutionMode) -> Self {
        self.execution = mode;
        self
    }

    /// Sets the timers.
    #[must_use]
    pub fn timing(mut self, timing: TimingConfig) -> Self {
        self.timing = timing;
        self
    }

    /// Sets the proxies.
    #[must_use]
    pub fn proxy(mut self, http: Option<String>, ftp: Option<String>) -> Self {
        self.proxy_http = http;
        self.proxy_ftp = ftp;
        self
    }

    /// Assigns a debounce tier to a `StateHasChanged` reason.
    #[must_use]
    pub fn state_changed_tier(mut self, reason: impl Into<String>, tier: StateChangedTier) -> Self {
        self.state_changed_tiers.insert(reason.into(), tier);
        self
    }

    /// Sets the watched configuration file.
    #[must_use]
    pub fn config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// Sets the watched daemon binary.
    #[must_use]
    pub fn binary_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.binary_file = Some(path.into());
        self
    }

    /// Sets how often watched files are checked.
    #[must_use]
    pub const fn monitor_interval(mut self, interval: Duration) -> Self {
        self.monitor_interval = interval;
        self
    }

    /// Sets the idle time after which the daemon quits.
    #[must_use]
    pub const fn exit_on_idle(mut self, idle: Option<Duration>) -> Self {
        self.exit_on_idle = idle;
        self
    }

    /// Returns the debounce tier for a reason.
    pub fn tier_for(&self, reason: &str) -> StateChangedTier {
        self.state_changed_tiers
            .get(reason)
            .copied()
            .unwrap_or(StateChangedTier::Priority)
    }
}

/// On-disk form of [`DaemonConfig`].
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    backend: Option<String>,
    state_dir: Option<PathBuf>,
    cache_dir: Option<PathBuf>,
    developer_mode: Option<bool>,
    update_check_processes: Option<bool>,
    refresh_cache_update_package_list: Option<bool>,
    refresh_cache_scan_desktop_files: Option<bool>,
    use_remaining_time: Option<bool>,
    proxy_http: Option<String>,
    proxy_ftp: Option<String>,
    execution: Option<ExecutionMode>,
    error_finish_timeout_ms: Option<u64>,
    finished_grace_ms: Option<u64>,
    updates_changed_delay_ms: Option<u64>,
    state_changed_priority_ms: Option<u64>,
    state_changed_normal_ms: Option<u64>,
    keep_finished_ms: Option<u64>,
    unused_timeout_ms: Option<u64>,
    state_changed_tiers: Option<HashMap<String, StateChangedTier>>,
    config_file: Option<PathBuf>,
    binary_file: Option<PathBuf>,
    monitor_interval_ms: Option<u64>,
    exit_on_idle_ms: Option<u64>,
}

impl ConfigFile {
    fn apply(self, config: &mut DaemonConfig) {
        fn set<T>(slot: &mut T, value: Option<T>) {
            if let Some(value) = value {
                *slot = value;
            }
        }
        fn set_ms(slot: &mut Duration, value: Option<u64>) {
            if let Some(ms) = value {
                *slot = Duration::from_millis(ms);
            }
        }

        set(&mut config.backend, self.backend);
        config.state_dir = self.state_dir.or(config.state_dir.take());
        set(&mut config.cache_dir, self.cache_dir);
        set(&mut config.developer_mode, self.developer_mode);
        set(&mut config.update_check_processes, self.update_check_processes);
        set(
            &mut config.refresh_cache_update_package_list,
            self.refresh_cache_update_package_list,
        );
        set(
            &mut config.refresh_cache_scan_desktop_files,
            self.refresh_cache_scan_desktop_files,
        );
        set(&mut config.use_remaining_time, self.use_remaining_time);
        config.proxy_http = self.proxy_http.or(config.proxy_http.take());
        config.proxy_ftp = self.proxy_ftp.or(config.proxy_ftp.take());
        set(&mut config.execution, self.execution);

        let timing = &mut config.timing;
        set_ms(&mut timing.error_finish_timeout, self.error_finish_timeout_ms);
        set_ms(&mut timing.finished_grace, self.finished_grace_ms);
        set_ms(&mut timing.updates_changed_delay, self.updates_changed_delay_ms);
        set_ms(&mut timing.state_changed_priority, self.state_changed_priority_ms);
        set_ms(&mut timing.state_changed_normal, self.state_changed_normal_ms);
        set_ms(&mut timing.keep_finished, self.keep_finished_ms);
        set_ms(&mut timing.unused_timeout, self.unused_timeout_ms);

        if let Some(tiers) = self.state_changed_tiers {
            config.state_changed_tiers.extend(tiers);
        }
        config.config_file = self.config_file.or(config.config_file.take());
        config.binary_file = self.binary_file.or(config.binary_file.take());
        set_ms(&mut config.monitor_interval, self.monitor_interval_ms);
        if let Some(ms) = self.exit_on_idle_ms {
            config.exit_on_idle = Some(Duration::from_millis(ms));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn default_config() {
        let config = DaemonConfig::default();
        assert_eq!(config.backend, "dummy");
        assert_eq!(config.execution, ExecutionMode::Worker);
        assert_eq!(config.timing.error_finish_timeout, Duration::from_millis(500));
        assert_eq!(config.timing.finished_grace, Duration::from_millis(10));
        assert!(!config.developer_mode);
    }

    #[test]
    fn builder_pattern() {
        let config = DaemonConfig::new()
            .backend("apt")
            .developer_mode(true)
            .execution(ExecutionMode::Inline);

        assert_eq!(config.backend, "apt");
        assert!(config.developer_mode);
        assert_eq!(config.execution, ExecutionMode::Inline);
    }

    #[test]
    fn resume_is_normal_tier() {
        let config = DaemonConfig::default();
        assert_eq!(config.tier_for("resume"), StateChangedTier::Normal);
        assert_eq!(config.tier_for("cache-update"), StateChangedTier::Priority);

        let config = config.state_changed_tier("cache-update", StateChangedTier::Normal);
        assert_eq!(config.tier_for("cache-update"), StateChangedTier::Normal);
    }

    #[test]
    fn load_overrides_only_present_keys() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("pkd.json");
        fs::write(
            &path,
            r#"{
                "backend": "yum",
                "developer_mode": true,
                "execution": "inline",
                "finished_grace_ms": 0,
                "keep_finished_ms": 1500,
                "state_changed_tiers": {"cron": "normal"}
            }"#,
        )
        .unwrap();

        let config = DaemonConfig::load(&path).unwrap();
        assert_eq!(config.backend, "yum");
        assert!(config.developer_mode);
        assert_eq!(config.execution, ExecutionMode::Inline);
        assert_eq!(config.timing.finished_grace, Duration::ZERO);
        assert_eq!(config.timing.keep_finished, Duration::from_millis(1500));
        assert_eq!(config.timing.unused_timeout, Duration::from_secs(300));
        assert_eq!(config.tier_for("cron"), StateChangedTier::Normal);
        assert_eq!(config.tier_for("resume"), StateChangedTier::Normal);
        assert_eq!(config.config_file.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn load_rejects_unknown_keys() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("pkd.json");
        fs::write(&path, r#"{"bakend": "yum"}"#).unwrap();
        assert!(DaemonConfig::load(&path).is_err());
    }
}
