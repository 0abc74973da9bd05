use std::path::PathBuf;

/// Runtime configuration, environment variables over defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the persisted person list and schedule map.
    pub data_dir: PathBuf,
    /// Reconciliation scan cadence in seconds.
    pub tick_secs: u64,
    /// Log level when RUST_LOG is unset.
    pub log_level: String,
    /// Notification permission as granted by the platform: "granted",
    /// "denied", or "unsupported".
    pub permission: String,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".catchup");
        Self {
            data_dir,
            tick_secs: 60,
            log_level: "info".to_string(),
            permission: "granted".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables with sensible defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            data_dir: std::env::var("CATCHUP_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            tick_secs: std::env::var("CATCHUP_TICK_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.tick_secs),
            log_level: std::env::var("CATCHUP_LOG_LEVEL").unwrap_or(defaults.log_level),
            permission: std::env::var("CATCHUP_PERMISSION").unwrap_or(defaults.permission),
        }
    }
}
