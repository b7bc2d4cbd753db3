use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Baud rate used for every attached device
pub const BAUD_RATE: u32 = 115_200;

/// Blocking read timeout for an open device
pub const READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Cadence of the port watcher
pub const WATCH_INTERVAL: Duration = Duration::from_secs(2);

/// Sleep between polls when the device has no pending input
pub const READ_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// PortLog configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PortLogConfig {
    /// Global configuration
    #[serde(default)]
    pub global: GlobalConfig,
}

/// Global configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Default log level for diagnostics on stderr
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Directory that receives `serial_log_*.log` files
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// Colorize rendered lines
    #[serde(default = "default_color")]
    pub color: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_color() -> bool {
    true
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_dir: default_log_dir(),
            color: default_color(),
        }
    }
}
