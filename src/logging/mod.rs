mod init;

pub use init::{init_logging, parse_rotation};

use std::path::PathBuf;
use std::sync::OnceLock;
use tracing::Level;
use tracing_appender::rolling::Rotation;

/// Log filename used by the tool.
pub const LOG_FILENAME: &str = "modelsync.log";

/// Global log file path, set once at startup.
static LOG_FILE_PATH: OnceLock<String> = OnceLock::new();

/// Store the log file path for later retrieval (e.g. in operator hints).
pub fn set_log_file_path(path: String) {
    let _unused = LOG_FILE_PATH.set(path);
}

/// Get the log file path set at startup.
pub fn get_log_file_path() -> &'static str {
    LOG_FILE_PATH.get().map_or("", |s| s.as_str())
}

/// Configuration for the logging system.
pub struct LogConfig {
    pub log_dir: PathBuf,
    pub log_level: Level,
    pub json_format: bool,
    pub rotation: Rotation,
}

impl Default for LogConfig {
    fn default() -> Self {
        let log_dir = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".modelsync")
            .join("logs");
        Self {
            log_dir,
            log_level: Level::INFO,
            json_format: false,
            rotation: Rotation::DAILY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_log_config() {
        let config = LogConfig::default();
        assert!(config.log_dir.ends_with(".modelsync/logs") || config.log_dir.ends_with("logs"));
        assert_eq!(config.log_level, Level::INFO);
        assert!(!config.json_format);
    }

    #[test]
    fn test_parse_rotation() {
        assert_eq!(parse_rotation("hourly"), Rotation::HOURLY);
        assert_eq!(parse_rotation("NEVER"), Rotation::NEVER);
        assert_eq!(parse_rotation("daily"), Rotation::DAILY);
        assert_eq!(parse_rotation("anything-else"), Rotation::DAILY);
    }

    #[test]
    fn test_log_file_path_registry() {
        // OnceLock: the first set wins, later sets are ignored.
        set_log_file_path("/tmp/modelsync.log".to_string());
        let first = get_log_file_path().to_string();
        set_log_file_path("/tmp/other.log".to_string());
        assert_eq!(get_log_file_path(), first);
    }
}
