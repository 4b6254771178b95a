use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration loaded from watchgod.toml.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct WatchgodConfig {
    pub watchdog: WatchdogConfig,
    pub heartbeat: HeartbeatConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    /// Reset-inactivity window before the token is cancelled. Zero is
    /// accepted and fires almost immediately.
    pub timeout_ms: u64,
}

/// Simulated worker driven by the `watchgod` binary.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    /// Delay between resets.
    pub interval_ms: u64,
    /// Number of resets before the worker stalls.
    pub beats: u32,
    /// How long to wait after the last beat before declaring the worker done.
    pub grace_ms: u64,
}

impl WatchdogConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl HeartbeatConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }
}

// --- Default implementations ---

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self { timeout_ms: 1000 }
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_ms: 400,
            beats: 10,
            grace_ms: 5000,
        }
    }
}

/// Errors that can occur while loading the config file.
#[derive(Debug)]
pub enum ConfigError {
    /// The file exists but could not be read.
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The file is not valid TOML or has fields of the wrong type.
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "failed to read config {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "failed to parse config {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
        }
    }
}

/// Load config from `path`. A missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<WatchgodConfig, ConfigError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(WatchgodConfig::default());
        }
        Err(e) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };

    toml::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = WatchgodConfig::default();
        assert_eq!(config.watchdog.timeout(), Duration::from_secs(1));
        assert_eq!(config.heartbeat.interval(), Duration::from_millis(400));
        assert_eq!(config.heartbeat.beats, 10);
        assert_eq!(config.heartbeat.grace(), Duration::from_secs(5));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let config = load_config(&dir.path().join("watchgod.toml")).unwrap();
        assert_eq!(config.watchdog.timeout_ms, 1000);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("watchgod.toml");
        std::fs::write(&path, "[watchdog]\ntimeout_ms = 250\n").unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.watchdog.timeout(), Duration::from_millis(250));
        assert_eq!(config.heartbeat.interval_ms, 400);
        assert_eq!(config.heartbeat.beats, 10);
    }

    #[test]
    fn test_full_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("watchgod.toml");
        std::fs::write(
            &path,
            r#"
[watchdog]
timeout_ms = 0

[heartbeat]
interval_ms = 40
beats = 3
grace_ms = 100
"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.watchdog.timeout(), Duration::ZERO);
        assert_eq!(config.heartbeat.interval(), Duration::from_millis(40));
        assert_eq!(config.heartbeat.beats, 3);
        assert_eq!(config.heartbeat.grace(), Duration::from_millis(100));
    }

    #[test]
    fn test_negative_timeout_is_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("watchgod.toml");
        std::fs::write(&path, "[watchdog]\ntimeout_ms = -5\n").unwrap();

        let err = load_config(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("failed to parse config"));
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("watchgod.toml");
        std::fs::write(&path, "this is not toml [").unwrap();

        let err = load_config(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_directory_is_read_error() {
        let dir = tempdir().unwrap();
        let err = load_config(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
