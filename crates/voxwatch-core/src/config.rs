//! Configuration for voxwatch.
//!
//! Settings live in `~/.voxwatch/config.yaml`. Every field has a default, so an
//! empty or partial file is valid:
//!
//! ```yaml
//! listener:
//!   port: 12345          # datagram socket binds port + 1
//! alerts:
//!   cooldown_secs: 15
//!   levels:
//!     warning: true
//! speech:
//!   watchdog_timeout_ms: 15000
//!   player: /usr/bin/paplay   # espeak output goes through this player
//! entity_names:
//!   antenna_1: Antenna
//! ```

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, VoxError};
use crate::types::StatusLevel;

/// Default stream listener port. The datagram socket uses the next port.
pub const DEFAULT_PORT: u16 = 12345;

/// Default per-entity cooldown between alerts.
pub const DEFAULT_COOLDOWN_SECS: u64 = 15;

/// Default dispatcher tick period.
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 500;

/// Default hang watchdog for a single utterance.
pub const WATCHDOG_TIMEOUT_MS: u64 = 15_000;

/// Default bound on waiting for a killed speech process to exit.
pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 1_000;

/// Default maximum length of one stream record.
pub const DEFAULT_MAX_LINE_BYTES: usize = 1024 * 1024;

/// Top-level voxwatch configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VoxConfig {
    /// Telemetry listener settings
    #[serde(default)]
    pub listener: ListenerConfig,

    /// Alert policy and dispatch settings
    #[serde(default)]
    pub alerts: AlertConfig,

    /// Speech backend settings
    #[serde(default)]
    pub speech: SpeechConfig,

    /// Spoken names keyed by entity (`component_id` or `component_id/subsystem`)
    #[serde(default)]
    pub entity_names: BTreeMap<String, String>,
}

/// Telemetry listener settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Address both sockets bind to
    pub bind_address: IpAddr,

    /// Stream port; the datagram socket binds `port + 1`
    pub port: u16,

    /// Lines longer than this are discarded
    pub max_line_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }
}

impl ListenerConfig {
    /// Address of the stream listener.
    pub fn stream_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }

    /// Address of the datagram socket.
    ///
    /// Port 0 asks the OS for an ephemeral port on both transports.
    pub fn datagram_addr(&self) -> SocketAddr {
        let port = if self.port == 0 { 0 } else { self.port.saturating_add(1) };
        SocketAddr::new(self.bind_address, port)
    }
}

/// Alert policy and dispatch settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Minimum seconds between two alerts for the same entity
    pub cooldown_secs: u64,

    /// Start muted
    pub muted: bool,

    /// Dispatcher tick period in milliseconds
    pub tick_interval_ms: u64,

    /// Which severities are announced
    pub levels: LevelToggles,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: DEFAULT_COOLDOWN_SECS,
            muted: false,
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            levels: LevelToggles::default(),
        }
    }
}

impl AlertConfig {
    /// Cooldown window as a duration.
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    /// Tick period as a duration.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

/// Per-severity alert switches.
///
/// `Operational` and `Unknown` have no switch; they are never announced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelToggles {
    pub critical: bool,
    pub degraded: bool,
    /// Off by default
    pub warning: bool,
    pub offline: bool,
}

impl Default for LevelToggles {
    fn default() -> Self {
        Self {
            critical: true,
            degraded: true,
            warning: false,
            offline: true,
        }
    }
}

impl LevelToggles {
    /// Whether alerts for `status` are switched on.
    pub fn is_enabled(&self, status: StatusLevel) -> bool {
        match status {
            StatusLevel::Critical => self.critical,
            StatusLevel::Degraded => self.degraded,
            StatusLevel::Warning => self.warning,
            StatusLevel::Offline => self.offline,
            StatusLevel::Operational | StatusLevel::Unknown => false,
        }
    }

    /// Switch alerts for `status` on or off. Returns false for levels that
    /// cannot be toggled.
    pub fn set(&mut self, status: StatusLevel, enabled: bool) -> bool {
        let slot = match status {
            StatusLevel::Critical => &mut self.critical,
            StatusLevel::Degraded => &mut self.degraded,
            StatusLevel::Warning => &mut self.warning,
            StatusLevel::Offline => &mut self.offline,
            StatusLevel::Operational | StatusLevel::Unknown => return false,
        };
        *slot = enabled;
        true
    }

    /// Names of the enabled levels, most severe first.
    pub fn enabled_names(&self) -> Vec<&'static str> {
        StatusLevel::ALL
            .iter()
            .filter(|level| self.is_enabled(**level))
            .map(|level| level.as_str())
            .collect()
    }
}

/// Speech backend settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// Explicit backend executable; skips discovery when set
    pub backend: Option<PathBuf>,

    /// Explicit audio player for espeak WAV output
    pub player: Option<PathBuf>,

    /// Hang watchdog for one utterance in milliseconds
    pub watchdog_timeout_ms: u64,

    /// How long to wait for a killed process to exit
    pub shutdown_grace_ms: u64,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            backend: None,
            player: None,
            watchdog_timeout_ms: WATCHDOG_TIMEOUT_MS,
            shutdown_grace_ms: DEFAULT_SHUTDOWN_GRACE_MS,
        }
    }
}

impl SpeechConfig {
    pub fn watchdog_timeout(&self) -> Duration {
        Duration::from_millis(self.watchdog_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

impl VoxConfig {
    /// Load configuration from the default path (`~/.voxwatch/config.yaml`).
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path()?)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                VoxError::config_not_found(path)
            } else {
                VoxError::io("reading configuration", path, e)
            }
        })?;
        let config = Self::parse(&content).map_err(|e| match e {
            VoxError::ConfigInvalid { message, .. } => VoxError::ConfigInvalid {
                path: path.to_path_buf(),
                message,
            },
            other => other,
        })?;
        debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Load an explicit file, or the default file if it exists, or defaults.
    ///
    /// An explicit path that does not exist is an error; a missing default
    /// file is not.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from(path);
        }
        match config_path() {
            Ok(default) if default.exists() => Self::load_from(&default),
            _ => Ok(Self::default()),
        }
    }

    /// Parse and validate configuration from a YAML string.
    pub fn parse(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: VoxConfig =
            serde_yaml::from_str(content).map_err(|e| VoxError::ConfigInvalid {
                path: PathBuf::from("<inline>"),
                message: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.listener.port == u16::MAX {
            return Err(VoxError::config_validation(format!(
                "port must be <= {} so the datagram port fits, got {}",
                u16::MAX - 1,
                self.listener.port
            )));
        }
        if self.listener.max_line_bytes == 0 {
            return Err(VoxError::config_validation("max_line_bytes must be > 0"));
        }
        if self.alerts.tick_interval_ms < 10 {
            return Err(VoxError::config_validation(format!(
                "tick_interval_ms must be >= 10, got {}",
                self.alerts.tick_interval_ms
            )));
        }
        if self.speech.watchdog_timeout_ms < 100 {
            return Err(VoxError::config_validation(format!(
                "watchdog_timeout_ms must be >= 100, got {}",
                self.speech.watchdog_timeout_ms
            )));
        }
        Ok(())
    }

    /// Spoken name for an entity, falling back to the given default.
    pub fn entity_name<'a>(&'a self, key: &str, fallback: &'a str) -> &'a str {
        self.entity_names.get(key).map(String::as_str).unwrap_or(fallback)
    }
}

/// voxwatch home directory (`~/.voxwatch`).
pub fn home_dir() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(".voxwatch"))
        .ok_or_else(|| VoxError::internal("home directory could not be determined"))
}

/// Default configuration file path (`~/.voxwatch/config.yaml`).
pub fn config_path() -> Result<PathBuf> {
    Ok(home_dir()?.join("config.yaml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = VoxConfig::default();
        assert_eq!(config.listener.port, 12345);
        assert_eq!(config.listener.datagram_addr().port(), 12346);
        assert_eq!(config.alerts.cooldown(), Duration::from_secs(15));
        assert_eq!(config.alerts.tick_interval(), Duration::from_millis(500));
        assert_eq!(config.speech.watchdog_timeout(), Duration::from_millis(15_000));
        assert!(config.alerts.levels.critical);
        assert!(!config.alerts.levels.warning);
    }

    #[test]
    fn test_parse_partial_yaml() {
        let yaml = r#"
listener:
  port: 9000
alerts:
  cooldown_secs: 5
  levels:
    warning: true
entity_names:
  antenna_1: Antenna
"#;
        let config = VoxConfig::parse(yaml).unwrap();
        assert_eq!(config.listener.port, 9000);
        assert_eq!(config.alerts.cooldown_secs, 5);
        assert!(config.alerts.levels.warning);
        // untouched levels keep their defaults
        assert!(config.alerts.levels.critical);
        assert_eq!(config.entity_name("antenna_1", "antenna_1"), "Antenna");
        assert_eq!(config.entity_name("radar_2", "radar_2"), "radar_2");
    }

    #[test]
    fn test_empty_yaml_is_default() {
        assert_eq!(VoxConfig::parse("").unwrap(), VoxConfig::default());
    }

    #[test]
    fn test_invalid_yaml() {
        let err = VoxConfig::parse("listener: [").unwrap_err();
        assert!(matches!(err, VoxError::ConfigInvalid { .. }));
    }

    #[test]
    fn test_validation_rejects_max_port() {
        let err = VoxConfig::parse("listener:\n  port: 65535\n").unwrap_err();
        assert!(matches!(err, VoxError::ConfigValidation { .. }));
    }

    #[test]
    fn test_validation_rejects_tiny_watchdog() {
        let err = VoxConfig::parse("speech:\n  watchdog_timeout_ms: 5\n").unwrap_err();
        assert!(err.to_string().contains("watchdog_timeout_ms"));
    }

    #[test]
    fn test_speech_overrides() {
        let config =
            VoxConfig::parse("speech:\n  backend: /usr/bin/espeak-ng\n  player: /usr/bin/paplay\n").unwrap();
        assert_eq!(config.speech.backend.as_deref(), Some(Path::new("/usr/bin/espeak-ng")));
        assert_eq!(config.speech.player.as_deref(), Some(Path::new("/usr/bin/paplay")));
        assert!(VoxConfig::default().speech.player.is_none());
    }

    #[test]
    fn test_port_zero_uses_ephemeral_datagram_port() {
        let listener = ListenerConfig {
            port: 0,
            ..ListenerConfig::default()
        };
        assert_eq!(listener.datagram_addr().port(), 0);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "alerts:\n  muted: true").unwrap();
        let config = VoxConfig::load_from(file.path()).unwrap();
        assert!(config.alerts.muted);
    }

    #[test]
    fn test_load_missing_explicit_file() {
        let err = VoxConfig::load_or_default(Some(Path::new("/nonexistent/voxwatch.yaml")))
            .unwrap_err();
        assert!(matches!(err, VoxError::ConfigNotFound { .. }));
    }

    #[test]
    fn test_level_toggles() {
        let mut levels = LevelToggles::default();
        assert_eq!(levels.enabled_names(), vec!["Critical", "Offline", "Degraded"]);
        assert!(levels.set(StatusLevel::Warning, true));
        assert!(levels.is_enabled(StatusLevel::Warning));
        assert!(!levels.set(StatusLevel::Operational, true));
        assert!(!levels.is_enabled(StatusLevel::Operational));
        assert!(!levels.is_enabled(StatusLevel::Unknown));
    }
}
