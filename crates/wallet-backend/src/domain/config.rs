//! Bridge configuration.
//!
//! Loaded from TOML, then overridden from `WALLET_*` environment variables.
//! Every section is `#[serde(default)]`, so an empty file is a valid config.
//!
//! ```toml
//! [bridge]
//! default_timeout = "30s"
//! cleanup_interval = "250ms"
//! fail_pending_on_disconnect = true
//!
//! [bridge.operation_timeouts]
//! withdrawTestkudos = "2m"
//!
//! [engine]
//! command = "taler-wallet-cli"
//! args = ["advanced", "serve"]
//! storage_dir = "/var/lib/taler-wallet"
//! restart_initial_backoff = "500ms"
//! restart_max_backoff = 30
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration for the wallet bridge.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    /// Request router and transport settings
    pub bridge: BridgeConfig,
    /// Wallet engine process settings
    pub engine: EngineConfig,
    /// Notification bus settings
    pub bus: BusConfig,
}

impl WalletConfig {
    /// Read and validate a TOML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|error| ConfigError::Io {
            path: path.to_path_buf(),
            error: error.to_string(),
        })?;
        Self::parse(&content)
    }

    /// Parse and validate TOML text.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: WalletConfig =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `WALLET_*` environment overrides.
    ///
    /// - `WALLET_ENGINE_COMMAND`: engine program
    /// - `WALLET_STORAGE_DIR`: engine storage directory
    /// - `WALLET_REQUEST_TIMEOUT`: default call timeout (`"30s"`, `"500ms"`, ...)
    /// - `WALLET_FAIL_PENDING_ON_DISCONNECT`: `true`/`false`
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(command) = lookup("WALLET_ENGINE_COMMAND") {
            self.engine.command = command;
        }
        if let Some(dir) = lookup("WALLET_STORAGE_DIR") {
            self.engine.storage_dir = PathBuf::from(dir);
        }
        if let Some(timeout) = lookup("WALLET_REQUEST_TIMEOUT") {
            self.bridge.default_timeout = humantime_serde::parse_duration(&timeout)
                .map_err(|e| ConfigError::InvalidTimeout(format!("WALLET_REQUEST_TIMEOUT: {e}")))?;
        }
        if let Some(flag) = lookup("WALLET_FAIL_PENDING_ON_DISCONNECT") {
            self.bridge.fail_pending_on_disconnect = flag.eq_ignore_ascii_case("true") || flag == "1";
        }
        self.validate()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bridge.default_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "default_timeout cannot be 0".into(),
            ));
        }

        if let Some((operation, _)) = self
            .bridge
            .operation_timeouts
            .iter()
            .find(|(_, timeout)| timeout.is_zero())
        {
            return Err(ConfigError::InvalidTimeout(format!(
                "timeout for '{operation}' cannot be 0"
            )));
        }

        if self.bridge.cleanup_interval.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "cleanup_interval cannot be 0".into(),
            ));
        }

        if self.bridge.reconnect_initial_backoff.is_zero()
            || self.bridge.reconnect_initial_backoff > self.bridge.reconnect_max_backoff
        {
            return Err(ConfigError::Invalid(
                "reconnect_initial_backoff must be non-zero and at most reconnect_max_backoff"
                    .into(),
            ));
        }

        if self.engine.restart_initial_backoff.is_zero()
            || self.engine.restart_initial_backoff > self.engine.restart_max_backoff
        {
            return Err(ConfigError::Invalid(
                "restart_initial_backoff must be non-zero and at most restart_max_backoff".into(),
            ));
        }

        if self.engine.command.trim().is_empty() {
            return Err(ConfigError::Invalid("engine.command cannot be empty".into()));
        }

        if self.bus.capacity == 0 {
            return Err(ConfigError::Invalid("bus.capacity cannot be 0".into()));
        }

        Ok(())
    }
}

/// Request router and transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Timeout for calls without a per-operation override
    #[serde(with = "humantime_serde")]
    pub default_timeout: Duration,

    /// How often overdue calls are swept
    #[serde(with = "humantime_serde")]
    pub cleanup_interval: Duration,

    /// Fail outstanding calls with `Disconnected` when the link drops.
    /// When false they stay pending until their timeout.
    pub fail_pending_on_disconnect: bool,

    #[serde(with = "humantime_serde")]
    pub reconnect_initial_backoff: Duration,

    #[serde(with = "humantime_serde")]
    pub reconnect_max_backoff: Duration,

    /// Per-operation timeout overrides, keyed by operation name
    #[serde(with = "humantime_serde::map")]
    pub operation_timeouts: HashMap<String, Duration>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(30),
            cleanup_interval: Duration::from_millis(250),
            fail_pending_on_disconnect: true,
            reconnect_initial_backoff: Duration::from_millis(100),
            reconnect_max_backoff: Duration::from_secs(5),
            operation_timeouts: HashMap::new(),
        }
    }
}

impl BridgeConfig {
    /// Timeout applying to `operation`.
    pub fn timeout_for(&self, operation: &str) -> Duration {
        self.operation_timeouts
            .get(operation)
            .copied()
            .unwrap_or(self.default_timeout)
    }

    /// Backoff to wait after `current`, doubling up to the configured cap.
    pub fn next_backoff(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.reconnect_max_backoff)
    }
}

/// Wallet engine process settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Program speaking the JSON-lines engine protocol on stdin/stdout
    pub command: String,
    pub args: Vec<String>,
    /// Directory holding the engine's database file
    pub storage_dir: PathBuf,

    /// Wait before restarting an engine that exited on its own. Doubles on
    /// every exit until the engine answers `init` again.
    #[serde(with = "humantime_serde")]
    pub restart_initial_backoff: Duration,

    #[serde(with = "humantime_serde")]
    pub restart_max_backoff: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            command: "taler-wallet-cli".to_string(),
            args: vec!["advanced".to_string(), "serve".to_string()],
            storage_dir: PathBuf::from("./wallet-data"),
            restart_initial_backoff: Duration::from_millis(500),
            restart_max_backoff: Duration::from_secs(30),
        }
    }
}

impl EngineConfig {
    /// Path the engine is told to persist its database at.
    pub fn database_path(&self) -> PathBuf {
        self.storage_dir.join("talerwalletdb.json")
    }

    pub fn next_restart_backoff(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.restart_max_backoff)
    }
}

/// Notification bus settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Events buffered per subscriber before the slowest one lags
    pub capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            capacity: wallet_bus::DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {error}", .path.display())]
    Io { path: PathBuf, error: String },

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Durations as `"30s"`, `"250ms"`, `"2m"` or plain seconds, either as a
/// string or a bare integer.
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[derive(Deserialize)]
    #[serde(untagged)]
    pub(super) enum RawDuration {
        Seconds(u64),
        Text(String),
    }

    impl RawDuration {
        pub(super) fn into_duration(self) -> Result<Duration, &'static str> {
            match self {
                RawDuration::Seconds(secs) => Ok(Duration::from_secs(secs)),
                RawDuration::Text(text) => parse_duration(&text),
            }
        }
    }

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format_duration(*duration))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        RawDuration::deserialize(deserializer)?
            .into_duration()
            .map_err(serde::de::Error::custom)
    }

    pub fn format_duration(duration: Duration) -> String {
        if duration.subsec_millis() == 0 {
            format!("{}s", duration.as_secs())
        } else {
            format!("{}ms", duration.as_millis())
        }
    }

    pub fn parse_duration(s: &str) -> Result<Duration, &'static str> {
        let s = s.trim();
        // "ms" before "s" and "m": both are suffixes of it.
        if let Some(ms) = s.strip_suffix("ms") {
            ms.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| "invalid milliseconds")
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid seconds")
        } else if let Some(mins) = s.strip_suffix('m') {
            let mins = mins.trim().parse::<u64>().map_err(|_| "invalid minutes")?;
            mins.checked_mul(60)
                .map(Duration::from_secs)
                .ok_or("minutes out of range")
        } else {
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid duration format")
        }
    }

    pub mod map {
        use serde::ser::SerializeMap;
        use serde::{Deserialize, Deserializer, Serializer};
        use std::collections::HashMap;
        use std::time::Duration;

        pub fn serialize<S>(
            durations: &HashMap<String, Duration>,
            serializer: S,
        ) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            let mut map = serializer.serialize_map(Some(durations.len()))?;
            for (key, duration) in durations {
                map.serialize_entry(key, &super::format_duration(*duration))?;
            }
            map.end()
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<HashMap<String, Duration>, D::Error>
        where
            D: Deserializer<'de>,
        {
            HashMap::<String, super::RawDuration>::deserialize(deserializer)?
                .into_iter()
                .map(|(key, raw)| {
                    raw.into_duration()
                        .map(|duration| (key, duration))
                        .map_err(serde::de::Error::custom)
                })
                .collect()
        }
    }
}
