use std::time::Duration;
use tracing::{Level, warn};

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

pub const DEFAULT_ENDPOINT: &str = "ws://localhost:8006";
pub const DEFAULT_USER_ID: &str = "unity_user";
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Holds all configuration for the Neuro client.
#[derive(Clone, Debug)]
pub struct Config {
    /// `ws://` or `wss://` address of the Neuro service.
    pub endpoint: String,
    pub auto_connect: bool,
    pub auto_reconnect: bool,
    pub reconnect_delay: Duration,
    /// `None` disables the heartbeat timer.
    pub heartbeat_interval: Option<Duration>,
    /// Upper bound on a single read before the connection is declared dead.
    pub read_timeout: Duration,
    pub user_id: String,
    pub log_level: Level,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            auto_connect: true,
            auto_reconnect: true,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            heartbeat_interval: Some(DEFAULT_HEARTBEAT_INTERVAL),
            read_timeout: DEFAULT_READ_TIMEOUT,
            user_id: DEFAULT_USER_ID.to_string(),
            log_level: Level::INFO,
        }
    }
}

impl Config {
    /// Defaults pointed at a specific endpoint.
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let endpoint =
            std::env::var("NEURO_ENDPOINT").unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string());
        validate_endpoint(&endpoint)
            .map_err(|e| ConfigError::InvalidValue("NEURO_ENDPOINT".to_string(), e))?;

        let auto_connect = bool_var("NEURO_AUTO_CONNECT", true)?;
        let auto_reconnect = bool_var("NEURO_AUTO_RECONNECT", true)?;

        let reconnect_delay = match secs_var("NEURO_RECONNECT_DELAY_SECS")? {
            Some(secs) => duration_from_secs("NEURO_RECONNECT_DELAY_SECS", secs)?,
            None => DEFAULT_RECONNECT_DELAY,
        };

        let heartbeat_interval = match secs_var("NEURO_HEARTBEAT_INTERVAL_SECS")? {
            Some(secs) if secs <= 0.0 => None,
            Some(secs) => Some(duration_from_secs("NEURO_HEARTBEAT_INTERVAL_SECS", secs)?),
            None => Some(DEFAULT_HEARTBEAT_INTERVAL),
        };

        let read_timeout = match secs_var("NEURO_READ_TIMEOUT_SECS")? {
            Some(secs) if secs <= 0.0 => {
                return Err(ConfigError::InvalidValue(
                    "NEURO_READ_TIMEOUT_SECS".to_string(),
                    "must be greater than zero".to_string(),
                ));
            }
            Some(secs) => duration_from_secs("NEURO_READ_TIMEOUT_SECS", secs)?,
            None => DEFAULT_READ_TIMEOUT,
        };

        let user_id =
            std::env::var("NEURO_USER_ID").unwrap_or_else(|_| DEFAULT_USER_ID.to_string());
        if user_id.trim().is_empty() {
            return Err(ConfigError::MissingVar(
                "NEURO_USER_ID must not be blank".to_string(),
            ));
        }

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let config = Self {
            endpoint,
            auto_connect,
            auto_reconnect,
            reconnect_delay,
            heartbeat_interval,
            read_timeout,
            user_id,
            log_level,
        };
        if let Some(interval) = config.heartbeat_interval.filter(|i| *i >= config.read_timeout) {
            warn!(
                heartbeat_secs = interval.as_secs_f64(),
                read_timeout_secs = config.read_timeout.as_secs_f64(),
                "Heartbeat interval is not shorter than the read timeout, \
                 quiet sessions will time out and reconnect"
            );
        }
        Ok(config)
    }

    /// Whether heartbeat traffic can arrive before a quiet read times out.
    /// A disabled heartbeat never keeps the session alive.
    pub fn heartbeat_keeps_alive(&self) -> bool {
        self.heartbeat_interval.is_some_and(|interval| interval < self.read_timeout)
    }
}

/// Checks that an endpoint is a WebSocket URL.
pub fn validate_endpoint(endpoint: &str) -> Result<(), String> {
    let rest = endpoint
        .strip_prefix("ws://")
        .or_else(|| endpoint.strip_prefix("wss://"))
        .ok_or_else(|| format!("'{}' is not a ws:// or wss:// URL", endpoint))?;
    if rest.is_empty() || rest.starts_with('/') {
        return Err(format!("'{}' has no host", endpoint));
    }
    Ok(())
}

fn bool_var(name: &str, default: bool) -> Result<bool, ConfigError> {
    let Ok(raw) = std::env::var(name) else {
        return Ok(default);
    };
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue(
            name.to_string(),
            format!("'{}' is not a boolean", raw),
        )),
    }
}

fn secs_var(name: &str) -> Result<Option<f64>, ConfigError> {
    let Ok(raw) = std::env::var(name) else {
        return Ok(None);
    };
    let secs = raw
        .trim()
        .parse::<f64>()
        .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string()))?;
    if !secs.is_finite() {
        return Err(ConfigError::InvalidValue(
            name.to_string(),
            format!("'{}' is not a finite number of seconds", raw),
        ));
    }
    Ok(Some(secs))
}

fn duration_from_secs(name: &str, secs: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(secs)
        .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    fn clear_env_vars() {
        unsafe {
            env::remove_var("NEURO_ENDPOINT");
            env::remove_var("NEURO_AUTO_CONNECT");
            env::remove_var("NEURO_AUTO_RECONNECT");
            env::remove_var("NEURO_RECONNECT_DELAY_SECS");
            env::remove_var("NEURO_HEARTBEAT_INTERVAL_SECS");
            env::remove_var("NEURO_READ_TIMEOUT_SECS");
            env::remove_var("NEURO_USER_ID");
            env::remove_var("RUST_LOG");
        }
    }

    #[test]
    fn test_config_error_display() {
        let missing_var = ConfigError::MissingVar("TEST_VAR".to_string());
        assert_eq!(
            format!("{}", missing_var),
            "Missing environment variable: TEST_VAR"
        );

        let invalid_value =
            ConfigError::InvalidValue("TEST_VAR".to_string(), "bad_value".to_string());
        assert_eq!(
            format!("{}", invalid_value),
            "Invalid value for environment variable TEST_VAR: bad_value"
        );
    }

    #[test]
    fn test_validate_endpoint() {
        assert!(validate_endpoint("ws://localhost:8006").is_ok());
        assert!(validate_endpoint("wss://neuro.example.com/socket").is_ok());
        assert!(validate_endpoint("http://localhost:8006").is_err());
        assert!(validate_endpoint("ws://").is_err());
        assert!(validate_endpoint("localhost:8006").is_err());
    }

    #[test]
    #[serial]
    fn test_config_from_env_defaults() {
        clear_env_vars();

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.endpoint, "ws://localhost:8006");
        assert!(config.auto_connect);
        assert!(config.auto_reconnect);
        assert_eq!(config.reconnect_delay, Duration::from_secs(5));
        assert_eq!(config.heartbeat_interval, Some(Duration::from_secs(10)));
        assert_eq!(config.read_timeout, Duration::from_secs(30));
        assert!(config.heartbeat_keeps_alive());
        assert_eq!(config.user_id, "unity_user");
        assert_eq!(config.log_level, Level::INFO);
    }

    #[test]
    #[serial]
    fn test_config_from_env_custom_values() {
        clear_env_vars();
        unsafe {
            env::set_var("NEURO_ENDPOINT", "wss://neuro.example.com/ws");
            env::set_var("NEURO_AUTO_CONNECT", "false");
            env::set_var("NEURO_AUTO_RECONNECT", "0");
            env::set_var("NEURO_RECONNECT_DELAY_SECS", "2.5");
            env::set_var("NEURO_HEARTBEAT_INTERVAL_SECS", "10");
            env::set_var("NEURO_READ_TIMEOUT_SECS", "0.75");
            env::set_var("NEURO_USER_ID", "player_two");
            env::set_var("RUST_LOG", "debug");
        }

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.endpoint, "wss://neuro.example.com/ws");
        assert!(!config.auto_connect);
        assert!(!config.auto_reconnect);
        assert_eq!(config.reconnect_delay, Duration::from_millis(2500));
        assert_eq!(config.heartbeat_interval, Some(Duration::from_secs(10)));
        assert_eq!(config.read_timeout, Duration::from_millis(750));
        assert_eq!(config.user_id, "player_two");
        assert_eq!(config.log_level, Level::DEBUG);
    }

    #[test]
    fn test_heartbeat_keeps_alive_only_when_shorter_than_read_timeout() {
        assert!(Config::default().heartbeat_keeps_alive());

        let config = |heartbeat: Option<u64>, read_timeout: u64| Config {
            heartbeat_interval: heartbeat.map(Duration::from_secs),
            read_timeout: Duration::from_secs(read_timeout),
            ..Config::default()
        };
        assert!(config(Some(29), 30).heartbeat_keeps_alive());
        assert!(!config(Some(30), 30).heartbeat_keeps_alive());
        assert!(!config(Some(45), 30).heartbeat_keeps_alive());
        assert!(!config(None, 30).heartbeat_keeps_alive());
    }

    #[test]
    #[serial]
    fn test_slow_heartbeat_still_loads() {
        clear_env_vars();
        unsafe {
            env::set_var("NEURO_HEARTBEAT_INTERVAL_SECS", "60");
            env::set_var("NEURO_READ_TIMEOUT_SECS", "30");
        }

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.heartbeat_interval, Some(Duration::from_secs(60)));
        assert!(!config.heartbeat_keeps_alive());
    }

    #[test]
    #[serial]
    fn test_non_positive_heartbeat_disables_timer() {
        for value in ["0", "-1", "0.0"] {
            clear_env_vars();
            unsafe {
                env::set_var("NEURO_HEARTBEAT_INTERVAL_SECS", value);
            }
            let config = Config::from_env().expect("Config should load successfully");
            assert_eq!(config.heartbeat_interval, None, "value {value}");
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_endpoint() {
        clear_env_vars();
        unsafe {
            env::set_var("NEURO_ENDPOINT", "http://localhost:8006");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "NEURO_ENDPOINT"),
            _ => panic!("Expected InvalidValue for NEURO_ENDPOINT"),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_numbers_and_flags() {
        let cases = [
            ("NEURO_RECONNECT_DELAY_SECS", "soon"),
            ("NEURO_RECONNECT_DELAY_SECS", "-3"),
            ("NEURO_HEARTBEAT_INTERVAL_SECS", "NaN"),
            ("NEURO_READ_TIMEOUT_SECS", "0"),
            ("NEURO_AUTO_RECONNECT", "maybe"),
            ("RUST_LOG", "not-a-level"),
        ];
        for (var, value) in cases {
            clear_env_vars();
            unsafe {
                env::set_var(var, value);
            }
            match Config::from_env().unwrap_err() {
                ConfigError::InvalidValue(name, _) => assert_eq!(name, var),
                other => panic!("Expected InvalidValue for {var}, got {other:?}"),
            }
        }
    }

    #[test]
    #[serial]
    fn test_config_blank_user_id() {
        clear_env_vars();
        unsafe {
            env::set_var("NEURO_USER_ID", "   ");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::MissingVar(msg) => assert!(msg.contains("NEURO_USER_ID")),
            _ => panic!("Expected MissingVar for NEURO_USER_ID"),
        }
    }
}
