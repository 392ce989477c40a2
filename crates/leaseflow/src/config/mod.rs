use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub leasing: LeasingConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let defaults = LeasingConfig::default();
        let leasing = LeasingConfig {
            application_expiration_days: day_count(
                "LEASING_APPLICATION_EXPIRATION_DAYS",
                defaults.application_expiration_days,
            )?,
            offer_expiration_days: day_count(
                "LEASING_OFFER_EXPIRATION_DAYS",
                defaults.offer_expiration_days,
            )?,
            activation_window_days: day_count(
                "LEASING_ACTIVATION_WINDOW_DAYS",
                defaults.activation_window_days,
            )?,
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            leasing,
        })
    }
}

/// Longest window any leasing setting may span.
pub const MAX_WINDOW_DAYS: i64 = 3650;

fn day_count(variable: &'static str, default: i64) -> Result<i64, ConfigError> {
    match env::var(variable) {
        Ok(raw) => match raw.trim().parse::<i64>() {
            Ok(days) if (1..=MAX_WINDOW_DAYS).contains(&days) => Ok(days),
            _ => Err(ConfigError::InvalidDayCount { variable }),
        },
        Err(_) => Ok(default),
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Windows applied by the application and lease workflows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeasingConfig {
    /// Days an application stays open when the organization has no override.
    pub application_expiration_days: i64,
    /// Days a generated lease offer may be accepted.
    pub offer_expiration_days: i64,
    /// How far ahead of its start date a pending lease may be activated.
    pub activation_window_days: i64,
}

impl Default for LeasingConfig {
    fn default() -> Self {
        Self {
            application_expiration_days: 30,
            offer_expiration_days: 30,
            activation_window_days: 30,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidDayCount { variable: &'static str },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidDayCount { variable } => {
                write!(
                    f,
                    "{variable} must be a number of days between 1 and {MAX_WINDOW_DAYS}"
                )
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort | ConfigError::InvalidDayCount { .. } => None,
            ConfigError::InvalidHost { source } => Some(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        env::remove_var("APP_ENV");
        env::remove_var("APP_HOST");
        env::remove_var("APP_PORT");
        env::remove_var("APP_LOG_LEVEL");
        env::remove_var("LEASING_APPLICATION_EXPIRATION_DAYS");
        env::remove_var("LEASING_OFFER_EXPIRATION_DAYS");
        env::remove_var("LEASING_ACTIVATION_WINDOW_DAYS");
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.leasing, LeasingConfig::default());
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
        reset_env();
    }

    #[test]
    fn reads_leasing_windows_from_env() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("LEASING_APPLICATION_EXPIRATION_DAYS", "45");
        env::set_var("LEASING_OFFER_EXPIRATION_DAYS", "7");
        let config = AppConfig::load().expect("config loads");
        assert_eq!(config.leasing.application_expiration_days, 45);
        assert_eq!(config.leasing.offer_expiration_days, 7);
        assert_eq!(config.leasing.activation_window_days, 30);
        reset_env();
    }

    #[test]
    fn rejects_non_positive_day_counts() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("LEASING_OFFER_EXPIRATION_DAYS", "0");
        match AppConfig::load() {
            Err(ConfigError::InvalidDayCount { variable }) => {
                assert_eq!(variable, "LEASING_OFFER_EXPIRATION_DAYS")
            }
            other => panic!("expected invalid day count, got {other:?}"),
        }
        reset_env();
    }

    #[test]
    fn rejects_day_counts_beyond_ten_years() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("LEASING_ACTIVATION_WINDOW_DAYS", "3650");
        let config = AppConfig::load().expect("upper bound is accepted");
        assert_eq!(config.leasing.activation_window_days, MAX_WINDOW_DAYS);

        env::set_var("LEASING_APPLICATION_EXPIRATION_DAYS", "9223372036854775");
        match AppConfig::load() {
            Err(ConfigError::InvalidDayCount { variable }) => {
                assert_eq!(variable, "LEASING_APPLICATION_EXPIRATION_DAYS")
            }
            other => panic!("expected invalid day count, got {other:?}"),
        }
        reset_env();
    }
}
