use crate::config::TelemetryConfig;
use std::fmt;
use tracing::info;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::EnvFilter;

/// Name attached to the startup event and used as the default filter target.
pub const SERVICE_NAME: &str = "leaseflow";

#[derive(Debug)]
pub enum TelemetryError {
    EnvFilter { value: String, source: ParseError },
    Subscriber(Box<dyn std::error::Error + Send + Sync>),
}

impl fmt::Display for TelemetryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryError::EnvFilter { value, .. } => {
                write!(f, "APP_LOG_LEVEL '{value}' is not a valid tracing filter")
            }
            TelemetryError::Subscriber(err) => {
                write!(f, "could not install the {SERVICE_NAME} subscriber: {err}")
            }
        }
    }
}

impl std::error::Error for TelemetryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TelemetryError::EnvFilter { source, .. } => Some(source),
            TelemetryError::Subscriber(err) => Some(&**err),
        }
    }
}

/// Expand a bare level such as `debug` so it applies to the leasing crates
/// while dependencies stay at `warn`. Full directive lists pass through.
pub fn default_directives(log_level: &str) -> String {
    let level = log_level.trim();
    if level.contains('=') || level.contains(',') {
        return level.to_string();
    }
    format!("warn,{SERVICE_NAME}={level},{SERVICE_NAME}_api={level}")
}

/// Install the global fmt subscriber. `RUST_LOG` takes precedence over the configured level.
pub fn init(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let (env_filter, directives) = match EnvFilter::try_from_default_env() {
        Ok(filter) => {
            let directives = filter.to_string();
            (filter, directives)
        }
        Err(_) => {
            let directives = default_directives(&config.log_level);
            let filter =
                EnvFilter::try_new(&directives).map_err(|source| TelemetryError::EnvFilter {
                    value: config.log_level.clone(),
                    source,
                })?;
            (filter, directives)
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .compact()
        .with_ansi(false)
        .try_init()
        .map_err(TelemetryError::Subscriber)?;

    info!(service = SERVICE_NAME, filter = %directives, "telemetry initialised");
    Ok(())
}
