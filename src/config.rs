use std::path::PathBuf;
use std::time::Duration;

use http::Uri;
use thiserror::Error;

const fn default_interval() -> Duration {
    Duration::from_secs(30)
}

const fn default_timeout() -> Duration {
    Duration::from_secs(10)
}

const fn default_startup_delay() -> Duration {
    Duration::from_secs(5)
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {name}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Runtime configuration, resolved once at process start. After that
/// the environment is never consulted again.
#[derive(Debug, Clone)]
pub struct Config {
    /// The inventory service endpoint, e.g. `http://inventory:1337/inventory`.
    pub endpoint: Uri,

    /// The interval between update cycles in steady state.
    pub interval: Duration,

    /// Timeout for a single inventory request, should be less than `interval`.
    pub timeout: Duration,

    /// Where the file_sd targets file is published.
    pub targets_file: PathBuf,

    /// The port sensors expose their metrics on.
    pub metrics_port: u16,

    /// The path sensors expose their metrics on.
    pub metrics_path: String,

    /// Value of the `job` label attached to every target.
    pub job: String,

    /// Value of the `environment` label attached to every target.
    pub environment: String,

    /// Publish a targets-only document without any labels.
    pub omit_labels: bool,

    /// How many update cycles may fail before startup is abandoned.
    pub startup_retries: u32,

    /// Fixed delay between startup attempts.
    pub startup_delay: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: Uri::from_static("http://inventory_server:1337/inventory"),
            interval: default_interval(),
            timeout: default_timeout(),
            targets_file: PathBuf::from("/shared/targets.json"),
            metrics_port: 9100,
            metrics_path: "/metrics".to_string(),
            job: "sensors".to_string(),
            environment: "production".to_string(),
            omit_labels: false,
            startup_retries: 10,
            startup_delay: default_startup_delay(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::resolve(|name| std::env::var(name).ok())
    }

    /// Build a `Config` from the given variable lookup, falling back to
    /// defaults for anything unset.
    pub fn resolve<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(value) = lookup("INVENTORY_URL") {
            config.endpoint = value
                .parse::<Uri>()
                .map_err(|err| ConfigError::Invalid {
                    name: "INVENTORY_URL",
                    value,
                    reason: err.to_string(),
                })?;
        }

        if let Some(value) = lookup("UPDATE_INTERVAL") {
            config.interval = parse_seconds("UPDATE_INTERVAL", value)?;
        }

        if let Some(value) = lookup("REQUEST_TIMEOUT") {
            config.timeout = parse_seconds("REQUEST_TIMEOUT", value)?;
        }

        if let Some(value) = lookup("TARGETS_FILE") {
            config.targets_file = PathBuf::from(value);
        }

        if let Some(value) = lookup("METRICS_PORT") {
            config.metrics_port = value
                .parse::<u16>()
                .map_err(|err| ConfigError::Invalid {
                    name: "METRICS_PORT",
                    value,
                    reason: err.to_string(),
                })?;
        }

        if let Some(value) = lookup("METRICS_PATH") {
            config.metrics_path = value;
        }

        if let Some(value) = lookup("JOB_NAME") {
            config.job = value;
        }

        if let Some(value) = lookup("ENVIRONMENT") {
            config.environment = value;
        }

        if let Some(value) = lookup("OMIT_LABELS") {
            config.omit_labels = match value.as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                _ => {
                    return Err(ConfigError::Invalid {
                        name: "OMIT_LABELS",
                        value,
                        reason: "expected a boolean".to_string(),
                    });
                }
            };
        }

        if let Some(value) = lookup("STARTUP_RETRIES") {
            config.startup_retries = value
                .parse::<u32>()
                .map_err(|err| ConfigError::Invalid {
                    name: "STARTUP_RETRIES",
                    value,
                    reason: err.to_string(),
                })?;
        }

        if let Some(value) = lookup("STARTUP_DELAY") {
            config.startup_delay = parse_seconds("STARTUP_DELAY", value)?;
        }

        Ok(config)
    }
}

fn parse_seconds(name: &'static str, value: String) -> Result<Duration, ConfigError> {
    match value.parse::<u64>() {
        Ok(secs) => Ok(Duration::from_secs(secs)),
        Err(err) => Err(ConfigError::Invalid {
            name,
            value,
            reason: err.to_string(),
        }),
    }
}
