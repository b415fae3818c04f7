use config::{Config, Environment};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variables are read as `ZENTABLE_<FIELD>`
const ENV_PREFIX: &str = "ZENTABLE";

/// Runtime settings for the client layer
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Directory holding the preferences database
    pub data_dir: PathBuf,
    /// Upper bound for a `connect` round trip
    pub connect_timeout: Duration,
    /// Upper bound for every other backend call
    pub request_timeout: Duration,
}

/// Raw overrides as found in the environment, validated field by field
#[derive(Debug, Default, Deserialize)]
struct Overrides {
    data_dir: Option<String>,
    connect_timeout_secs: Option<String>,
    request_timeout_secs: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("zentable");
        Self {
            data_dir,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl ClientConfig {
    /// Defaults, overridden by `ZENTABLE_*` environment variables
    pub fn from_env() -> Self {
        Self::from_environment(Environment::with_prefix(ENV_PREFIX))
    }

    fn from_environment(environment: Environment) -> Self {
        let overrides = Config::builder()
            .add_source(environment)
            .build()
            .and_then(|settings| settings.try_deserialize::<Overrides>());

        match overrides {
            Ok(overrides) => Self::default().with_overrides(overrides),
            Err(e) => {
                tracing::warn!("Ignoring environment configuration: {}", e);
                Self::default()
            }
        }
    }

    fn with_overrides(mut self, overrides: Overrides) -> Self {
        if let Some(dir) = overrides.data_dir.filter(|d| !d.trim().is_empty()) {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(timeout) = seconds("connect_timeout_secs", overrides.connect_timeout_secs) {
            self.connect_timeout = timeout;
        }
        if let Some(timeout) = seconds("request_timeout_secs", overrides.request_timeout_secs) {
            self.request_timeout = timeout;
        }
        self
    }

    pub fn preferences_path(&self) -> PathBuf {
        self.data_dir.join("connections.db")
    }
}

fn seconds(field: &str, raw: Option<String>) -> Option<Duration> {
    let raw = raw?;
    match raw.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Some(Duration::from_secs(secs)),
        _ => {
            tracing::warn!(
                "Ignoring {}_{}={:?}: expected a positive number of seconds",
                ENV_PREFIX,
                field.to_uppercase(),
                raw
            );
            None
        }
    }
}
