use crate::errors::{Error, Result};
use crate::model::Credentials;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_MQTT_PORT: u16 = 1883;
const BROKER_SCHEMES: [&str; 2] = ["tcp://", "mqtt://"];
const SEARCH_DIRS: [&str; 2] = [".", "/etc/device-locator"];
const CONFIG_EXTENSIONS: [&str; 4] = ["toml", "yaml", "yml", "json"];

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub mqtt: MqttSettings,
    #[serde(default)]
    pub remote: RemoteSettings,
    #[serde(default)]
    pub poll: PollSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
    #[serde(default)]
    pub metrics: MetricsSettings,
    #[serde(default)]
    pub accounts: Vec<Credentials>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MqttSettings {
    pub broker: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Last-will topic
    #[serde(default)]
    pub lwt: Option<String>,
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_true")]
    pub pin_certificate: bool,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollSettings {
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_jitter")]
    pub jitter_secs: u64,
    #[serde(default)]
    pub retries: u32,
    #[serde(default)]
    pub on_error: ErrorPolicy,
}

/// What happens after an account worker reports an error
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// The first error from any account stops the whole process
    #[default]
    FailFast,
    /// Errors are logged; failed refreshes are retried at the next tick
    Continue,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricsSettings {
    #[serde(default)]
    pub addr: Option<String>,
}

fn default_prefix() -> String {
    "owntracks".to_string()
}
fn default_keep_alive() -> u64 {
    30
}
fn default_base_url() -> String {
    "https://fmipmobile.icloud.com".to_string()
}
fn default_true() -> bool {
    true
}
fn default_timeout() -> u64 {
    30
}
fn default_interval() -> u64 {
    900
}
fn default_jitter() -> u64 {
    15
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            pin_certificate: true,
            timeout_secs: default_timeout(),
        }
    }
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            jitter_secs: default_jitter(),
            retries: 0,
            on_error: ErrorPolicy::default(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Settings {
    /// Load configuration from a file and environment variables.
    ///
    /// Without an explicit path, the first `config.{toml,yaml,yml,json}`
    /// found in the working directory or `/etc/device-locator/` is used, and
    /// no other file is merged in. Environment variables with the `LOCATOR__`
    /// prefix override the file.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => Some(path.to_path_buf()),
            None => find_config_file(&SEARCH_DIRS.map(Path::new)),
        };

        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        let settings: Self = builder
            .add_source(config::Environment::with_prefix("LOCATOR").separator("__"))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Parse settings from an in-memory TOML document.
    pub fn from_toml(document: &str) -> Result<Self> {
        let settings: Self = config::Config::builder()
            .add_source(config::File::from_str(document, config::FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.accounts.is_empty() {
            return Err(invalid("no accounts configured"));
        }

        let mut seen = HashSet::new();
        for account in &self.accounts {
            if account.username.is_empty() || account.password.is_empty() {
                return Err(invalid("account username and password must not be empty"));
            }
            if !seen.insert(account.username.as_str()) {
                return Err(invalid(&format!(
                    "account {} is configured twice",
                    account.username
                )));
            }
        }

        if self.mqtt.prefix.is_empty() {
            return Err(invalid("mqtt.prefix must not be empty"));
        }
        self.mqtt.broker_address()?;

        if self.poll.interval_secs == 0 {
            return Err(invalid("poll.interval_secs must be greater than zero"));
        }

        Ok(())
    }
}

impl MqttSettings {
    /// Splits `broker` into host and port. Accepts an optional `tcp://` or
    /// `mqtt://` scheme and defaults to port 1883. Any other scheme is rejected.
    pub fn broker_address(&self) -> Result<(String, u16)> {
        let address = match BROKER_SCHEMES
            .iter()
            .find_map(|scheme| self.broker.strip_prefix(scheme))
        {
            Some(rest) => rest,
            None if self.broker.contains("://") => {
                return Err(invalid(&format!(
                    "unsupported MQTT broker scheme in {}",
                    self.broker
                )))
            }
            None => self.broker.as_str(),
        }
        .trim_end_matches('/');

        if address.is_empty() {
            return Err(invalid("mqtt.broker must not be empty"));
        }

        match address.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse()
                    .map_err(|_| invalid(&format!("invalid MQTT port in {}", self.broker)))?;
                Ok((host.to_string(), port))
            }
            None => Ok((address.to_string(), DEFAULT_MQTT_PORT)),
        }
    }

    pub fn client_id(&self) -> String {
        match self.id.as_deref() {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => format!("locator-{}", uuid::Uuid::new_v4()),
        }
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }
}

impl RemoteSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// First `config.<ext>` in `dirs`, in order.
fn find_config_file(dirs: &[&Path]) -> Option<PathBuf> {
    dirs.iter().find_map(|dir| {
        CONFIG_EXTENSIONS
            .iter()
            .map(|ext| dir.join(format!("config.{}", ext)))
            .find(|candidate| candidate.is_file())
    })
}

fn invalid(message: &str) -> Error {
    Error::Config(config::ConfigError::Message(message.to_string()))
}
