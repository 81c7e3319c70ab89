//! Receiver configuration.
//!
//! Values come from an optional per-environment properties file
//! (`<dir>/<env>.properties`, read as INI) and from environment variables,
//! which take precedence. The variable for a key is the key uppercased with
//! `.` replaced by `_`, so `stripe.webhook.secret` is overridden by
//! `STRIPE_WEBHOOK_SECRET`.
//!
//! A value of exactly `${NAME}` is an indirection: it resolves to the
//! environment variable `NAME`.
//!
//! ```text
//! # config/test.properties
//! stripe.webhook.secret=${STRIPE_WEBHOOK_SECRET_TEST}
//! webhook.port=9090
//! webhook.bind=127.0.0.1
//! ```

use std::fmt;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use ::config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

/// Key holding the Stripe webhook signing secret.
pub const KEY_SECRET: &str = "stripe.webhook.secret";
/// Key holding the listen port.
pub const KEY_PORT: &str = "webhook.port";
/// Key holding the listen address.
pub const KEY_BIND: &str = "webhook.bind";

/// Environment variable selecting the properties file.
const ENV_NAME_VAR: &str = "ENV";
/// Environment variable overriding the properties directory.
const CONFIG_DIR_VAR: &str = "WEBHOOK_CONFIG_DIR";

const DEFAULT_ENV: &str = "test";
const DEFAULT_CONFIG_DIR: &str = "config";
const DEFAULT_PORT: u16 = 9090;
const DEFAULT_BIND: IpAddr = IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED);

/// Configuration errors. All of them are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The signing secret is missing or blank.
    #[error("missing webhook signing secret (set stripe.webhook.secret or STRIPE_WEBHOOK_SECRET)")]
    MissingSecret,

    /// A value could not be parsed.
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },

    /// The properties file exists but could not be read or parsed.
    #[error("failed to load {}: {source}", path.display())]
    Source {
        path: PathBuf,
        #[source]
        source: ::config::ConfigError,
    },
}

/// The webhook signing secret.
///
/// Its contents never appear in `Debug` output or logs.
#[derive(Clone, PartialEq, Eq)]
pub struct WebhookSecret(String);

impl WebhookSecret {
    pub fn new(secret: impl Into<String>) -> Self {
        WebhookSecret(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for WebhookSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WebhookSecret(***)")
    }
}

/// Raw layered settings, before indirection and parsing.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Settings {
    stripe: StripeSettings,
    webhook: ListenerSettings,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StripeSettings {
    webhook: StripeWebhookSettings,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StripeWebhookSettings {
    secret: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ListenerSettings {
    port: Option<String>,
    bind: Option<String>,
}

/// Resolved receiver configuration.
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    /// Signing secret shared with Stripe.
    pub webhook_secret: WebhookSecret,
    /// Port the listener binds to.
    pub port: u16,
    /// Address the listener binds to.
    pub bind_address: IpAddr,
}

impl ReceiverConfig {
    /// Builds a configuration with default port and bind address.
    pub fn new(webhook_secret: impl Into<String>) -> Self {
        ReceiverConfig {
            webhook_secret: WebhookSecret::new(webhook_secret),
            port: DEFAULT_PORT,
            bind_address: DEFAULT_BIND,
        }
    }

    /// Sets the bind address.
    pub fn with_bind_address(mut self, bind_address: IpAddr) -> Self {
        self.bind_address = bind_address;
        self
    }

    /// Loads configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(|name| std::env::var(name).ok())
    }

    /// Loads configuration using `env` to look up environment variables.
    ///
    /// The properties file is `<WEBHOOK_CONFIG_DIR>/<ENV>.properties`,
    /// defaulting to `config/test.properties`. A missing file is not an error.
    pub fn load(env: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env_name = env(ENV_NAME_VAR).unwrap_or_else(|| DEFAULT_ENV.to_string());
        let dir = env(CONFIG_DIR_VAR).unwrap_or_else(|| DEFAULT_CONFIG_DIR.to_string());
        let path = Path::new(&dir).join(format!("{env_name}.properties"));

        let settings = read_settings(&path, &env)?;
        Self::from_settings(settings, &env)
    }

    fn from_settings(
        settings: Settings,
        env: &impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let webhook_secret = settings
            .stripe
            .webhook
            .secret
            .and_then(|raw| resolve_placeholder(raw, env))
            .filter(|s| !s.trim().is_empty())
            .map(WebhookSecret)
            .ok_or(ConfigError::MissingSecret)?;

        let listener = settings.webhook;
        let port = match listener.port.and_then(|raw| resolve_placeholder(raw, env)) {
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
                key: KEY_PORT,
                value: raw,
            })?,
            None => DEFAULT_PORT,
        };

        let bind_address = match listener.bind.and_then(|raw| resolve_placeholder(raw, env)) {
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
                key: KEY_BIND,
                value: raw,
            })?,
            None => DEFAULT_BIND,
        };

        Ok(ReceiverConfig {
            webhook_secret,
            port,
            bind_address,
        })
    }
}

/// Layers the properties file under the environment overrides.
fn read_settings(
    path: &Path,
    env: &impl Fn(&str) -> Option<String>,
) -> Result<Settings, ConfigError> {
    let overrides: ::config::Map<String, String> = [KEY_SECRET, KEY_PORT, KEY_BIND]
        .into_iter()
        .map(env_var_for)
        .filter_map(|name| env(&name).map(|value| (name, value)))
        .collect();

    debug!(
        path = %path.display(),
        exists = path.is_file(),
        overrides = overrides.len(),
        "Loading receiver configuration"
    );

    let source_error = |source| ConfigError::Source {
        path: path.to_path_buf(),
        source,
    };

    Config::builder()
        .add_source(
            File::from(path.to_path_buf())
                .format(FileFormat::Ini)
                .required(false),
        )
        .add_source(
            Environment::default()
                .separator("_")
                .source(Some(overrides)),
        )
        .build()
        .map_err(source_error)?
        .try_deserialize()
        .map_err(source_error)
}

/// Resolves a value of exactly `${NAME}` to the environment variable `NAME`.
fn resolve_placeholder(raw: String, env: &impl Fn(&str) -> Option<String>) -> Option<String> {
    match raw
        .trim()
        .strip_prefix("${")
        .and_then(|rest| rest.strip_suffix('}'))
    {
        Some(name) => env(name),
        None => Some(raw),
    }
}

/// Maps a property key to its overriding environment variable name.
fn env_var_for(key: &str) -> String {
    key.to_ascii_uppercase().replace('.', "_")
}
