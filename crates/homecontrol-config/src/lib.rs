//! Persistent configuration for devolo Home Control clients.
//!
//! TOML profiles, password resolution (env var, keyring, plaintext) and
//! translation to `homecontrol_core::HomeControlConfig`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use homecontrol_core::HomeControlConfig;

const KEYRING_SERVICE: &str = "homecontrol";
const PASSWORD_ENV: &str = "HOMECONTROL_PASSWORD";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{profile}' is not configured")]
    UnknownProfile { profile: String },

    #[error("no password configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when none is named.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named account profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    /// RPC and directory request timeout, seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Look for the gateway in the LAN first.
    #[serde(default = "default_zeroconf")]
    pub zeroconf: bool,

    /// How long to wait for the push channel, seconds.
    #[serde(default = "default_establish_timeout")]
    pub establish_timeout: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            zeroconf: default_zeroconf(),
            establish_timeout: default_establish_timeout(),
        }
    }
}

fn default_timeout() -> u64 {
    30
}
fn default_zeroconf() -> bool {
    true
}
fn default_establish_timeout() -> u64 {
    600
}

/// One directory account.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Profile {
    /// Directory account e-mail.
    pub username: String,

    /// Password in plaintext. Prefer the keyring or an env var.
    pub password: Option<String>,

    /// Name of an env var holding the password.
    pub password_env: Option<String>,

    /// Gateway serial. Unset picks the first gateway of the account.
    pub gateway_id: Option<String>,

    /// Directory base URL override.
    pub directory_url: Option<String>,

    pub zeroconf: Option<bool>,

    pub timeout: Option<u64>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "homecontrol", "homecontrol").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("homecontrol");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the config from the canonical path plus environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load the config from `path` plus `HOMECONTROL_*` environment
/// variables (`HOMECONTROL_DEFAULTS__TIMEOUT=10`).
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("HOMECONTROL_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve the directory password: env var, then keyring, then
/// plaintext in the profile.
pub fn resolve_password(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    // 1. Env var
    let env_name = profile.password_env.as_deref().unwrap_or(PASSWORD_ENV);
    if let Ok(pw) = std::env::var(env_name) {
        return Ok(SecretString::from(pw));
    }

    // 2. Keyring
    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/password")) {
        if let Ok(pw) = entry.get_password() {
            return Ok(SecretString::from(pw));
        }
    }

    // 3. Plaintext in config
    if let Some(ref pw) = profile.password {
        return Ok(SecretString::from(pw.clone()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

/// Store a password in the system keyring for `profile_name`.
pub fn store_password(profile_name: &str, password: &str) -> Result<(), ConfigError> {
    keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/password"))
        .and_then(|entry| entry.set_password(password))
        .map_err(|e| ConfigError::Validation {
            field: "keyring".into(),
            reason: e.to_string(),
        })
}

// ── Translation ─────────────────────────────────────────────────────

impl Config {
    /// Look up a profile, falling back to the default profile name.
    pub fn profile(&self, name: Option<&str>) -> Result<(&str, &Profile), ConfigError> {
        let name = name
            .or(self.default_profile.as_deref())
            .unwrap_or("default");
        self.profiles
            .get_key_value(name)
            .map(|(name, profile)| (name.as_str(), profile))
            .ok_or_else(|| ConfigError::UnknownProfile {
                profile: name.into(),
            })
    }
}

/// Build a `HomeControlConfig` from a profile and the global defaults.
pub fn profile_to_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<HomeControlConfig, ConfigError> {
    if profile.username.is_empty() {
        return Err(ConfigError::Validation {
            field: "username".into(),
            reason: format!("profile '{profile_name}' has no username"),
        });
    }
    let password = resolve_password(profile, profile_name)?;

    let mut config = HomeControlConfig::new(profile.username.clone(), password);
    if let Some(ref url) = profile.directory_url {
        url::Url::parse(url).map_err(|_| ConfigError::Validation {
            field: "directory_url".into(),
            reason: format!("invalid URL: {url}"),
        })?;
        config.directory_url.clone_from(url);
    }
    config.gateway_id.clone_from(&profile.gateway_id);
    config.zeroconf = profile.zeroconf.unwrap_or(defaults.zeroconf);
    config.rpc_timeout = Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout));
    config.establish_timeout = Duration::from_secs(defaults.establish_timeout);
    Ok(config)
}
