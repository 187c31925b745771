//! Load config from file and environment.

use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_API_URL: &str = "https://translate.yandex.net/api/v1.5/tr.json/translate";

/// Client configuration. File: ~/.config/crosstalk/config.toml or /etc/crosstalk/config.toml.
/// Env overrides: CROSSTALK_USERNAME, CROSSTALK_DISCOVERY_PORT, CROSSTALK_TRANSPORT_PORT,
/// CROSSTALK_TRANSLATE, CROSSTALK_LANGUAGE, CROSSTALK_API_KEY, CROSSTALK_API_URL.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Display name shown to peers (default: host name).
    #[serde(default = "default_username")]
    pub username: String,
    /// Discovery UDP port (default 45688).
    #[serde(default = "default_discovery_port")]
    pub discovery_port: u16,
    /// Session TCP port while hosting (default 45689).
    #[serde(default = "default_transport_port")]
    pub transport_port: u16,
    /// Translate incoming messages.
    #[serde(default)]
    pub translate: bool,
    /// Target language for translation mode (default "nl").
    #[serde(default = "default_translation_language")]
    pub translation_language: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Per-call timeout for the translation service.
    #[serde(default = "default_translation_timeout_secs")]
    pub translation_timeout_secs: u64,
    /// Show received messages strictly in arrival order, even when translations finish out of order.
    #[serde(default)]
    pub strict_order: bool,
}

fn default_username() -> String {
    ["HOSTNAME", "USER"]
        .iter()
        .filter_map(|k| std::env::var(k).ok())
        .find(|v| !v.trim().is_empty())
        .unwrap_or_else(|| "crosstalk".to_string())
}
fn default_discovery_port() -> u16 {
    45688
}
fn default_transport_port() -> u16 {
    45689
}
fn default_translation_language() -> String {
    crosstalk_core::session::DEFAULT_TRANSLATION_LANGUAGE.to_string()
}
fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}
fn default_translation_timeout_secs() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            username: default_username(),
            discovery_port: default_discovery_port(),
            transport_port: default_transport_port(),
            translate: false,
            translation_language: default_translation_language(),
            api_url: default_api_url(),
            api_key: None,
            translation_timeout_secs: default_translation_timeout_secs(),
            strict_order: false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Load config: defaults, then the config file (explicit path or first found), then env vars.
/// An explicit path that cannot be read or parsed is an error; a broken default file is logged and skipped.
pub fn load(explicit: Option<&Path>) -> Result<Config, ConfigError> {
    let mut c = match explicit {
        Some(p) => read_file(p)?,
        None => load_default_file().unwrap_or_default(),
    };
    apply_env(&mut c, |k| std::env::var(k).ok());
    Ok(c)
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/crosstalk/config.toml"));
    }
    out.push(PathBuf::from("/etc/crosstalk/config.toml"));
    out
}

fn load_default_file() -> Option<Config> {
    let path = config_paths().into_iter().find(|p| p.exists())?;
    match read_file(&path) {
        Ok(c) => Some(c),
        Err(e) => {
            log::warn!("ignoring config: {}", e);
            None
        }
    }
}

fn read_file(path: &Path) -> Result<Config, ConfigError> {
    let s = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&s).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn parse(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

fn apply_env(c: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(s) = var("CROSSTALK_USERNAME") {
        if !s.trim().is_empty() {
            c.username = s;
        }
    }
    if let Some(s) = var("CROSSTALK_DISCOVERY_PORT") {
        if let Ok(p) = s.parse::<u16>() {
            c.discovery_port = p;
        }
    }
    if let Some(s) = var("CROSSTALK_TRANSPORT_PORT") {
        if let Ok(p) = s.parse::<u16>() {
            c.transport_port = p;
        }
    }
    if let Some(s) = var("CROSSTALK_TRANSLATE") {
        match s.to_ascii_lowercase().as_str() {
            "1" | "true" | "on" | "yes" => c.translate = true,
            "0" | "false" | "off" | "no" => c.translate = false,
            _ => log::warn!("ignoring CROSSTALK_TRANSLATE={}", s),
        }
    }
    if let Some(s) = var("CROSSTALK_LANGUAGE") {
        if !s.trim().is_empty() {
            c.translation_language = s;
        }
    }
    if let Some(s) = var("CROSSTALK_API_KEY") {
        c.api_key = Some(s);
    }
    if let Some(s) = var("CROSSTALK_API_URL") {
        c.api_url = s;
    }
}
