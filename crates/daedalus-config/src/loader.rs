//! Configuration loader with layered approach.
//!
//! This module provides the [`ConfigLoader`] for loading configuration from
//! files and environment variables, plus the [`load_config`] and
//! [`must_load`] shortcuts used by applications.

use std::env;
use std::fs;
use std::path::Path;

use serde_json::{Map, Value};

use crate::config::Config;
use crate::error::{ConfigError, ConfigResult};
use crate::schema::{GrpcSection, HttpSection, MysqlSection, RedisSection};

/// Prefix of environment overrides read by [`load_config`].
pub const ENV_PREFIX: &str = "DAEDALUS";

/// Source document format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// TOML
    Toml,
    /// JSON
    Json,
}

impl Format {
    /// Picks the format from a file extension.
    pub fn from_path(path: &Path) -> ConfigResult<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);

        match extension.as_deref() {
            Some("toml") => Ok(Self::Toml),
            Some("json") => Ok(Self::Json),
            _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        }
    }

    fn parse(self, content: &str) -> ConfigResult<Value> {
        let value = match self {
            Self::Toml => toml::from_str(content)?,
            Self::Json => serde_json::from_str(content)?,
        };
        Ok(value)
    }
}

/// Loads a file, applies `DAEDALUS__*` overrides and validates the result.
///
/// A `.env` file in the working directory is loaded first if present.
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<Config> {
    ConfigLoader::new()
        .with_dotenv()
        .with_file(path)?
        .with_env_prefix(ENV_PREFIX)
        .load()
}

/// Like [`load_config`] but panics on error.
///
/// # Panics
///
/// Panics if the configuration cannot be loaded or is invalid.
pub fn must_load(path: impl AsRef<Path>) -> Config {
    match load_config(path) {
        Ok(config) => config,
        Err(e) => panic!("failed to load configuration: {e}"),
    }
}

/// Configuration loader with layered approach.
///
/// The loader applies configuration in layers, with later layers overriding
/// earlier ones key by key:
/// 1. Default values (built into the code)
/// 2. Configuration files and strings, in the order added
/// 3. Environment variables
///
/// Environment variables use `PREFIX__SECTION__KEY`, e.g.
/// `DAEDALUS__HTTP__ADDR=:9000` or `DAEDALUS__QUEUE__POOL_SIZE=64`. Each
/// segment matches a config key ignoring case and underscores. Values are
/// typed after the key they replace.
///
/// # Example
///
/// ```
/// use daedalus_config::{ConfigLoader, Format};
///
/// let config = ConfigLoader::new()
///     .with_string("[http]\naddr = \":8080\"\nreadTimeout = 5", Format::Toml)
///     .unwrap()
///     .with_env_vars([("APP__HTTP__ADDR", ":9000")], "APP")
///     .unwrap()
///     .load()
///     .unwrap();
///
/// let http = config.http.unwrap();
/// assert_eq!(http.server.addr, ":9000");
/// assert_eq!(http.server.read_timeout, 5);
/// ```
#[derive(Debug)]
pub struct ConfigLoader {
    value: Value,
    env_prefix: Option<String>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a new configuration loader.
    #[must_use]
    pub fn new() -> Self {
        Self {
            value: Value::Object(Map::new()),
            env_prefix: None,
        }
    }

    /// Load configuration from a file.
    ///
    /// The format is determined by the file extension.
    pub fn with_file<P: AsRef<Path>>(self, path: P) -> ConfigResult<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        let format = Format::from_path(path)?;
        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;
        self.with_string(&content, format)
    }

    /// Load configuration from an optional file.
    ///
    /// If the file exists, loads it. If not, silently continues.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> ConfigResult<Self> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Load configuration from a string.
    pub fn with_string(mut self, content: &str, format: Format) -> ConfigResult<Self> {
        let layer = format.parse(content)?;
        if !layer.is_object() {
            return Err(ConfigError::validation_error("configuration root must be a table"));
        }
        merge(&mut self.value, layer);
        Ok(self)
    }

    /// Read overrides from process environment variables starting with
    /// `PREFIX__` when [`load`](Self::load) runs.
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Apply overrides from explicit `(name, value)` pairs, filtered by `prefix`.
    pub fn with_env_vars<I, K, V>(mut self, vars: I, prefix: &str) -> ConfigResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        apply_env_overrides(&mut self.value, &prefix.to_uppercase(), vars)?;
        Ok(self)
    }

    /// Load a `.env` file into the process environment.
    ///
    /// Uses the `dotenvy` crate. A missing file is not an error.
    #[must_use]
    pub fn with_dotenv(self) -> Self {
        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!(path = %path.display(), "loaded .env file"),
            Err(e) if e.not_found() => {}
            Err(e) => tracing::warn!(error = %e, "failed to load .env file"),
        }
        self
    }

    /// Finalize, apply environment overrides and validate.
    pub fn load(self) -> ConfigResult<Config> {
        let config = self.load_unvalidated()?;
        config.validate()?;
        Ok(config)
    }

    /// Finalize without validation.
    pub fn load_unvalidated(mut self) -> ConfigResult<Config> {
        if let Some(prefix) = self.env_prefix.take() {
            apply_env_overrides(&mut self.value, &prefix, env::vars())?;
        }
        Ok(serde_json::from_value(self.value)?)
    }
}

// Deep-merge `layer` into `base`; tables merge, everything else replaces.
fn merge(base: &mut Value, layer: Value) {
    match (base, layer) {
        (Value::Object(base), Value::Object(layer)) => {
            for (key, value) in layer {
                match base.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, layer) => *base = layer,
    }
}

// A config with every section present, used to type override values.
fn template() -> Value {
    let full = Config {
        http: Some(HttpSection::default()),
        grpc: Some(GrpcSection::default()),
        queue: Some(daedalus_queue::QueueConfig::default()),
        mysql: Some(MysqlSection::default()),
        redis: Some(RedisSection::default()),
        ..Config::default()
    };
    serde_json::to_value(full).unwrap_or(Value::Null)
}

fn normalize(key: &str) -> String {
    key.chars()
        .filter(|c| *c != '_')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

fn camel_case(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for (i, word) in segment.split('_').filter(|w| !w.is_empty()).enumerate() {
        let word = word.to_ascii_lowercase();
        if i == 0 {
            out.push_str(&word);
        } else {
            let mut chars = word.chars();
            if let Some(first) = chars.next() {
                out.push(first.to_ascii_uppercase());
                out.extend(chars);
            }
        }
    }
    out
}

fn find_key(map: &Map<String, Value>, segment: &str) -> Option<String> {
    let wanted = normalize(segment);
    map.keys().find(|key| normalize(key) == wanted).cloned()
}

fn apply_env_overrides<I, K, V>(root: &mut Value, prefix: &str, vars: I) -> ConfigResult<()>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let marker = format!("{prefix}__");
    let template = template();

    for (key, value) in vars {
        let (key, value) = (key.as_ref(), value.as_ref());
        let Some(path) = key.strip_prefix(&marker) else {
            continue;
        };
        let segments: Vec<&str> = path.split("__").collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(ConfigError::env_parse_error(key, "invalid key format"));
        }
        set_path(root, &template, &segments, key, value)?;
        tracing::debug!(var = %key, "applied environment override");
    }
    Ok(())
}

fn set_path(root: &mut Value, template: &Value, segments: &[&str], var: &str, raw: &str) -> ConfigResult<()> {
    let mut node = root;
    let mut hint = Some(template);

    for (i, segment) in segments.iter().enumerate() {
        if node.is_null() {
            *node = Value::Object(Map::new());
        }
        let Value::Object(map) = node else {
            return Err(ConfigError::env_parse_error(var, "parent key is not a table"));
        };

        let hint_map = hint.and_then(Value::as_object);
        let name = find_key(map, segment)
            .or_else(|| hint_map.and_then(|m| find_key(m, segment)))
            .unwrap_or_else(|| camel_case(segment));
        hint = hint_map.and_then(|m| m.get(&name));

        if i + 1 == segments.len() {
            let existing = map.get(&name).filter(|v| !v.is_null()).or(hint);
            let typed = typed_value(existing, raw).map_err(|reason| ConfigError::env_parse_error(var, reason))?;
            map.insert(name, typed);
            return Ok(());
        }
        node = map.entry(name).or_insert(Value::Null);
    }
    Ok(())
}

fn typed_value(like: Option<&Value>, raw: &str) -> Result<Value, String> {
    match like {
        Some(Value::String(_)) => Ok(Value::String(raw.to_string())),
        Some(Value::Bool(_)) => parse_bool(raw)
            .map(Value::Bool)
            .ok_or_else(|| "expected boolean".to_string()),
        Some(Value::Number(_)) => parse_number(raw).ok_or_else(|| "expected number".to_string()),
        Some(Value::Array(_)) => Ok(Value::Array(
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| Value::String(s.to_string()))
                .collect(),
        )),
        Some(Value::Object(_)) => Err("cannot override a table with a scalar".to_string()),
        Some(Value::Null) | None => Ok(parse_bool(raw)
            .map(Value::Bool)
            .or_else(|| parse_number(raw))
            .unwrap_or_else(|| Value::String(raw.to_string()))),
    }
}

fn parse_number(raw: &str) -> Option<Value> {
    if let Ok(n) = raw.parse::<i64>() {
        return Some(Value::from(n));
    }
    raw.parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
