//! Layered configuration loading.
//!
//! A [`ConfigLoader`] resolves a destination struct from up to three layers,
//! later layers winning at field granularity:
//!
//! 1. inline raw bytes (lowest),
//! 2. config files, in the order given,
//! 3. environment variables with a configured prefix (highest).
//!
//! Layers are deep-merged as JSON trees before a single deserialization, so
//! destinations usually want `#[serde(default)]`. After deserialization the
//! destination's [`ConfigSection::set_defaults`] and
//! [`ConfigSection::validate`] callbacks run.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::ConfigError;

/// Supported on-disk/inline config formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Toml,
}

/// A configuration destination with optional default-filling and
/// validation callbacks.
pub trait ConfigSection: DeserializeOwned {
    /// Fill in defaults for fields the layers left unset.
    fn set_defaults(&mut self) {}

    /// Reject inconsistent configurations.
    fn validate(&self) -> Result<(), ConfigError> {
        Ok(())
    }
}

/// Layered config loader. Cheap to clone; the boot event carries a copy so
/// boot handlers can load their own sections.
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    raw: Option<(Vec<u8>, ConfigFormat)>,
    files: Vec<PathBuf>,
    env_prefix: Option<String>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the inline raw layer (lowest priority).
    pub fn with_raw(mut self, bytes: impl Into<Vec<u8>>, format: ConfigFormat) -> Self {
        self.raw = Some((bytes.into(), format));
        self
    }

    /// Append a config file layer; the format is derived from the
    /// extension (`.json`, `.toml`).
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.files.push(path.into());
        self
    }

    /// Enable the environment overlay for variables starting with `prefix`
    /// (the prefix is literal, e.g. `"MYAPP_"`). Nested fields are
    /// addressed with `__`; values are parsed as JSON scalars where
    /// possible, strings otherwise.
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = Some(prefix.into());
        self
    }

    /// Resolve a populated, validated `T` from all configured layers.
    pub fn load<T: ConfigSection>(&self) -> Result<T, ConfigError> {
        let mut merged = Map::new();

        if let Some((bytes, format)) = &self.raw {
            merge(&mut merged, parse_layer(bytes, *format)?);
        }

        for path in &self.files {
            let bytes = std::fs::read(path).map_err(|source| ConfigError::Read {
                path: path.clone(),
                source,
            })?;
            merge(&mut merged, parse_layer(&bytes, format_for(path)?)?);
        }

        if let Some(prefix) = &self.env_prefix {
            apply_env_overlay(&mut merged, prefix);
        }

        let mut out: T = serde_json::from_value(Value::Object(merged))?;
        out.set_defaults();
        out.validate()?;
        Ok(out)
    }
}

fn format_for(path: &Path) -> Result<ConfigFormat, ConfigError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => Ok(ConfigFormat::Json),
        Some("toml") => Ok(ConfigFormat::Toml),
        _ => Err(ConfigError::UnknownFormat(path.to_path_buf())),
    }
}

fn parse_layer(bytes: &[u8], format: ConfigFormat) -> Result<Map<String, Value>, ConfigError> {
    let value = match format {
        ConfigFormat::Json => serde_json::from_slice::<Value>(bytes)
            .map_err(|e| ConfigError::Parse(e.to_string()))?,
        ConfigFormat::Toml => {
            let text =
                std::str::from_utf8(bytes).map_err(|e| ConfigError::Parse(e.to_string()))?;
            let table: toml::Value =
                toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
            serde_json::to_value(table)?
        }
    };
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(ConfigError::NotAnObject),
    }
}

/// Deep-merge `src` into `dst`; scalars and arrays in `src` overwrite.
fn merge(dst: &mut Map<String, Value>, src: Map<String, Value>) {
    for (key, value) in src {
        if let Value::Object(incoming) = value {
            if let Some(Value::Object(existing)) = dst.get_mut(&key) {
                merge(existing, incoming);
                continue;
            }
            dst.insert(key, Value::Object(incoming));
        } else {
            dst.insert(key, value);
        }
    }
}

fn apply_env_overlay(dst: &mut Map<String, Value>, prefix: &str) {
    // vars_os, not vars: a single non-Unicode entry anywhere in the
    // process environment must not abort the overlay.
    for (key, raw) in std::env::vars_os() {
        let (Some(key), Some(raw)) = (key.to_str(), raw.to_str()) else {
            continue;
        };
        let Some(rest) = key.strip_prefix(prefix) else {
            continue;
        };
        if rest.is_empty() {
            continue;
        }
        let segments: Vec<String> = rest.to_lowercase().split("__").map(String::from).collect();
        insert_path(dst, &segments, env_value(raw));
    }
}

/// Try to interpret the variable as a JSON scalar ("8080", "true"), fall
/// back to a plain string.
fn env_value(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        Ok(v @ (Value::Bool(_) | Value::Number(_) | Value::Null)) => v,
        _ => Value::String(raw.to_string()),
    }
}

fn insert_path(dst: &mut Map<String, Value>, segments: &[String], value: Value) {
    let (head, rest) = match segments.split_first() {
        Some(parts) => parts,
        None => return,
    };
    if rest.is_empty() {
        dst.insert(head.clone(), value);
        return;
    }
    let child = dst
        .entry(head.clone())
        .or_insert_with(|| Value::Object(Map::new()));
    if !child.is_object() {
        *child = Value::Object(Map::new());
    }
    if let Value::Object(map) = child {
        insert_path(map, rest, value);
    }
}
