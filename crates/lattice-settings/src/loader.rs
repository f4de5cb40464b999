//! Layered settings loading.
//!
//! Layers, lowest priority first:
//! 1. compiled [`ClientSettings::default()`]
//! 2. the JSON settings file (`~/.lattice/settings.json` unless a path is given)
//! 3. `LATTICE_*` environment variables, `__` separating sections
//!
//! Environment keys are upper snake case and are mapped onto the camelCase
//! JSON keys, so `LATTICE_THREADS__SERVER_SIDE_SUPPORT=true` overrides
//! `threads.serverSideSupport`. Values are read as JSON when they parse
//! (`true`, `64`) and as plain strings otherwise.

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Format, Json, Serialized};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::ClientSettings;

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "LATTICE_";

/// Resolve the path to the settings file (`~/.lattice/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".lattice").join("settings.json")
}

/// Load settings from the default path with environment overrides.
pub fn load_settings() -> Result<ClientSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific file with environment overrides.
///
/// A missing file contributes nothing. Invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<ClientSettings> {
    load_layers(path, std::env::vars())
}

fn load_layers(
    path: &Path,
    vars: impl IntoIterator<Item = (String, String)>,
) -> Result<ClientSettings> {
    let mut figment = Figment::from(Serialized::defaults(ClientSettings::default()));

    if path.exists() {
        debug!(?path, "loading settings from file");
        figment = figment.merge(Json::file(path));
    } else {
        debug!(?path, "settings file not found, using defaults");
    }

    let overrides = env_overrides(vars);
    if overrides.as_object().is_some_and(|o| !o.is_empty()) {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    let settings: ClientSettings = figment.extract()?;
    settings.validate()?;
    Ok(settings)
}

/// Collect `LATTICE_*` variables into a nested camelCase JSON object.
pub fn env_overrides(vars: impl IntoIterator<Item = (String, String)>) -> Value {
    let mut root = Map::new();
    for (name, raw) in vars {
        let Some(key) = name.strip_prefix(ENV_PREFIX) else {
            continue;
        };
        let path: Vec<String> = key.split("__").map(camel_case).collect();
        if path.iter().any(String::is_empty) {
            warn!(key = %name, "malformed settings env var, ignoring");
            continue;
        }
        let value = serde_json::from_str(&raw).unwrap_or(Value::String(raw));
        insert_path(&mut root, &path, value);
    }
    Value::Object(root)
}

fn insert_path(map: &mut Map<String, Value>, path: &[String], value: Value) {
    let Some((head, rest)) = path.split_first() else {
        return;
    };
    if rest.is_empty() {
        let _ = map.insert(head.clone(), value);
        return;
    }
    let entry = map
        .entry(head.clone())
        .or_insert_with(|| Value::Object(Map::new()));
    if !entry.is_object() {
        *entry = Value::Object(Map::new());
    }
    if let Value::Object(child) = entry {
        insert_path(child, rest, value);
    }
}

/// `SERVER_SIDE_SUPPORT` → `serverSideSupport`.
pub fn camel_case(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for (i, word) in segment.split('_').filter(|w| !w.is_empty()).enumerate() {
        let lower = word.to_ascii_lowercase();
        if i == 0 {
            out.push_str(&lower);
        } else {
            let mut chars = lower.chars();
            if let Some(first) = chars.next() {
                out.push(first.to_ascii_uppercase());
                out.push_str(chars.as_str());
            }
        }
    }
    out
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
