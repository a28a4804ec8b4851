//! Settings loading: defaults → file (deep-merged) → environment.

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::errors::{Result, SettingsError};
use crate::types::TetherSettings;

/// Default settings file: `~/.tether/settings.json`.
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
    PathBuf::from(home).join(".tether").join("settings.json")
}

/// Recursively merge `overlay` into `base`.
///
/// Objects merge key by key; any other overlay value (including arrays and
/// `null`) replaces the base value.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                let merged = match base.remove(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value,
                };
                let _ = base.insert(key, merged);
            }
            Value::Object(base)
        }
        (_, overlay) => overlay,
    }
}

/// Load settings from `path` (or the default path), then apply process
/// environment overrides.
///
/// A missing file is not an error; the defaults are used.
pub fn load_settings(path: Option<&Path>) -> Result<TetherSettings> {
    let path = path.map_or_else(settings_path, Path::to_path_buf);
    let mut settings = load_settings_from_path(&path)?;
    apply_env_overrides(&mut settings, |var| std::env::var(var).ok())?;
    settings.validate();
    Ok(settings)
}

/// Load settings from a file, deep-merged over defaults. No env overrides.
pub fn load_settings_from_path(path: &Path) -> Result<TetherSettings> {
    let defaults = serde_json::to_value(TetherSettings::default()).map_err(|source| {
        SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        }
    })?;

    let merged = match std::fs::read_to_string(path) {
        Ok(content) => {
            let file: Value =
                serde_json::from_str(&content).map_err(|source| SettingsError::Parse {
                    path: path.to_path_buf(),
                    source,
                })?;
            deep_merge(defaults, file)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(?path, "no settings file, using defaults");
            defaults
        }
        Err(source) => {
            return Err(SettingsError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let mut settings: TetherSettings =
        serde_json::from_value(merged).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    settings.validate();
    Ok(settings)
}

/// Apply `TETHER_*` overrides using `lookup` to read variables.
///
/// Taking a lookup function keeps tests away from the process environment.
pub fn apply_env_overrides(
    settings: &mut TetherSettings,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<()> {
    let non_empty = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

    if let Some(host) = non_empty("TETHER_HOST") {
        settings.server.host = host;
    }
    if let Some(port) = non_empty("TETHER_PORT") {
        settings.server.port = port.trim().parse().map_err(|_| SettingsError::EnvOverride {
            var: "TETHER_PORT",
            value: port.clone(),
        })?;
    }
    if let Some(url) = non_empty("TETHER_RELAY_URL") {
        settings.relay.remote_url = Some(url);
    }
    if let Some(key) = non_empty("TETHER_MEDIA_API_KEY") {
        settings.media.api_key = key;
    }
    if let Some(secret) = non_empty("TETHER_MEDIA_API_SECRET") {
        settings.media.api_secret = secret;
    }
    if let Some(url) = non_empty("TETHER_MEDIA_URL") {
        settings.media.url = url;
    }
    if let Some(secret) = non_empty("TETHER_AUTH_JWT_SECRET") {
        settings.auth.jwt_secret = Some(secret);
    }
    if let Some(level) = non_empty("TETHER_LOG_LEVEL") {
        settings.logging.level = level;
    }
    Ok(())
}
