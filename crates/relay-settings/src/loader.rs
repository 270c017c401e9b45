//! Settings loading with deep merge and environment variable overrides.
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::Path;

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::RelaySettings;

/// Load defaults, an optional settings file, then process env overrides.
pub fn load_settings(path: Option<&Path>) -> Result<RelaySettings> {
    match path {
        Some(path) => load_settings_from_path(path),
        None => {
            let mut settings = RelaySettings::default();
            apply_env_overrides(&mut settings);
            Ok(settings)
        }
    }
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; a file with invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<RelaySettings> {
    let defaults = serde_json::to_value(RelaySettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: RelaySettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Read a `.env` file into the process environment. Existing variables win.
pub fn load_dotenv(path: Option<&Path>) -> Result<()> {
    let loaded = match path {
        Some(path) => dotenvy::from_path(path).map(|()| path.to_path_buf()),
        None => dotenvy::dotenv(),
    };
    match loaded {
        Ok(path) => {
            debug!(?path, "loaded env file");
            Ok(())
        }
        Err(e) => Err(SettingsError::EnvFile(e.to_string())),
    }
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply process environment overrides.
pub fn apply_env_overrides(settings: &mut RelaySettings) {
    apply_env_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`.
///
/// Invalid numeric or boolean values are ignored with a warning.
pub fn apply_env_overrides_from<F>(settings: &mut RelaySettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let string = |name: &str| lookup(name).filter(|v| !v.is_empty());

    // ── SMS ─────────────────────────────────────────────────────────
    if let Some(v) = string("USER_PHONE_NUMBER") {
        settings.sms.user_phone_number = v;
    }
    if let Some(v) = string("TWILIO_PHONE_NUMBER") {
        settings.sms.twilio_phone_number = v;
    }
    if let Some(v) = string("TWILIO_ACCOUNT_SID") {
        settings.sms.account_sid = v;
    }
    if let Some(v) = string("TWILIO_AUTH_TOKEN") {
        settings.sms.auth_token = v;
    }

    // ── Translator ──────────────────────────────────────────────────
    if let Some(v) = string("OPENAI_API_KEY") {
        settings.translator.api_key = v;
    }
    if let Some(v) = string("OPENAI_MODEL") {
        settings.translator.model = v;
    }

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = string("RELAY_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = string("RELAY_PORT") {
        match parse_u16_range(&v, 1, u16::MAX) {
            Some(port) => settings.server.port = port,
            None => warn!(key = "RELAY_PORT", value = %v, "invalid port env var, ignoring"),
        }
    }
    if let Some(v) = string("RELAY_ENV") {
        match v.parse() {
            Ok(env) => settings.server.env = env,
            Err(e) => warn!(key = "RELAY_ENV", error = %e, "invalid env var, ignoring"),
        }
    }
    if let Some(v) = string("RELAY_REQUEST_TIMEOUT_MS") {
        match parse_u64_range(&v, 100, 120_000) {
            Some(ms) => settings.server.request_timeout_ms = ms,
            None => warn!(key = "RELAY_REQUEST_TIMEOUT_MS", value = %v, "invalid timeout env var, ignoring"),
        }
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = string("RELAY_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = string("RELAY_LOG_JSON") {
        match parse_bool(&v) {
            Some(json) => settings.logging.json = json,
            None => warn!(key = "RELAY_LOG_JSON", value = %v, "invalid boolean env var, ignoring"),
        }
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}
