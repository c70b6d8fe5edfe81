//! Settings loading.
//!
//! The settings file is deep-merged over the serialized defaults: objects
//! merge per key, arrays and scalars from the file replace the default, and
//! a `null` in the file keeps the default. Environment overrides are applied
//! last, then the result is validated.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use courier_core::logging::LogFormat;
use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::{CourierSettings, MAX_ACK_POLL_ATTEMPTS, MAX_ACK_POLL_INTERVAL_MS};

/// Resolve the path to the settings file (`~/.courier/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".courier").join("settings.json")
}

/// Load `~/.courier/settings.json` with environment overrides.
pub fn load_settings() -> Result<CourierSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from `path` with environment overrides.
///
/// A missing file yields the defaults. Unreadable or malformed files are
/// errors.
pub fn load_settings_from_path(path: &Path) -> Result<CourierSettings> {
    let defaults = serde_json::to_value(CourierSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: CourierSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Merge `source` over `target`, recursing into objects.
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

/// Apply overrides from the process environment.
pub fn apply_env_overrides(settings: &mut CourierSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`.
///
/// Each variable has strict parsing rules; invalid values are ignored with a
/// warning (falling back to file/default). `COURIER_PORT` wins over `PORT`.
pub fn apply_overrides(settings: &mut CourierSettings, lookup: impl Fn(&str) -> Option<String>) {
    let read = |name: &str| lookup(name).filter(|v| !v.is_empty());

    // ── Server ──────────────────────────────────────────────────────
    for key in ["PORT", "COURIER_PORT"] {
        if let Some(v) = read_with(&read, key, |v| parse_in_range(v, 1, 65535)) {
            settings.server.port = v;
        }
    }
    if let Some(v) = read("COURIER_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read_with(&read, "COURIER_MAX_CONNECTIONS", |v| {
        parse_in_range(v, 1, 1_000_000)
    }) {
        settings.server.max_connections = v;
    }

    // ── Delivery ────────────────────────────────────────────────────
    if let Some(v) = read_with(&read, "COURIER_ACK_POLL_ATTEMPTS", |v| {
        parse_in_range(v, 1, MAX_ACK_POLL_ATTEMPTS)
    }) {
        settings.delivery.ack_poll_attempts = v;
    }
    if let Some(v) = read_with(&read, "COURIER_ACK_POLL_INTERVAL_MS", |v| {
        parse_in_range(v, 1, MAX_ACK_POLL_INTERVAL_MS)
    }) {
        settings.delivery.ack_poll_interval_ms = v;
    }
    if let Some(v) = read_with(&read, "COURIER_MAX_DELIVERY_ATTEMPTS", |v| {
        parse_in_range(v, 0, u32::MAX)
    }) {
        settings.delivery.max_delivery_attempts = v;
    }

    // ── Task ────────────────────────────────────────────────────────
    if let Some(v) = read("COURIER_TASK_DIR") {
        settings.task.task_dir = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = read("COURIER_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read_with(&read, "COURIER_LOG_FORMAT", LogFormat::parse) {
        settings.logging.format = v;
    }
}

fn read_with<T>(
    read: &impl Fn(&str) -> Option<String>,
    name: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Option<T> {
    let val = read(name)?;
    let result = parse(&val);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid env var, ignoring");
    }
    result
}

/// Parse `val` and accept it only within `min..=max`.
pub fn parse_in_range<T>(val: &str, min: T, max: T) -> Option<T>
where
    T: FromStr + PartialOrd,
{
    val.parse().ok().filter(|n| (min..=max).contains(n))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn deep_merge_objects() {
        let merged = deep_merge(
            json!({"server": {"host": "a", "port": 1}}),
            json!({"server": {"port": 2}}),
        );
        assert_eq!(merged["server"]["host"], "a");
        assert_eq!(merged["server"]["port"], 2);
    }

    #[test]
    fn deep_merge_skips_null() {
        let merged = deep_merge(json!({"x": 1}), json!({"x": null}));
        assert_eq!(merged["x"], 1);
    }

    #[test]
    fn deep_merge_replaces_arrays() {
        let merged = deep_merge(json!({"x": [1, 2]}), json!({"x": [3]}));
        assert_eq!(merged["x"], json!([3]));
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_settings_from_path(&dir.path().join("nope.json")).unwrap();
        assert_eq!(settings.delivery.ack_poll_attempts, 2);
    }

    #[test]
    fn file_values_merge_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"delivery":{"ackPollIntervalMs":100},"task":{"taskDir":"/srv/task"}}"#,
        )
        .unwrap();
        let settings = load_settings_from_path(&path).unwrap();
        assert_eq!(settings.delivery.ack_poll_interval_ms, 100);
        assert_eq!(settings.delivery.ack_poll_attempts, 2);
        assert_eq!(settings.task.task_dir, "/srv/task");
        assert_eq!(settings.task.hit_config_file, "hit_config.json");
    }

    #[test]
    fn invalid_json_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(load_settings_from_path(&path).is_err());
    }

    #[test]
    fn oversized_interval_in_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"delivery":{"ackPollIntervalMs":18446744073709551615}}"#).unwrap();
        assert!(load_settings_from_path(&path).is_err());
    }

    #[test]
    fn invalid_value_in_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"delivery":{"ackPollAttempts":0}}"#).unwrap();
        assert!(load_settings_from_path(&path).is_err());
    }

    #[test]
    fn port_overrides() {
        let mut s = CourierSettings::default();
        apply_overrides(&mut s, env(&[("PORT", "5000")]));
        assert_eq!(s.server.port, 5000);

        let mut s = CourierSettings::default();
        apply_overrides(&mut s, env(&[("PORT", "5000"), ("COURIER_PORT", "6000")]));
        assert_eq!(s.server.port, 6000);
    }

    #[test]
    fn invalid_override_ignored() {
        let mut s = CourierSettings::default();
        apply_overrides(
            &mut s,
            env(&[("PORT", "99999"), ("COURIER_ACK_POLL_ATTEMPTS", "0")]),
        );
        assert_eq!(s.server.port, 3000);
        assert_eq!(s.delivery.ack_poll_attempts, 2);
    }

    #[test]
    fn delivery_overrides() {
        let mut s = CourierSettings::default();
        apply_overrides(
            &mut s,
            env(&[
                ("COURIER_ACK_POLL_ATTEMPTS", "4"),
                ("COURIER_ACK_POLL_INTERVAL_MS", "50"),
                ("COURIER_MAX_DELIVERY_ATTEMPTS", "10"),
            ]),
        );
        assert_eq!(s.delivery.ack_poll_attempts, 4);
        assert_eq!(s.delivery.ack_poll_interval_ms, 50);
        assert_eq!(s.delivery.max_delivery_attempts, 10);
    }

    #[test]
    fn logging_and_task_overrides() {
        let mut s = CourierSettings::default();
        apply_overrides(
            &mut s,
            env(&[
                ("COURIER_LOG_LEVEL", "debug"),
                ("COURIER_LOG_FORMAT", "json"),
                ("COURIER_TASK_DIR", "/tmp/t"),
                ("COURIER_HOST", ""),
            ]),
        );
        assert_eq!(s.logging.level, "debug");
        assert_eq!(s.logging.format, LogFormat::Json);
        assert_eq!(s.task.task_dir, "/tmp/t");
        // empty values are treated as unset
        assert_eq!(s.server.host, "0.0.0.0");
    }

    #[test]
    fn parse_ranges() {
        assert_eq!(parse_in_range::<u16>("80", 1, 65535), Some(80));
        assert_eq!(parse_in_range::<u16>("0", 1, 65535), None);
        assert_eq!(parse_in_range::<u16>("70000", 1, 65535), None);
        assert_eq!(parse_in_range::<u32>("abc", 0, 10), None);
        assert_eq!(parse_in_range::<u64>("600001", 1, 600_000), None);
        assert_eq!(parse_in_range::<usize>("5", 1, 10), Some(5));
    }
}
