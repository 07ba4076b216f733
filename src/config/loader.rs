//! Configuration loading and environment parsing.

use super::Config;
use serde_json::Value;
use std::fs;
use std::path::Path;

/// Load configuration with the following precedence (highest first):
/// 1) `SKETCHPARTY_CONFIG_JSON` env var containing raw JSON
/// 2) File pointed at by `SKETCHPARTY_CONFIG_PATH`
/// 3) config.json in the current working directory
/// 4) Defaults compiled into the binary
///
/// Individual fields can then be overridden two ways:
/// - `SKETCHPARTY__` prefixed variables with `__` as the nesting separator,
///   e.g. `SKETCHPARTY__PORT=9000` or `SKETCHPARTY__GAME__ROUND_SECONDS=90`;
/// - the flat operational knobs (`ROUND_SECONDS`, `MAX_ROUNDS`,
///   `DISCONNECT_GRACE_SECONDS`, ...) that deployment tooling has always
///   exported, mapped onto their config fields.
///
/// Any errors while reading or parsing are printed to stderr and the
/// affected source is skipped; `load()` always returns a usable `Config`.
#[must_use]
pub fn load() -> Config {
    use std::env;
    use std::path::PathBuf;

    let defaults = Config::default();
    let mut merged =
        serde_json::to_value(&defaults).unwrap_or_else(|_| Value::Object(serde_json::Map::new()));

    // 1) Inline JSON via env var
    if let Ok(json) = env::var("SKETCHPARTY_CONFIG_JSON") {
        if let Some(value) = parse_json_document(&json, "SKETCHPARTY_CONFIG_JSON") {
            merge_values(&mut merged, value);
        }
    }

    // 2) Explicit path via env var
    if let Ok(path) = env::var("SKETCHPARTY_CONFIG_PATH") {
        merge_file_source(&mut merged, &PathBuf::from(path));
    }

    // 3) config.json in CWD
    merge_file_source(&mut merged, &PathBuf::from("config.json"));

    // Nested overrides with prefix SKETCHPARTY and separator __
    apply_env_overrides(&mut merged);

    // Flat legacy knobs
    apply_flat_knobs(&mut merged);

    match serde_json::from_value::<Config>(merged) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to deserialize config; using defaults: {e}");
            defaults
        }
    }
}

/// Flat knob name → config path. These are the operational variables the
/// deployment stack exports directly, without the nested prefix syntax.
const FLAT_KNOBS: &[(&str, &[&str])] = &[
    ("ROUND_SECONDS", &["game", "round_seconds"]),
    ("MAX_ROUNDS", &["game", "max_rounds"]),
    ("MAX_PLAYERS", &["game", "max_players"]),
    ("CHAT_WINDOW_SECONDS", &["game", "chat_window_seconds"]),
    ("CHAT_MAX_BURST", &["game", "chat_max_burst"]),
    ("MAX_CHAT_COOLDOWN", &["game", "max_chat_cooldown"]),
    (
        "DISCONNECT_GRACE_SECONDS",
        &["game", "disconnect_grace_seconds"],
    ),
    ("ROUND_BREAK_SECONDS", &["game", "round_break_seconds"]),
    ("KICK_VOTE_SECONDS", &["game", "kick_vote_seconds"]),
    ("CHAT_HISTORY_LIMIT", &["game", "chat_history_limit"]),
    ("DRAW_HISTORY_LIMIT", &["game", "draw_history_limit"]),
    (
        "ROOM_HISTORY_TTL_SECONDS",
        &["storage", "room_history_ttl_seconds"],
    ),
    (
        "ROOM_STATE_TTL_SECONDS",
        &["storage", "room_state_ttl_seconds"],
    ),
    (
        "TIMER_OWNER_GRACE_SECONDS",
        &["storage", "timer_owner_grace_seconds"],
    ),
    (
        "REDIS_LOCK_TIMEOUT_SECONDS",
        &["storage", "lock_timeout_seconds"],
    ),
    ("REDIS_LOCK_WAIT_SECONDS", &["storage", "lock_wait_seconds"]),
];

fn apply_flat_knobs(root: &mut Value) {
    for (name, path) in FLAT_KNOBS {
        if let Ok(raw) = std::env::var(name) {
            let segments: Vec<String> = path.iter().map(|s| (*s).to_string()).collect();
            set_nested_value(root, &segments, parse_scalar(raw.trim()));
        }
    }
}

fn parse_json_document(raw: &str, label: &str) -> Option<Value> {
    if raw.trim().is_empty() {
        return None;
    }

    match serde_json::from_str(raw) {
        Ok(value) => Some(value),
        Err(err) => {
            eprintln!("Failed to parse config from {label}: {err}");
            None
        }
    }
}

fn merge_file_source(target: &mut Value, path: &Path) {
    if path.as_os_str().is_empty() || !path.exists() {
        return;
    }

    match fs::read_to_string(path) {
        Ok(contents) => {
            if let Some(value) = parse_json_document(&contents, &format!("file {}", path.display()))
            {
                merge_values(target, value);
            }
        }
        Err(err) => {
            eprintln!("Failed to read config from {}: {}", path.display(), err);
        }
    }
}

fn merge_values(target: &mut Value, source: Value) {
    match (target, source) {
        (Value::Object(target_map), Value::Object(source_map)) => {
            for (key, value) in source_map {
                match target_map.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        target_map.insert(key, value);
                    }
                }
            }
        }
        (target_slot, source_value) => {
            *target_slot = source_value;
        }
    }
}

fn apply_env_overrides(root: &mut Value) {
    for (key, raw_value) in std::env::vars() {
        let Some(stripped) = key.strip_prefix("SKETCHPARTY__") else {
            continue;
        };

        let segments: Vec<String> = stripped
            .split("__")
            .filter(|segment| !segment.is_empty())
            .map(str::to_ascii_lowercase)
            .collect();

        if segments.is_empty() {
            continue;
        }

        let value = parse_scalar(raw_value.trim());
        set_nested_value(root, &segments, value);
    }
}

fn parse_scalar(raw: &str) -> Value {
    if raw.is_empty() {
        return Value::String(String::new());
    }

    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn set_nested_value(target: &mut Value, segments: &[String], value: Value) {
    match segments {
        [] => *target = value,
        [leaf] => {
            ensure_object(target).insert(leaf.clone(), value);
        }
        [head, rest @ ..] => {
            let entry = ensure_object(target)
                .entry(head.clone())
                .or_insert_with(|| Value::Object(serde_json::Map::new()));
            set_nested_value(entry, rest, value);
        }
    }
}

fn ensure_object(value: &mut Value) -> &mut serde_json::Map<String, Value> {
    if !value.is_object() {
        *value = Value::Object(serde_json::Map::new());
    }

    // SAFETY: The branch above guarantees `value` is a `Value::Object`, so
    // `as_object_mut()` will always return `Some`.
    #[allow(clippy::expect_used)]
    value
        .as_object_mut()
        .expect("value should be coerced into an object")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for (name, _) in FLAT_KNOBS {
            std::env::remove_var(name);
        }
        let prefixed: Vec<String> = std::env::vars()
            .map(|(k, _)| k)
            .filter(|k| k.starts_with("SKETCHPARTY"))
            .collect();
        for key in prefixed {
            std::env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn test_defaults_without_sources() {
        clear_env();
        let cfg = load();
        assert_eq!(cfg.game.round_seconds, 120);
        assert_eq!(cfg.game.max_rounds, 10);
        assert_eq!(cfg.storage.lock_timeout_seconds, 10);
    }

    #[test]
    #[serial]
    fn test_nested_env_override() {
        clear_env();
        std::env::set_var("SKETCHPARTY__GAME__ROUND_SECONDS", "90");
        std::env::set_var("SKETCHPARTY__PORT", "9001");
        let cfg = load();
        std::env::remove_var("SKETCHPARTY__GAME__ROUND_SECONDS");
        std::env::remove_var("SKETCHPARTY__PORT");
        assert_eq!(cfg.game.round_seconds, 90);
        assert_eq!(cfg.port, 9001);
    }

    #[test]
    #[serial]
    fn test_flat_knob_override() {
        clear_env();
        std::env::set_var("ROUND_SECONDS", "60");
        std::env::set_var("KICK_VOTE_SECONDS", "30");
        std::env::set_var("REDIS_LOCK_WAIT_SECONDS", "2");
        let cfg = load();
        for name in ["ROUND_SECONDS", "KICK_VOTE_SECONDS", "REDIS_LOCK_WAIT_SECONDS"] {
            std::env::remove_var(name);
        }
        assert_eq!(cfg.game.round_seconds, 60);
        assert_eq!(cfg.game.kick_vote_seconds, 30);
        assert_eq!(cfg.storage.lock_wait_seconds, 2);
    }

    #[test]
    #[serial]
    fn test_config_file_merges_over_defaults() {
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"game": {"max_rounds": 3}, "port": 7000}"#).unwrap();
        std::env::set_var("SKETCHPARTY_CONFIG_PATH", &path);
        let cfg = load();
        std::env::remove_var("SKETCHPARTY_CONFIG_PATH");
        assert_eq!(cfg.game.max_rounds, 3);
        assert_eq!(cfg.port, 7000);
        // Untouched fields keep their defaults.
        assert_eq!(cfg.game.round_seconds, 120);
    }
}
