//! Utility functions for configuration parsing.

use std::str::FromStr;

/// Read an environment variable, treating empty or blank values as unset.
pub fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse an environment variable, falling back to `default` when unset.
pub fn parse_env<T>(name: &str, default: T) -> Result<T, String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_var(name) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|e| format!("Invalid value for {name} ('{raw}'): {e}")),
        None => Ok(default),
    }
}

/// Parse an optional environment variable.
pub fn parse_env_opt<T>(name: &str) -> Result<Option<T>, String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_var(name)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|e| format!("Invalid value for {name} ('{raw}'): {e}"))
        })
        .transpose()
}

/// Parse a boolean flag ("true"/"false", "1"/"0", "yes"/"no", "on"/"off").
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Read a boolean environment variable.
pub fn parse_env_bool(name: &str, default: bool) -> Result<bool, String> {
    match env_var(name) {
        Some(raw) => {
            parse_bool(&raw).ok_or_else(|| format!("Invalid boolean for {name}: '{raw}'"))
        }
        None => Ok(default),
    }
}
