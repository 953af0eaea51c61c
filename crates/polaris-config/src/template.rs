//! `${{ key }}` substitution and table merging for config files.

use polaris_core::{PolarisError, Result};
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{\{\s*(.*?)\s*\}\}").expect("valid placeholder regex"));

/// Template variables from the process environment, keyed `env_<NAME>`.
pub fn env_vars() -> HashMap<String, String> {
    std::env::vars()
        .map(|(k, v)| (format!("env_{k}"), v))
        .collect()
}

/// Replace every `${{ key }}` with its value.
///
/// Unknown keys and keys bound to an empty value are errors, so a typo
/// never silently turns into an empty string.
pub fn render(content: &str, vars: &HashMap<String, String>) -> Result<String> {
    let mut missing = None;
    let rendered = PLACEHOLDER.replace_all(content, |caps: &Captures<'_>| {
        let key = caps[1].trim();
        match vars.get(key).filter(|v| !v.is_empty()) {
            Some(v) => v.clone(),
            None => {
                missing.get_or_insert_with(|| key.to_string());
                String::new()
            }
        }
    });
    if let Some(key) = missing {
        return Err(PolarisError::Config(format!("Invalid variable key \"{key}\"")));
    }
    Ok(rendered.into_owned())
}

/// Merge `overlay` into `base`. Tables merge recursively; arrays and
/// scalars from the overlay replace whatever the base held.
pub fn deep_merge(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base), toml::Value::Table(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) if existing.is_table() && value.is_table() => {
                        deep_merge(existing, value)
                    }
                    _ => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
