//! `${NAME}` / `${NAME:default}` substitution over a parsed YAML document.

use crate::error::ConfigError;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_yaml::Value;

static PLACEHOLDER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::([^}]*))?\}").expect("placeholder regex is valid")
});

/// Substitute placeholders in every string value using the process environment.
pub fn substitute_env(value: Value) -> Result<Value, ConfigError> {
    substitute_with(value, &|name| std::env::var(name).ok())
}

/// Substitute placeholders in every string value, resolving names with `lookup`.
///
/// Mapping keys are left untouched. A string that changed is re-read as a YAML
/// scalar so numbers and booleans keep their type.
pub fn substitute_with<F>(value: Value, lookup: &F) -> Result<Value, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match value {
        Value::String(text) => substitute_scalar(text, lookup),
        Value::Sequence(items) => items
            .into_iter()
            .map(|item| substitute_with(item, lookup))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Sequence),
        Value::Mapping(mapping) => {
            let mut out = serde_yaml::Mapping::with_capacity(mapping.len());
            for (key, item) in mapping {
                out.insert(key, substitute_with(item, lookup)?);
            }
            Ok(Value::Mapping(out))
        }
        other => Ok(other),
    }
}

fn substitute_scalar<F>(text: String, lookup: &F) -> Result<Value, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if !PLACEHOLDER_RE.is_match(&text) {
        return Ok(Value::String(text));
    }

    let mut missing = None;
    let replaced = PLACEHOLDER_RE.replace_all(&text, |caps: &Captures| {
        let name = &caps[1];
        match (lookup(name), caps.get(2)) {
            (Some(found), _) => found,
            (None, Some(default)) => default.as_str().to_string(),
            (None, None) => {
                missing.get_or_insert_with(|| name.to_string());
                String::new()
            }
        }
    });

    if let Some(name) = missing {
        return Err(ConfigError::MissingEnvVar(name));
    }

    let replaced = replaced.into_owned();
    match serde_yaml::from_str::<Value>(&replaced) {
        Ok(typed @ (Value::Bool(_) | Value::Number(_))) => Ok(typed),
        _ => Ok(Value::String(replaced)),
    }
}
