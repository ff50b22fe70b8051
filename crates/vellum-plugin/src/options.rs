//! Install-time plugin options.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use vellum_core::error::{AppError, ErrorKind};
use vellum_core::result::AppResult;

/// Immutable options handed to a plugin's `install`.
///
/// Produced by deep merging caller overrides over the plugin's defaults:
/// objects merge key by key, everything else is replaced by the override.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PluginOptions(Value);

impl PluginOptions {
    /// Merges `overrides` over `defaults`.
    ///
    /// A `null` override keeps the defaults untouched.
    pub fn merged(defaults: Value, overrides: Value) -> Self {
        let mut value = defaults;
        if !overrides.is_null() {
            deep_merge(&mut value, overrides);
        }
        Self(value)
    }

    /// Gets a top-level option.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Gets a top-level string option.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Gets a top-level boolean option.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(Value::as_bool)
    }

    /// Looks up a nested option by JSON pointer (`/options/path`).
    pub fn pointer(&self, pointer: &str) -> Option<&Value> {
        self.0.pointer(pointer)
    }

    /// Deserializes the options into a typed struct.
    pub fn deserialize<T: DeserializeOwned>(&self) -> AppResult<T> {
        serde_json::from_value(self.0.clone()).map_err(|e| {
            AppError::with_source(
                ErrorKind::Configuration,
                format!("Invalid plugin options: {e}"),
                e,
            )
        })
    }

    /// Raw JSON value.
    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

impl Default for PluginOptions {
    fn default() -> Self {
        Self(Value::Object(serde_json::Map::new()))
    }
}

/// Recursively merges `overrides` into `base`.
pub fn deep_merge(base: &mut Value, overrides: Value) {
    match (base, overrides) {
        (Value::Object(base), Value::Object(overrides)) => {
            for (key, value) in overrides {
                match base.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overrides) => *base = overrides,
    }
}
