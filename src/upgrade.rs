//! Versioned state upgrades.
//!
//! When a resource schema changes between releases, states persisted under
//! an older version are migrated one version at a time. Each step is a pure
//! function over the raw attribute map: it adds defaults only when absent and
//! restructures losslessly, so re-applying a step to an upgraded record
//! changes nothing.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::ProviderError;

/// One migration step from version `n` to `n + 1`.
pub type UpgradeStep = fn(Map<String, Value>) -> Result<Map<String, Value>, ProviderError>;

/// Chain of upgrade steps ending at the current schema version.
#[derive(Clone)]
pub struct Upgrader {
    current_version: u64,
    steps: BTreeMap<u64, UpgradeStep>,
}

impl Upgrader {
    /// An upgrader with no steps; only the current version is accepted.
    pub fn new(current_version: u64) -> Self {
        Self {
            current_version,
            steps: BTreeMap::new(),
        }
    }

    /// Register the step migrating `from_version` to `from_version + 1`.
    pub fn with_step(mut self, from_version: u64, step: UpgradeStep) -> Self {
        self.steps.insert(from_version, step);
        self
    }

    /// The schema version states are upgraded to.
    pub fn current_version(&self) -> u64 {
        self.current_version
    }

    /// Upgrade `state`, written under `version`, to the current version.
    ///
    /// A state already at the current version is returned unchanged. The
    /// input is never partially modified: on error the caller keeps its
    /// original value.
    pub fn upgrade(&self, version: i64, state: Value) -> Result<Value, ProviderError> {
        let version = u64::try_from(version)
            .map_err(|_| ProviderError::Upgrade(format!("invalid schema version {}", version)))?;

        if version == self.current_version {
            return Ok(state);
        }
        if version > self.current_version {
            return Err(ProviderError::Upgrade(format!(
                "state was written by schema version {} but the newest known version is {}",
                version, self.current_version
            )));
        }

        let mut attributes = match state {
            Value::Object(map) => map,
            other => {
                return Err(ProviderError::Upgrade(format!(
                    "expected an object for prior state, got {}",
                    type_name(&other)
                )))
            }
        };

        for from in version..self.current_version {
            let step = self.steps.get(&from).ok_or_else(|| {
                ProviderError::Upgrade(format!(
                    "no upgrade path from schema version {} to {}",
                    from,
                    from + 1
                ))
            })?;
            debug!(from_version = from, to_version = from + 1, "Upgrading state");
            attributes = step(attributes)?;
        }

        Ok(Value::Object(attributes))
    }
}

impl fmt::Debug for Upgrader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Upgrader")
            .field("current_version", &self.current_version)
            .field("steps", &self.steps.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Insert `value` under `key` unless the key holds a non-null value.
pub fn set_default_if_absent(attributes: &mut Map<String, Value>, key: &str, value: Value) {
    match attributes.get(key) {
        Some(existing) if !existing.is_null() => {}
        _ => {
            attributes.insert(key.to_string(), value);
        }
    }
}

/// Turn a single nested block stored under `key` into a one-element list.
///
/// Lists and nulls are left alone; anything else is malformed.
pub fn single_block_to_list(
    attributes: &mut Map<String, Value>,
    key: &str,
) -> Result<(), ProviderError> {
    match attributes.remove(key) {
        None => {}
        Some(Value::Object(block)) => {
            attributes.insert(key.to_string(), Value::Array(vec![Value::Object(block)]));
        }
        Some(v @ (Value::Array(_) | Value::Null)) => {
            attributes.insert(key.to_string(), v);
        }
        Some(other) => {
            return Err(ProviderError::Upgrade(format!(
                "attribute '{}' must be a block, got {}",
                key,
                type_name(&other)
            )))
        }
    }
    Ok(())
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
