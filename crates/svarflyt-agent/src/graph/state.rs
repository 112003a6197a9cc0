use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use svarflyt_core::error::{Result, SvarflytError};

/// The state container threaded through one graph run.
///
/// Keys are field names; values are JSON. A field keeps the JSON kind it
/// was introduced with for the rest of the run (null is compatible with
/// every kind); `merge` rejects a patch that would change it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphState {
    fields: HashMap<String, Value>,
}

impl GraphState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a state from seed values.
    pub fn seeded(seed: StatePatch) -> Result<Self> {
        let mut state = Self::new();
        state.merge(seed)?;
        Ok(state)
    }

    /// Decode a required field.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let value = self
            .fields
            .get(key)
            .ok_or_else(|| SvarflytError::MissingField(key.to_string()))?;
        decode(key, value)
    }

    /// Decode a field that may be absent or null.
    pub fn get_opt<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.fields.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => decode(key, value).map(Some),
        }
    }

    /// Get a value as a string, if it's a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(|v| v.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Merge a patch, last writer wins per field.
    ///
    /// The patch is checked as a whole before anything is written, so a
    /// rejected patch leaves the state untouched.
    pub fn merge(&mut self, patch: StatePatch) -> Result<()> {
        for (key, new) in &patch.fields {
            if let Some(old) = self.fields.get(key) {
                let (from, to) = (kind(old), kind(new));
                if from != "null" && to != "null" && from != to {
                    return Err(SvarflytError::FieldTypeChanged {
                        field: key.clone(),
                        from,
                        to,
                    });
                }
            }
        }
        for (key, value) in patch.fields {
            self.fields.insert(key, value);
        }
        Ok(())
    }

    /// Copy of the named fields only. Missing keys are skipped.
    pub fn slice(&self, keys: &[&str]) -> GraphState {
        let fields = keys
            .iter()
            .filter_map(|k| self.fields.get(*k).map(|v| (k.to_string(), v.clone())))
            .collect();
        GraphState { fields }
    }
}

/// A partial update returned by a step. Empty patches are fine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatePatch {
    fields: Vec<(String, Value)>,
}

impl StatePatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a serializable field.
    pub fn set<T: Serialize + ?Sized>(self, key: &str, value: &T) -> Result<Self> {
        Ok(self.set_value(key, serde_json::to_value(value)?))
    }

    /// Add a raw JSON field. A later write to the same key wins.
    pub fn set_value(mut self, key: &str, value: Value) -> Self {
        self.fields.retain(|(k, _)| k != key);
        self.fields.push((key.to_string(), value));
        self
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Append `other`'s fields, overwriting shared keys.
    pub fn extend(mut self, other: StatePatch) -> Self {
        for (key, value) in other.fields {
            self = self.set_value(&key, value);
        }
        self
    }
}

fn decode<T: DeserializeOwned>(key: &str, value: &Value) -> Result<T> {
    T::deserialize(value).map_err(|e| SvarflytError::FieldType {
        field: key.to_string(),
        message: e.to_string(),
    })
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
