use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::error::{BridgeError, BridgeResult};

/// Task configuration captured once at load time.
///
/// The raw JSON is kept verbatim; `values` holds the flattened view where nested
/// objects become dotted keys (`server.port`) and arrays of scalars are joined
/// with `,`. Nested containers inside arrays are skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigSnapshot {
    raw: String,
    values: BTreeMap<String, String>,
}

impl ConfigSnapshot {
    pub fn from_json(raw: &str) -> BridgeResult<Self> {
        let doc = if raw.trim().is_empty() { "{}" } else { raw };

        let parsed: Value = serde_json::from_str(doc)
            .map_err(|e| BridgeError::SerializationFailure(format!("can't parse task configuration: {}", e)))?;
        let Value::Object(root) = parsed else {
            return Err(BridgeError::SerializationFailure(
                "task configuration must be a JSON object".to_string(),
            ));
        };

        let mut values = BTreeMap::new();
        flatten_object(&root, &mut Vec::new(), &mut values);

        Ok(ConfigSnapshot { raw: raw.to_string(), values })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Sorted.
    pub fn keys(&self) -> Vec<String> {
        self.values.keys().cloned().collect()
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

fn flatten_object<'a>(obj: &'a Map<String, Value>, path: &mut Vec<&'a str>, out: &mut BTreeMap<String, String>) {
    for (key, value) in obj {
        path.push(key);
        match value {
            Value::Object(inner) => flatten_object(inner, path, out),
            Value::Array(items) => {
                let rendered: Vec<String> = items.iter().filter_map(scalar_text).collect();
                if !rendered.is_empty() {
                    out.insert(path.join("."), rendered.join(","));
                }
            }
            scalar => {
                if let Some(text) = scalar_text(scalar) {
                    out.insert(path.join("."), text);
                }
            }
        }
        path.pop();
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some(String::new()),
        Value::Array(_) | Value::Object(_) => None,
    }
}
