//! The uniform result shape returned by every task.

use serde::Serialize;
use serde_json::{Map, Value};

/// `{summary, items | entities, error?, note?, ...context}`.
///
/// A missing `error` means success.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Envelope {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(flatten)]
    pub body: Map<String, Value>,
}

impl Envelope {
    pub fn success(summary: impl Into<String>) -> Self {
        Self {
            summary: Some(summary.into()),
            ..Self::default()
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }

    /// Attach a context field.
    pub fn with(mut self, key: &str, value: impl Serialize) -> Self {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.body.insert(key.to_string(), value);
        self
    }

    /// Attach record lists (investments, documents, date pairs).
    pub fn with_items(self, items: impl Serialize) -> Self {
        self.with("items", items)
    }

    /// Attach resolved entity lists (companies, investors).
    pub fn with_entities(self, entities: impl Serialize) -> Self {
        self.with("entities", entities)
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.body.get(key)
    }

    /// Length of the `items` or `entities` list, whichever is present.
    pub fn record_count(&self) -> usize {
        ["items", "entities"]
            .iter()
            .find_map(|k| self.body.get(*k).and_then(Value::as_array))
            .map(Vec::len)
            .unwrap_or(0)
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
