//! Stored records and their lightweight previews.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// A full document as returned by the remote store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub owner_id: String,
    #[serde(default, deserialize_with = "lenient")]
    pub fields: Map<String, Value>,
}

impl Record {
    pub fn new(
        id: impl Into<String>,
        owner_id: impl Into<String>,
        fields: Map<String, Value>,
    ) -> Self {
        Self {
            id: id.into(),
            owner_id: owner_id.into(),
            fields,
        }
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    /// Numeric field as f64; missing or non-numeric fields read as 0.0.
    pub fn number_field(&self, name: &str) -> f64 {
        self.fields.get(name).and_then(Value::as_f64).unwrap_or(0.0)
    }

    /// Project a preview: the listed summary fields plus the first
    /// `notable_limit` entries of the `notable_field` list.
    pub fn preview(
        &self,
        summary_fields: &[String],
        notable_field: &str,
        notable_limit: usize,
    ) -> RecordPreview {
        let summary = summary_fields
            .iter()
            .filter_map(|name| self.fields.get(name).map(|v| (name.clone(), v.clone())))
            .collect();

        let notable = self
            .fields
            .get(notable_field)
            .and_then(Value::as_array)
            .map(|items| items.iter().take(notable_limit).cloned().collect())
            .unwrap_or_default();

        RecordPreview {
            id: self.id.clone(),
            summary,
            notable,
        }
    }
}

/// Projection of a record used by list and browse views.
///
/// Every field falls back to its default when a payload is missing it or
/// carries the wrong type, so a damaged cached preview still reconstructs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordPreview {
    #[serde(default, deserialize_with = "lenient")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient")]
    pub summary: Map<String, Value>,
    #[serde(default, deserialize_with = "lenient")]
    pub notable: Vec<Value>,
}

impl RecordPreview {
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.summary.get(name).and_then(Value::as_str)
    }
}

fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}
