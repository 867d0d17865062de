//! Remote query descriptors.
//!
//! A [`QueryDescriptor`] fully determines one remote round trip: which store
//! and collection, whose records, where to resume, how many, in what order,
//! and an optional string range on one field.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::store::record::Record;

/// Upper bound appended to a prefix to form an exclusive range end.
const PREFIX_RANGE_END: char = '\u{f8ff}';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn from_descending(descending: bool) -> Self {
        if descending {
            SortDirection::Desc
        } else {
            SortDirection::Asc
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn new(field: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }

    /// Order two records by the sort field, breaking ties by id ascending.
    pub fn compare(&self, a: &Record, b: &Record) -> Ordering {
        let by_field = compare_values(a.field(&self.field), b.field(&self.field));
        let by_field = match self.direction {
            SortDirection::Asc => by_field,
            SortDirection::Desc => by_field.reverse(),
        };
        by_field.then_with(|| a.id.cmp(&b.id))
    }
}

/// String range filter: `start <= field < end`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RangeFilter {
    pub field: String,
    pub start: String,
    pub end: String,
}

impl RangeFilter {
    /// Range matching every string value starting with `prefix`.
    pub fn prefix(field: impl Into<String>, prefix: &str) -> Self {
        Self {
            field: field.into(),
            start: prefix.to_string(),
            end: format!("{prefix}{PREFIX_RANGE_END}"),
        }
    }

    pub fn matches(&self, record: &Record) -> bool {
        record
            .str_field(&self.field)
            .is_some_and(|v| v >= self.start.as_str() && v < self.end.as_str())
    }
}

/// Position to resume a query after: the last record seen and its sort value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cursor {
    pub id: String,
    pub sort_value: Option<Value>,
}

impl Cursor {
    pub fn after(record: &Record, sort: &SortSpec) -> Self {
        Self {
            id: record.id.clone(),
            sort_value: record.field(&sort.field).cloned(),
        }
    }

    /// Whether `record` sorts strictly after this cursor.
    pub fn precedes(&self, record: &Record, sort: &SortSpec) -> bool {
        let by_field = compare_values(self.sort_value.as_ref(), record.field(&sort.field));
        let by_field = match sort.direction {
            SortDirection::Asc => by_field,
            SortDirection::Desc => by_field.reverse(),
        };
        by_field.then_with(|| self.id.as_str().cmp(&record.id)) == Ordering::Less
    }
}

/// Immutable description of a single remote query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryDescriptor {
    pub store_id: String,
    pub collection: String,
    pub owner_id: String,
    pub cursor: Option<Cursor>,
    pub page_size: usize,
    pub sort: SortSpec,
    pub filter: Option<RangeFilter>,
}

impl QueryDescriptor {
    pub fn new(
        store_id: impl Into<String>,
        collection: impl Into<String>,
        owner_id: impl Into<String>,
        sort: SortSpec,
        page_size: usize,
    ) -> Self {
        Self {
            store_id: store_id.into(),
            collection: collection.into(),
            owner_id: owner_id.into(),
            cursor: None,
            page_size,
            sort,
            filter: None,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn start_after(mut self, cursor: Cursor) -> Self {
        self.cursor = Some(cursor);
        self
    }

    pub fn with_filter(mut self, filter: RangeFilter) -> Self {
        self.filter = Some(filter);
        self
    }
}

/// Total order over JSON values: missing/null < bool < number < string < other.
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(v: Option<&Value>) -> u8 {
        match v {
            None | Some(Value::Null) => 0,
            Some(Value::Bool(_)) => 1,
            Some(Value::Number(_)) => 2,
            Some(Value::String(_)) => 3,
            Some(Value::Array(_)) | Some(Value::Object(_)) => 4,
        }
    }

    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(x), Some(y)) if rank(a) == 4 && rank(b) == 4 => x.to_string().cmp(&y.to_string()),
        _ => rank(a).cmp(&rank(b)),
    }
}
