use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const EVENTS_TABLE: &str = "events";
pub const VENUES_TABLE: &str = "venues";
pub const ATTENDEES_TABLE: &str = "attendees";
pub const ORDERS_TABLE: &str = "orders";

/// One row bound for a warehouse table, keyed by column name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    pub data: Map<String, Value>,
}

impl Record {
    pub fn new(data: Map<String, Value>) -> Self {
        Self { data }
    }

    /// Builds a record from a JSON object. Anything else yields `None`.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(data) => Some(Self { data }),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.data.insert(key.into(), value);
    }

    pub fn id(&self) -> Option<String> {
        self.data.get("id").and_then(value_as_key)
    }
}

/// Renders a scalar JSON value the way it is compared against `id::text`.
pub fn value_as_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// A column of a warehouse table as reported by the Postgres catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableColumn {
    pub name: String,
    pub sql_type: String,
}

impl TableColumn {
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
        }
    }

    pub fn is_array(&self) -> bool {
        self.sql_type.ends_with("[]")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pagination {
    pub object_count: u64,
    pub page_number: u32,
    pub page_size: u32,
    pub page_count: u32,
    pub has_more_items: bool,
}

impl Pagination {
    /// Page after `requested`. A response without `page_number` counts as
    /// the page that was asked for, so paging always moves forward.
    pub fn next_page(&self, requested: u32) -> Option<u32> {
        self.has_more_items.then(|| self.page_number.max(requested) + 1)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventsPage {
    #[serde(default)]
    pub pagination: Pagination,
    #[serde(default)]
    pub events: Vec<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AttendeesPage {
    #[serde(default)]
    pub pagination: Pagination,
    #[serde(default)]
    pub attendees: Vec<Value>,
}

/// Outcome of one loader run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadSummary {
    pub start_date: Option<NaiveDate>,
    pub events: usize,
    pub venues: usize,
    pub attendees: usize,
    pub orders: usize,
    pub views_refreshed: bool,
}
