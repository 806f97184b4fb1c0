//! Document-store seam.
//!
//! The leaderboard backend is a collection of JSON documents keyed by player
//! id. Everything above this module talks to it through [`DocumentStore`];
//! [`crate::db::Database`] keeps documents in SQLite and [`MemoryStore`]
//! keeps them in-process.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

mod memory;
mod subscription;

pub use memory::MemoryStore;
pub use subscription::{watch_collection, Subscription};

pub type Fields = Map<String, Value>;

/// Invoked with a full ordered snapshot every time the watched collection changes.
pub type SnapshotCallback = Arc<dyn Fn(Vec<Document>) + Send + Sync>;

pub type SharedStore = Arc<dyn DocumentStore>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    pub fn number(&self, field: &str) -> Option<f64> {
        self.fields.get(field).and_then(Value::as_f64)
    }
}

/// One field mutation inside an `update_document` call.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOp {
    Set(String, Value),
    /// Adds to the stored number; an absent or non-numeric field counts as zero.
    Increment(String, f64),
    /// Pushes onto the stored array, creating it when absent.
    Append(String, Value),
}

impl FieldOp {
    pub fn set(field: &str, value: impl Into<Value>) -> Self {
        FieldOp::Set(field.to_string(), value.into())
    }

    pub fn increment(field: &str, by: f64) -> Self {
        FieldOp::Increment(field.to_string(), by)
    }

    pub fn append(field: &str, value: impl Into<Value>) -> Self {
        FieldOp::Append(field.to_string(), value.into())
    }

    pub fn field(&self) -> &str {
        match self {
            FieldOp::Set(field, _) | FieldOp::Increment(field, _) | FieldOp::Append(field, _) => {
                field
            }
        }
    }

    /// Apply this op to a document body.
    pub fn apply(&self, fields: &mut Fields) {
        match self {
            FieldOp::Set(field, value) => {
                fields.insert(field.clone(), value.clone());
            }
            FieldOp::Increment(field, by) => {
                let current = fields.get(field).and_then(Value::as_f64).unwrap_or(0.0);
                fields.insert(field.clone(), number_value(current + by));
            }
            FieldOp::Append(field, value) => match fields.get_mut(field) {
                Some(Value::Array(items)) => items.push(value.clone()),
                _ => {
                    fields.insert(field.clone(), Value::Array(vec![value.clone()]));
                }
            },
        }
    }
}

fn number_value(value: f64) -> Value {
    serde_json::Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderedQuery {
    pub collection: String,
    pub sort_field: String,
    pub direction: SortDirection,
}

impl OrderedQuery {
    pub fn new(collection: &str, sort_field: &str, direction: SortDirection) -> Self {
        Self {
            collection: collection.to_string(),
            sort_field: sort_field.to_string(),
            direction,
        }
    }

    /// Keep documents carrying a numeric sort field and order them; ties by id.
    pub fn sort(&self, documents: Vec<Document>) -> Vec<Document> {
        let mut keyed: Vec<(f64, Document)> = documents
            .into_iter()
            .filter_map(|doc| doc.number(&self.sort_field).map(|key| (key, doc)))
            .collect();

        keyed.sort_by(|(a, doc_a), (b, doc_b)| {
            let by_key = match self.direction {
                SortDirection::Ascending => a.total_cmp(b),
                SortDirection::Descending => b.total_cmp(a),
            };
            by_key.then_with(|| doc_a.id.cmp(&doc_b.id))
        });

        keyed.into_iter().map(|(_, doc)| doc).collect()
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_document(&self, collection: &str, id: &str) -> Result<Option<Document>>;

    /// Full overwrite; used once, when a player record is first created.
    async fn set_document(&self, collection: &str, id: &str, fields: Fields) -> Result<()>;

    /// Partial update. All ops apply atomically; a missing document is an error.
    async fn update_document(&self, collection: &str, id: &str, ops: Vec<FieldOp>) -> Result<()>;

    async fn append_to_sequence_field(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        value: Value,
    ) -> Result<()> {
        self.update_document(collection, id, vec![FieldOp::Append(field.to_string(), value)])
            .await
    }

    async fn query_ordered(&self, query: &OrderedQuery) -> Result<Vec<Document>>;

    /// Push-based variant of `query_ordered`: the callback gets the current
    /// snapshot right away and a fresh one after every write to the collection.
    fn subscribe_ordered(&self, query: OrderedQuery, callback: SnapshotCallback) -> Subscription;
}
