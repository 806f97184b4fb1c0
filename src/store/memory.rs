use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex, MutexGuard},
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::sync::broadcast;

use super::{
    watch_collection, Document, DocumentStore, FieldOp, Fields, OrderedQuery, SnapshotCallback,
    Subscription,
};

const CHANGE_CHANNEL_CAPACITY: usize = 64;

type Collections = HashMap<String, BTreeMap<String, Fields>>;

/// Process-local document store. Nothing survives a restart.
#[derive(Clone)]
pub struct MemoryStore {
    collections: Arc<Mutex<Collections>>,
    changes: broadcast::Sender<String>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            collections: Arc::new(Mutex::new(HashMap::new())),
            changes,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Collections> {
        match self.collections.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn notify(&self, collection: &str) {
        let _ = self.changes.send(collection.to_string());
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get_document(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let guard = self.lock();
        Ok(guard
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|fields| Document::new(id, fields.clone())))
    }

    async fn set_document(&self, collection: &str, id: &str, fields: Fields) -> Result<()> {
        self.lock()
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), fields);
        self.notify(collection);
        Ok(())
    }

    async fn update_document(&self, collection: &str, id: &str, ops: Vec<FieldOp>) -> Result<()> {
        {
            let mut guard = self.lock();
            let fields = guard
                .get_mut(collection)
                .and_then(|docs| docs.get_mut(id))
                .ok_or_else(|| anyhow!("document {collection}/{id} not found"))?;
            for op in &ops {
                op.apply(fields);
            }
        }
        self.notify(collection);
        Ok(())
    }

    async fn query_ordered(&self, query: &OrderedQuery) -> Result<Vec<Document>> {
        let documents = {
            let guard = self.lock();
            guard
                .get(&query.collection)
                .map(|docs| {
                    docs.iter()
                        .map(|(id, fields)| Document::new(id.clone(), fields.clone()))
                        .collect()
                })
                .unwrap_or_default()
        };
        Ok(query.sort(documents))
    }

    fn subscribe_ordered(&self, query: OrderedQuery, callback: SnapshotCallback) -> Subscription {
        watch_collection(
            Arc::new(self.clone()),
            self.changes.subscribe(),
            query,
            callback,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SortDirection;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    fn xp_doc(xp: f64) -> Fields {
        json!({ "xp": xp }).as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn update_of_missing_document_fails() {
        let store = MemoryStore::new();
        let result = store
            .update_document("leaderboard", "ghost", vec![FieldOp::increment("xp", 1.0)])
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn subscription_sees_initial_and_changed_snapshots() {
        let store = MemoryStore::new();
        store.set_document("leaderboard", "a", xp_doc(5.0)).await.unwrap();

        let seen: Arc<StdMutex<Vec<Vec<String>>>> = Arc::new(StdMutex::new(Vec::new()));
        let sink = seen.clone();
        let subscription = store.subscribe_ordered(
            OrderedQuery::new("leaderboard", "xp", SortDirection::Descending),
            Arc::new(move |docs: Vec<Document>| {
                sink.lock()
                    .unwrap()
                    .push(docs.into_iter().map(|d| d.id).collect());
            }),
        );

        tokio::time::sleep(Duration::from_millis(20)).await;
        store.set_document("leaderboard", "b", xp_doc(9.0)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let snapshots = seen.lock().unwrap().clone();
        assert_eq!(snapshots.first(), Some(&vec!["a".to_string()]));
        assert_eq!(
            snapshots.last(),
            Some(&vec!["b".to_string(), "a".to_string()])
        );

        subscription.unsubscribe();
        let delivered = seen.lock().unwrap().len();
        store.set_document("leaderboard", "c", xp_doc(1.0)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(seen.lock().unwrap().len(), delivered);
    }
}
