//! Document store abstraction and in-memory backend
//!
//! The application reads and writes schemaless JSON documents grouped into
//! flat collections. `DocumentStore` is the seam: routes and sync tasks only
//! see the trait, `MemoryStore` is the bundled backend. Consumers subscribe
//! to whole-collection snapshots over `tokio::sync::watch`; every committed
//! write (including a batch) publishes exactly one new snapshot per touched
//! collection.

pub mod backup;
pub mod error;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tokio::sync::{watch, Mutex, RwLock};

pub use backup::{decode_value, BackupDocument, BackupFile};
pub use error::StoreError;

/// Collection names, kept identical to the historical data model so
/// existing backups restore without translation
pub mod collections {
    pub const ACCOUNTS: &str = "accounts";
    /// Ledger entries; the legacy name predates income support
    pub const ENTRIES: &str = "expenses";
    pub const CLIENTS: &str = "clients";
    pub const CATEGORIES: &str = "categories";
    pub const STORAGE_REQUESTS: &str = "storageRequests";
    pub const STORAGE_SEASONS: &str = "storageSeasons";
    pub const VEHICLE_TYPES: &str = "vehicleTypes";
    pub const OFFER_TEMPLATES: &str = "offerTemplates";
    pub const STORAGE_OFFERS: &str = "storageOffers";
    pub const STORAGE_ADD_ONS: &str = "storageAddOns";
}

/// Sentinel replaced with the commit time when a write lands
pub fn server_timestamp() -> Value {
    serde_json::json!({ "__datatype": "serverTimestamp" })
}

fn resolve_server_timestamps(value: &mut Value, now: &str) {
    match value {
        Value::Object(map) => {
            if map.get("__datatype").and_then(Value::as_str) == Some("serverTimestamp") {
                *value = Value::String(now.to_string());
                return;
            }
            for entry in map.values_mut() {
                resolve_server_timestamps(entry, now);
            }
        }
        Value::Array(items) => {
            for entry in items.iter_mut() {
                resolve_server_timestamps(entry, now);
            }
        }
        _ => {}
    }
}

/// One stored document: its id and its JSON object body
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Value,
}

impl Document {
    /// Deserialize into a model type, injecting the document id as the
    /// `id` field the models expect
    pub fn to_model<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        let mut data = self.data.clone();
        match data.as_object_mut() {
            Some(map) => {
                map.insert("id".to_string(), Value::String(self.id.clone()));
            }
            None => return Err(StoreError::NotAnObject),
        }
        Ok(serde_json::from_value(data)?)
    }
}

/// Deserialize a whole snapshot, skipping documents that no longer parse
/// (schema drift is logged, not fatal)
pub fn snapshot_to_models<T: DeserializeOwned>(collection: &str, docs: &[Document]) -> Vec<T> {
    docs.iter()
        .filter_map(|doc| match doc.to_model::<T>() {
            Ok(model) => Some(model),
            Err(err) => {
                log::warn!("skipping malformed document {}/{}: {}", collection, doc.id, err);
                None
            }
        })
        .collect()
}

/// One operation inside an atomic batch
#[derive(Debug, Clone)]
pub enum BatchOp {
    Set {
        collection: String,
        id: String,
        data: Value,
        /// Merge into the existing document instead of replacing it
        merge: bool,
    },
    Delete {
        collection: String,
        id: String,
    },
}

impl BatchOp {
    pub fn set(collection: &str, id: &str, data: Value) -> Self {
        BatchOp::Set {
            collection: collection.to_string(),
            id: id.to_string(),
            data,
            merge: false,
        }
    }

    pub fn merge(collection: &str, id: &str, data: Value) -> Self {
        BatchOp::Set {
            collection: collection.to_string(),
            id: id.to_string(),
            data,
            merge: true,
        }
    }

    pub fn delete(collection: &str, id: &str) -> Self {
        BatchOp::Delete {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }

    fn collection(&self) -> &str {
        match self {
            BatchOp::Set { collection, .. } => collection,
            BatchOp::Delete { collection, .. } => collection,
        }
    }
}

/// Ordering for `list`; `order_by` names a top-level field
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub order_by: Option<String>,
    pub descending: bool,
}

impl ListOptions {
    pub fn ordered_by(field: &str) -> Self {
        ListOptions {
            order_by: Some(field.to_string()),
            descending: false,
        }
    }

    pub fn descending(field: &str) -> Self {
        ListOptions {
            order_by: Some(field.to_string()),
            descending: true,
        }
    }
}

/// Storage backend seam
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError>;

    async fn list(&self, collection: &str, options: &ListOptions)
        -> Result<Vec<Document>, StoreError>;

    /// Insert with a generated id; returns the id
    async fn create(&self, collection: &str, data: Value) -> Result<String, StoreError>;

    async fn set(
        &self,
        collection: &str,
        id: &str,
        data: Value,
        merge: bool,
    ) -> Result<(), StoreError>;

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError>;

    /// Apply every operation under one lock; observers see a single
    /// snapshot per touched collection with all operations applied
    async fn batch(&self, ops: Vec<BatchOp>) -> Result<(), StoreError>;

    /// Whole-collection snapshot channel, seeded with the current contents
    async fn subscribe(&self, collection: &str) -> watch::Receiver<Vec<Document>>;
}

type Collections = HashMap<String, BTreeMap<String, Value>>;

/// In-memory backend with optional JSON persistence: one
/// `<dir>/<collection>.json` file per collection, written after every
/// committed mutation
pub struct MemoryStore {
    data: RwLock<Collections>,
    watchers: Mutex<HashMap<String, watch::Sender<Vec<Document>>>>,
    dir: Option<PathBuf>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore {
            data: RwLock::new(HashMap::new()),
            watchers: Mutex::new(HashMap::new()),
            dir: None,
        }
    }

    /// Open a persistent store, loading any collection files already in
    /// the directory
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(dir)?;
        let mut collections: Collections = HashMap::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let name = match path.file_stem().and_then(|s| s.to_str()) {
                Some(name) => name.to_string(),
                None => continue,
            };
            let content = std::fs::read_to_string(&path)?;
            let documents: BTreeMap<String, Value> = serde_json::from_str(&content)?;
            log::info!("loaded {} documents from {}", documents.len(), path.display());
            collections.insert(name, documents);
        }
        Ok(MemoryStore {
            data: RwLock::new(collections),
            watchers: Mutex::new(HashMap::new()),
            dir: Some(dir.to_path_buf()),
        })
    }

    /// Restore a backup into the store, replacing existing contents
    pub async fn restore_backup(&self, backup: &BackupFile) -> Result<(), StoreError> {
        let mut ops = Vec::with_capacity(backup.documents.len());
        for document in &backup.documents {
            let (collection, id) = document.split_path()?;
            ops.push(BatchOp::set(
                collection,
                id,
                decode_value(document.data.clone()),
            ));
        }
        log::info!(
            "restoring backup of {} ({} documents)",
            backup.project_id,
            backup.document_count
        );
        self.batch(ops).await
    }

    /// Export every collection into a backup file
    pub async fn export_backup(&self, project_id: &str) -> BackupFile {
        let data = self.data.read().await;
        let mut documents = Vec::new();
        for (collection, docs) in data.iter() {
            for (id, value) in docs {
                documents.push(BackupDocument {
                    path: format!("{}/{}", collection, id),
                    data: value.clone(),
                });
            }
        }
        BackupFile::new(project_id, documents)
    }

    fn snapshot(collections: &Collections, collection: &str) -> Vec<Document> {
        collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, data)| Document {
                        id: id.clone(),
                        data: data.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn persist(&self, collections: &Collections, collection: &str) -> Result<(), StoreError> {
        let dir = match &self.dir {
            Some(dir) => dir,
            None => return Ok(()),
        };
        let empty = BTreeMap::new();
        let docs = collections.get(collection).unwrap_or(&empty);
        let path = dir.join(format!("{}.json", collection));
        let json = serde_json::to_string_pretty(docs)?;
        std::fs::write(&path, json)?;
        Ok(())
    }

    async fn notify(&self, collections: &Collections, collection: &str) {
        let snapshot = Self::snapshot(collections, collection);
        let mut watchers = self.watchers.lock().await;
        let sender = watchers
            .entry(collection.to_string())
            .or_insert_with(|| watch::channel(Vec::new()).0);
        sender.send_replace(snapshot);
    }

    fn apply_set(
        collections: &mut Collections,
        collection: &str,
        id: &str,
        mut data: Value,
        merge: bool,
        now: &str,
    ) -> Result<(), StoreError> {
        resolve_server_timestamps(&mut data, now);
        let incoming = match data {
            Value::Object(map) => map,
            _ => return Err(StoreError::NotAnObject),
        };
        let docs = collections.entry(collection.to_string()).or_default();
        match docs.get_mut(id) {
            Some(existing) if merge => {
                if let Some(target) = existing.as_object_mut() {
                    for (key, value) in incoming {
                        target.insert(key, value);
                    }
                } else {
                    *existing = Value::Object(incoming);
                }
            }
            _ => {
                docs.insert(id.to_string(), Value::Object(incoming));
            }
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        let data = self.data.read().await;
        Ok(data.get(collection).and_then(|docs| {
            docs.get(id).map(|value| Document {
                id: id.to_string(),
                data: value.clone(),
            })
        }))
    }

    async fn list(
        &self,
        collection: &str,
        options: &ListOptions,
    ) -> Result<Vec<Document>, StoreError> {
        let data = self.data.read().await;
        let mut documents = Self::snapshot(&data, collection);
        if let Some(field) = &options.order_by {
            documents.sort_by(|a, b| compare_json(a.data.get(field), b.data.get(field)));
            if options.descending {
                documents.reverse();
            }
        }
        Ok(documents)
    }

    async fn create(&self, collection: &str, data: Value) -> Result<String, StoreError> {
        let id = uuid::Uuid::new_v4().to_string();
        self.set(collection, &id, data, false).await?;
        Ok(id)
    }

    async fn set(
        &self,
        collection: &str,
        id: &str,
        data: Value,
        merge: bool,
    ) -> Result<(), StoreError> {
        let now = chrono::Utc::now().to_rfc3339();
        let mut collections = self.data.write().await;
        Self::apply_set(&mut collections, collection, id, data, merge, &now)?;
        self.persist(&collections, collection)?;
        self.notify(&collections, collection).await;
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        let mut collections = self.data.write().await;
        let removed = collections
            .get_mut(collection)
            .and_then(|docs| docs.remove(id));
        if removed.is_none() {
            return Err(StoreError::not_found(collection, id));
        }
        self.persist(&collections, collection)?;
        self.notify(&collections, collection).await;
        Ok(())
    }

    async fn batch(&self, ops: Vec<BatchOp>) -> Result<(), StoreError> {
        let now = chrono::Utc::now().to_rfc3339();
        let mut collections = self.data.write().await;
        let mut touched: Vec<String> = Vec::new();
        for op in ops {
            if !touched.iter().any(|c| c == op.collection()) {
                touched.push(op.collection().to_string());
            }
            match op {
                BatchOp::Set {
                    collection,
                    id,
                    data,
                    merge,
                } => {
                    Self::apply_set(&mut collections, &collection, &id, data, merge, &now)?;
                }
                BatchOp::Delete { collection, id } => {
                    // Deleting a missing document inside a batch is a no-op,
                    // matching delete-by-query semantics.
                    if let Some(docs) = collections.get_mut(&collection) {
                        docs.remove(&id);
                    }
                }
            }
        }
        for collection in &touched {
            self.persist(&collections, collection)?;
        }
        for collection in &touched {
            self.notify(&collections, collection).await;
        }
        Ok(())
    }

    async fn subscribe(&self, collection: &str) -> watch::Receiver<Vec<Document>> {
        let data = self.data.read().await;
        let snapshot = Self::snapshot(&data, collection);
        let mut watchers = self.watchers.lock().await;
        let sender = watchers
            .entry(collection.to_string())
            .or_insert_with(|| watch::channel(Vec::new()).0);
        sender.send_replace(snapshot);
        sender.subscribe()
    }
}

/// Null < bool < number < string < array < object, mirroring how the
/// ordered queries behaved against the original backend closely enough
/// for display ordering
fn compare_json(a: Option<&Value>, b: Option<&Value>) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    fn rank(value: Option<&Value>) -> u8 {
        match value {
            None | Some(Value::Null) => 0,
            Some(Value::Bool(_)) => 1,
            Some(Value::Number(_)) => 2,
            Some(Value::String(_)) => 3,
            Some(Value::Array(_)) => 4,
            Some(Value::Object(_)) => 5,
        }
    }
    match rank(a).cmp(&rank(b)) {
        Ordering::Equal => {}
        other => return other,
    }
    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = MemoryStore::new();
        store
            .set("accounts", "a1", json!({"name": "Checking"}), false)
            .await
            .unwrap();
        let doc = store.get("accounts", "a1").await.unwrap().unwrap();
        assert_eq!(doc.data["name"], "Checking");
        store.delete("accounts", "a1").await.unwrap();
        assert!(store.get("accounts", "a1").await.unwrap().is_none());
        assert!(store.delete("accounts", "a1").await.is_err());
    }

    #[tokio::test]
    async fn test_merge_keeps_unrelated_fields() {
        let store = MemoryStore::new();
        store
            .set("accounts", "a1", json!({"name": "Checking", "openingBalance": 100}), false)
            .await
            .unwrap();
        store
            .set("accounts", "a1", json!({"defaultCash": true}), true)
            .await
            .unwrap();
        let doc = store.get("accounts", "a1").await.unwrap().unwrap();
        assert_eq!(doc.data["name"], "Checking");
        assert_eq!(doc.data["defaultCash"], true);
    }

    #[tokio::test]
    async fn test_server_timestamp_resolved_on_write() {
        let store = MemoryStore::new();
        store
            .set(
                "expenses",
                "e1",
                json!({"amount": 10, "createdAt": server_timestamp()}),
                false,
            )
            .await
            .unwrap();
        let doc = store.get("expenses", "e1").await.unwrap().unwrap();
        assert!(doc.data["createdAt"].is_string());
        let parsed: chrono::DateTime<chrono::Utc> =
            doc.data["createdAt"].as_str().unwrap().parse().unwrap();
        assert!(parsed <= chrono::Utc::now());
    }

    #[tokio::test]
    async fn test_batch_publishes_one_snapshot_per_collection() {
        let store = MemoryStore::new();
        let mut rx = store.subscribe("expenses").await;
        rx.borrow_and_update();
        store
            .batch(vec![
                BatchOp::set("expenses", "e1", json!({"amount": 1})),
                BatchOp::set("expenses", "e2", json!({"amount": 2})),
                BatchOp::set("accounts", "a1", json!({"name": "Checking"})),
            ])
            .await
            .unwrap();
        assert!(rx.has_changed().unwrap());
        let snapshot = rx.borrow_and_update().clone();
        // Both writes land in the same snapshot.
        assert_eq!(snapshot.len(), 2);
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_list_ordering() {
        let store = MemoryStore::new();
        store
            .set("storageOffers", "o1", json!({"order": 2}), false)
            .await
            .unwrap();
        store
            .set("storageOffers", "o2", json!({"order": 1}), false)
            .await
            .unwrap();
        store
            .set("storageOffers", "o3", json!({}), false)
            .await
            .unwrap();
        let docs = store
            .list("storageOffers", &ListOptions::ordered_by("order"))
            .await
            .unwrap();
        let ids: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
        // Documents missing the field sort first.
        assert_eq!(ids, vec!["o3", "o2", "o1"]);
    }

    #[tokio::test]
    async fn test_backup_round_trip() {
        let store = MemoryStore::new();
        store
            .set("accounts", "a1", json!({"name": "Checking"}), false)
            .await
            .unwrap();
        store
            .set("expenses", "e1", json!({"amount": 12.5}), false)
            .await
            .unwrap();
        let backup = store.export_backup("stowbook-local").await;
        assert_eq!(backup.document_count, 2);

        let restored = MemoryStore::new();
        restored.restore_backup(&backup).await.unwrap();
        let doc = restored.get("expenses", "e1").await.unwrap().unwrap();
        assert_eq!(doc.data["amount"], 12.5);
    }

    #[tokio::test]
    async fn test_to_model_injects_id() {
        #[derive(serde::Deserialize)]
        struct Named {
            id: String,
            name: String,
        }
        let doc = Document {
            id: "a1".to_string(),
            data: json!({"name": "Checking"}),
        };
        let model: Named = doc.to_model().unwrap();
        assert_eq!(model.id, "a1");
        assert_eq!(model.name, "Checking");
    }

    #[tokio::test]
    async fn test_persistence_round_trip() {
        let dir = std::env::temp_dir().join(format!("stowbook-store-{}", uuid::Uuid::new_v4()));
        {
            let store = MemoryStore::open(&dir).unwrap();
            store
                .set("accounts", "a1", json!({"name": "Checking"}), false)
                .await
                .unwrap();
        }
        let reopened = MemoryStore::open(&dir).unwrap();
        let doc = reopened.get("accounts", "a1").await.unwrap().unwrap();
        assert_eq!(doc.data["name"], "Checking");
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
