//! Versioned JSON backup format
//!
//! A backup is a single JSON file listing every document by its
//! `collection/id` path. Files produced by earlier tooling wrap special
//! values in `__datatype` markers (timestamps, geopoints, document
//! references, blobs); importing unwraps them to plain JSON so the store
//! and the model layer never see the markers.

use crate::error::StoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const BACKUP_VERSION: u32 = 1;

/// One exported document, addressed by `collection/id`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupDocument {
    pub path: String,
    pub data: Value,
}

impl BackupDocument {
    /// Split the path into collection and document id. Subcollection paths
    /// are rejected; the store is flat.
    pub fn split_path(&self) -> Result<(&str, &str), StoreError> {
        let mut parts = self.path.splitn(2, '/');
        let collection = parts.next().unwrap_or_default();
        let id = parts.next().unwrap_or_default();
        if collection.is_empty() || id.is_empty() || id.contains('/') {
            return Err(StoreError::invalid_backup(format!(
                "unsupported document path: {}",
                self.path
            )));
        }
        Ok((collection, id))
    }
}

/// Backup file header and document list
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupFile {
    pub version: u32,
    pub project_id: String,
    pub created_at: DateTime<Utc>,
    pub document_count: usize,
    pub documents: Vec<BackupDocument>,
}

impl BackupFile {
    /// Documents are sorted by path so backups diff cleanly
    pub fn new(project_id: &str, mut documents: Vec<BackupDocument>) -> Self {
        documents.sort_by(|a, b| a.path.cmp(&b.path));
        BackupFile {
            version: BACKUP_VERSION,
            project_id: project_id.to_string(),
            created_at: Utc::now(),
            document_count: documents.len(),
            documents,
        }
    }

    pub fn parse(json: &str) -> Result<Self, StoreError> {
        let backup: BackupFile = serde_json::from_str(json)?;
        if backup.version != BACKUP_VERSION {
            return Err(StoreError::invalid_backup(format!(
                "unsupported version {}",
                backup.version
            )));
        }
        Ok(backup)
    }
}

/// Recursively unwrap `__datatype` markers into plain JSON values
pub fn decode_value(value: Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.into_iter().map(decode_value).collect()),
        Value::Object(map) => {
            match map.get("__datatype").and_then(Value::as_str) {
                Some("timestamp") => {
                    return map.get("value").cloned().unwrap_or(Value::Null);
                }
                Some("documentReference") => {
                    return map.get("path").cloned().unwrap_or(Value::Null);
                }
                Some("blob") => {
                    return map.get("base64").cloned().unwrap_or(Value::Null);
                }
                Some("geopoint") => {
                    let mut point = serde_json::Map::new();
                    point.insert(
                        "latitude".to_string(),
                        map.get("latitude").cloned().unwrap_or(Value::Null),
                    );
                    point.insert(
                        "longitude".to_string(),
                        map.get("longitude").cloned().unwrap_or(Value::Null),
                    );
                    return Value::Object(point);
                }
                _ => {}
            }
            Value::Object(
                map.into_iter()
                    .map(|(key, entry)| (key, decode_value(entry)))
                    .collect(),
            )
        }
        other => other,
    }
}
