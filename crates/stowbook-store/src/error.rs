//! Error types for stowbook-store

use thiserror::Error;

/// Document store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Document not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    #[error("Document data must be a JSON object")]
    NotAnObject,

    #[error("Invalid backup file: {message}")]
    InvalidBackup { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn not_found(collection: impl Into<String>, id: impl Into<String>) -> Self {
        StoreError::NotFound {
            collection: collection.into(),
            id: id.into(),
        }
    }

    pub fn invalid_backup(message: impl Into<String>) -> Self {
        StoreError::InvalidBackup {
            message: message.into(),
        }
    }
}
