//! Error types for stowbook-core

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error codes for programmatic error handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Account not found
    AccountNotFound,
    /// Entry not found
    EntryNotFound,
    /// Transaction not found
    TransactionNotFound,
    /// Validation error
    ValidationError,
    /// Duplicate account name
    DuplicateName,
    /// Internal error
    InternalError,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCode::AccountNotFound => write!(f, "ACCOUNT_NOT_FOUND"),
            ErrorCode::EntryNotFound => write!(f, "ENTRY_NOT_FOUND"),
            ErrorCode::TransactionNotFound => write!(f, "TRANSACTION_NOT_FOUND"),
            ErrorCode::ValidationError => write!(f, "VALIDATION_ERROR"),
            ErrorCode::DuplicateName => write!(f, "DUPLICATE_NAME"),
            ErrorCode::InternalError => write!(f, "INTERNAL_ERROR"),
        }
    }
}

/// Core ledger errors
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Account not found: {id}")]
    AccountNotFound { id: String },

    #[error("Entry not found: {id}")]
    EntryNotFound { id: String },

    #[error("Transaction not found: {key}")]
    TransactionNotFound { key: String },

    #[error("Validation failed: {message}")]
    Validation { message: String },

    #[error("Duplicate account name: {name}")]
    DuplicateName { name: String },
}

impl CoreError {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        CoreError::Validation {
            message: message.into(),
        }
    }

    /// Map to a stable error code for API payloads
    pub fn code(&self) -> ErrorCode {
        match self {
            CoreError::AccountNotFound { .. } => ErrorCode::AccountNotFound,
            CoreError::EntryNotFound { .. } => ErrorCode::EntryNotFound,
            CoreError::TransactionNotFound { .. } => ErrorCode::TransactionNotFound,
            CoreError::Validation { .. } => ErrorCode::ValidationError,
            CoreError::DuplicateName { .. } => ErrorCode::DuplicateName,
        }
    }
}
