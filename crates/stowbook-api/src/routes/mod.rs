//! Route modules for the API server
//!
//! All routes are organized into modules for better maintainability:
//! - accounts: Account list with balances, create/update
//! - ledger: Rendered rows, recent activity, entries, transfers, deletes
//! - storage: Storage requests and price estimates

pub mod accounts;
pub mod ledger;
pub mod storage;
