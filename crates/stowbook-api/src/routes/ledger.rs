//! Ledger API endpoints: rendered rows, recent activity, and mutations

use crate::{ApiError, AppState};
use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;
use stowbook_core::{
    normalize_tag, quantize, CoreError, EntryType, LedgerFilters, LedgerRow, TransactionSummary,
};
use stowbook_store::{collections, server_timestamp, BatchOp};

/// Query filters for the rendered ledger: comma-separated account ids and
/// tags
#[derive(Debug, Default, Deserialize)]
pub struct RowsQuery {
    #[serde(default)]
    pub accounts: Option<String>,
    #[serde(default)]
    pub tags: Option<String>,
}

impl RowsQuery {
    fn filters(&self) -> LedgerFilters {
        let mut filters = LedgerFilters::default();
        if let Some(accounts) = &self.accounts {
            let selection: HashSet<String> = accounts
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
            if !selection.is_empty() {
                filters.account_selection = Some(selection);
            }
        }
        if let Some(tags) = &self.tags {
            filters.set_tags(tags.split(',').map(String::from));
        }
        filters
    }
}

/// Rendered ledger rows, newest first
pub async fn api_ledger_rows(
    State(state): State<AppState>,
    Query(query): Query<RowsQuery>,
) -> Json<Vec<LedgerRow>> {
    let ledger = state.ledger.read().await;
    Json(ledger.render_rows_with(&query.filters()))
}

#[derive(Debug, Default, Deserialize)]
pub struct RecentQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Latest logical transactions for the dashboard; the page size from the
/// configuration caps the list unless the caller asks for less
pub async fn api_ledger_recent(
    State(state): State<AppState>,
    Query(query): Query<RecentQuery>,
) -> Json<Vec<TransactionSummary>> {
    let limit = query
        .limit
        .unwrap_or(state.config.pagination.records_per_page);
    let ledger = state.ledger.read().await;
    Json(ledger.recent_transactions(limit))
}

/// Create/update payload for a ledger entry
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryPayload {
    pub account_id: String,
    #[serde(default)]
    pub entity_id: Option<String>,
    pub entry_type: EntryType,
    pub amount: Decimal,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub is_return: bool,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub vendor_tag: Option<String>,
}

/// Validate an entry payload against the current ledger and build the
/// document body (without transaction id or audit timestamps)
async fn build_entry_document(
    state: &AppState,
    payload: &EntryPayload,
) -> Result<serde_json::Value, ApiError> {
    let amount = quantize(payload.amount);
    if amount <= Decimal::ZERO {
        return Err(CoreError::validation("Enter a positive amount.").into());
    }
    let category = payload
        .category
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or_else(|| CoreError::validation("Select a category."))?
        .to_string();
    let entity_id = payload
        .entity_id
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(String::from)
        .ok_or_else(|| CoreError::validation("Select an entity."))?;
    let date = payload
        .date
        .ok_or_else(|| CoreError::validation("Choose a date."))?;

    let ledger = state.ledger.read().await;
    if ledger.account_by_id(&payload.account_id).is_none() {
        return Err(CoreError::AccountNotFound {
            id: payload.account_id.clone(),
        }
        .into());
    }
    if ledger.account_by_id(&entity_id).is_none() {
        return Err(CoreError::AccountNotFound { id: entity_id }.into());
    }

    // A combined account always occupies both legs.
    let (account_id, entity_id) =
        ledger.coerce_combined_legs(payload.account_id.clone(), entity_id);

    let tags: Vec<String> = payload
        .tags
        .iter()
        .map(|tag| normalize_tag(tag))
        .filter(|tag| !tag.is_empty())
        .collect();

    Ok(json!({
        "accountId": account_id,
        "entityId": entity_id,
        "entryType": payload.entry_type,
        "amount": amount,
        "isReturn": payload.is_return,
        "category": category,
        "categoryId": payload.category_id,
        "date": date,
        "description": payload.description,
        "tags": tags,
        "clientId": payload.client_id,
        "vendorTag": payload.vendor_tag,
    }))
}

/// Create a ledger entry
pub async fn api_entry_create(
    State(state): State<AppState>,
    Json(payload): Json<EntryPayload>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut document = build_entry_document(&state, &payload).await?;
    document["transactionId"] = json!(uuid::Uuid::new_v4().to_string());
    document["createdAt"] = server_timestamp();

    let id = state.store.create(collections::ENTRIES, document).await?;
    log::info!("created ledger entry {}", id);
    Ok(Json(json!({ "id": id })))
}

/// Update a ledger entry; the transaction id never changes on edit
pub async fn api_entry_update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<EntryPayload>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if state.store.get(collections::ENTRIES, &id).await?.is_none() {
        return Err(CoreError::EntryNotFound { id }.into());
    }
    let mut document = build_entry_document(&state, &payload).await?;
    document["updatedAt"] = server_timestamp();

    state
        .store
        .set(collections::ENTRIES, &id, document, true)
        .await?;
    Ok(Json(json!({ "id": id })))
}

/// Create payload for a transfer between two cash accounts
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferPayload {
    pub from_account_id: String,
    pub to_account_id: String,
    pub amount: Decimal,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub description: Option<String>,
}

impl TransferPayload {
    async fn validate(&self, state: &AppState) -> Result<(Decimal, String), ApiError> {
        if self.from_account_id == self.to_account_id {
            return Err(CoreError::validation("Select two distinct cash accounts.").into());
        }
        let amount = quantize(self.amount);
        if amount <= Decimal::ZERO {
            return Err(CoreError::validation("Enter a positive amount.").into());
        }
        let ledger = state.ledger.read().await;
        let mut names = Vec::with_capacity(2);
        for id in [&self.from_account_id, &self.to_account_id] {
            let account = ledger
                .account_by_id(id)
                .ok_or_else(|| CoreError::AccountNotFound { id: id.clone() })?;
            if !account.kind.supports_cash() {
                return Err(
                    CoreError::validation("Transfers move money between cash accounts.").into(),
                );
            }
            names.push(account.name.clone());
        }
        let description = self
            .description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(String::from)
            .unwrap_or_else(|| format!("Transfer {} → {}", names[0], names[1]));
        Ok((amount, description))
    }

    fn leg(
        &self,
        amount: Decimal,
        description: &str,
        transaction_id: &str,
        account_id: &str,
        entry_type: EntryType,
    ) -> serde_json::Value {
        json!({
            "accountId": account_id,
            "entryType": entry_type,
            "amount": amount,
            "category": "Transfer",
            "date": self.date,
            "description": description,
            "transactionId": transaction_id,
        })
    }
}

/// Create a transfer: two entries sharing one transaction id, written
/// atomically
pub async fn api_transfer_create(
    State(state): State<AppState>,
    Json(payload): Json<TransferPayload>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (amount, description) = payload.validate(&state).await?;
    let transaction_id = uuid::Uuid::new_v4().to_string();

    let mut expense = payload.leg(
        amount,
        &description,
        &transaction_id,
        &payload.from_account_id,
        EntryType::Expense,
    );
    expense["createdAt"] = server_timestamp();
    let mut income = payload.leg(
        amount,
        &description,
        &transaction_id,
        &payload.to_account_id,
        EntryType::Income,
    );
    income["createdAt"] = server_timestamp();

    state
        .store
        .batch(vec![
            BatchOp::set(
                collections::ENTRIES,
                &uuid::Uuid::new_v4().to_string(),
                expense,
            ),
            BatchOp::set(
                collections::ENTRIES,
                &uuid::Uuid::new_v4().to_string(),
                income,
            ),
        ])
        .await?;

    log::info!("created transfer {}", transaction_id);
    Ok(Json(json!({ "transactionId": transaction_id })))
}

/// Update both legs of a transfer atomically
pub async fn api_transfer_update(
    State(state): State<AppState>,
    Path(transaction_id): Path<String>,
    Json(payload): Json<TransferPayload>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (amount, description) = payload.validate(&state).await?;

    let (expense_id, income_id) = {
        let ledger = state.ledger.read().await;
        match ledger.transfer_legs(&transaction_id) {
            Some((expense, income)) => (expense.id.clone(), income.id.clone()),
            // A sibling leg is missing; the entry edit endpoint is the
            // fallback for malformed transfers.
            None => {
                return Err(CoreError::TransactionNotFound {
                    key: transaction_id,
                }
                .into())
            }
        }
    };

    let mut expense = payload.leg(
        amount,
        &description,
        &transaction_id,
        &payload.from_account_id,
        EntryType::Expense,
    );
    expense["updatedAt"] = server_timestamp();
    let mut income = payload.leg(
        amount,
        &description,
        &transaction_id,
        &payload.to_account_id,
        EntryType::Income,
    );
    income["updatedAt"] = server_timestamp();

    state
        .store
        .batch(vec![
            BatchOp::merge(collections::ENTRIES, &expense_id, expense),
            BatchOp::merge(collections::ENTRIES, &income_id, income),
        ])
        .await?;

    Ok(Json(json!({ "transactionId": transaction_id })))
}

/// Delete a logical transaction: every entry sharing the transaction id
/// in one batch, falling back to a single document whose own id matches
pub async fn api_transaction_delete(
    State(state): State<AppState>,
    Path(txn): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let entry_ids: Vec<String> = {
        let ledger = state.ledger.read().await;
        ledger
            .transaction_entries(&txn)
            .iter()
            .map(|entry| entry.id.clone())
            .collect()
    };

    if !entry_ids.is_empty() {
        let ops = entry_ids
            .iter()
            .map(|id| BatchOp::delete(collections::ENTRIES, id))
            .collect();
        state.store.batch(ops).await?;
        log::info!("deleted transaction {} ({} entries)", txn, entry_ids.len());
        return Ok(Json(json!({ "deleted": entry_ids.len() })));
    }

    // The in-memory view can lag a fresh write; check the store directly.
    if state.store.get(collections::ENTRIES, &txn).await?.is_some() {
        state.store.delete(collections::ENTRIES, &txn).await?;
        return Ok(Json(json!({ "deleted": 1 })));
    }

    Err(CoreError::TransactionNotFound { key: txn }.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Arc;
    use stowbook_config::Config;
    use stowbook_core::{Account, AccountKind, LedgerEntry};
    use stowbook_store::MemoryStore;

    fn account(id: &str, name: &str, kind: AccountKind) -> Account {
        Account {
            id: id.to_string(),
            name: name.to_string(),
            kind,
            opening_balance: Decimal::ZERO,
            opening_date: None,
            created_at: None,
            default_cash: false,
            default_entity: false,
        }
    }

    async fn seeded_state(config: Config) -> AppState {
        let state = AppState::new(Arc::new(MemoryStore::new()), config);
        state.ledger.write().await.apply_accounts_snapshot(vec![
            account("a", "Checking", AccountKind::Cash),
            account("b", "Savings", AccountKind::Cash),
            account("o", "Owner", AccountKind::Entity),
        ]);
        state
    }

    fn payload(entity: Option<&str>, date: Option<DateTime<Utc>>) -> EntryPayload {
        EntryPayload {
            account_id: "a".to_string(),
            entity_id: entity.map(String::from),
            entry_type: EntryType::Expense,
            amount: "25".parse().unwrap(),
            date,
            category: Some("Fuel".to_string()),
            category_id: None,
            description: None,
            tags: Vec::new(),
            is_return: false,
            client_id: None,
            vendor_tag: None,
        }
    }

    fn june(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, day, 0, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_entry_requires_entity() {
        let state = seeded_state(Config::default()).await;
        let err = build_entry_document(&state, &payload(None, Some(june(1))))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Select an entity."));
        let err = build_entry_document(&state, &payload(Some("  "), Some(june(1))))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Select an entity."));
    }

    #[tokio::test]
    async fn test_entry_requires_date() {
        let state = seeded_state(Config::default()).await;
        let err = build_entry_document(&state, &payload(Some("o"), None))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Choose a date."));
    }

    #[tokio::test]
    async fn test_entry_document_carries_both_legs_and_date() {
        let state = seeded_state(Config::default()).await;
        let doc = build_entry_document(&state, &payload(Some("o"), Some(june(1))))
            .await
            .unwrap();
        assert_eq!(doc["accountId"], "a");
        assert_eq!(doc["entityId"], "o");
        assert!(doc["date"].is_string());
    }

    #[tokio::test]
    async fn test_recent_limit_defaults_to_configured_page_size() {
        let mut config = Config::default();
        config.pagination.records_per_page = 1;
        let state = seeded_state(config).await;
        state.ledger.write().await.apply_entries_snapshot(vec![
            LedgerEntry {
                id: "e1".to_string(),
                transaction_id: Some("t1".to_string()),
                account_id: "a".to_string(),
                entry_type: EntryType::Expense,
                amount: "10".parse().unwrap(),
                date: Some(june(2)),
                ..Default::default()
            },
            LedgerEntry {
                id: "e2".to_string(),
                transaction_id: Some("t2".to_string()),
                account_id: "b".to_string(),
                entry_type: EntryType::Income,
                amount: "5".parse().unwrap(),
                date: Some(june(3)),
                ..Default::default()
            },
        ]);

        let Json(capped) = api_ledger_recent(
            State(state.clone()),
            Query(RecentQuery { limit: None }),
        )
        .await;
        assert_eq!(capped.len(), 1);
        assert_eq!(capped[0].txn_key, "t2");

        let Json(all) = api_ledger_recent(
            State(state),
            Query(RecentQuery { limit: Some(10) }),
        )
        .await;
        assert_eq!(all.len(), 2);
    }
}
