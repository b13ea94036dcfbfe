//! Accounts API endpoints

use crate::{ApiError, AppState};
use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use stowbook_core::{quantize, AccountBalance, AccountKind, CoreError, DefaultClear};
use stowbook_store::{collections, server_timestamp, BatchOp};

/// Create/update payload for an account
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountPayload {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: AccountKind,
    #[serde(default)]
    pub opening_balance: Decimal,
    #[serde(default)]
    pub opening_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub default_cash: bool,
    #[serde(default)]
    pub default_entity: bool,
}

impl AccountPayload {
    fn validate(&self) -> Result<String, CoreError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(CoreError::validation("Enter an account name."));
        }
        if self.default_cash && !self.kind.supports_cash() {
            return Err(CoreError::validation(
                "Only cash-capable accounts can be the default cash account.",
            ));
        }
        if self.default_entity && !self.kind.supports_entity() {
            return Err(CoreError::validation(
                "Only entity-capable accounts can be the default entity account.",
            ));
        }
        Ok(name.to_string())
    }

    fn document(&self, name: &str) -> serde_json::Value {
        json!({
            "name": name,
            "type": self.kind,
            "openingBalance": quantize(self.opening_balance),
            "openingDate": self.opening_date,
            "defaultCash": self.default_cash,
            "defaultEntity": self.default_entity,
        })
    }
}

fn clear_ops(clears: &[DefaultClear]) -> Vec<BatchOp> {
    clears
        .iter()
        .map(|clear| {
            let mut patch = serde_json::Map::new();
            if clear.clear_cash {
                patch.insert("defaultCash".to_string(), json!(false));
            }
            if clear.clear_entity {
                patch.insert("defaultEntity".to_string(), json!(false));
            }
            BatchOp::merge(
                collections::ACCOUNTS,
                &clear.account_id,
                serde_json::Value::Object(patch),
            )
        })
        .collect()
}

/// Account list with computed balances
pub async fn api_accounts(State(state): State<AppState>) -> Json<Vec<AccountBalance>> {
    let ledger = state.ledger.read().await;
    Json(ledger.account_balances())
}

/// Create an account; claimed default flags are cleared from every other
/// account in the same batch
pub async fn api_account_create(
    State(state): State<AppState>,
    Json(payload): Json<AccountPayload>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let name = payload.validate()?;
    let id = uuid::Uuid::new_v4().to_string();

    let clears = {
        let ledger = state.ledger.read().await;
        if ledger.account_name_taken(&name, None) {
            return Err(CoreError::DuplicateName { name }.into());
        }
        ledger.default_flag_clears(&id, payload.default_cash, payload.default_entity)
    };

    let mut document = payload.document(&name);
    document["createdAt"] = server_timestamp();

    let mut ops = vec![BatchOp::set(collections::ACCOUNTS, &id, document)];
    ops.extend(clear_ops(&clears));
    state.store.batch(ops).await?;

    log::info!("created account {} ({})", name, id);
    Ok(Json(json!({ "id": id })))
}

/// Update an account
pub async fn api_account_update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<AccountPayload>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let name = payload.validate()?;

    let clears = {
        let ledger = state.ledger.read().await;
        if ledger.account_by_id(&id).is_none() {
            return Err(CoreError::AccountNotFound { id }.into());
        }
        if ledger.account_name_taken(&name, Some(&id)) {
            return Err(CoreError::DuplicateName { name }.into());
        }
        ledger.default_flag_clears(&id, payload.default_cash, payload.default_entity)
    };

    let mut document = payload.document(&name);
    document["updatedAt"] = server_timestamp();

    let mut ops = vec![BatchOp::merge(collections::ACCOUNTS, &id, document)];
    ops.extend(clear_ops(&clears));
    state.store.batch(ops).await?;

    Ok(Json(json!({ "id": id })))
}
