//! Storage request API endpoints

use crate::{load_storage_request, ApiError, AppState};
use axum::extract::{Path, State};
use axum::Json;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use stowbook_core::pricing::StorageRequest;
use stowbook_store::{collections, snapshot_to_models, ListOptions};

/// Storage request plus its computed amounts
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageRequestView {
    #[serde(flatten)]
    pub request: StorageRequest,
    /// Automatic price from the catalog, if it can be computed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_amount: Option<Decimal>,
    /// Contract override when present, otherwise the estimate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_amount: Option<Decimal>,
}

/// Storage requests with resolved amounts, newest first
pub async fn api_storage_requests(
    State(state): State<AppState>,
) -> Result<Json<Vec<StorageRequestView>>, ApiError> {
    let docs = state
        .store
        .list(
            collections::STORAGE_REQUESTS,
            &ListOptions::descending("createdAt"),
        )
        .await?;
    let requests: Vec<StorageRequest> = snapshot_to_models(collections::STORAGE_REQUESTS, &docs);

    let catalog = state.catalog.read().await;
    let views = requests
        .into_iter()
        .map(|request| {
            let estimated_amount = catalog.estimate_amount(&request);
            let resolved_amount = catalog.resolve_amount(&request);
            StorageRequestView {
                request,
                estimated_amount,
                resolved_amount,
            }
        })
        .collect();
    Ok(Json(views))
}

/// Price breakdown for one storage request
pub async fn api_storage_estimate(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let request = load_storage_request(&state, &id).await?;
    let catalog = state.catalog.read().await;
    Ok(Json(json!({
        "id": id,
        "estimatedAmount": catalog.estimate_amount(&request),
        "contractAmount": request.contract_amount,
        "resolvedAmount": catalog.resolve_amount(&request),
    })))
}
