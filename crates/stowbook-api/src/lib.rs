//! HTTP JSON API server
//!
//! Routes are organized into modules:
//! - routes::accounts: Account list with balances, create/update
//! - routes::ledger: Rendered ledger rows, recent activity, entry and
//!   transfer mutations, transaction delete
//! - routes::storage: Storage requests and price estimates
//!
//! All application state lives behind snapshot channels: background sync
//! tasks subscribe to the document store and push fresh collection
//! snapshots into the ledger view and the pricing catalog, so read
//! handlers never touch the store.

pub mod error;
pub mod routes;

use axum::{
    routing::{delete, get, post, put},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use stowbook_config::Config;
use stowbook_core::pricing::{
    AddOn, OfferTemplate, PricingCatalog, Season, StorageRequest, VehicleType,
};
use stowbook_core::{Account, LedgerEntry, LedgerView};
use stowbook_store::{collections, snapshot_to_models, DocumentStore, ListOptions};
use tokio::net::TcpListener;
use tokio::sync::RwLock;

pub use error::ApiError;

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<RwLock<LedgerView>>,
    pub catalog: Arc<RwLock<PricingCatalog>>,
    pub store: Arc<dyn DocumentStore>,
    pub config: Config,
}

impl AppState {
    pub fn new(store: Arc<dyn DocumentStore>, config: Config) -> Self {
        AppState {
            ledger: Arc::new(RwLock::new(LedgerView::new())),
            catalog: Arc::new(RwLock::new(PricingCatalog::new())),
            store,
            config,
        }
    }
}

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    use routes::accounts::{api_account_create, api_account_update, api_accounts};
    use routes::ledger::{
        api_entry_create, api_entry_update, api_ledger_recent, api_ledger_rows,
        api_transaction_delete, api_transfer_create, api_transfer_update,
    };
    use routes::storage::{api_storage_estimate, api_storage_requests};

    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/accounts", get(api_accounts))
        .route("/api/accounts", post(api_account_create))
        .route("/api/accounts/:id", put(api_account_update))
        .route("/api/ledger/rows", get(api_ledger_rows))
        .route("/api/ledger/recent", get(api_ledger_recent))
        .route("/api/ledger/entries", post(api_entry_create))
        .route("/api/ledger/entries/:id", put(api_entry_update))
        .route("/api/ledger/transfers", post(api_transfer_create))
        .route("/api/ledger/transfers/:txn", put(api_transfer_update))
        .route("/api/ledger/transactions/:txn", delete(api_transaction_delete))
        .route("/api/storage/requests", get(api_storage_requests))
        .route("/api/storage/requests/:id/estimate", get(api_storage_estimate))
        .route("/api/reload", post(api_reload))
        .layer(tower_http::cors::CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

/// Re-read every collection from the store and replace the in-memory
/// snapshots
async fn api_reload(
    state: axum::extract::State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    reload_all(&state).await?;
    Ok(Json(json!({ "success": true })))
}

/// Load all collections into the ledger view and pricing catalog
pub async fn reload_all(state: &AppState) -> Result<(), ApiError> {
    let options = ListOptions::default();

    let docs = state.store.list(collections::ACCOUNTS, &options).await?;
    let accounts: Vec<Account> = snapshot_to_models(collections::ACCOUNTS, &docs);
    let docs = state.store.list(collections::ENTRIES, &options).await?;
    let entries: Vec<LedgerEntry> = snapshot_to_models(collections::ENTRIES, &docs);
    {
        let mut ledger = state.ledger.write().await;
        ledger.apply_accounts_snapshot(accounts);
        ledger.apply_entries_snapshot(entries);
    }

    let docs = state.store.list(collections::STORAGE_SEASONS, &options).await?;
    let seasons: Vec<Season> = snapshot_to_models(collections::STORAGE_SEASONS, &docs);
    let docs = state.store.list(collections::VEHICLE_TYPES, &options).await?;
    let vehicle_types: Vec<VehicleType> = snapshot_to_models(collections::VEHICLE_TYPES, &docs);
    let docs = state.store.list(collections::OFFER_TEMPLATES, &options).await?;
    let templates: Vec<OfferTemplate> = snapshot_to_models(collections::OFFER_TEMPLATES, &docs);
    let docs = state.store.list(collections::STORAGE_OFFERS, &options).await?;
    let offers = snapshot_to_models(collections::STORAGE_OFFERS, &docs);
    let docs = state.store.list(collections::STORAGE_ADD_ONS, &options).await?;
    let addons: Vec<AddOn> = snapshot_to_models(collections::STORAGE_ADD_ONS, &docs);
    {
        let mut catalog = state.catalog.write().await;
        catalog.apply_seasons_snapshot(seasons);
        catalog.apply_vehicle_types_snapshot(vehicle_types);
        catalog.apply_templates_snapshot(templates);
        catalog.apply_offers_snapshot(offers);
        catalog.apply_addons_snapshot(addons);
    }

    log::info!("reloaded all collections from store");
    Ok(())
}

/// Spawn one background task per watched collection; each task applies
/// the current snapshot immediately and then every published change
pub fn spawn_store_sync(state: &AppState) {
    {
        let store = state.store.clone();
        let ledger = state.ledger.clone();
        tokio::spawn(async move {
            let mut rx = store.subscribe(collections::ACCOUNTS).await;
            loop {
                let docs = rx.borrow_and_update().clone();
                let accounts = snapshot_to_models(collections::ACCOUNTS, &docs);
                ledger.write().await.apply_accounts_snapshot(accounts);
                if rx.changed().await.is_err() {
                    break;
                }
            }
        });
    }
    {
        let store = state.store.clone();
        let ledger = state.ledger.clone();
        tokio::spawn(async move {
            let mut rx = store.subscribe(collections::ENTRIES).await;
            loop {
                let docs = rx.borrow_and_update().clone();
                let entries = snapshot_to_models(collections::ENTRIES, &docs);
                ledger.write().await.apply_entries_snapshot(entries);
                if rx.changed().await.is_err() {
                    break;
                }
            }
        });
    }
    {
        let store = state.store.clone();
        let catalog = state.catalog.clone();
        tokio::spawn(async move {
            let mut rx = store.subscribe(collections::STORAGE_SEASONS).await;
            loop {
                let docs = rx.borrow_and_update().clone();
                let seasons = snapshot_to_models(collections::STORAGE_SEASONS, &docs);
                catalog.write().await.apply_seasons_snapshot(seasons);
                if rx.changed().await.is_err() {
                    break;
                }
            }
        });
    }
    {
        let store = state.store.clone();
        let catalog = state.catalog.clone();
        tokio::spawn(async move {
            let mut rx = store.subscribe(collections::VEHICLE_TYPES).await;
            loop {
                let docs = rx.borrow_and_update().clone();
                let types = snapshot_to_models(collections::VEHICLE_TYPES, &docs);
                catalog.write().await.apply_vehicle_types_snapshot(types);
                if rx.changed().await.is_err() {
                    break;
                }
            }
        });
    }
    {
        let store = state.store.clone();
        let catalog = state.catalog.clone();
        tokio::spawn(async move {
            let mut rx = store.subscribe(collections::OFFER_TEMPLATES).await;
            loop {
                let docs = rx.borrow_and_update().clone();
                let templates = snapshot_to_models(collections::OFFER_TEMPLATES, &docs);
                catalog.write().await.apply_templates_snapshot(templates);
                if rx.changed().await.is_err() {
                    break;
                }
            }
        });
    }
    {
        let store = state.store.clone();
        let catalog = state.catalog.clone();
        tokio::spawn(async move {
            let mut rx = store.subscribe(collections::STORAGE_OFFERS).await;
            loop {
                let docs = rx.borrow_and_update().clone();
                let offers = snapshot_to_models(collections::STORAGE_OFFERS, &docs);
                catalog.write().await.apply_offers_snapshot(offers);
                if rx.changed().await.is_err() {
                    break;
                }
            }
        });
    }
    {
        let store = state.store.clone();
        let catalog = state.catalog.clone();
        tokio::spawn(async move {
            let mut rx = store.subscribe(collections::STORAGE_ADD_ONS).await;
            loop {
                let docs = rx.borrow_and_update().clone();
                let addons = snapshot_to_models(collections::STORAGE_ADD_ONS, &docs);
                catalog.write().await.apply_addons_snapshot(addons);
                if rx.changed().await.is_err() {
                    break;
                }
            }
        });
    }
}

/// Fetch a storage request document as a model
pub(crate) async fn load_storage_request(
    state: &AppState,
    id: &str,
) -> Result<StorageRequest, ApiError> {
    let doc = state
        .store
        .get(collections::STORAGE_REQUESTS, id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("storageRequests/{}", id)))?;
    doc.to_model().map_err(|err| {
        log::error!("malformed storage request {}: {}", id, err);
        ApiError::InternalError
    })
}

/// Start the HTTP server
///
/// Binds to the configured address, wires up the background sync tasks,
/// and serves until the process is stopped.
pub async fn start_server(state: AppState) -> anyhow::Result<()> {
    let addr = format!("{}:{}", state.config.server.host, state.config.server.port);

    spawn_store_sync(&state);
    let router = create_router(state);

    let listener = TcpListener::bind(&addr).await?;
    log::info!("Starting stowbook server on http://{}", addr);
    axum::serve(listener, router).await?;
    Ok(())
}
