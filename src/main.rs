//! Stowbook main entry point

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use stowbook_api::{reload_all, start_server, AppState};
use stowbook_config::Config;
use stowbook_store::{BackupFile, MemoryStore};
use tokio::runtime::Runtime;

#[derive(Parser, Debug)]
#[command(name = "stowbook")]
#[command(version = "0.1.0")]
#[command(about = "Bookkeeping and seasonal storage-rental ledger service", long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = Args::parse();
    let rt = Runtime::new()?;

    rt.block_on(async {
        let config = Config::load(args.config.clone())?;

        let data_path = config.profile_data_path();
        log::info!(
            "profile '{}' (project {}), data path {}",
            config.profiles.active,
            config.active_project_id(),
            data_path.display()
        );

        let store = Arc::new(MemoryStore::open(&data_path)?);

        // Seed an empty store from a backup file, if configured.
        if let Some(seed_path) = &config.data.seed_backup {
            let is_empty = store.export_backup(config.active_project_id()).await.document_count == 0;
            if is_empty {
                let content = std::fs::read_to_string(seed_path)?;
                let backup = BackupFile::parse(&content)?;
                if backup.project_id != config.active_project_id() {
                    log::warn!(
                        "seed backup was created for project {}, active profile is {}",
                        backup.project_id,
                        config.active_project_id()
                    );
                }
                store.restore_backup(&backup).await?;
            } else {
                log::debug!("store not empty, skipping seed backup");
            }
        }

        let state = AppState::new(store, config);
        reload_all(&state).await.map_err(|err| anyhow::anyhow!(err.to_string()))?;

        start_server(state).await
    })
}
