//! Device authorization server.
//!
//! Lets a headless client obtain an access token by having a person approve a short
//! user code in an already signed-in browser session.

use domain::device_flow::DbFlowStore;
use domain::{FlowSettings, FlowStore, Manager, MemoryFlowStore};
use log::*;
use service::config::{Config, FlowStoreKind};
use service::{logging::Logger, AppState};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let config = Config::new();
    if let Err(e) = Logger::init_logger(&config) {
        eprintln!("Failed to initialize logger: {e}");
    }

    info!("Starting up device authorization server...");
    info!(
        "Runtime environment: {}, flow store: {}",
        config.runtime_env(),
        config.flow_store
    );

    let pepper = config.device_auth_pepper();
    if pepper.is_empty() && config.is_production() {
        warn!("DEVICE_AUTH_PEPPER is empty; device code hashes are unpeppered");
    }

    let (store, db) = match config.flow_store {
        FlowStoreKind::Postgres => {
            let db = match service::init_database(&config).await {
                Ok(db) => Arc::new(db),
                Err(e) => {
                    error!("Failed to establish database connection: {e}");
                    std::process::exit(1);
                }
            };
            match DbFlowStore::new(Arc::clone(&db), config.token_encryption_key()) {
                Ok(store) => (Arc::new(store) as Arc<dyn FlowStore>, Some(db)),
                Err(e) => {
                    error!("Failed to set up the device flow store: {e}");
                    std::process::exit(1);
                }
            }
        }
        FlowStoreKind::Memory => {
            warn!("Device flows are kept in memory and will be lost on restart");
            let store: Arc<dyn FlowStore> =
                Arc::new(MemoryFlowStore::with_capacity(config.memory_store_capacity));
            (store, None)
        }
    };

    let settings = FlowSettings {
        verification_path: config.verification_path().to_string(),
        ..FlowSettings::default()
    };
    let device_flows = Manager::new(store, pepper, settings);

    let app_state = AppState::new(config, device_flows, db.as_ref());

    if let Err(e) = web::init_server(app_state).await {
        error!("Server stopped: {e}");
        std::process::exit(1);
    }
}
