//! One-shot sweep that marks every lapsed device flow as expired and erases its token.
//! Safe to run from cron while the server is serving requests.

use domain::device_flow::{self, DbFlowStore};
use domain::{FlowSettings, FlowStore, Manager};
use log::{error, info};
use service::{config::Config, logging::Logger};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let config = Config::new();
    if let Err(e) = Logger::init_logger(&config) {
        eprintln!("Failed to initialize logger: {e}");
    }

    info!("Expiring lapsed device flows...");

    let db = match service::init_database(&config).await {
        Ok(db) => Arc::new(db),
        Err(e) => {
            error!("Failed to establish database connection: {e}");
            std::process::exit(1);
        }
    };

    let store: Arc<dyn FlowStore> = match DbFlowStore::new(db, config.token_encryption_key()) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("Failed to set up the device flow store: {e}");
            std::process::exit(1);
        }
    };
    let device_flows = Manager::new(store, config.device_auth_pepper(), FlowSettings::default());

    match device_flow::expire_lapsed(&device_flows).await {
        Ok(count) => info!("Expired {count} device flows"),
        Err(e) => {
            error!("Failed to expire lapsed device flows: {e}");
            std::process::exit(1);
        }
    }
}
