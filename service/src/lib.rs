use config::Config;
use device_auth::{FlowStore, Manager};
use log::info;
use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};
use std::sync::Arc;
use tokio::time::Duration;

pub mod config;
pub mod logging;

pub async fn init_database(config: &Config) -> Result<DatabaseConnection, DbErr> {
    info!(
        "Database pool config: max_connections={}, min_connections={}, \
         connect_timeout={}s, acquire_timeout={}s, idle_timeout={}s, max_lifetime={}s",
        config.db_max_connections,
        config.db_min_connections,
        config.db_connect_timeout_secs,
        config.db_acquire_timeout_secs,
        config.db_idle_timeout_secs,
        config.db_max_lifetime_secs,
    );

    let mut opt = ConnectOptions::new::<&str>(config.database_url());
    opt.max_connections(config.db_max_connections)
        .min_connections(config.db_min_connections)
        .connect_timeout(Duration::from_secs(config.db_connect_timeout_secs))
        .acquire_timeout(Duration::from_secs(config.db_acquire_timeout_secs))
        .idle_timeout(Duration::from_secs(config.db_idle_timeout_secs))
        .max_lifetime(Duration::from_secs(config.db_max_lifetime_secs))
        .sqlx_logging(true)
        .sqlx_logging_level(log::LevelFilter::Debug)
        .set_schema_search_path("device_auth"); // Setting default PostgreSQL schema

    let db = Database::connect(opt).await?;

    Ok(db)
}

/// The device flow manager over whichever store the configuration selected.
pub type DeviceFlowManager = Manager<Arc<dyn FlowStore>>;

// Service-level state shared by every request handler
// Needs to implement Clone to be able to be passed into Router as State
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub device_flows: Arc<DeviceFlowManager>,
    /// Absent when flows are kept in memory.
    pub database_connection: Option<Arc<DatabaseConnection>>,
}

impl AppState {
    pub fn new(
        app_config: Config,
        device_flows: DeviceFlowManager,
        db: Option<&Arc<DatabaseConnection>>,
    ) -> Self {
        Self {
            config: app_config,
            device_flows: Arc::new(device_flows),
            database_connection: db.map(Arc::clone),
        }
    }

    pub fn db_conn_ref(&self) -> Option<&DatabaseConnection> {
        self.database_connection.as_deref()
    }
}
