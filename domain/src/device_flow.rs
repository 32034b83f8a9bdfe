//! Database-backed flow store and the device flow operations exposed to `web`.
//!
//! Implements `device_auth::FlowStore` using the `device_flows` table. Escorted tokens are
//! encrypted with AES-256-GCM before writing when a key is configured.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::*;
use sea_orm::DatabaseConnection;

use device_auth::error::{store_error, Error as FlowStoreError, StoreErrorKind};
use device_auth::{
    Approval, ApproveResponse, CallerIdentity, FlowRecord, FlowStatus, FlowStore, Manager,
    NewFlow, PollResponse, StartResponse,
};
use entity_api::device_flow;
use entity_api::error::{EntityApiErrorKind, Error as EntityApiError};

use crate::encryption;
use crate::error::Error;
use crate::{device_flow_status::DeviceFlowStatus, device_flows::Model, Id};

/// The flow manager shared by every request handler.
pub type DeviceFlows = Manager<Arc<dyn FlowStore>>;

/// Database-backed flow store that optionally encrypts tokens at rest.
pub struct DbFlowStore {
    db: Arc<DatabaseConnection>,
    encryption_key: Option<String>,
}

impl DbFlowStore {
    /// Fails if `encryption_key` is set but is not a 32-byte hex key.
    pub fn new(db: Arc<DatabaseConnection>, encryption_key: Option<String>) -> Result<Self, Error> {
        if let Some(key) = encryption_key.as_deref() {
            encryption::validate_key(key).map_err(|e| {
                warn!("Rejecting TOKEN_ENCRYPTION_KEY: {e}");
                Error::config(e.to_string())
            })?;
        }

        Ok(Self { db, encryption_key })
    }

    fn to_record(&self, model: Model) -> Result<FlowRecord, FlowStoreError> {
        let access_token = encryption::open(model.access_token, self.encryption_key.as_deref())
            .map_err(|e| {
                error!("Failed to decrypt the token of device flow {}: {e}", model.id);
                store_error(StoreErrorKind::Encryption, &e.to_string())
            })?;

        Ok(FlowRecord {
            id: model.id,
            device_code_hash: model.device_code_hash,
            user_code: model.user_code,
            status: flow_status(model.status),
            created_at: model.created_at.with_timezone(&Utc),
            expires_at: model.expires_at.with_timezone(&Utc),
            interval_seconds: model.interval_seconds,
            last_polled_at: model.last_polled_at.map(|t| t.with_timezone(&Utc)),
            approved_at: model.approved_at.map(|t| t.with_timezone(&Utc)),
            approved_by_external_id: model.approved_by_external_id,
            consumed_at: model.consumed_at.map(|t| t.with_timezone(&Utc)),
            access_token,
            access_token_expires_at: model.access_token_expires_at,
        })
    }

    fn to_optional_record(&self, model: Option<Model>) -> Result<Option<FlowRecord>, FlowStoreError> {
        model.map(|model| self.to_record(model)).transpose()
    }
}

fn flow_status(status: DeviceFlowStatus) -> FlowStatus {
    match status {
        DeviceFlowStatus::Pending => FlowStatus::Pending,
        DeviceFlowStatus::Approved => FlowStatus::Approved,
        DeviceFlowStatus::Consumed => FlowStatus::Consumed,
        DeviceFlowStatus::Expired => FlowStatus::Expired,
    }
}

fn store_db_err(err: EntityApiError) -> FlowStoreError {
    let kind = match err.error_kind {
        EntityApiErrorKind::Conflict => StoreErrorKind::Conflict,
        _ => StoreErrorKind::Unavailable,
    };
    FlowStoreError {
        source: Some(Box::new(err)),
        error_kind: device_auth::ErrorKind::Store(kind),
    }
}

#[async_trait]
impl FlowStore for DbFlowStore {
    async fn insert(&self, flow: NewFlow) -> Result<FlowRecord, FlowStoreError> {
        let model = device_flow::create(
            &self.db,
            device_flow::NewDeviceFlow {
                id: flow.id,
                device_code_hash: flow.device_code_hash,
                user_code: flow.user_code,
                created_at: flow.created_at,
                expires_at: flow.expires_at,
                interval_seconds: flow.interval_seconds,
            },
        )
        .await
        .map_err(store_db_err)?;

        self.to_record(model)
    }

    async fn find_by_id(&self, id: Id) -> Result<Option<FlowRecord>, FlowStoreError> {
        match device_flow::find_by_id(&self.db, id).await {
            Ok(model) => self.to_record(model).map(Some),
            Err(err) if err.error_kind == EntityApiErrorKind::RecordNotFound => Ok(None),
            Err(err) => Err(store_db_err(err)),
        }
    }

    async fn find_by_device_code_hash(
        &self,
        device_code_hash: &str,
    ) -> Result<Option<FlowRecord>, FlowStoreError> {
        let model = device_flow::find_by_device_code_hash(&self.db, device_code_hash)
            .await
            .map_err(store_db_err)?;
        self.to_optional_record(model)
    }

    async fn find_by_user_code(&self, user_code: &str) -> Result<Option<FlowRecord>, FlowStoreError> {
        let model = device_flow::find_by_user_code(&self.db, user_code)
            .await
            .map_err(store_db_err)?;
        self.to_optional_record(model)
    }

    async fn approve(&self, id: Id, approval: Approval) -> Result<bool, FlowStoreError> {
        let access_token = encryption::seal(approval.access_token, self.encryption_key.as_deref())
            .map_err(|e| store_error(StoreErrorKind::Encryption, &e.to_string()))?;

        device_flow::approve(
            &self.db,
            id,
            approval.approved_at,
            &approval.approved_by_external_id,
            access_token,
            approval.access_token_expires_at,
        )
        .await
        .map_err(store_db_err)
    }

    async fn touch_poll(
        &self,
        id: Id,
        observed: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<bool, FlowStoreError> {
        device_flow::touch_last_polled(&self.db, id, observed, now)
            .await
            .map_err(store_db_err)
    }

    async fn consume(&self, id: Id, now: DateTime<Utc>) -> Result<bool, FlowStoreError> {
        device_flow::consume(&self.db, id, now)
            .await
            .map_err(store_db_err)
    }

    async fn expire(&self, id: Id) -> Result<bool, FlowStoreError> {
        device_flow::expire(&self.db, id).await.map_err(store_db_err)
    }

    async fn expire_lapsed(&self, now: DateTime<Utc>) -> Result<u64, FlowStoreError> {
        device_flow::expire_lapsed(&self.db, now)
            .await
            .map_err(store_db_err)
    }
}

/// Starts a new device flow.
pub async fn start(flows: &DeviceFlows) -> Result<StartResponse, Error> {
    Ok(flows.start().await?)
}

/// Approves the flow named by `user_code` on behalf of `caller`.
pub async fn approve(
    flows: &DeviceFlows,
    caller: Option<&CallerIdentity>,
    user_code: &str,
    access_token: &str,
    access_token_expires_at: Option<i64>,
) -> Result<ApproveResponse, Error> {
    Ok(flows
        .approve(caller, user_code, access_token, access_token_expires_at)
        .await?)
}

/// Polls the flow identified by the raw `device_code`.
pub async fn poll(flows: &DeviceFlows, device_code: &str) -> Result<PollResponse, Error> {
    let response = flows.poll(device_code).await?;
    debug!("Device flow poll answered with {}", response.status());
    Ok(response)
}

/// Expires every lapsed flow, returning how many were expired.
pub async fn expire_lapsed(flows: &DeviceFlows) -> Result<u64, Error> {
    Ok(flows.expire_lapsed(Utc::now()).await?)
}
