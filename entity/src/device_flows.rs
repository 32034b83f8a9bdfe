//! SeaORM Entity for device_flows table.
//! One row per device authorization attempt.

use crate::device_flow_status::DeviceFlowStatus;
use crate::Id;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize, ToSchema)]
#[schema(as = entity::device_flows::Model)]
#[sea_orm(schema_name = "device_auth", table_name = "device_flows")]
pub struct Model {
    #[serde(skip_deserializing)]
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Id,

    /// Peppered SHA-256 of the device code, hex encoded
    #[serde(skip_serializing)]
    #[sea_orm(unique)]
    pub device_code_hash: String,

    /// Human-facing `XXXX-XXXX` code
    #[sea_orm(unique)]
    pub user_code: String,

    #[schema(value_type = String)]
    pub status: DeviceFlowStatus,

    #[schema(value_type = String, format = DateTime)]
    pub created_at: DateTimeWithTimeZone,

    #[schema(value_type = String, format = DateTime)]
    pub expires_at: DateTimeWithTimeZone,

    /// Minimum seconds between accepted polls
    pub interval_seconds: i32,

    #[schema(value_type = Option<String>, format = DateTime)]
    pub last_polled_at: Option<DateTimeWithTimeZone>,

    #[schema(value_type = Option<String>, format = DateTime)]
    pub approved_at: Option<DateTimeWithTimeZone>,

    pub approved_by_external_id: Option<String>,

    #[schema(value_type = Option<String>, format = DateTime)]
    pub consumed_at: Option<DateTimeWithTimeZone>,

    /// Escorted token, possibly encrypted. Only present while approved.
    #[serde(skip_serializing)]
    pub access_token: Option<String>,

    /// Token expiry in epoch milliseconds, as supplied by the approver
    pub access_token_expires_at: Option<i64>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
