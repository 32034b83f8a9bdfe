use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Status of a device authorization flow through its lifecycle.
#[derive(
    Debug, Clone, Copy, Eq, PartialEq, EnumIter, Deserialize, Default, Serialize, DeriveActiveEnum,
)]
#[serde(rename_all = "lowercase")]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "device_flow_status")]
pub enum DeviceFlowStatus {
    /// Waiting for a person to approve the user code
    #[sea_orm(string_value = "pending")]
    #[default]
    Pending,
    /// Approved, holding the token until the device polls
    #[sea_orm(string_value = "approved")]
    Approved,
    /// The token was handed to the device
    #[sea_orm(string_value = "consumed")]
    Consumed,
    /// The flow outlived its deadline
    #[sea_orm(string_value = "expired")]
    Expired,
}

impl std::fmt::Display for DeviceFlowStatus {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceFlowStatus::Pending => write!(fmt, "pending"),
            DeviceFlowStatus::Approved => write!(fmt, "approved"),
            DeviceFlowStatus::Consumed => write!(fmt, "consumed"),
            DeviceFlowStatus::Expired => write!(fmt, "expired"),
        }
    }
}
