//! Business layer between `web` and the persistence crates.
//!
//! Re-exports the device flow protocol types so that `web` does not need to depend on
//! `device-auth` or `entity_api` directly.

pub use device_auth::{
    memory::MemoryFlowStore, ApproveResponse, ApproveStatus, CallerIdentity, FlowSettings,
    FlowStore, Manager, PollResponse, StartResponse,
};

// Re-exports from `entity` crate via `entity_api`
pub use entity_api::{device_flow_status, device_flows, Id};

pub mod device_flow;
pub mod encryption;
pub mod error;
pub mod identity;
