//! # device-auth
//!
//! Device authorization grant for headless clients:
//! - Code generation: 64 hex character device codes and `XXXX-XXXX` user codes
//! - Device code hashing with a server-side pepper, so raw device codes are never stored
//! - The flow state machine behind the `start`, `approve` and `poll` operations
//! - The `FlowStore` persistence seam and a bounded in-memory implementation
//!
//! ## Architecture
//!
//! This crate has no database or HTTP dependency. `domain` implements `FlowStore`
//! over Postgres and `web` binds the three operations to HTTP routes.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use device_auth::{memory::MemoryFlowStore, FlowSettings, Manager};
//!
//! let manager = Manager::new(MemoryFlowStore::new(), "pepper".to_string(), FlowSettings::default());
//! let started = manager.start().await?;
//! let polled = manager.poll(&started.device_code).await?;
//! ```

pub mod codes;
pub mod error;
pub mod flow;
pub mod hasher;
pub mod manager;
pub mod memory;
pub mod store;

// Re-export commonly used types
pub use error::{Error, ErrorKind};
pub use flow::{
    Approval, ApproveResponse, ApproveStatus, CallerIdentity, FlowRecord, FlowSettings,
    FlowStatus, NewFlow, PollResponse, StartResponse,
};
pub use hasher::DeviceCodeHasher;
pub use manager::Manager;
pub use store::FlowStore;

/// Identifier of a single flow record.
pub type Id = uuid::Uuid;
