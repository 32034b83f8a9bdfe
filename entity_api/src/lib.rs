pub use entity::{device_flow_status, device_flows, Id};

pub mod device_flow;
pub mod error;
