//! Typed request bodies for the device flow endpoints.
//!
//! Field names are camelCase on the wire, matching what device clients and the
//! approval page send.

pub(crate) mod device_flow;
