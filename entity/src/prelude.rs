pub use super::device_flows::Entity as DeviceFlows;
