use uuid::Uuid;

pub mod prelude;

pub mod device_flow_status;
pub mod device_flows;

/// A type alias that represents any Entity's internal id field data type.
/// Aliased so that it's easy to change the underlying type if necessary.
pub type Id = Uuid;
