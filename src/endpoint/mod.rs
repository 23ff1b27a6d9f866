//! Endpoint addressing and regional selection.

pub mod address;
pub mod registry;

pub use address::EndpointAddress;
pub use registry::{EndpointHealth, EndpointRegistry, EndpointSpec};
