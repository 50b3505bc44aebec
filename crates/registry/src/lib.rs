pub mod registry;

pub use registry::{builtin_capabilities, CapabilityRegistry};
