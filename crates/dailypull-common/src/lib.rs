pub mod config;
pub mod descriptor;
pub mod error;
pub mod policy;

pub use descriptor::{CandidateList, ElementDescriptor, InteractionChannel, LocatorKind};
pub use policy::RetryPolicy;
