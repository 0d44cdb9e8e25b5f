pub mod alert;
pub mod browser;
pub mod config;
pub mod credentials;
pub mod download;
pub mod google_auth;
pub mod interaction;
pub mod navigator;
pub mod orchestrator;
pub mod publish;
pub mod readiness;
pub mod table;

pub use dailypull_common::error;
pub use dailypull_common::{CandidateList, ElementDescriptor, InteractionChannel, LocatorKind, RetryPolicy};
