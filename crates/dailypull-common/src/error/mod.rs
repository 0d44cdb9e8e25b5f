pub mod driver_error;
pub mod interaction_error;

pub use driver_error::DriverError;
pub use interaction_error::{CandidateFailure, InteractionError};
