pub mod loader;

pub use dailypull_common::config::*;
pub use loader::{ConfigError, ConfigLoader};
