//! Configuration and logging

pub mod config;
pub mod logging;

pub use config::{ConfigError, SystemConfig, ValidationResult};
pub use logging::init_logging;
