pub mod agent;
pub mod config;
pub mod core;
pub mod error;
pub mod log;
pub mod messaging;
pub mod orchestration;
pub mod registry;

pub use error::{Error, Result};
