pub mod api;
pub mod config;
pub mod error;
pub mod feedback;
pub mod mcp;
pub mod missions;
pub mod models;
pub mod store;
pub mod validation;

pub use error::{MissionError, Result};
