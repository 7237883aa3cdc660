//! Configuration Management
//!
//! This module handles loading the price stream configuration from the environment.

pub mod stream;

// Re-export
pub use stream::StreamConfig;
