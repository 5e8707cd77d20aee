//! Infrastructure - configuration, session, and metrics
//!
//! This module contains infrastructure concerns:
//! - `config` - Application configuration (TOML loading, defaults)
//! - `session` - Bearer token lifecycle
//! - `metrics` - Lock-free counters

pub mod config;
pub mod metrics;
pub mod session;

// Re-export commonly used types
pub use config::Config;
pub use metrics::Metrics;
pub use session::SessionContext;
