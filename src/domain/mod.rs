//! Domain models - backend entities and status semantics
//!
//! This module contains the canonical data types used throughout the system:
//! - `Transaction` - one vehicle's pass through the facility
//! - `Lane` / `Camera` / `Picture` - gate reference data
//! - `Status` - entry/exit status codes and their display translation
//! - `display` - operator-facing time and URL formatting

pub mod display;
pub mod status;
pub mod types;

// Re-export commonly used types at module level
pub use status::{Badge, Side, Status};
pub use types::{Camera, CameraId, Lane, LaneId, LaneLookup, Picture, Transaction, TransactionId};
