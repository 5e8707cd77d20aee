//! IO modules - backend interfaces
//!
//! This module contains all external IO operations:
//! - `api` - `GateApi` trait, request bodies, response envelope
//! - `http` - reqwest client implementing `GateApi`
//! - `error` - `ApiError` and the operator-facing failure taxonomy

pub mod api;
pub mod error;
pub mod http;

// Re-export commonly used types
pub use api::{
    GateApi, GateEventRequest, ManualDataRequest, TransactionPage, TransactionQuery,
};
pub use error::{ApiError, FailureCategory, OperatorError};
pub use http::HttpGateApi;
