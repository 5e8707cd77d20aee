//! Services - dashboard behavior and state management
//!
//! This module contains the core business logic services:
//! - `backfill` - Fill missing dispatch/plate from records sharing a tag
//! - `poller` - Independent per-gate polling loop
//! - `deferred` - Delayed fire-and-forget tasks
//! - `workflow` - Manual completion and lane actuation
//! - `pending_exit` - Candidate ranking for manual exits
//! - `coordinator` - Per-lane pollers and the master refresh switch

pub mod backfill;
pub mod coordinator;
pub mod deferred;
pub mod pending_exit;
pub mod poller;
pub mod workflow;

// Re-export commonly used types
pub use coordinator::{CoordinatorOptions, GateDashboardCoordinator, GateRuntimeConfig};
pub use deferred::DeferredTask;
pub use pending_exit::{list_pending_exits, PendingExitSelection, PendingExits};
pub use poller::{GatePoller, GateSnapshot, PollerContext, PollerState};
pub use workflow::{
    CompletionOutcome, DetailCompletion, ManualCompletionWorkflow, ManualEntryForm,
    ValidationError, WorkflowError,
};
