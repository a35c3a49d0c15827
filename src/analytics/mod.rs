// ============================================================================
// Analytics Module
// Derived statistics over persisted executions
// ============================================================================

mod executions;

pub use executions::{ExecutionAggregate, ExecutionAnalytics};
