// HTTP API routes
//
// This module contains the admin route handlers for the event-log pipeline.

pub mod common;
pub mod logs;

// Re-export common types
pub use common::{AffectedResponse, ErrorResponse, ListResponse};
