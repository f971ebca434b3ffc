//! Integration tests module
//!
//! End-to-end tests for the boundcall connector layer, including:
//! - Document status and service interruption reporting
//! - Lazy connect, idle release and disconnect of sessions
//! - Cancellation, deadlines and hard errors

pub mod connector_test;
pub mod fixtures;
pub mod session_test;
