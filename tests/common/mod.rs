//! Shared test utilities for integration tests.
//!
//! This module provides:
//! - A recording mock destination store
//! - wiremock helpers for the source site's log, file and design-file services
//! - Log entry builders

#![allow(dead_code)]

pub mod mock_store;
pub mod site;

pub use mock_store::*;
pub use site::*;
