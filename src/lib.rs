//! DAT Monitor: digital-asset-treasury holdings reconciliation
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod extract;
pub mod pipeline;
pub mod engine;
pub mod storage;
pub mod data;
pub mod alerts;
