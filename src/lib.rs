//! SENTINEL — Autonomous Listed-Equity Signal Scanner
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod net;
pub mod data;
pub mod universe;
pub mod strategy;
pub mod engine;
pub mod storage;
pub mod notify;
