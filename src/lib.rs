//! Carimbo library
//!
//! Offline asset cache (generations, lifecycle, request interception) and the
//! technician report generator, exposed for the binary and integration tests.

pub mod cache;
pub mod cli;
pub mod config;
pub mod interceptor;
pub mod lifecycle;
pub mod network;
pub mod report;
pub mod worker;
