// ABOUTME: Library root for nexus — re-exports all modules for integration testing.
// ABOUTME: The binary entry point is in main.rs, which uses this crate as a library.

pub mod app;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod server;
pub mod session;
pub mod upstream;
