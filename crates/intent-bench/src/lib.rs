//! Offline evaluation harness for the intent filters: replays seeded synthetic operators
//! through each configured updater and reports identification accuracy and latency.

pub mod analytics;
pub mod config;
pub mod logging;
pub mod runner;
