//! Command implementations.

pub mod config;
pub mod history;
pub mod progress;
pub mod recommend;
pub mod session;
