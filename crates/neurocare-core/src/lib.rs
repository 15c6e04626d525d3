//! neurocare-core - Core library for NeuroCare
//!
//! This crate provides the logic behind the NeuroCare therapy companion:
//!
//! - **session**: Live session state machine (start, stop, emergency stop)
//! - **recommendation**: Rule-based frequency/duration suggestions
//! - **device**: Device channel abstraction and a simulated device
//! - **repository**: Session history storage interface
//! - **db**: SQLite-backed session history (feature `db`)
//! - **progress**: Progress statistics over session history
//! - **auth**: Signed-in user context

pub mod auth;
pub mod config;
#[cfg(feature = "db")]
pub mod db;
pub mod device;
pub mod error;
pub mod progress;
pub mod recommendation;
pub mod repository;
pub mod session;
pub mod types;

// Re-export commonly used types
pub use auth::AuthContext;
pub use config::SessionConfig;
#[cfg(feature = "db")]
pub use db::Database;
pub use device::{DeviceChannel, DeviceContext, SimulatedDevice};
pub use error::{Error, Result};
pub use repository::{InMemorySessionRepository, SessionRepository};
pub use session::{SessionController, SessionPhase, SessionSnapshot, StopReason};
pub use types::{RecommendationReport, SessionRecommendation, SessionRecord};
