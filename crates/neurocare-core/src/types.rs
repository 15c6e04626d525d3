//! Shared types for neurocare-core.
//!
//! These types are used by the session controller, the repositories and the
//! recommendation engine.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Lowest accepted vibration intensity.
pub const MIN_INTENSITY: u8 = 0;

/// Highest accepted vibration intensity.
pub const MAX_INTENSITY: u8 = 100;

// ─────────────────────────────────────────────────────────────────────────────
// Time
// ─────────────────────────────────────────────────────────────────────────────

/// Completion instant of a session, split into whole seconds and a
/// sub-second fraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionTimestamp {
    pub seconds: i64,
    pub nanoseconds: u32,
}

impl SessionTimestamp {
    pub fn new(seconds: i64, nanoseconds: u32) -> Self {
        Self {
            seconds,
            nanoseconds,
        }
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self {
            seconds: dt.timestamp(),
            nanoseconds: dt.timestamp_subsec_nanos(),
        }
    }

    /// Convert to a UTC datetime. Out-of-range values clamp to the epoch.
    pub fn to_datetime(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.seconds, self.nanoseconds)
            .single()
            .unwrap_or_default()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Entity Types
// ─────────────────────────────────────────────────────────────────────────────

/// A completed therapy session as stored by a [`SessionRepository`].
///
/// [`SessionRepository`]: crate::repository::SessionRepository
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: String,
    pub user_id: String,
    pub timestamp: SessionTimestamp,
    /// Elapsed seconds.
    #[serde(default)]
    pub duration: u64,
    /// Intensity in effect when the session ended. Absent values read as 0.
    #[serde(default)]
    pub vibration_intensity: u8,
    /// Last temperature reading observed at stop time (°C). Despite the
    /// name this is a snapshot, not a time-weighted mean.
    #[serde(default)]
    pub average_temperature: Option<f64>,
    #[serde(default)]
    pub average_heart_rate: Option<f64>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Input Types (for creating entities)
// ─────────────────────────────────────────────────────────────────────────────

/// Input for persisting a finished session. The repository assigns the id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSessionRecord {
    pub user_id: String,
    pub timestamp: SessionTimestamp,
    pub duration: u64,
    pub vibration_intensity: u8,
    pub average_temperature: Option<f64>,
    pub average_heart_rate: Option<f64>,
}

impl NewSessionRecord {
    /// Attach a repository-assigned id.
    pub fn into_record(self, id: impl Into<String>) -> SessionRecord {
        SessionRecord {
            id: id.into(),
            user_id: self.user_id,
            timestamp: self.timestamp,
            duration: self.duration,
            vibration_intensity: self.vibration_intensity,
            average_temperature: self.average_temperature,
            average_heart_rate: self.average_heart_rate,
        }
    }

    /// Check the record invariants before it is written.
    pub fn validate(&self) -> Result<()> {
        if self.user_id.is_empty() {
            return Err(Error::validation("user_id", "must not be empty"));
        }
        validate_intensity(i64::from(self.vibration_intensity))?;
        if let Some(hr) = self.average_heart_rate {
            if !(hr >= 0.0) {
                return Err(Error::validation(
                    "average_heart_rate",
                    "must be a non-negative number",
                ));
            }
        }
        Ok(())
    }
}

/// Validate a requested vibration intensity, returning it narrowed to `u8`.
pub fn validate_intensity(value: i64) -> Result<u8> {
    if value < i64::from(MIN_INTENSITY) || value > i64::from(MAX_INTENSITY) {
        return Err(Error::validation(
            "vibration_intensity",
            format!(
                "must be between {} and {}, got {}",
                MIN_INTENSITY, MAX_INTENSITY, value
            ),
        ));
    }
    Ok(value as u8)
}

// ─────────────────────────────────────────────────────────────────────────────
// Derived Types (never persisted)
// ─────────────────────────────────────────────────────────────────────────────

/// A suggestion for a future session derived from one past session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecommendation {
    /// 1-based rank, newest session first.
    pub session_number: usize,
    pub session_date: String,
    /// Hz, within [40, 166].
    pub frequency: u32,
    /// Minutes.
    pub duration: u32,
    pub justification: String,
}

/// A literature reference attached to a recommendation batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub title: String,
    pub reference: String,
}

/// Output of the recommendation engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendationReport {
    pub recommendations: Vec<SessionRecommendation>,
    pub citations: Vec<Citation>,
}

impl RecommendationReport {
    pub fn is_empty(&self) -> bool {
        self.recommendations.is_empty()
    }
}
