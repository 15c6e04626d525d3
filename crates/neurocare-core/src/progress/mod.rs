//! Progress statistics over a user's session history.

use crate::types::{SessionRecord, SessionTimestamp};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// How many sessions the dashboard lists.
pub const RECENT_SESSION_LIMIT: usize = 5;

/// Aggregate view of a session history.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProgressSummary {
    pub total_sessions: usize,
    pub total_duration_seconds: u64,
    pub average_duration_seconds: u64,
    /// None when there are no sessions.
    pub average_intensity: Option<f64>,
    /// Mean of the recorded end-of-session temperatures.
    pub average_temperature: Option<f64>,
    pub sessions_last_7_days: usize,
    pub last_session_at: Option<SessionTimestamp>,
}

/// Summarize sessions relative to `now`.
pub fn summarize(sessions: &[SessionRecord], now: DateTime<Utc>) -> ProgressSummary {
    if sessions.is_empty() {
        return ProgressSummary::default();
    }

    let total_sessions = sessions.len();
    let total_duration_seconds: u64 = sessions.iter().map(|s| s.duration).sum();
    let intensity_sum: f64 = sessions
        .iter()
        .map(|s| f64::from(s.vibration_intensity))
        .sum();

    let temperatures: Vec<f64> = sessions
        .iter()
        .filter_map(|s| s.average_temperature)
        .collect();
    let average_temperature = if temperatures.is_empty() {
        None
    } else {
        Some(temperatures.iter().sum::<f64>() / temperatures.len() as f64)
    };

    let week_ago = SessionTimestamp::from_datetime(now - Duration::days(7));
    let sessions_last_7_days = sessions
        .iter()
        .filter(|s| s.timestamp >= week_ago)
        .count();

    ProgressSummary {
        total_sessions,
        total_duration_seconds,
        average_duration_seconds: total_duration_seconds / total_sessions as u64,
        average_intensity: Some(intensity_sum / total_sessions as f64),
        average_temperature,
        sessions_last_7_days,
        last_session_at: sessions.iter().map(|s| s.timestamp).max(),
    }
}

/// The `limit` most recent sessions, newest first.
pub fn recent(sessions: &[SessionRecord], limit: usize) -> Vec<SessionRecord> {
    let mut sorted = sessions.to_vec();
    sorted.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    sorted.truncate(limit);
    sorted
}

/// Elapsed seconds as `MM:SS`.
pub fn format_duration(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

/// Session time as e.g. `Nov 14, 2023 10:13 PM` (UTC).
pub fn format_session_date(timestamp: &SessionTimestamp) -> String {
    timestamp
        .to_datetime()
        .format("%b %-d, %Y %-I:%M %p")
        .to_string()
}
