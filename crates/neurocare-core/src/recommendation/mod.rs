//! Rule-based therapy recommendations.
//!
//! Converts a user's session history into one recommendation per past
//! session:
//!
//! ```text
//! sessions ──► sort newest first ──► per session:
//!                                      ├─► frequency band from intensity
//!                                      ├─► heart-rate adjustment
//!                                      ├─► duration from previous length
//!                                      └─► justification (first rule wins)
//! ```
//!
//! The engine is pure: no I/O, no clock, no state.

use crate::types::{Citation, RecommendationReport, SessionRecommendation, SessionRecord};

/// Lowest recommended frequency (Hz).
pub const MIN_FREQUENCY: u32 = 40;

/// Highest recommended frequency (Hz).
pub const MAX_FREQUENCY: u32 = 166;

/// Duration suggested when the source session has no recorded length.
pub const DEFAULT_DURATION_MINUTES: u32 = 15;

/// Longest recommended session (minutes).
pub const MAX_DURATION_MINUTES: u32 = 30;

const HIGH_HEART_RATE: f64 = 90.0;
const LOW_HEART_RATE: f64 = 60.0;
const CIRCULATORY_HEART_RATE: f64 = 80.0;
const HEAT_BUILDUP_TEMPERATURE: f64 = 37.5;
const HIGH_INTENSITY: u8 = 70;

/// Why a recommendation was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Justification {
    CirculatoryBalance,
    HeatBuildup,
    IntensityCounterbalance,
    PainRelief,
}

impl Justification {
    /// Pick the first matching rule for a session.
    pub fn for_session(session: &SessionRecord) -> Self {
        if session
            .average_heart_rate
            .is_some_and(|hr| hr > CIRCULATORY_HEART_RATE)
        {
            Self::CirculatoryBalance
        } else if session
            .average_temperature
            .is_some_and(|t| t > HEAT_BUILDUP_TEMPERATURE)
        {
            Self::HeatBuildup
        } else if session.vibration_intensity > HIGH_INTENSITY {
            Self::IntensityCounterbalance
        } else {
            Self::PainRelief
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::CirculatoryBalance => {
                "Your heart rate was elevated, so this frequency is tuned to support circulatory balance during therapy."
            }
            Self::HeatBuildup => {
                "Skin temperature ran high last time; this frequency helps minimize heat buildup at the treatment site."
            }
            Self::IntensityCounterbalance => {
                "A lower frequency counterbalances the high vibration intensity used in your last session."
            }
            Self::PainRelief => {
                "This frequency range targets neuropathic pain relief and improved peripheral circulation."
            }
        }
    }
}

/// Fixed reference list shown alongside any non-empty recommendation set.
pub fn citations() -> Vec<Citation> {
    [
        (
            "Vibration therapy for painful diabetic peripheral neuropathy",
            "Clinical review, placeholder reference 1",
        ),
        (
            "Frequency-dependent effects of local vibration on skin blood flow",
            "Physiology study, placeholder reference 2",
        ),
        (
            "Thermal safety considerations in wearable vibrotactile devices",
            "Device safety report, placeholder reference 3",
        ),
    ]
    .into_iter()
    .map(|(title, reference)| Citation {
        title: title.to_string(),
        reference: reference.to_string(),
    })
    .collect()
}

/// Base frequency band for an intensity level.
pub fn base_frequency(intensity: u8) -> u32 {
    let intensity = u32::from(intensity);
    if intensity <= 30 {
        // floor(i * 1.5)
        (120 + intensity * 3 / 2).min(MAX_FREQUENCY)
    } else if intensity <= 70 {
        80 + (intensity - 30)
    } else {
        // floor((i - 70) * 1.3)
        40 + (intensity - 70) * 13 / 10
    }
}

/// Shift a frequency for the session's heart rate, if one was recorded.
pub fn adjust_for_heart_rate(frequency: u32, heart_rate: Option<f64>) -> u32 {
    match heart_rate {
        Some(hr) if hr > HIGH_HEART_RATE => frequency.saturating_sub(15).max(MIN_FREQUENCY),
        Some(hr) if hr < LOW_HEART_RATE => (frequency + 10).min(MAX_FREQUENCY),
        _ => frequency,
    }
}

/// Suggested next duration in minutes from the previous session's seconds.
pub fn recommended_duration(previous_seconds: u64) -> u32 {
    if previous_seconds == 0 {
        return DEFAULT_DURATION_MINUTES;
    }
    let prev_min = u32::try_from(previous_seconds / 60).unwrap_or(u32::MAX);
    if prev_min < 10 {
        (prev_min + 5).min(20)
    } else if prev_min < 20 {
        (prev_min + 2).min(25)
    } else {
        prev_min.min(MAX_DURATION_MINUTES)
    }
}

/// Calendar date shown next to a recommendation, e.g. `Mar 4, 2025`.
pub fn session_date(session: &SessionRecord) -> String {
    session.timestamp.to_datetime().format("%b %-d, %Y").to_string()
}

/// Build the recommendation for one session at its 0-based rank.
pub fn recommend(session: &SessionRecord, rank: usize) -> SessionRecommendation {
    let frequency = adjust_for_heart_rate(
        base_frequency(session.vibration_intensity),
        session.average_heart_rate,
    );

    SessionRecommendation {
        session_number: rank + 1,
        session_date: session_date(session),
        frequency,
        duration: recommended_duration(session.duration),
        justification: Justification::for_session(session).message().to_string(),
    }
}

/// Generate recommendations for a session history in any order.
///
/// Sessions are ranked newest first; equal timestamps keep their input
/// order. Citations are attached only when there is at least one
/// recommendation.
pub fn generate(sessions: &[SessionRecord]) -> RecommendationReport {
    if sessions.is_empty() {
        return RecommendationReport::default();
    }

    let mut sorted: Vec<&SessionRecord> = sessions.iter().collect();
    sorted.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    let recommendations = sorted
        .into_iter()
        .enumerate()
        .map(|(rank, session)| recommend(session, rank))
        .collect();

    RecommendationReport {
        recommendations,
        citations: citations(),
    }
}
