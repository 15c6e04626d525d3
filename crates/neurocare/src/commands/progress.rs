//! Progress command.

use anyhow::Result;
use chrono::Utc;
use colored::Colorize;
use neurocare_core::progress::{
    self, ProgressSummary, RECENT_SESSION_LIMIT, format_duration, format_session_date,
};
use neurocare_core::{SessionRecord, SessionRepository};
use serde::Serialize;

use crate::config::Config;
use crate::database;

#[derive(Debug, Serialize)]
struct ProgressReport {
    summary: ProgressSummary,
    recent_sessions: Vec<SessionRecord>,
}

pub async fn execute(json: bool, user: Option<&str>, config: &Config) -> Result<()> {
    let db = database::open(config)?;
    let user_id = database::resolve_user(user, config);
    let report = build_report(db.as_ref(), &user_id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

async fn build_report(repository: &dyn SessionRepository, user_id: &str) -> Result<ProgressReport> {
    let sessions = repository.list_by_user(user_id).await?;
    Ok(ProgressReport {
        summary: progress::summarize(&sessions, Utc::now()),
        recent_sessions: progress::recent(&sessions, RECENT_SESSION_LIMIT),
    })
}

fn print_report(report: &ProgressReport) {
    let summary = &report.summary;
    if summary.total_sessions == 0 {
        println!("{}", "No sessions yet".yellow());
        return;
    }

    println!("{}", "Progress".cyan().bold());
    println!("{}", "─".repeat(60));
    println!("  Sessions:          {}", summary.total_sessions);
    println!("  Last 7 days:       {}", summary.sessions_last_7_days);
    println!(
        "  Total time:        {}",
        format_duration(summary.total_duration_seconds)
    );
    println!(
        "  Average duration:  {}",
        format_duration(summary.average_duration_seconds)
    );
    if let Some(intensity) = summary.average_intensity {
        println!("  Average intensity: {:.0}%", intensity);
    }
    if let Some(temp) = summary.average_temperature {
        println!("  Average temp:      {:.1}°C", temp);
    }

    println!();
    println!("{}", "Recent Sessions".cyan());
    for session in &report.recent_sessions {
        println!(
            "  {:<22} {:>6}  {:>3}%",
            format_session_date(&session.timestamp),
            format_duration(session.duration),
            session.vibration_intensity
        );
    }
}
