//! Session history commands.

use anyhow::Result;
use colored::Colorize;
use dialoguer::Confirm;
use neurocare_core::progress::{format_duration, format_session_date};
use neurocare_core::{Error, SessionRecord, SessionRepository};
use std::io::IsTerminal;

use crate::cli::{HistoryAction, HistoryCommand};
use crate::config::Config;
use crate::database;

pub async fn execute(cmd: HistoryCommand, user: Option<&str>, config: &Config) -> Result<()> {
    let db = database::open(config)?;
    let user_id = database::resolve_user(user, config);

    match cmd.action {
        HistoryAction::List { limit, json } => list(db.as_ref(), &user_id, limit, json).await,
        HistoryAction::Delete { session_id } => delete(db.as_ref(), &user_id, &session_id).await,
        HistoryAction::Clear { yes } => clear(db.as_ref(), &user_id, yes).await,
    }
}

async fn list(
    repository: &dyn SessionRepository,
    user_id: &str,
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    let mut sessions = repository.list_by_user(user_id).await?;
    if let Some(limit) = limit {
        sessions.truncate(limit);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&sessions)?);
        return Ok(());
    }

    if sessions.is_empty() {
        println!("{}", "No sessions yet".yellow());
        println!("  Run one with: neurocare session run");
        return Ok(());
    }

    println!("{}", "Session History".cyan().bold());
    println!("{}", "─".repeat(60));
    for session in &sessions {
        println!("{}", format_row(session));
    }
    println!();
    println!("  {} session(s)", sessions.len());

    Ok(())
}

fn format_row(session: &SessionRecord) -> String {
    let short_id = &session.id[..8.min(session.id.len())];
    let temperature = session
        .average_temperature
        .map(|t| format!("{:.1}°C", t))
        .unwrap_or_else(|| "-".to_string());
    format!(
        "  {}  {:<22} {:>6}  {:>4}%  {:>7}",
        short_id.dimmed(),
        format_session_date(&session.timestamp),
        format_duration(session.duration),
        session.vibration_intensity,
        temperature
    )
}

async fn delete(repository: &dyn SessionRepository, user_id: &str, session_id: &str) -> Result<()> {
    match repository.delete_one(user_id, session_id).await {
        Ok(()) => {
            println!("{} Session deleted", "✓".green());
            Ok(())
        }
        Err(e @ (Error::SessionNotFound(_) | Error::PermissionDenied)) => {
            println!("{} {}", "✗".red(), e);
            Err(e.into())
        }
        Err(e) => Err(e.into()),
    }
}

async fn clear(repository: &dyn SessionRepository, user_id: &str, yes: bool) -> Result<()> {
    if !yes {
        let confirmed = std::io::stdin().is_terminal()
            && Confirm::new()
                .with_prompt(format!("Delete all sessions for {}?", user_id))
                .default(false)
                .interact()?;
        if !confirmed {
            println!("{}", "Cancelled".yellow());
            return Ok(());
        }
    }

    let deleted = repository.delete_all_for_user(user_id).await?;
    println!("{} Deleted {} session(s)", "✓".green(), deleted);
    Ok(())
}
