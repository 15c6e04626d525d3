//! Recommendation command.

use anyhow::Result;
use colored::Colorize;
use neurocare_core::recommendation;
use neurocare_core::{RecommendationReport, SessionRepository};

use crate::config::Config;
use crate::database;

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

async fn build_report(
    repository: &dyn SessionRepository,
    user_id: &str,
) -> Result<RecommendationReport> {
    let sessions = repository.list_by_user(user_id).await?;
    Ok(recommendation::generate(&sessions))
}

fn print_report(report: &RecommendationReport) {
    if report.is_empty() {
        println!("{}", "No recommendations yet".yellow());
        println!("  Complete a session to get personalized suggestions.");
        return;
    }

    println!("{}", "Recommended Sessions".cyan().bold());
    println!("{}", "─".repeat(60));
    for rec in &report.recommendations {
        println!(
            "  {} {}  ({})",
            format!("#{}", rec.session_number).bold(),
            format!("{} Hz, {} min", rec.frequency, rec.duration).green(),
            rec.session_date.dimmed()
        );
        println!("     {}", rec.justification);
    }

    println!();
    println!("{}", "References".cyan());
    for citation in &report.citations {
        println!("  • {} ({})", citation.title, citation.reference.dimmed());
    }
}
