//! Configuration file commands.

use anyhow::{Context, Result, bail};
use colored::Colorize;
use std::path::Path;

use crate::cli::{ConfigAction, ConfigCommand};
use crate::config::Config;

pub fn execute(cmd: ConfigCommand, config: &Config) -> Result<()> {
    match cmd.action {
        ConfigAction::Show => show(config),
        ConfigAction::Init { force } => {
            let path = Config::config_path();
            init(&path, force)?;
            println!("{} Wrote {}", "✓".green(), path.display());
            Ok(())
        }
    }
}

fn show(config: &Config) -> Result<()> {
    println!("{} {}", "Config file:".cyan(), Config::config_path().display());
    println!();
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

/// Write the default configuration to `path`.
fn init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "Config file already exists at {} (use --force to overwrite)",
            path.display()
        );
    }
    Config::default()
        .save_to(path)
        .with_context(|| format!("Failed to write {}", path.display()))
}
