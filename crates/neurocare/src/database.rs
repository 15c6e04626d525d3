//! Session store and signed-in user for CLI commands.
//!
//! Every command opens the same SQLite file, resolved from
//! `NEUROCARE_DATABASE_PATH` or the config file.

use anyhow::{Context, Result};
use neurocare_core::{AuthContext, Database};
use std::sync::Arc;
use tracing::debug;

use crate::config::Config;

/// User ID used when nobody is configured.
pub const LOCAL_USER: &str = "local";

/// Open the session database named by the configuration.
pub fn open(config: &Config) -> Result<Arc<Database>> {
    let path = &config.database.path;
    debug!(path = %path.display(), "opening session database");
    let db = Database::open_path(path)
        .with_context(|| format!("Failed to open database at {}", path.display()))?;
    db.ping().context("Database is not usable")?;
    Ok(Arc::new(db))
}

/// Resolve the acting user.
///
/// Resolution order:
/// 1. `--user` flag or NEUROCARE_USER_ID
/// 2. `[user] id` in the config file
/// 3. "local"
pub fn resolve_user(flag: Option<&str>, config: &Config) -> String {
    flag.filter(|u| !u.is_empty())
        .or(config.user.id.as_deref().filter(|u| !u.is_empty()))
        .unwrap_or(LOCAL_USER)
        .to_string()
}

/// Auth context signed in as the resolved user.
pub fn auth_context(flag: Option<&str>, config: &Config) -> AuthContext {
    AuthContext::signed_in(resolve_user(flag, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_user_order() {
        let mut config = Config::default();
        assert_eq!(resolve_user(None, &config), LOCAL_USER);

        config.user.id = Some("alice".into());
        assert_eq!(resolve_user(None, &config), "alice");
        assert_eq!(resolve_user(Some("bob"), &config), "bob");
        assert_eq!(resolve_user(Some(""), &config), "alice");
    }

    #[test]
    fn test_auth_context_signed_in() {
        let config = Config::default();
        let auth = auth_context(Some("carol"), &config);
        assert_eq!(auth.user_id().as_deref(), Some("carol"));
    }

    #[test]
    fn test_open_creates_database() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.database.path = dir.path().join("data").join("sessions.db");

        let db = open(&config).unwrap();
        assert!(config.database.path.exists());
        assert!(db.list_sessions("local").unwrap().is_empty());
    }
}
