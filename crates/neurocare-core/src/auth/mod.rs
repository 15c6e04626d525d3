//! Authentication context for neurocare-core.
//!
//! Sign-in itself happens outside the core. The result is carried around as
//! an explicit [`AuthContext`] value handed to whoever needs the user id.

use crate::error::{Error, Result};
use std::sync::{Arc, RwLock};

/// Currently signed-in user, shared between clones.
#[derive(Debug, Clone, Default)]
pub struct AuthContext {
    user_id: Arc<RwLock<Option<String>>>,
}

impl AuthContext {
    /// Context with no signed-in user.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Context already signed in as `user_id`.
    pub fn signed_in(user_id: impl Into<String>) -> Self {
        let ctx = Self::default();
        ctx.sign_in(user_id);
        ctx
    }

    pub fn sign_in(&self, user_id: impl Into<String>) {
        let user_id = user_id.into();
        if let Ok(mut current) = self.user_id.write() {
            *current = if user_id.is_empty() { None } else { Some(user_id) };
        }
    }

    pub fn sign_out(&self) {
        if let Ok(mut current) = self.user_id.write() {
            *current = None;
        }
    }

    /// The signed-in user, if any.
    pub fn user_id(&self) -> Option<String> {
        self.user_id.read().ok().and_then(|id| id.clone())
    }

    /// The signed-in user, or `MissingAuth` naming the attempted operation.
    pub fn require_user(&self, operation: &str) -> Result<String> {
        self.user_id().ok_or_else(|| Error::missing_auth(operation))
    }
}
