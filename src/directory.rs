//! User directory
//!
//! The mentorship core only reads users; lookups go through the
//! [`UserDirectory`] seam so tests can substitute their own directory.

#[cfg(test)]
pub mod testing;

use crate::db::{Database, DbError, NewUser, Role, User, UserId};
use crate::error::{CoreError, CoreResult};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

/// Read-only user lookup
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn lookup(&self, id: UserId) -> Result<Option<User>, DbError>;
}

#[async_trait]
impl UserDirectory for Database {
    async fn lookup(&self, id: UserId) -> Result<Option<User>, DbError> {
        self.find_user(id)
    }
}

#[async_trait]
impl<T: UserDirectory + ?Sized> UserDirectory for Arc<T> {
    async fn lookup(&self, id: UserId) -> Result<Option<User>, DbError> {
        (**self).lookup(id).await
    }
}

/// Registration payload as received from clients
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub username: Option<String>,
    /// Accepted as an alias for `username`
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub company: Option<String>,
    pub designation: Option<String>,
    pub industry: Option<String>,
    #[serde(default)]
    pub expertise: Vec<String>,
    pub availability: Option<u32>,
}

impl Registration {
    /// Normalize and validate into a directory entry
    pub fn validate(self) -> CoreResult<NewUser> {
        let email = self
            .email
            .map(|e| e.trim().to_lowercase())
            .filter(|e| !e.is_empty())
            .ok_or_else(|| CoreError::validation("email", "is required"))?;

        let (local, domain) = email
            .split_once('@')
            .ok_or_else(|| CoreError::validation("email", "must be an email address"))?;
        if local.is_empty() || domain.is_empty() {
            return Err(CoreError::validation("email", "must be an email address"));
        }

        let username = non_blank(self.username)
            .or_else(|| non_blank(self.name))
            .unwrap_or_else(|| local.to_string());

        let role = self
            .role
            .ok_or_else(|| CoreError::validation("role", "is required"))?
            .parse::<Role>()
            .map_err(|e| CoreError::validation("role", e))?;

        let expertise = self
            .expertise
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(NewUser {
            username,
            email,
            role,
            company: non_blank(self.company),
            designation: non_blank(self.designation),
            industry: non_blank(self.industry),
            expertise,
            availability: self.availability.unwrap_or(0),
        })
    }
}

/// Validate and store a new user
pub fn register(db: &Database, registration: Registration) -> CoreResult<User> {
    let new_user = registration.validate()?;
    let user = db.insert_user(&new_user)?;
    tracing::info!(user_id = %user.id, role = %user.role, "Registered user");
    Ok(user)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
