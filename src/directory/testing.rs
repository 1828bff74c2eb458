//! Directories for tests

use super::UserDirectory;
use crate::db::{Database, DbError, Role, User, UserId};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Directory backed by a map; entries can be renamed to observe snapshotting
#[derive(Default)]
pub struct InMemoryDirectory {
    users: Mutex<HashMap<UserId, User>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, username: &str, role: Role) -> User {
        let now = Utc::now();
        let user = User {
            id: UserId::generate(),
            username: username.to_string(),
            email: format!("{username}@example.org"),
            role,
            company: None,
            designation: None,
            industry: None,
            expertise: vec![],
            availability: 1,
            created_at: now,
            updated_at: now,
        };
        self.users.lock().unwrap().insert(user.id, user.clone());
        user
    }

    pub fn rename(&self, id: UserId, username: &str) {
        if let Some(user) = self.users.lock().unwrap().get_mut(&id) {
            user.username = username.to_string();
        }
    }
}

#[async_trait]
impl UserDirectory for InMemoryDirectory {
    async fn lookup(&self, id: UserId) -> Result<Option<User>, DbError> {
        Ok(self.users.lock().unwrap().get(&id).cloned())
    }
}

/// Database-backed directory that starts failing after a number of lookups
pub struct FlakyDirectory {
    db: Database,
    remaining: AtomicUsize,
}

impl FlakyDirectory {
    pub fn new(db: Database, successful_lookups: usize) -> Self {
        Self {
            db,
            remaining: AtomicUsize::new(successful_lookups),
        }
    }

    /// Stop failing
    pub fn recover(&self) {
        self.remaining.store(usize::MAX, Ordering::SeqCst);
    }
}

#[async_trait]
impl UserDirectory for FlakyDirectory {
    async fn lookup(&self, id: UserId) -> Result<Option<User>, DbError> {
        let allowed = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if allowed {
            self.db.find_user(id)
        } else {
            Err(DbError::Busy { attempts: 3 })
        }
    }
}
