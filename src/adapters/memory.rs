//! In-process store used for local development and the test suite.

use crate::domain::message::Message;
use crate::domain::user::{NewUser, User};
use crate::error::{AppError, Result};
use crate::storage::{MessageStore, StoreHealth, UserStore};
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::atomic::{AtomicBool, Ordering};
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug)]
pub struct MemoryStore {
    users: DashMap<String, User>,
    // Kept sorted by (time, id)
    messages: RwLock<Vec<Message>>,
    available: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self { users: DashMap::new(), messages: RwLock::new(Vec::new()), available: AtomicBool::new(true) }
    }

    /// Toggles a simulated outage: while unavailable every operation fails.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(AppError::Database(sqlx::Error::PoolTimedOut))
        }
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create(&self, user: NewUser) -> Result<User> {
        self.check_available()?;

        match self.users.entry(user.username.clone()) {
            Entry::Occupied(_) => Err(AppError::DuplicateUser),
            Entry::Vacant(slot) => {
                let created = User {
                    id: Uuid::new_v4(),
                    username: user.username,
                    password_hash: user.password_hash,
                    created_at: OffsetDateTime::now_utc(),
                };
                slot.insert(created.clone());
                Ok(created)
            }
        }
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        self.check_available()?;
        Ok(self.users.get(username).map(|u| u.value().clone()))
    }

    async fn count(&self) -> Result<u64> {
        self.check_available()?;
        Ok(self.users.len() as u64)
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn insert(&self, message: &Message) -> Result<()> {
        self.check_available()?;

        let mut messages = self.messages.write().await;
        let key = (message.time, message.id);
        let pos = messages.partition_point(|m| (m.time, m.id) <= key);
        messages.insert(pos, message.clone());
        Ok(())
    }

    async fn recent(&self, limit: u32) -> Result<Vec<Message>> {
        self.check_available()?;

        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        let messages = self.messages.read().await;
        let start = messages.len().saturating_sub(limit);
        Ok(messages[start..].to_vec())
    }
}

#[async_trait]
impl StoreHealth for MemoryStore {
    async fn ping(&self) -> Result<()> {
        self.check_available()
    }
}
