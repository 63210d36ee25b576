//! Persistence seams. Services only ever see these traits; the concrete
//! backends live under `crate::adapters`.

use crate::domain::message::Message;
use crate::domain::user::{NewUser, User};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Username/password records.
#[async_trait]
pub trait UserStore: Send + Sync + std::fmt::Debug {
    /// Inserts a user.
    ///
    /// # Errors
    /// Returns `AppError::DuplicateUser` if the username is already taken.
    async fn create(&self, user: NewUser) -> Result<User>;

    async fn find_by_username(&self, username: &str) -> Result<Option<User>>;

    async fn count(&self) -> Result<u64>;
}

/// Chat messages.
#[async_trait]
pub trait MessageStore: Send + Sync + std::fmt::Debug {
    async fn insert(&self, message: &Message) -> Result<()>;

    /// Returns up to `limit` of the most recent messages, oldest first.
    async fn recent(&self, limit: u32) -> Result<Vec<Message>>;
}

/// Backend liveness, used by the readiness probe.
#[async_trait]
pub trait StoreHealth: Send + Sync + std::fmt::Debug {
    async fn ping(&self) -> Result<()>;
}

/// The set of store handles injected into services.
#[derive(Clone, Debug)]
pub struct Store {
    pub users: Arc<dyn UserStore>,
    pub messages: Arc<dyn MessageStore>,
    pub health: Arc<dyn StoreHealth>,
}

impl Store {
    /// Wraps a single backend that implements every store trait.
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: UserStore + MessageStore + StoreHealth + 'static,
    {
        let users = Arc::clone(&backend) as Arc<dyn UserStore>;
        let messages = Arc::clone(&backend) as Arc<dyn MessageStore>;
        let health = backend as Arc<dyn StoreHealth>;
        Self { users, messages, health }
    }
}
