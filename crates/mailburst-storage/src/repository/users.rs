//! User repository

use std::sync::Arc;

use chrono::Utc;
use mailburst_common::types::UserId;
use mailburst_common::{Error, Result};
use uuid::Uuid;

use crate::models::{CreateUser, User};
use crate::store::MemoryStore;

/// User repository
#[derive(Clone)]
pub struct UserRepository {
    store: Arc<MemoryStore>,
}

impl UserRepository {
    /// Create a new user repository
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }

    /// Create a new user
    pub async fn create(&self, input: CreateUser) -> Result<User> {
        let mut by_email = self.store.users_by_email.write().await;
        if by_email.contains_key(&input.email) {
            return Err(Error::Validation(format!(
                "User already exists: {}",
                input.email
            )));
        }

        let user = User {
            id: Uuid::new_v4(),
            email: input.email.clone(),
            name: input.name,
            created_at: Utc::now(),
        };

        by_email.insert(input.email, user.id);
        self.store.users.write().await.insert(user.id, user.clone());

        Ok(user)
    }

    /// Get a user by ID
    pub async fn get(&self, id: UserId) -> Result<Option<User>> {
        Ok(self.store.users.read().await.get(&id).cloned())
    }

    /// Get a user by email address
    pub async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        let id = match self.store.users_by_email.read().await.get(email) {
            Some(id) => *id,
            None => return Ok(None),
        };
        self.get(id).await
    }
}
