use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::auth::errors::StoreError;
use crate::auth::repo::UserStore;
use crate::auth::repo_types::{User, UserChange};

/// Process-local `UserStore`. One write lock per call keeps multi-field
/// updates atomic.
#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<Uuid, User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn count(&self) -> usize {
        self.users.read().await.len()
    }
}

fn owns_email(user: &User, email: &str) -> bool {
    user.email.to_lowercase() == email.to_lowercase()
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| owns_email(u, email)).cloned())
    }

    async fn email_taken(&self, email: &str, except: Option<Uuid>) -> Result<bool, StoreError> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .any(|u| Some(u.id) != except && owns_email(u, email)))
    }

    async fn insert(&self, user: &User) -> Result<(), StoreError> {
        let mut users = self.users.write().await;
        if users.values().any(|u| owns_email(u, &user.email)) {
            return Err(StoreError::EmailTaken);
        }
        users.insert(user.id, user.clone());
        Ok(())
    }

    async fn update(
        &self,
        id: Uuid,
        changes: &[UserChange],
        now: OffsetDateTime,
    ) -> Result<(), StoreError> {
        let mut users = self.users.write().await;
        for change in changes {
            if let UserChange::Email(email) = change {
                if users.values().any(|u| u.id != id && owns_email(u, email)) {
                    return Err(StoreError::EmailTaken);
                }
            }
        }
        let user = users.get_mut(&id).ok_or(StoreError::NotFound)?;
        for change in changes {
            user.apply(change, now);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(email: &str) -> User {
        let now = OffsetDateTime::now_utc();
        User {
            id: Uuid::new_v4(),
            name: "Example".into(),
            email: email.into(),
            password_digest: "digest".into(),
            activated: false,
            activated_at: None,
            activation_digest: "activation".into(),
            remember_digest: None,
            reset_digest: None,
            reset_sent_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn email_lookup_ignores_case() {
        let store = MemoryUserStore::new();
        let u = user("user@example.com");
        store.insert(&u).await.unwrap();
        let found = store.find_by_email("USER@Example.com").await.unwrap();
        assert_eq!(found.map(|f| f.id), Some(u.id));
        assert!(store.email_taken("User@example.com", None).await.unwrap());
        assert!(!store.email_taken("user@example.com", Some(u.id)).await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let store = MemoryUserStore::new();
        store.insert(&user("user@example.com")).await.unwrap();
        let err = store.insert(&user("user@example.com")).await.unwrap_err();
        assert!(matches!(err, StoreError::EmailTaken));
        assert_eq!(store.count().await, 1);
    }

    #[tokio::test]
    async fn update_writes_reset_pair_together() {
        let store = MemoryUserStore::new();
        let u = user("user@example.com");
        store.insert(&u).await.unwrap();
        let sent_at = OffsetDateTime::now_utc();
        store
            .update(
                u.id,
                &[UserChange::ResetDigest {
                    digest: "d".into(),
                    sent_at,
                }],
                sent_at,
            )
            .await
            .unwrap();
        let stored = store.find_by_id(u.id).await.unwrap().unwrap();
        assert_eq!(stored.reset_digest.as_deref(), Some("d"));
        assert_eq!(stored.reset_sent_at, Some(sent_at));
    }

    #[tokio::test]
    async fn update_of_missing_user_is_not_found() {
        let store = MemoryUserStore::new();
        let err = store
            .update(
                Uuid::new_v4(),
                &[UserChange::RememberDigest(None)],
                OffsetDateTime::now_utc(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }
}
