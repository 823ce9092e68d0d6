use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::errors::StoreError;
use crate::auth::repo_types::{User, UserChange};

/// Persistence seam for user records.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    /// Case-insensitive lookup.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    /// Whether another user (other than `except`) already owns `email`.
    async fn email_taken(&self, email: &str, except: Option<Uuid>) -> Result<bool, StoreError>;

    async fn insert(&self, user: &User) -> Result<(), StoreError>;

    /// Apply all changes atomically, or none of them.
    async fn update(
        &self,
        id: Uuid,
        changes: &[UserChange],
        now: OffsetDateTime,
    ) -> Result<(), StoreError>;
}

const USER_COLUMNS: &str = "id, name, email, password_digest, activated, activated_at, \
     activation_digest, remember_digest, reset_digest, reset_sent_at, created_at, updated_at";

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE lower(email) = lower($1)"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn email_taken(&self, email: &str, except: Option<Uuid>) -> Result<bool, StoreError> {
        let taken: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM users
                WHERE lower(email) = lower($1)
                  AND ($2::uuid IS NULL OR id <> $2)
            )
            "#,
        )
        .bind(email)
        .bind(except)
        .fetch_one(&self.db)
        .await?;
        Ok(taken)
    }

    async fn insert(&self, user: &User) -> Result<(), StoreError> {
        sqlx::query(&format!(
            "INSERT INTO users ({USER_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)"
        ))
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_digest)
        .bind(user.activated)
        .bind(user.activated_at)
        .bind(&user.activation_digest)
        .bind(user.remember_digest.as_deref())
        .bind(user.reset_digest.as_deref())
        .bind(user.reset_sent_at)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn update(
        &self,
        id: Uuid,
        changes: &[UserChange],
        now: OffsetDateTime,
    ) -> Result<(), StoreError> {
        if changes.is_empty() {
            return Ok(());
        }
        let mut tx = self.db.begin().await?;
        for change in changes {
            let query = match change {
                UserChange::Name(name) => {
                    sqlx::query("UPDATE users SET name = $3, updated_at = $2 WHERE id = $1")
                        .bind(id)
                        .bind(now)
                        .bind(name)
                }
                UserChange::Email(email) => {
                    sqlx::query("UPDATE users SET email = $3, updated_at = $2 WHERE id = $1")
                        .bind(id)
                        .bind(now)
                        .bind(email)
                }
                UserChange::PasswordDigest(digest) => sqlx::query(
                    "UPDATE users SET password_digest = $3, updated_at = $2 WHERE id = $1",
                )
                .bind(id)
                .bind(now)
                .bind(digest),
                UserChange::Activated { at } => sqlx::query(
                    "UPDATE users SET activated = TRUE, activated_at = $3, updated_at = $2 \
                     WHERE id = $1",
                )
                .bind(id)
                .bind(now)
                .bind(*at),
                UserChange::RememberDigest(digest) => sqlx::query(
                    "UPDATE users SET remember_digest = $3, updated_at = $2 WHERE id = $1",
                )
                .bind(id)
                .bind(now)
                .bind(digest.as_deref()),
                UserChange::ResetDigest { digest, sent_at } => sqlx::query(
                    "UPDATE users SET reset_digest = $3, reset_sent_at = $4, updated_at = $2 \
                     WHERE id = $1",
                )
                .bind(id)
                .bind(now)
                .bind(digest)
                .bind(*sent_at),
            };
            let result = query.execute(&mut *tx).await?;
            if result.rows_affected() == 0 {
                // dropping `tx` rolls back
                return Err(StoreError::NotFound);
            }
        }
        tx.commit().await?;
        Ok(())
    }
}
