use std::sync::Arc;

use time::{Duration, OffsetDateTime};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::auth::errors::{AccountError, ValidationErrors};
use crate::auth::password::Hasher;
use crate::auth::repo::UserStore;
use crate::auth::repo_types::{NewUser, User, UserChange, UserUpdate};
use crate::auth::token::{new_token, Purpose, Token};
use crate::auth::validation::{
    normalize_email, normalize_name, validate_email, validate_name, validate_password,
};
use crate::mailer::Mailer;

pub const DEFAULT_RESET_TTL: Duration = Duration::hours(2);

/// A freshly issued token together with the user it belongs to.
#[derive(Debug)]
pub struct Issued {
    pub user: User,
    pub token: Token,
    /// Whether the accompanying mail went out. The token stays valid either
    /// way.
    pub delivered: bool,
}

/// Result of a successful password login.
#[derive(Debug)]
pub struct Session {
    pub user: User,
    pub remember_token: Option<Token>,
}

/// Credential and token lifecycle over an injected store and mailer.
pub struct AccountService {
    store: Arc<dyn UserStore>,
    mailer: Arc<dyn Mailer>,
    hasher: Hasher,
    reset_ttl: Duration,
}

impl AccountService {
    pub fn new(store: Arc<dyn UserStore>, mailer: Arc<dyn Mailer>, hasher: Hasher) -> Self {
        Self {
            store,
            mailer,
            hasher,
            reset_ttl: DEFAULT_RESET_TTL,
        }
    }

    pub fn with_reset_ttl(mut self, ttl: Duration) -> Self {
        self.reset_ttl = ttl;
        self
    }

    /// Commit `changes` and mirror them onto `user`.
    async fn write(&self, user: &mut User, changes: Vec<UserChange>) -> Result<(), AccountError> {
        if changes.is_empty() {
            return Ok(());
        }
        let now = OffsetDateTime::now_utc();
        self.store.update(user.id, &changes, now).await?;
        for change in &changes {
            user.apply(change, now);
        }
        Ok(())
    }

    // ---- credential store ----

    /// Normalizes and validates the input, then inserts the user with a fresh
    /// activation digest.
    #[instrument(skip_all)]
    pub async fn create_user(&self, input: NewUser) -> Result<(User, Token), AccountError> {
        let name = normalize_name(&input.name);
        let email = normalize_email(&input.email);

        let mut errors = ValidationErrors::new();
        validate_name(&name, &mut errors);
        validate_email(&email, &mut errors);
        validate_password(
            &input.password,
            input.password_confirmation.as_deref(),
            &mut errors,
        );
        if !errors.has("email") && self.store.email_taken(&email, None).await? {
            errors.add("email", "has already been taken");
        }
        if !errors.is_empty() {
            debug!(%errors, "signup rejected");
            return Err(AccountError::Validation(errors));
        }

        let password_digest = self.hasher.digest(&input.password)?;
        let activation_token = new_token();
        let activation_digest = self.hasher.digest(activation_token.as_str())?;
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            name,
            email,
            password_digest,
            activated: false,
            activated_at: None,
            activation_digest,
            remember_digest: None,
            reset_digest: None,
            reset_sent_at: None,
            created_at: now,
            updated_at: now,
        };
        self.store.insert(&user).await?;
        info!(user_id = %user.id, email = %user.email, "user created");
        Ok((user, activation_token))
    }

    /// Profile edit. The password is only validated and rehashed when a
    /// non-empty one is supplied.
    #[instrument(skip_all, fields(user_id = %user.id))]
    pub async fn update_user(&self, user: &mut User, update: UserUpdate) -> Result<(), AccountError> {
        let mut errors = ValidationErrors::new();
        let mut changes = Vec::new();

        if let Some(name) = update.name {
            let name = normalize_name(&name);
            validate_name(&name, &mut errors);
            if name != user.name {
                changes.push(UserChange::Name(name));
            }
        }

        if let Some(email) = update.email {
            let email = normalize_email(&email);
            validate_email(&email, &mut errors);
            if email != user.email {
                if !errors.has("email") && self.store.email_taken(&email, Some(user.id)).await? {
                    errors.add("email", "has already been taken");
                }
                changes.push(UserChange::Email(email));
            }
        }

        let password = update.password.filter(|p| !p.is_empty());
        if let Some(password) = &password {
            validate_password(password, update.password_confirmation.as_deref(), &mut errors);
        }

        errors.into_result()?;

        if let Some(password) = password {
            changes.push(UserChange::PasswordDigest(self.hasher.digest(&password)?));
        }
        self.write(user, changes).await?;
        info!(user_id = %user.id, "user updated");
        Ok(())
    }

    pub fn authenticate_password(&self, user: &User, password: &str) -> bool {
        self.hasher.verify(Some(&user.password_digest), password)
    }

    // ---- token lifecycle ----

    /// New remember token; the previous one stops working.
    #[instrument(skip_all, fields(user_id = %user.id))]
    pub async fn remember(&self, user: &mut User) -> Result<Token, AccountError> {
        let token = new_token();
        let digest = self.hasher.digest(token.as_str())?;
        self.write(user, vec![UserChange::RememberDigest(Some(digest))])
            .await?;
        debug!(user_id = %user.id, "remember digest stored");
        Ok(token)
    }

    #[instrument(skip_all, fields(user_id = %user.id))]
    pub async fn forget(&self, user: &mut User) -> Result<(), AccountError> {
        self.write(user, vec![UserChange::RememberDigest(None)]).await
    }

    /// Digest and timestamp are written as one change.
    #[instrument(skip_all, fields(user_id = %user.id))]
    pub async fn create_reset_digest(&self, user: &mut User) -> Result<Token, AccountError> {
        let token = new_token();
        let digest = self.hasher.digest(token.as_str())?;
        let sent_at = OffsetDateTime::now_utc();
        self.write(user, vec![UserChange::ResetDigest { digest, sent_at }])
            .await?;
        debug!(user_id = %user.id, "reset digest stored");
        Ok(token)
    }

    pub fn password_reset_expired(&self, user: &User) -> bool {
        self.password_reset_expired_at(user, OffsetDateTime::now_utc())
    }

    pub fn password_reset_expired_at(&self, user: &User, now: OffsetDateTime) -> bool {
        match user.reset_sent_at {
            Some(sent_at) => now - sent_at > self.reset_ttl,
            None => true,
        }
    }

    pub async fn send_activation_email(&self, user: &User, token: &Token) -> Result<(), AccountError> {
        self.mailer
            .send_activation(user, token)
            .await
            .map_err(AccountError::Delivery)
    }

    pub async fn send_password_reset_email(
        &self,
        user: &User,
        token: &Token,
    ) -> Result<(), AccountError> {
        self.mailer
            .send_password_reset(user, token)
            .await
            .map_err(AccountError::Delivery)
    }

    // ---- gate ----

    /// Whether `presented` matches the stored digest for `purpose`. Purpose
    /// rules (activation state, expiry) belong to the caller.
    pub fn authenticated(&self, user: &User, purpose: Purpose, presented: &str) -> bool {
        match user.digest_for(purpose) {
            None => false,
            Some(digest) => self.hasher.verify(Some(digest), presented),
        }
    }

    // ---- flows ----

    #[instrument(skip_all)]
    pub async fn sign_up(&self, input: NewUser) -> Result<Issued, AccountError> {
        let (user, token) = self.create_user(input).await?;
        let delivered = match self.send_activation_email(&user, &token).await {
            Ok(()) => true,
            Err(e) => {
                warn!(user_id = %user.id, error = %e, "activation mail not delivered");
                false
            }
        };
        Ok(Issued {
            user,
            token,
            delivered,
        })
    }

    /// Marks an unactivated account as activated. Every failure looks the same
    /// to the caller.
    #[instrument(skip(self, token))]
    pub async fn activate(&self, email: &str, token: &str) -> Result<User, AccountError> {
        let email = normalize_email(email);
        let Some(mut user) = self.store.find_by_email(&email).await? else {
            warn!("activation for unknown email");
            return Err(AccountError::InvalidLink);
        };
        // The lookup by normalized email is the email match.
        if user.activated || !self.authenticated(&user, Purpose::Activation, token) {
            warn!(user_id = %user.id, "invalid activation link");
            return Err(AccountError::InvalidLink);
        }
        let at = OffsetDateTime::now_utc();
        self.write(&mut user, vec![UserChange::Activated { at }]).await?;
        info!(user_id = %user.id, "account activated");
        Ok(user)
    }

    #[instrument(skip(self, password))]
    pub async fn log_in(
        &self,
        email: &str,
        password: &str,
        remember_me: bool,
    ) -> Result<Session, AccountError> {
        let email = normalize_email(email);
        let Some(mut user) = self.store.find_by_email(&email).await? else {
            warn!("login unknown email");
            return Err(AccountError::InvalidCredentials);
        };
        if !self.authenticate_password(&user, password) {
            warn!(user_id = %user.id, "login invalid password");
            return Err(AccountError::InvalidCredentials);
        }
        if !user.activated {
            warn!(user_id = %user.id, "login before activation");
            return Err(AccountError::NotActivated);
        }
        let remember_token = if remember_me {
            Some(self.remember(&mut user).await?)
        } else {
            self.forget(&mut user).await?;
            None
        };
        info!(user_id = %user.id, remember_me, "user logged in");
        Ok(Session {
            user,
            remember_token,
        })
    }

    /// Forget the persistent session, if the user still exists.
    #[instrument(skip(self))]
    pub async fn log_out(&self, user_id: Uuid) -> Result<(), AccountError> {
        if let Some(mut user) = self.store.find_by_id(user_id).await? {
            self.forget(&mut user).await?;
            info!(%user_id, "user logged out");
        }
        Ok(())
    }

    /// Restore a session from a remembered token.
    #[instrument(skip(self, remember_token))]
    pub async fn recall(
        &self,
        user_id: Uuid,
        remember_token: &str,
    ) -> Result<Option<User>, AccountError> {
        let user = self.store.find_by_id(user_id).await?;
        Ok(user.filter(|u| self.authenticated(u, Purpose::Remember, remember_token)))
    }

    #[instrument(skip(self))]
    pub async fn request_password_reset(&self, email: &str) -> Result<Issued, AccountError> {
        let email = normalize_email(email);
        let Some(mut user) = self.store.find_by_email(&email).await? else {
            return Err(AccountError::NotFound);
        };
        let token = self.create_reset_digest(&mut user).await?;
        let delivered = match self.send_password_reset_email(&user, &token).await {
            Ok(()) => true,
            Err(e) => {
                warn!(user_id = %user.id, error = %e, "password reset mail not delivered");
                false
            }
        };
        Ok(Issued {
            user,
            token,
            delivered,
        })
    }

    /// The user behind a reset link: must exist, be activated, match the
    /// token and not be expired.
    #[instrument(skip(self, token))]
    pub async fn check_reset_link(&self, email: &str, token: &str) -> Result<User, AccountError> {
        let email = normalize_email(email);
        let Some(user) = self.store.find_by_email(&email).await? else {
            return Err(AccountError::InvalidLink);
        };
        if !user.activated || !self.authenticated(&user, Purpose::Reset, token) {
            warn!(user_id = %user.id, "invalid reset link");
            return Err(AccountError::InvalidLink);
        }
        if self.password_reset_expired(&user) {
            warn!(user_id = %user.id, "reset link expired");
            return Err(AccountError::ExpiredToken);
        }
        Ok(user)
    }

    #[instrument(skip(self, token, password, confirmation))]
    pub async fn reset_password(
        &self,
        email: &str,
        token: &str,
        password: &str,
        confirmation: Option<&str>,
    ) -> Result<User, AccountError> {
        let mut user = self.check_reset_link(email, token).await?;
        if password.is_empty() {
            let mut errors = ValidationErrors::new();
            errors.add("password", "can't be empty");
            return Err(AccountError::Validation(errors));
        }
        self.update_user(
            &mut user,
            UserUpdate {
                password: Some(password.to_string()),
                password_confirmation: confirmation.map(str::to_string),
                ..UserUpdate::default()
            },
        )
        .await?;
        info!(user_id = %user.id, "password reset");
        Ok(user)
    }
}
