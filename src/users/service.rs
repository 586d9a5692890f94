use std::{future::Future, sync::Arc};

use anyhow::Context;
use time::OffsetDateTime;
use tokio::{
    task,
    time::{timeout_at, Instant},
};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::{
    events::{EventPublisher, UserCreatedEvent},
    repo::{RepoError, UserRepository},
    repo_types::{normalize_email, NewUser, User},
};
use crate::auth::{
    jwt::JwtKeys,
    password::{Hasher, PasswordError},
};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(&'static str),
    /// Same outcome for unknown email and wrong password.
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("a user with this email already exists")]
    Conflict,
    #[error("operation timed out")]
    Timeout,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

fn repo_failure(e: RepoError) -> ServiceError {
    match e {
        RepoError::Conflict => ServiceError::Conflict,
        RepoError::InvalidId => ServiceError::Validation("malformed user id"),
        RepoError::Database(e) => {
            error!(error = %e, "user repository failure");
            ServiceError::Internal(e.into())
        }
    }
}

async fn within<F: Future>(deadline: Instant, fut: F) -> Result<F::Output, ServiceError> {
    timeout_at(deadline, fut).await.map_err(|_| {
        warn!("deadline exceeded");
        ServiceError::Timeout
    })
}

/// User lifecycle: creation, lookup and credential checks.
pub struct UserService {
    repo: Arc<dyn UserRepository>,
    events: Arc<dyn EventPublisher>,
    hasher: Arc<Hasher>,
    keys: Arc<JwtKeys>,
    // Verified against when the email is unknown so both failure paths cost the same.
    dummy_hash: String,
}

impl UserService {
    pub fn new(
        repo: Arc<dyn UserRepository>,
        events: Arc<dyn EventPublisher>,
        hasher: Hasher,
        keys: Arc<JwtKeys>,
    ) -> Result<Self, PasswordError> {
        let dummy_hash = hasher.hash(&Uuid::new_v4().to_string())?;
        Ok(Self {
            repo,
            events,
            hasher: Arc::new(hasher),
            keys,
            dummy_hash,
        })
    }

    #[instrument(skip(self, new_user), fields(email = %new_user.email))]
    pub async fn create_user(
        &self,
        new_user: NewUser,
        deadline: Instant,
    ) -> Result<User, ServiceError> {
        let NewUser {
            username,
            email,
            password,
        } = new_user;

        let password_hash = within(deadline, self.hash(password)).await??;

        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            username,
            email: normalize_email(&email),
            password_hash,
            created_at: now,
            updated_at: now,
        };

        let created = within(deadline, self.repo.create_user(&user))
            .await?
            .map_err(repo_failure)?;
        info!(user_id = %created.id, "user created");

        self.announce(&created, deadline).await;
        Ok(created.redacted())
    }

    #[instrument(skip(self))]
    pub async fn get_user_by_id(
        &self,
        id: &str,
        deadline: Instant,
    ) -> Result<Option<User>, ServiceError> {
        let user = within(deadline, self.repo.get_user_by_id(id))
            .await?
            .map_err(repo_failure)?;
        Ok(user.map(User::redacted))
    }

    #[instrument(skip(self, password))]
    pub async fn authenticate(
        &self,
        email: &str,
        password: &str,
        deadline: Instant,
    ) -> Result<User, ServiceError> {
        let email = normalize_email(email);
        let found = within(deadline, self.repo.get_user_by_email(&email))
            .await?
            .map_err(repo_failure)?;

        let hash = match &found {
            Some(u) => u.password_hash.clone(),
            None => self.dummy_hash.clone(),
        };
        let matches = within(deadline, self.verify(hash, password.to_owned())).await??;

        match found {
            Some(user) if matches => Ok(user.redacted()),
            Some(user) => {
                warn!(user_id = %user.id, "login invalid password");
                Err(ServiceError::InvalidCredentials)
            }
            None => {
                warn!("login unknown email");
                Err(ServiceError::InvalidCredentials)
            }
        }
    }

    /// Authenticates and returns a fresh bearer token.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        deadline: Instant,
    ) -> Result<String, ServiceError> {
        let user = self.authenticate(email, password, deadline).await?;
        let token = self.keys.issue(user.id).map_err(|e| {
            error!(error = %e, user_id = %user.id, "token issue failed");
            ServiceError::Internal(e.into())
        })?;
        info!(user_id = %user.id, "user logged in");
        Ok(token)
    }

    async fn hash(&self, password: String) -> Result<String, ServiceError> {
        let hasher = self.hasher.clone();
        task::spawn_blocking(move || hasher.hash(&password))
            .await
            .context("hashing task")?
            .map_err(|e| ServiceError::Internal(e.into()))
    }

    async fn verify(&self, hash: String, password: String) -> Result<bool, ServiceError> {
        let hasher = self.hasher.clone();
        let outcome = task::spawn_blocking(move || hasher.verify(&hash, &password))
            .await
            .context("verification task")?;
        Ok(outcome.is_ok())
    }

    /// Best effort: the user is already stored, so failures are only logged.
    async fn announce(&self, user: &User, deadline: Instant) {
        let event = UserCreatedEvent::from(user);
        match timeout_at(deadline, self.events.publish_user_created(&event)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(error = ?e, user_id = %user.id, "publish user created event failed")
            }
            Err(_) => error!(user_id = %user.id, "publish user created event timed out"),
        }
    }
}
