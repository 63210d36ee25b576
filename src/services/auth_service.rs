use crate::config::AuthConfig;
use crate::domain::auth::{Claims, Password, generate_secret};
use crate::domain::user::NewUser;
use crate::error::{AppError, Result};
use crate::storage::UserStore;
use opentelemetry::{KeyValue, global, metrics::Counter};
use std::sync::Arc;

#[derive(Clone, Debug)]
struct Metrics {
    users_registered_total: Counter<u64>,
    login_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("huddle-server");
        Self {
            users_registered_total: meter
                .u64_counter("users_registered_total")
                .with_description("Total number of successful user registrations")
                .build(),
            login_total: meter.u64_counter("auth_login_total").with_description("Total number of login attempts").build(),
        }
    }
}

/// Register/login over the credential store.
#[derive(Clone, Debug)]
pub struct AuthService {
    users: Arc<dyn UserStore>,
    secret: Arc<[u8]>,
    config: AuthConfig,
    metrics: Metrics,
}

impl AuthService {
    #[must_use]
    pub fn new(users: Arc<dyn UserStore>, config: AuthConfig) -> Self {
        let secret: Arc<[u8]> = match &config.jwt_secret {
            Some(secret) => Arc::from(secret.as_bytes()),
            None => {
                tracing::warn!("No token secret configured, chat tokens will not survive a restart");
                Arc::from(generate_secret())
            }
        };

        Self { users, secret, config, metrics: Metrics::new() }
    }

    /// Creates a user.
    ///
    /// # Errors
    /// Returns `AppError::DuplicateUser` if the username is taken and
    /// `AppError::Validation` for empty or oversized fields.
    #[tracing::instrument(skip(self, password), err(level = "warn"))]
    pub async fn register(&self, username: String, password: String) -> Result<()> {
        self.validate(&username, &password)?;

        if self.users.find_by_username(&username).await?.is_some() {
            return Err(AppError::DuplicateUser);
        }

        let password_hash = hash_password(password).await?;

        // The store enforces uniqueness too, so a concurrent registration that
        // slipped past the check above still fails with DuplicateUser.
        self.users.create(NewUser { username, password_hash }).await?;

        tracing::info!("User registered successfully");
        self.metrics.users_registered_total.add(1, &[]);
        Ok(())
    }

    /// Checks credentials and issues a chat token bound to the username.
    ///
    /// # Errors
    /// Returns `AppError::InvalidCredentials` for an unknown user or a wrong
    /// password, without saying which.
    #[tracing::instrument(skip(self, password), err(level = "warn"))]
    pub async fn login(&self, username: String, password: String) -> Result<String> {
        let Some(user) = self.users.find_by_username(&username).await? else {
            tracing::debug!("Login failed: user not found");
            self.metrics.login_total.add(1, &[KeyValue::new("result", "rejected")]);
            return Err(AppError::InvalidCredentials);
        };

        if !verify_password(password, user.password_hash).await? {
            tracing::debug!("Login failed: invalid password");
            self.metrics.login_total.add(1, &[KeyValue::new("result", "rejected")]);
            return Err(AppError::InvalidCredentials);
        }

        let token = Claims::new(user.username, self.config.token_ttl_secs).encode(&self.secret)?;

        tracing::info!("User logged in successfully");
        self.metrics.login_total.add(1, &[KeyValue::new("result", "ok")]);
        Ok(token)
    }

    /// Resolves a chat token to the username it was issued for.
    ///
    /// # Errors
    /// Returns `AppError::Unauthorized` if the token is invalid or expired.
    pub fn verify_token(&self, token: &str) -> Result<String> {
        Claims::decode(token, &self.secret).map(|claims| claims.sub)
    }

    fn validate(&self, username: &str, password: &str) -> Result<()> {
        if username.trim().is_empty() || password.is_empty() {
            return Err(AppError::Validation("Username and password are required".to_string()));
        }
        if username.chars().count() > self.config.max_username_len {
            return Err(AppError::Validation(format!(
                "Username must be at most {} characters",
                self.config.max_username_len
            )));
        }
        Ok(())
    }
}

async fn hash_password(password: String) -> Result<String> {
    tokio::task::spawn_blocking(move || Password::hash(&password)).await.map_err(|_| AppError::Internal)?
}

async fn verify_password(password: String, password_hash: String) -> Result<bool> {
    tokio::task::spawn_blocking(move || Password::verify(&password, &password_hash))
        .await
        .map_err(|_| AppError::Internal)?
}
