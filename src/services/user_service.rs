use crate::api::error::AppError;
use crate::config::AppConfig;
use crate::entities::{prelude::*, users};
use crate::services::login_guard::LoginAttemptGuard;
use crate::utils::auth::create_jwt;
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::{Duration, Utc};
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct NewAccount {
    pub email: String,
    pub username: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub address: Option<String>,
}

pub struct UserService {
    db: DatabaseConnection,
    guard: LoginAttemptGuard,
    config: AppConfig,
}

impl UserService {
    pub fn new(db: DatabaseConnection, guard: LoginAttemptGuard, config: AppConfig) -> Self {
        Self { db, guard, config }
    }

    pub fn guard(&self) -> &LoginAttemptGuard {
        &self.guard
    }

    /// Creates a disabled account with a fresh activation token. The
    /// activation link is logged instead of mailed.
    pub async fn register(&self, account: NewAccount) -> Result<users::Model, AppError> {
        let email = account.email.trim().to_lowercase();
        let username = account.username.trim().to_string();

        if self.find_by_email(&email).await?.is_some() {
            return Err(AppError::Conflict("Email is already registered".to_string()));
        }
        if self.find_by_username(&username).await?.is_some() {
            return Err(AppError::Conflict("Username is already taken".to_string()));
        }

        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(account.password.as_bytes(), &salt)
            .map_err(|e| AppError::Internal(e.to_string()))?
            .to_string();

        let token = Uuid::new_v4().to_string();
        let now = Utc::now();

        let user = users::ActiveModel {
            email: Set(email),
            username: Set(username),
            password_hash: Set(password_hash),
            first_name: Set(account.first_name.trim().to_string()),
            last_name: Set(account.last_name.trim().to_string()),
            address: Set(account.address.filter(|a| !a.trim().is_empty())),
            enabled: Set(false),
            activation_token: Set(Some(token.clone())),
            token_expires_at: Set(Some(now + Duration::hours(self.config.activation_ttl_hours))),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;

        tracing::info!(
            "📧 Activation link for {}: {}/auth/activate?token={}",
            user.email,
            self.config.public_base_url.trim_end_matches('/'),
            token
        );

        Ok(user)
    }

    pub async fn activate(&self, token: &str) -> Result<users::Model, AppError> {
        let user = Users::find()
            .filter(users::Column::ActivationToken.eq(token))
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::BadRequest("Invalid activation token".to_string()))?;

        if user
            .token_expires_at
            .is_some_and(|expires_at| expires_at < Utc::now())
        {
            return Err(AppError::BadRequest("Activation token has expired".to_string()));
        }

        let mut active: users::ActiveModel = user.into();
        active.enabled = Set(true);
        active.activation_token = Set(None);
        active.token_expires_at = Set(None);
        let user = active.update(&self.db).await?;

        tracing::info!("✅ Account {} activated", user.id);
        Ok(user)
    }

    /// Checks credentials for `address`, recording failures in the login
    /// guard. Returns the user and a signed token on success.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        address: &str,
    ) -> Result<(users::Model, String), AppError> {
        if self.guard.is_blocked(address) {
            return Err(AppError::TooManyRequests(
                "Too many failed login attempts. Please try again later.".to_string(),
            ));
        }

        let user = match self.verify_credentials(email, password).await {
            Ok(user) => user,
            Err(e) => {
                if matches!(e, AppError::Unauthorized(_) | AppError::Forbidden(_)) {
                    self.guard.login_failed(address);
                }
                return Err(e);
            }
        };

        self.guard.login_succeeded(address);

        let token = create_jwt(
            user.id,
            &user.email,
            &self.config.jwt_secret,
            self.config.jwt_ttl_hours,
        )?;

        Ok((user, token))
    }

    async fn verify_credentials(&self, email: &str, password: &str) -> Result<users::Model, AppError> {
        let user = self
            .find_by_email(&email.trim().to_lowercase())
            .await?
            .ok_or_else(|| AppError::Unauthorized("Invalid email or password".to_string()))?;

        let parsed_hash =
            PasswordHash::new(&user.password_hash).map_err(|e| AppError::Internal(e.to_string()))?;

        Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .map_err(|_| AppError::Unauthorized("Invalid email or password".to_string()))?;

        if !user.enabled {
            return Err(AppError::Forbidden("Account is not activated".to_string()));
        }

        Ok(user)
    }

    pub async fn find_by_id(&self, id: i32) -> Result<Option<users::Model>, AppError> {
        Ok(Users::find_by_id(id).one(&self.db).await?)
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<users::Model>, AppError> {
        Ok(Users::find()
            .filter(users::Column::Email.eq(email))
            .one(&self.db)
            .await?)
    }

    pub async fn find_by_username(&self, username: &str) -> Result<Option<users::Model>, AppError> {
        Ok(Users::find()
            .filter(users::Column::Username.eq(username))
            .one(&self.db)
            .await?)
    }
}
