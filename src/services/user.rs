//! User service
//!
//! Registration, token login/refresh and the staff bootstrap. Roles are chosen
//! at registration and never change afterwards.

use crate::config::StaffBootstrap;
use crate::db::repositories::UserRepository;
use crate::models::{CreateUserInput, Role, User, UserSummary};
use crate::services::password::{hash_password, verify_against_dummy, verify_password};
use crate::services::token::{JwtService, TokenError, TokenPair};
use anyhow::Context;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

const MAX_USERNAME_LEN: usize = 150;
const MIN_PASSWORD_LEN: usize = 8;

/// Letters, digits and `@.+-_`
static USERNAME_RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^[\w.@+-]+$").ok());

/// Error types for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// Invalid credentials or token
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    /// Invalid input, including taken usernames and emails
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("User not found: {0}")]
    NotFound(i64),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    tokens: JwtService,
}

impl UserService {
    pub fn new(user_repo: Arc<dyn UserRepository>, tokens: JwtService) -> Self {
        Self { user_repo, tokens }
    }

    /// Register a new user with the requested role.
    ///
    /// The role is stored with the account in one insert; permissions derive
    /// from it, so a user can never exist without its permission set.
    pub async fn register(&self, input: CreateUserInput) -> Result<User, UserServiceError> {
        let role = validate_register_input(&input)?;

        if self
            .user_repo
            .get_by_username(&input.username)
            .await
            .context("Failed to check username")?
            .is_some()
        {
            return Err(UserServiceError::ValidationError(format!(
                "Username '{}' is already taken",
                input.username
            )));
        }

        if self
            .user_repo
            .get_by_email(&input.email)
            .await
            .context("Failed to check email")?
            .is_some()
        {
            return Err(UserServiceError::ValidationError(format!(
                "Email '{}' is already registered",
                input.email
            )));
        }

        let password_hash = hash_password(&input.password).context("Failed to hash password")?;
        let user = User::new(input.username, input.email, password_hash, role);

        let created = self
            .user_repo
            .create(&user)
            .await
            .context("Failed to create user")?;

        tracing::info!(user_id = created.id, role = %created.role, "User registered");
        Ok(created)
    }

    /// Check credentials and issue an access/refresh token pair
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<(User, TokenPair), UserServiceError> {
        let user = match self
            .user_repo
            .get_by_username(username)
            .await
            .context("Failed to get user by username")?
        {
            Some(user) => user,
            None => {
                verify_against_dummy(password);
                return Err(invalid_credentials());
            }
        };

        let valid = verify_password(password, &user.password_hash)
            .context("Failed to verify password")?;
        if !valid {
            return Err(invalid_credentials());
        }

        let pair = self
            .tokens
            .issue_pair(&user)
            .context("Failed to issue tokens")?;
        Ok((user, pair))
    }

    /// Exchange a refresh token for a new access token
    pub fn refresh(&self, refresh_token: &str) -> Result<String, UserServiceError> {
        self.tokens
            .refresh_access(refresh_token)
            .map_err(|e| UserServiceError::AuthenticationError(e.to_string()))
    }

    /// Resolve a bearer access token to its user.
    ///
    /// The user is reloaded so that deleted accounts stop authenticating.
    pub async fn authenticate_token(&self, token: &str) -> Result<User, UserServiceError> {
        let claims = self.tokens.verify_access(token).map_err(|e| match e {
            TokenError::WrongType { .. } => {
                UserServiceError::AuthenticationError("Token is not an access token".into())
            }
            TokenError::Invalid(e) => UserServiceError::AuthenticationError(e.to_string()),
        })?;

        self.user_repo
            .get_by_id(claims.user_id)
            .await
            .context("Failed to load token user")?
            .ok_or_else(|| UserServiceError::AuthenticationError("User no longer exists".into()))
    }

    pub async fn get_by_id(&self, id: i64) -> Result<User, UserServiceError> {
        self.user_repo
            .get_by_id(id)
            .await
            .context("Failed to get user by ID")?
            .ok_or(UserServiceError::NotFound(id))
    }

    pub async fn set_staff(&self, id: i64, is_staff: bool) -> Result<User, UserServiceError> {
        self.get_by_id(id).await?;
        self.user_repo
            .set_staff(id, is_staff)
            .await
            .context("Failed to update staff flag")?;
        self.get_by_id(id).await
    }

    /// Create the configured staff account unless it already exists.
    ///
    /// An existing account with that username is only promoted to staff.
    pub async fn ensure_staff(&self, staff: &StaffBootstrap) -> Result<User, UserServiceError> {
        let existing = self
            .user_repo
            .get_by_username(&staff.username)
            .await
            .context("Failed to look up staff account")?;

        let user = match existing {
            Some(user) if user.is_staff => return Ok(user),
            Some(user) => user,
            None => {
                self.register(CreateUserInput {
                    username: staff.username.clone(),
                    email: staff.email.clone(),
                    password: staff.password.clone(),
                    role: staff.role.clone(),
                })
                .await?
            }
        };

        tracing::info!(username = %user.username, "Granting staff access");
        self.set_staff(user.id, true).await
    }

    pub async fn list_journalists(&self) -> Result<Vec<UserSummary>, UserServiceError> {
        let users = self
            .user_repo
            .list_by_role(Role::Journalist)
            .await
            .context("Failed to list journalists")?;
        Ok(users.iter().map(UserSummary::from).collect())
    }
}

fn invalid_credentials() -> UserServiceError {
    UserServiceError::AuthenticationError("Invalid username or password".to_string())
}

fn validate_register_input(input: &CreateUserInput) -> Result<Role, UserServiceError> {
    let username = input.username.as_str();
    if username.is_empty() || username.chars().count() > MAX_USERNAME_LEN {
        return Err(UserServiceError::ValidationError(format!(
            "Username must be 1 to {} characters",
            MAX_USERNAME_LEN
        )));
    }
    if !USERNAME_RE.as_ref().is_some_and(|re| re.is_match(username)) {
        return Err(UserServiceError::ValidationError(
            "Username may only contain letters, digits and @.+-_".to_string(),
        ));
    }

    if !input.email.contains('@') {
        return Err(UserServiceError::ValidationError(
            "Invalid email format".to_string(),
        ));
    }

    if input.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(UserServiceError::ValidationError(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }

    input
        .role
        .parse::<Role>()
        .map_err(|_| UserServiceError::ValidationError(format!("Invalid role '{}'", input.role)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::SqlxUserRepository;
    use crate::db::{create_test_pool, migrations};
    use chrono::Duration;

    async fn setup_test_service() -> UserService {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let tokens = JwtService::new("secret", "newsdesk".into(), Duration::minutes(5), Duration::hours(1));
        UserService::new(SqlxUserRepository::boxed(pool), tokens)
    }

    fn input(username: &str, email: &str, password: &str, role: &str) -> CreateUserInput {
        CreateUserInput {
            username: username.into(),
            email: email.into(),
            password: password.into(),
            role: role.into(),
        }
    }

    #[tokio::test]
    async fn test_register_assigns_requested_role() {
        let service = setup_test_service().await;

        let user = service
            .register(input("jane", "jane@example.com", "password123", "journalist"))
            .await
            .expect("Failed to register");

        assert_eq!(user.role, Role::Journalist);
        assert!(!user.is_staff);
        assert!(user.password_hash.starts_with("$argon2id$"));
    }

    #[tokio::test]
    async fn test_register_rejects_bad_input() {
        let service = setup_test_service().await;

        let cases = [
            input("", "a@example.com", "password123", "reader"),
            input("bad name", "a@example.com", "password123", "reader"),
            input(&"x".repeat(151), "a@example.com", "password123", "reader"),
            input("alice", "not-an-email", "password123", "reader"),
            input("alice", "a@example.com", "short", "reader"),
            input("alice", "a@example.com", "password123", "admin"),
        ];

        for case in cases {
            let result = service.register(case.clone()).await;
            assert!(
                matches!(result, Err(UserServiceError::ValidationError(_))),
                "expected validation error for {:?}",
                case.username
            );
        }
    }

    #[tokio::test]
    async fn test_register_duplicate_username_or_email_fails() {
        let service = setup_test_service().await;
        service
            .register(input("jane", "jane@example.com", "password123", "reader"))
            .await
            .unwrap();

        let dup_name = service
            .register(input("jane", "other@example.com", "password123", "reader"))
            .await;
        assert!(matches!(dup_name, Err(UserServiceError::ValidationError(_))));

        let dup_email = service
            .register(input("other", "jane@example.com", "password123", "reader"))
            .await;
        assert!(matches!(dup_email, Err(UserServiceError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_authenticate_and_resolve_token() {
        let service = setup_test_service().await;
        let registered = service
            .register(input("jane", "jane@example.com", "password123", "editor"))
            .await
            .unwrap();

        let (user, pair) = service.authenticate("jane", "password123").await.unwrap();
        assert_eq!(user.id, registered.id);

        let resolved = service.authenticate_token(&pair.access).await.unwrap();
        assert_eq!(resolved.id, registered.id);
        assert_eq!(resolved.role, Role::Editor);

        assert!(matches!(
            service.authenticate_token(&pair.refresh).await,
            Err(UserServiceError::AuthenticationError(_))
        ));

        let access = service.refresh(&pair.refresh).unwrap();
        assert_eq!(service.authenticate_token(&access).await.unwrap().id, registered.id);
    }

    #[tokio::test]
    async fn test_authenticate_rejects_bad_credentials() {
        let service = setup_test_service().await;
        service
            .register(input("jane", "jane@example.com", "password123", "reader"))
            .await
            .unwrap();

        assert!(matches!(
            service.authenticate("jane", "wrong-password").await,
            Err(UserServiceError::AuthenticationError(_))
        ));
        assert!(matches!(
            service.authenticate("nobody", "password123").await,
            Err(UserServiceError::AuthenticationError(_))
        ));
    }

    #[tokio::test]
    async fn test_ensure_staff_is_idempotent() {
        let service = setup_test_service().await;
        let staff = StaffBootstrap {
            username: "chief".into(),
            email: "chief@example.com".into(),
            password: "password123".into(),
            role: "editor".into(),
        };

        let first = service.ensure_staff(&staff).await.unwrap();
        assert!(first.is_staff);
        assert_eq!(first.role, Role::Editor);

        let second = service.ensure_staff(&staff).await.unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_list_journalists() {
        let service = setup_test_service().await;
        service
            .register(input("jane", "jane@example.com", "password123", "journalist"))
            .await
            .unwrap();
        service
            .register(input("rita", "rita@example.com", "password123", "reader"))
            .await
            .unwrap();

        let journalists = service.list_journalists().await.unwrap();
        assert_eq!(journalists.len(), 1);
        assert_eq!(journalists[0].username, "jane");
    }
}
