use std::sync::Arc;

use tracing::{info, instrument};

use crate::domain::context::OpContext;
use crate::domain::error::{unexpected, DomainError};
use crate::domain::model::{NewUser, Role, User};
use crate::domain::ports::{PasswordHasher, StorageError, TokenService, UserRepo};
use crate::domain::service::log_failure;

/// Accounts and token issuance.
#[derive(Clone)]
pub struct UserService {
    repo: Arc<dyn UserRepo>,
    tokens: Arc<dyn TokenService>,
    hasher: Arc<dyn PasswordHasher>,
}

impl UserService {
    pub fn new(
        repo: Arc<dyn UserRepo>,
        tokens: Arc<dyn TokenService>,
        hasher: Arc<dyn PasswordHasher>,
    ) -> Self {
        Self {
            repo,
            tokens,
            hasher,
        }
    }

    /// Issues a token for `role` without an account behind it.
    #[instrument(name = "pvz.service.dummy_login", skip(self, ctx), fields(request_id = %ctx.request_id, %role))]
    pub async fn dummy_login(&self, ctx: &OpContext, role: Role) -> Result<String, DomainError> {
        self.tokens
            .issue(role, None)
            .map_err(DomainError::from)
            .inspect_err(|e| log_failure("dummy_login", e))
    }

    #[instrument(name = "pvz.service.register", skip(self, ctx, password), fields(request_id = %ctx.request_id, %role))]
    pub async fn register(
        &self,
        ctx: &OpContext,
        email: &str,
        password: &str,
        role: Role,
    ) -> Result<User, DomainError> {
        let email = email.trim();
        validate_email(email)?;
        if password.is_empty() {
            return Err(DomainError::validation("password must not be empty"));
        }

        let res = ctx
            .run(async {
                let password_hash = self.hasher.hash(password);
                self.repo
                    .create_user(NewUser {
                        email: email.to_string(),
                        password_hash,
                        role,
                    })
                    .await
                    .map_err(|e| match e {
                        StorageError::DuplicateEmail => DomainError::UserAlreadyExists {
                            email: email.to_string(),
                        },
                        other => unexpected("register", other),
                    })
            })
            .await;

        match &res {
            Ok(user) => info!(user_id = %user.id, "user registered"),
            Err(e) => log_failure("register", e),
        }
        res
    }

    #[instrument(name = "pvz.service.login", skip(self, ctx, password), fields(request_id = %ctx.request_id))]
    pub async fn login(
        &self,
        ctx: &OpContext,
        email: &str,
        password: &str,
    ) -> Result<String, DomainError> {
        ctx.run(async {
            let user = self
                .repo
                .get_user_by_email(email.trim())
                .await
                .map_err(|e| match e {
                    StorageError::UserNotFound => DomainError::InvalidCredentials,
                    other => unexpected("login", other),
                })?;

            if !self.hasher.verify(password, &user.password_hash) {
                return Err(DomainError::InvalidCredentials);
            }

            Ok(self.tokens.issue(user.role, Some(user.id))?)
        })
        .await
        .inspect_err(|e| log_failure("login", e))
    }
}

fn validate_email(email: &str) -> Result<(), DomainError> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && domain.contains('.')
                && !email.chars().any(char::is_whitespace)
                && !domain.contains('@')
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(DomainError::validation(format!("invalid email: {email}")))
    }
}
