// Accounts and sessions: email/password sign-up and sign-in, stateless
// HS256 session tokens, and the identity handed to the other operations.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use routemarket_core::db::models::{Role, User, UserProfile, UserSubscriptionStatus};
use routemarket_core::error::{ErrorCode, MarketError, Result, StoreError};
use routemarket_core::utils::{generate_id, is_valid_email, normalize_email};

use crate::context::MarketContext;
use crate::crypto::{hash_password, sign_jwt, verify_jwt, verify_password};

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRef {
    pub id: String,
    pub role: Role,
}

impl UserRef {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

impl From<&User> for UserRef {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            role: user.role,
        }
    }
}

/// Claims carried in a session token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionClaims {
    pub user_id: String,
    pub role: Role,
}

/// A signed-in user and their session token.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSession {
    pub token: String,
    pub user: UserProfile,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignUp {
    pub name: String,
    pub email: String,
    pub password: String,
}

fn issue_session(ctx: &MarketContext, user: &User) -> Result<AuthSession> {
    let claims = SessionClaims {
        user_id: user.id.clone(),
        role: user.role,
    };
    let token = sign_jwt(&claims, &ctx.options.secret, ctx.options.session.expires_in_secs)?;
    Ok(AuthSession {
        token,
        user: user.profile(),
    })
}

fn check_password_length(ctx: &MarketContext, password: &str) -> Result<()> {
    let len = password.chars().count();
    if len < ctx.options.session.min_password_length {
        return Err(MarketError::invalid(ErrorCode::PasswordTooShort));
    }
    if len > ctx.options.session.max_password_length {
        return Err(MarketError::invalid(ErrorCode::PasswordTooLong));
    }
    Ok(())
}

/// Register a new user with role USER and sign them in.
pub async fn sign_up(ctx: &MarketContext, request: SignUp) -> Result<AuthSession> {
    let email = normalize_email(&request.email);
    if !is_valid_email(&email) {
        return Err(MarketError::invalid(ErrorCode::InvalidEmail));
    }
    check_password_length(ctx, &request.password)?;

    let repo = ctx.store.repo();
    if repo.find_user_by_email(&email).await?.is_some() {
        return Err(MarketError::Conflict(ErrorCode::UserAlreadyExists));
    }

    let now = Utc::now();
    let user = User {
        id: generate_id(),
        email,
        name: request.name.trim().to_string(),
        password_hash: hash_password(&request.password)?,
        role: Role::User,
        subscription_status: UserSubscriptionStatus::None,
        created_at: now,
        updated_at: now,
    };

    let user = match repo.insert_user(&user).await {
        Ok(user) => user,
        Err(StoreError::UniqueViolation { .. }) => {
            return Err(MarketError::Conflict(ErrorCode::UserAlreadyExists))
        }
        Err(other) => return Err(other.into()),
    };

    tracing::info!(user_id = %user.id, "user signed up");
    issue_session(ctx, &user)
}

/// Check credentials and issue a session token.
pub async fn sign_in(ctx: &MarketContext, email: &str, password: &str) -> Result<AuthSession> {
    let email = normalize_email(email);
    let invalid = || MarketError::Unauthorized(ErrorCode::InvalidEmailOrPassword);

    let Some(user) = ctx.store.repo().find_user_by_email(&email).await? else {
        // Hash anyway so unknown emails cost the same as wrong passwords.
        let _ = hash_password(password);
        return Err(invalid());
    };

    if !verify_password(&user.password_hash, password)? {
        tracing::debug!(user_id = %user.id, "password mismatch");
        return Err(invalid());
    }
    issue_session(ctx, &user)
}

/// Resolve a session token to the current user. The role is re-read from storage.
pub async fn authenticate(ctx: &MarketContext, token: &str) -> Result<UserRef> {
    let claims: SessionClaims = verify_jwt(token, &ctx.options.secret)
        .ok_or(MarketError::Unauthorized(ErrorCode::InvalidSession))?;
    let user = ctx
        .store
        .repo()
        .find_user(&claims.user_id)
        .await?
        .ok_or(MarketError::Unauthorized(ErrorCode::InvalidSession))?;
    Ok(UserRef::from(&user))
}

pub fn require_admin(user: &UserRef) -> Result<()> {
    if user.is_admin() {
        Ok(())
    } else {
        Err(MarketError::Forbidden(ErrorCode::Forbidden))
    }
}
