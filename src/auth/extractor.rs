//! JWT extractors
//!
//! The token only identifies the caller. Role and existence come from the
//! `users` row, loaded once per request.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use super::jwt::{Claims, JwtService};
use super::AuthError;
use crate::api::error::ApiError;
use crate::db;
use crate::domain::value_objects::Role;
use crate::models::User;
use crate::AppState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: i64,
    pub username: String,
    pub role: Role,
}

impl CurrentUser {
    pub fn is_admin(&self) -> bool { self.role == Role::Admin }

    /// Admins may act on anyone; everyone else only on themselves.
    pub fn can_access_user(&self, user_id: i64) -> bool { self.is_admin() || self.id == user_id }

    pub fn require_admin(&self) -> Result<(), ApiError> {
        if self.is_admin() { Ok(()) } else { Err(ApiError::admin_required()) }
    }
}

impl From<User> for CurrentUser {
    fn from(user: User) -> Self {
        Self { id: user.id, username: user.username, role: user.role }
    }
}

/// User id carried in the token subject.
pub fn subject_id(claims: &Claims) -> Result<i64, AuthError> {
    claims.sub.parse().map_err(|_| AuthError::InvalidToken(format!("bad subject {:?}", claims.sub)))
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<CurrentUser>() {
            return Ok(user.clone());
        }

        let header = parts.headers.get(AUTHORIZATION).and_then(|h| h.to_str().ok());
        let Some(header) = header else {
            tracing::debug!(uri = %parts.uri, "missing authorization header");
            return Err(ApiError::Unauthorized("Please login first".into()));
        };
        let token = JwtService::extract_from_header(header)
            .ok_or_else(|| ApiError::Unauthorized("Invalid authorization header".into()))?;

        let claims = state.jwt.validate(token).map_err(|e| {
            tracing::warn!(uri = %parts.uri, error = %e, "token rejected");
            ApiError::from(e)
        })?;
        let id = subject_id(&claims)?;
        let Some(row) = db::users::find(&state.db, id).await? else {
            tracing::warn!(user_id = id, "token for a deleted user");
            return Err(ApiError::Unauthorized("User no longer exists".into()));
        };
        let user = CurrentUser::from(row);
        parts.extensions.insert(user.clone());
        Ok(user)
    }
}

/// A `CurrentUser` with the admin role; anyone else gets 403.
#[derive(Debug, Clone)]
pub struct AdminUser(pub CurrentUser);

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user = CurrentUser::from_request_parts(parts, state).await?;
        user.require_admin()?;
        Ok(AdminUser(user))
    }
}

impl std::ops::Deref for AdminUser {
    type Target = CurrentUser;
    fn deref(&self) -> &CurrentUser { &self.0 }
}
