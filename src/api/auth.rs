use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{ApiError, ApiResult, ValidatedJson};
use crate::auth::{verify_password, CurrentUser};
use crate::db;
use crate::models::User;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/login", post(login)).route("/me", get(me))
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1))]
    pub username: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub user: User,
}

async fn login(State(state): State<AppState>, ValidatedJson(req): ValidatedJson<LoginRequest>) -> ApiResult<Json<LoginResponse>> {
    let user = db::users::find_by_username(&state.db, req.username.trim()).await?;
    let Some(user) = user.filter(|u| verify_password(&req.password, &u.password_hash)) else {
        tracing::info!(username = %req.username, "login rejected");
        return Err(ApiError::invalid_credentials());
    };
    let access_token = state.jwt.issue(&user)?;
    tracing::info!(user_id = user.id, "user logged in");
    Ok(Json(LoginResponse { access_token, token_type: "bearer", user }))
}

async fn me(State(state): State<AppState>, user: CurrentUser) -> ApiResult<Json<User>> {
    let user = db::users::find(&state.db, user.id).await?.ok_or_else(|| ApiError::not_found("User"))?;
    Ok(Json(user))
}
