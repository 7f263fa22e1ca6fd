use axum::extract::{Path, Query, State};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use validator::Validate;

use super::{ApiError, ApiResult, MessageResponse, ValidatedJson};
use crate::audit::AuditEntry;
use crate::auth::{hash_password, verify_password, AdminUser, CurrentUser};
use crate::db;
use crate::db::users::{NewUser, UserFilter, UserUpdate};
use crate::domain::value_objects::{Page, Role};
use crate::models::User;
use crate::AppState;

const TABLE: &str = "users";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/:id", get(fetch).put(update).delete(remove))
        .route("/:id/change-password", put(change_password))
        .route("/batch-delete", post(batch_delete))
        .route("/batch-role", post(batch_role))
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub role: Option<Role>,
    pub search: Option<String>,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PasswordChange {
    pub old_password: String,
    #[validate(length(min = 6, max = 128))]
    pub new_password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct BatchIds {
    #[validate(length(min = 1))]
    pub ids: Vec<i64>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct BatchRole {
    #[validate(length(min = 1))]
    pub ids: Vec<i64>,
    pub role: Role,
}

async fn list(State(state): State<AppState>, _user: CurrentUser, Query(params): Query<ListParams>) -> ApiResult<Json<Vec<User>>> {
    let filter = UserFilter { role: params.role, search: params.search };
    let page = Page::new(params.skip, params.limit, 100, 500);
    Ok(Json(db::users::list(&state.db, &filter, page).await?))
}

async fn create(State(state): State<AppState>, admin: AdminUser, ValidatedJson(new): ValidatedJson<NewUser>) -> ApiResult<Json<User>> {
    if db::users::username_taken(&state.db, &new.username, None).await? {
        return Err(ApiError::conflict(format!("Username {} already exists", new.username)));
    }
    let hash = hash_password(&new.password)?;
    let user = db::users::insert(&state.db, &new, &hash).await?;
    state.audit.record(AuditEntry::created(TABLE, user.id, &user).by(admin.id)).await;
    Ok(Json(user))
}

async fn fetch(State(state): State<AppState>, user: CurrentUser, Path(id): Path<i64>) -> ApiResult<Json<User>> {
    if !user.can_access_user(id) {
        return Err(ApiError::forbidden("You can only view your own account"));
    }
    let found = db::users::find(&state.db, id).await?.ok_or_else(|| ApiError::not_found("User"))?;
    Ok(Json(found))
}

async fn update(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    ValidatedJson(patch): ValidatedJson<UserUpdate>,
) -> ApiResult<Json<User>> {
    if !user.can_access_user(id) {
        return Err(ApiError::forbidden("You can only update your own account"));
    }
    if patch.role.is_some() && !user.is_admin() {
        return Err(ApiError::forbidden("Only admins may change roles"));
    }
    let old = db::users::find(&state.db, id).await?.ok_or_else(|| ApiError::not_found("User"))?;
    if let Some(username) = &patch.username {
        if db::users::username_taken(&state.db, username, Some(id)).await? {
            return Err(ApiError::conflict(format!("Username {username} already exists")));
        }
    }
    let hash = patch.password.as_deref().map(hash_password).transpose()?;
    let updated = db::users::update(&state.db, id, &patch, hash.as_deref())
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;
    state.audit.record(AuditEntry::updated(TABLE, id, &old, &updated).by(user.id)).await;
    Ok(Json(updated))
}

async fn remove(State(state): State<AppState>, admin: AdminUser, Path(id): Path<i64>) -> ApiResult<Json<MessageResponse>> {
    if admin.id == id {
        return Err(ApiError::bad_request("You cannot delete your own account"));
    }
    let old = db::users::find(&state.db, id).await?.ok_or_else(|| ApiError::not_found("User"))?;
    db::users::delete(&state.db, id).await?;
    state.audit.record(AuditEntry::deleted(TABLE, id, &old).by(admin.id)).await;
    Ok(Json(MessageResponse::new("User deleted")))
}

async fn change_password(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    ValidatedJson(req): ValidatedJson<PasswordChange>,
) -> ApiResult<Json<MessageResponse>> {
    if user.id != id {
        return Err(ApiError::forbidden("You can only change your own password"));
    }
    let found = db::users::find(&state.db, id).await?.ok_or_else(|| ApiError::not_found("User"))?;
    if !verify_password(&req.old_password, &found.password_hash) {
        return Err(ApiError::bad_request("Old password is incorrect"));
    }
    let hash = hash_password(&req.new_password)?;
    db::users::set_password(&state.db, id, &hash).await?;
    tracing::info!(user_id = id, "password changed");
    Ok(Json(MessageResponse::new("Password changed")))
}

async fn batch_delete(State(state): State<AppState>, admin: AdminUser, ValidatedJson(req): ValidatedJson<BatchIds>) -> ApiResult<Json<MessageResponse>> {
    if req.ids.contains(&admin.id) {
        return Err(ApiError::bad_request("You cannot delete your own account"));
    }
    let count = db::users::delete_many(&state.db, &req.ids).await?;
    tracing::info!(count, by = admin.id, "users batch deleted");
    Ok(Json(MessageResponse::with_count(format!("Deleted {count} users"), count)))
}

async fn batch_role(State(state): State<AppState>, admin: AdminUser, ValidatedJson(req): ValidatedJson<BatchRole>) -> ApiResult<Json<MessageResponse>> {
    let count = db::users::set_role_many(&state.db, &req.ids, req.role).await?;
    tracing::info!(count, role = %req.role, by = admin.id, "user roles batch updated");
    Ok(Json(MessageResponse::with_count(format!("Updated {count} users"), count)))
}
