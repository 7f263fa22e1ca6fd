use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use super::{ApiError, ApiResult, MessageResponse, ValidatedJson};
use crate::audit::AuditEntry;
use crate::auth::{AdminUser, CurrentUser};
use crate::db;
use crate::db::platforms::{NewPlatform, PlatformUpdate};
use crate::domain::value_objects::Page;
use crate::models::{Platform, Shop};
use crate::AppState;

const TABLE: &str = "platforms";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/:id", get(fetch).put(update).delete(remove))
        .route("/:id/shops", get(shops))
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub is_active: Option<bool>,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

async fn list(State(state): State<AppState>, _user: CurrentUser, Query(params): Query<ListParams>) -> ApiResult<Json<Vec<Platform>>> {
    let page = Page::new(params.skip, params.limit, 100, 500);
    Ok(Json(db::platforms::list(&state.db, params.is_active, page).await?))
}

async fn fetch(State(state): State<AppState>, _user: CurrentUser, Path(id): Path<i64>) -> ApiResult<Json<Platform>> {
    let platform = db::platforms::find(&state.db, id).await?.ok_or_else(|| ApiError::not_found("Platform"))?;
    Ok(Json(platform))
}

async fn shops(State(state): State<AppState>, _user: CurrentUser, Path(id): Path<i64>) -> ApiResult<Json<Vec<Shop>>> {
    if db::platforms::find(&state.db, id).await?.is_none() {
        return Err(ApiError::not_found("Platform"));
    }
    Ok(Json(db::platforms::shops(&state.db, id).await?))
}

async fn ensure_unique(state: &AppState, name: Option<&str>, code: Option<&str>, except_id: Option<i64>) -> ApiResult<()> {
    if let Some(code) = code {
        if db::platforms::code_taken(&state.db, code, except_id).await? {
            return Err(ApiError::conflict(format!("Platform code {code} already exists")));
        }
    }
    if let Some(name) = name.map(str::trim) {
        if db::platforms::name_taken(&state.db, name, except_id).await? {
            return Err(ApiError::conflict(format!("Platform name {name} already exists")));
        }
    }
    Ok(())
}

async fn create(State(state): State<AppState>, admin: AdminUser, ValidatedJson(new): ValidatedJson<NewPlatform>) -> ApiResult<Json<Platform>> {
    ensure_unique(&state, Some(&new.name), Some(new.code.as_str()), None).await?;
    let platform = db::platforms::insert(&state.db, &new).await?;
    state.audit.record(AuditEntry::created(TABLE, platform.id, &platform).by(admin.id)).await;
    Ok(Json(platform))
}

async fn update(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<i64>,
    ValidatedJson(patch): ValidatedJson<PlatformUpdate>,
) -> ApiResult<Json<Platform>> {
    let old = db::platforms::find(&state.db, id).await?.ok_or_else(|| ApiError::not_found("Platform"))?;
    ensure_unique(&state, patch.name.as_deref(), patch.code.as_ref().map(|c| c.as_str()), Some(id)).await?;
    let platform = db::platforms::update(&state.db, id, &patch).await?.ok_or_else(|| ApiError::not_found("Platform"))?;
    state.audit.record(AuditEntry::updated(TABLE, id, &old, &platform).by(admin.id)).await;
    Ok(Json(platform))
}

async fn remove(State(state): State<AppState>, admin: AdminUser, Path(id): Path<i64>) -> ApiResult<Json<MessageResponse>> {
    let old = db::platforms::find(&state.db, id).await?.ok_or_else(|| ApiError::not_found("Platform"))?;
    let shops = db::platforms::count_shops(&state.db, id).await?;
    if shops > 0 {
        return Err(ApiError::bad_request(format!("Platform still has {shops} shops; remove them first")));
    }
    db::platforms::delete(&state.db, id).await?;
    state.audit.record(AuditEntry::deleted(TABLE, id, &old).by(admin.id)).await;
    Ok(Json(MessageResponse::new("Platform deleted")))
}
