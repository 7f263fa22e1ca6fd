use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use super::{ApiError, ApiResult, MessageResponse, ValidatedJson};
use crate::audit::AuditEntry;
use crate::auth::CurrentUser;
use crate::db;
use crate::db::shops::{NewShop, ShopFilter, ShopUpdate};
use crate::domain::value_objects::{Page, ShopStatus};
use crate::models::{Shop, ShopView};
use crate::AppState;

const TABLE: &str = "shops";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/count/total", get(count))
        .route("/:id", get(fetch).put(update).delete(remove))
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub platform_id: Option<i64>,
    pub status: Option<ShopStatus>,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ShopCount {
    pub total: i64,
}

async fn list(State(state): State<AppState>, _user: CurrentUser, Query(params): Query<ListParams>) -> ApiResult<Json<Vec<ShopView>>> {
    let filter = ShopFilter { platform_id: params.platform_id, status: params.status };
    let page = Page::new(params.skip, params.limit, 100, 500);
    Ok(Json(db::shops::list(&state.db, &filter, page).await?))
}

async fn count(State(state): State<AppState>, _user: CurrentUser) -> ApiResult<Json<ShopCount>> {
    Ok(Json(ShopCount { total: db::shops::count(&state.db).await? }))
}

async fn fetch(State(state): State<AppState>, _user: CurrentUser, Path(id): Path<i64>) -> ApiResult<Json<ShopView>> {
    let shop = db::shops::find_view(&state.db, id).await?.ok_or_else(|| ApiError::not_found("Shop"))?;
    Ok(Json(shop))
}

async fn check_references(state: &AppState, platform_id: Option<i64>, manager_id: Option<i64>) -> ApiResult<()> {
    if let Some(platform_id) = platform_id {
        if db::platforms::find(&state.db, platform_id).await?.is_none() {
            return Err(ApiError::not_found("Platform"));
        }
    }
    if let Some(manager_id) = manager_id {
        if db::users::find(&state.db, manager_id).await?.is_none() {
            return Err(ApiError::not_found("Manager"));
        }
    }
    Ok(())
}

async fn create(State(state): State<AppState>, user: CurrentUser, ValidatedJson(new): ValidatedJson<NewShop>) -> ApiResult<Json<Shop>> {
    if db::shops::name_taken(&state.db, new.name.trim(), None).await? {
        return Err(ApiError::conflict(format!("Shop {} already exists", new.name.trim())));
    }
    check_references(&state, Some(new.platform_id), new.manager_id).await?;
    let shop = db::shops::insert(&state.db, &new).await?;
    state.audit.record(AuditEntry::created(TABLE, shop.id, &shop).by(user.id)).await;
    Ok(Json(shop))
}

async fn update(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    ValidatedJson(patch): ValidatedJson<ShopUpdate>,
) -> ApiResult<Json<Shop>> {
    let old = db::shops::find(&state.db, id).await?.ok_or_else(|| ApiError::not_found("Shop"))?;
    if let Some(name) = patch.name.as_deref().map(str::trim) {
        if db::shops::name_taken(&state.db, name, Some(id)).await? {
            return Err(ApiError::conflict(format!("Shop {name} already exists")));
        }
    }
    check_references(&state, patch.platform_id, patch.manager_id).await?;
    let shop = db::shops::update(&state.db, id, &patch).await?.ok_or_else(|| ApiError::not_found("Shop"))?;
    state.audit.record(AuditEntry::updated(TABLE, id, &old, &shop).by(user.id)).await;
    Ok(Json(shop))
}

async fn remove(State(state): State<AppState>, user: CurrentUser, Path(id): Path<i64>) -> ApiResult<Json<MessageResponse>> {
    let old = db::shops::find(&state.db, id).await?.ok_or_else(|| ApiError::not_found("Shop"))?;
    db::shops::delete(&state.db, id).await?;
    state.audit.record(AuditEntry::deleted(TABLE, id, &old).by(user.id)).await;
    Ok(Json(MessageResponse::new("Shop deleted")))
}
