use axum::extract::{Path, State};
use axum::routing::{get, put};
use axum::{Json, Router};
use serde::Deserialize;
use validator::Validate;

use super::{ApiError, ApiResult, MessageResponse, ValidatedJson};
use crate::audit::AuditEntry;
use crate::auth::{AdminUser, CurrentUser};
use crate::db;
use crate::db::menus::{MenuItemUpdate, MenuSort, NewMenuItem};
use crate::domain::aggregates::menu::{build_tree, creates_cycle, visible_to};
use crate::domain::aggregates::MenuNode;
use crate::models::MenuItem;
use crate::AppState;

const TABLE: &str = "menu_items";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/tree", get(tree))
        .route("/all", get(list_all))
        .route("/sort/batch", put(sort))
        .route("/:id", get(fetch).put(update).delete(remove))
}

#[derive(Debug, Deserialize, Validate)]
pub struct SortRequest {
    #[validate(length(min = 1))]
    pub items: Vec<MenuSort>,
}

async fn visible_menus(state: &AppState, user: &CurrentUser) -> ApiResult<Vec<MenuItem>> {
    let items = db::menus::list_visible(&state.db).await?;
    Ok(items.into_iter().filter(|m| visible_to(m.required_role.as_deref(), user.role)).collect())
}

async fn list(State(state): State<AppState>, user: CurrentUser) -> ApiResult<Json<Vec<MenuItem>>> {
    Ok(Json(visible_menus(&state, &user).await?))
}

async fn tree(State(state): State<AppState>, user: CurrentUser) -> ApiResult<Json<Vec<MenuNode>>> {
    Ok(Json(build_tree(visible_menus(&state, &user).await?)))
}

async fn list_all(State(state): State<AppState>, _admin: AdminUser) -> ApiResult<Json<Vec<MenuItem>>> {
    Ok(Json(db::menus::list_all(&state.db).await?))
}

async fn fetch(State(state): State<AppState>, _admin: AdminUser, Path(id): Path<i64>) -> ApiResult<Json<MenuItem>> {
    let item = db::menus::find(&state.db, id).await?.ok_or_else(|| ApiError::not_found("Menu"))?;
    Ok(Json(item))
}

async fn create(State(state): State<AppState>, admin: AdminUser, ValidatedJson(new): ValidatedJson<NewMenuItem>) -> ApiResult<Json<MenuItem>> {
    if let Some(parent_id) = new.parent_id.filter(|id| *id > 0) {
        if !db::menus::exists(&state.db, parent_id).await? {
            return Err(ApiError::bad_request(format!("Parent menu {parent_id} does not exist")));
        }
    }
    let item = db::menus::insert(&state.db, &new).await?;
    state.audit.record(AuditEntry::created(TABLE, item.id, &item).by(admin.id)).await;
    Ok(Json(item))
}

async fn update(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<i64>,
    ValidatedJson(patch): ValidatedJson<MenuItemUpdate>,
) -> ApiResult<Json<MenuItem>> {
    let old = db::menus::find(&state.db, id).await?.ok_or_else(|| ApiError::not_found("Menu"))?;
    if let Some(parent_id) = patch.parent_id.filter(|id| *id > 0) {
        if parent_id == id {
            return Err(ApiError::bad_request("A menu cannot be its own parent"));
        }
        if !db::menus::exists(&state.db, parent_id).await? {
            return Err(ApiError::bad_request(format!("Parent menu {parent_id} does not exist")));
        }
        let links = db::menus::links(&state.db).await?;
        if creates_cycle(&links, id, parent_id) {
            return Err(ApiError::bad_request("A menu cannot be moved under one of its descendants"));
        }
    }
    let item = db::menus::update(&state.db, id, &patch).await?.ok_or_else(|| ApiError::not_found("Menu"))?;
    state.audit.record(AuditEntry::updated(TABLE, id, &old, &item).by(admin.id)).await;
    Ok(Json(item))
}

async fn remove(State(state): State<AppState>, admin: AdminUser, Path(id): Path<i64>) -> ApiResult<Json<MessageResponse>> {
    let old = db::menus::find(&state.db, id).await?.ok_or_else(|| ApiError::not_found("Menu"))?;
    let children = db::menus::count_children(&state.db, id).await?;
    if children > 0 {
        return Err(ApiError::bad_request(format!("Menu has {children} child items; remove them first")));
    }
    db::menus::delete(&state.db, id).await?;
    state.audit.record(AuditEntry::deleted(TABLE, id, &old).by(admin.id)).await;
    Ok(Json(MessageResponse::new("Menu deleted")))
}

async fn sort(State(state): State<AppState>, admin: AdminUser, ValidatedJson(req): ValidatedJson<SortRequest>) -> ApiResult<Json<MessageResponse>> {
    let count = db::menus::apply_sort(&state.db, &req.items).await?;
    tracing::info!(count, by = admin.id, "menu order updated");
    Ok(Json(MessageResponse::with_count("Menu order updated", count)))
}
