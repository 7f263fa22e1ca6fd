use std::collections::BTreeMap;

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::Value;

use super::{ApiError, ApiResult, MessageResponse, ValidatedJson};
use crate::audit::AuditEntry;
use crate::auth::{AdminUser, CurrentUser};
use crate::db;
use crate::db::settings::{NewSetting, SettingUpdate};
use crate::domain::aggregates::setting::check_value;
use crate::models::SystemSetting;
use crate::AppState;

const TABLE: &str = "system_settings";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create).put(batch_update))
        .route("/:key", get(fetch).put(update).delete(remove))
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub group_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BatchUpdate {
    pub settings: BTreeMap<String, Value>,
}

/// Settings are stored as text; non-string JSON values keep their JSON spelling.
fn stored_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

async fn list(State(state): State<AppState>, user: CurrentUser, Query(params): Query<ListParams>) -> ApiResult<Json<Vec<SystemSetting>>> {
    let settings = db::settings::list(&state.db, params.group_name.as_deref(), !user.is_admin()).await?;
    Ok(Json(settings))
}

async fn fetch(State(state): State<AppState>, user: CurrentUser, Path(key): Path<String>) -> ApiResult<Json<SystemSetting>> {
    let setting = db::settings::find_by_key(&state.db, &key).await?.ok_or_else(|| ApiError::not_found("Setting"))?;
    if !setting.is_public && !user.is_admin() {
        return Err(ApiError::admin_required());
    }
    Ok(Json(setting))
}

async fn create(State(state): State<AppState>, admin: AdminUser, ValidatedJson(new): ValidatedJson<NewSetting>) -> ApiResult<Json<SystemSetting>> {
    check_value(new.value_type, new.value.as_deref())?;
    if db::settings::find_by_key(&state.db, new.key.trim()).await?.is_some() {
        return Err(ApiError::conflict(format!("Setting {} already exists", new.key.trim())));
    }
    let setting = db::settings::insert(&state.db, &new).await?;
    state.audit.record(AuditEntry::created(TABLE, setting.id, &setting).by(admin.id)).await;
    Ok(Json(setting))
}

async fn update(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(key): Path<String>,
    ValidatedJson(patch): ValidatedJson<SettingUpdate>,
) -> ApiResult<Json<SystemSetting>> {
    let old = db::settings::find_by_key(&state.db, &key).await?.ok_or_else(|| ApiError::not_found("Setting"))?;
    let value_type = patch.value_type.unwrap_or(old.value_type);
    check_value(value_type, patch.value.as_deref().or(old.value.as_deref()))?;
    let setting = db::settings::update(&state.db, old.id, &patch).await?.ok_or_else(|| ApiError::not_found("Setting"))?;
    state.audit.record(AuditEntry::updated(TABLE, setting.id, &old, &setting).by(admin.id)).await;
    Ok(Json(setting))
}

/// Writes every known key in one transaction; unknown keys are ignored.
async fn batch_update(State(state): State<AppState>, admin: AdminUser, Json(req): Json<BatchUpdate>) -> ApiResult<Json<MessageResponse>> {
    let mut tx = state.db.begin().await?;
    let mut changes = Vec::new();
    for (key, value) in req.settings {
        let Some(old) = db::settings::lock_by_key(&mut *tx, &key).await? else {
            tracing::debug!(key = %key, "ignoring unknown setting");
            continue;
        };
        let value = stored_text(value);
        check_value(old.value_type, value.as_deref())?;
        db::settings::set_value(&mut *tx, old.id, value.as_deref()).await?;
        changes.push((old, value));
    }
    tx.commit().await?;

    let count = changes.len() as u64;
    for (old, value) in changes {
        let mut new = old.clone();
        new.value = value;
        state.audit.record(AuditEntry::updated(TABLE, old.id, &old, &new).by(admin.id)).await;
    }
    Ok(Json(MessageResponse::with_count(format!("Updated {count} settings"), count)))
}

async fn remove(State(state): State<AppState>, admin: AdminUser, Path(key): Path<String>) -> ApiResult<Json<MessageResponse>> {
    let old = db::settings::find_by_key(&state.db, &key).await?.ok_or_else(|| ApiError::not_found("Setting"))?;
    db::settings::delete(&state.db, old.id).await?;
    state.audit.record(AuditEntry::deleted(TABLE, old.id, &old).by(admin.id)).await;
    Ok(Json(MessageResponse::new("Setting deleted")))
}
