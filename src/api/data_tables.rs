use axum::extract::{Multipart, Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use super::imports::{data_table_target, run_import, Upload};
use super::{ApiError, ApiResult, MessageResponse, ValidatedJson};
use crate::audit::AuditEntry;
use crate::auth::{AdminUser, CurrentUser};
use crate::db;
use crate::db::data_tables::{DataTableFilter, DataTableUpdate, NewDataTable, PlatformNode};
use crate::domain::aggregates::data_table::{normalize_fields, validate_fields};
use crate::domain::value_objects::Page;
use crate::import::{describe, ImportReport, ParsedSheet};
use crate::models::DataTable;
use crate::AppState;

const TABLE: &str = "data_tables";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/tree", get(tree))
        .route("/parse-excel", post(parse_excel))
        .route("/import-data", post(import_data))
        .route("/:id", get(fetch).put(update).delete(remove))
}

#[derive(Debug, Deserialize)]
pub struct TreeParams {
    pub platform_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub shop_id: Option<i64>,
    pub table_type: Option<String>,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

async fn tree(State(state): State<AppState>, _user: CurrentUser, Query(params): Query<TreeParams>) -> ApiResult<Json<Vec<PlatformNode>>> {
    Ok(Json(db::data_tables::tree(&state.db, params.platform_id).await?))
}

async fn list(State(state): State<AppState>, _user: CurrentUser, Query(params): Query<ListParams>) -> ApiResult<Json<Vec<DataTable>>> {
    let filter = DataTableFilter { shop_id: params.shop_id, table_type: params.table_type };
    let page = Page::new(params.skip, params.limit, 100, 500);
    Ok(Json(db::data_tables::list(&state.db, &filter, page).await?))
}

async fn fetch(State(state): State<AppState>, _user: CurrentUser, Path(id): Path<i64>) -> ApiResult<Json<DataTable>> {
    let table = db::data_tables::find(&state.db, id).await?.ok_or_else(|| ApiError::not_found("Data table"))?;
    Ok(Json(table))
}

async fn create(State(state): State<AppState>, admin: AdminUser, ValidatedJson(mut new): ValidatedJson<NewDataTable>) -> ApiResult<Json<DataTable>> {
    normalize_fields(&mut new.fields);
    validate_fields(&new.fields)?;
    if db::shops::find(&state.db, new.shop_id).await?.is_none() {
        return Err(ApiError::not_found("Shop"));
    }
    let table = db::data_tables::insert(&state.db, &new).await?;
    state.audit.record(AuditEntry::created(TABLE, table.id, &table).by(admin.id)).await;
    Ok(Json(table))
}

async fn update(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<i64>,
    ValidatedJson(mut patch): ValidatedJson<DataTableUpdate>,
) -> ApiResult<Json<DataTable>> {
    if let Some(fields) = patch.fields.as_mut() {
        normalize_fields(fields);
        validate_fields(fields)?;
    }
    let old = db::data_tables::find(&state.db, id).await?.ok_or_else(|| ApiError::not_found("Data table"))?;
    let table = db::data_tables::update(&state.db, id, &patch).await?.ok_or_else(|| ApiError::not_found("Data table"))?;
    state.audit.record(AuditEntry::updated(TABLE, id, &old, &table).by(admin.id)).await;
    Ok(Json(table))
}

async fn remove(State(state): State<AppState>, admin: AdminUser, Path(id): Path<i64>) -> ApiResult<Json<MessageResponse>> {
    let old = db::data_tables::find(&state.db, id).await?.ok_or_else(|| ApiError::not_found("Data table"))?;
    db::data_tables::delete(&state.db, id).await?;
    state.audit.record(AuditEntry::deleted(TABLE, id, &old).by(admin.id)).await;
    Ok(Json(MessageResponse::new("Data table deleted")))
}

/// Suggests a field list for a new table from an uploaded spreadsheet.
async fn parse_excel(_user: CurrentUser, multipart: Multipart) -> ApiResult<Json<ParsedSheet>> {
    let upload = Upload::read(multipart).await?;
    let (file_name, sheet) = upload.into_sheet().await?;
    let parsed = describe(&sheet);
    tracing::info!(file = %file_name, columns = parsed.fields.len(), rows = parsed.total_rows, "spreadsheet parsed");
    Ok(Json(parsed))
}

async fn import_data(State(state): State<AppState>, user: CurrentUser, multipart: Multipart) -> ApiResult<Json<ImportReport>> {
    let upload = Upload::read(multipart).await?;
    let target = data_table_target(&state, upload.required("data_table_id")?).await?;
    run_import(&state, &user, target, upload).await
}
