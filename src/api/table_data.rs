use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{ApiError, ApiResult, MessageResponse, ValidatedJson};
use crate::audit::AuditEntry;
use crate::auth::CurrentUser;
use crate::db;
use crate::db::table_data::{parse_filters, RowQuery};
use crate::domain::aggregates::data_table::{normalize_row, validate_row};
use crate::domain::aggregates::{FieldConfig, JsonMap};
use crate::domain::value_objects::{Page, SortOrder};
use crate::models::{DataTable, TableRow};
use crate::AppState;

const TABLE: &str = "table_data";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/query", post(query))
        .route("/:table_id/data", get(list).post(create))
        .route("/:table_id/data/:row_id", get(fetch).put(replace).delete(remove))
}

#[derive(Debug, Deserialize, Validate)]
pub struct RowPayload {
    pub data: JsonMap,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct QueryRequest {
    #[validate(length(min = 1))]
    pub table_type: String,
    pub shop_id: Option<i64>,
    pub data_table_id: Option<i64>,
    #[serde(default)]
    pub filters: Option<JsonMap>,
    pub sort_by: Option<String>,
    #[serde(default)]
    pub sort_order: SortOrder,
    #[validate(range(min = 0))]
    pub skip: Option<i64>,
    #[validate(range(min = 1, max = 100))]
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct RowPage {
    pub total: i64,
    pub items: Vec<JsonMap>,
    pub skip: i64,
    pub limit: i64,
    pub fields: Vec<FieldConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_table: Option<TableSummary>,
}

#[derive(Debug, Serialize)]
pub struct TableSummary {
    pub id: i64,
    pub name: String,
    pub table_type: String,
    pub shop_id: i64,
}

impl From<&DataTable> for TableSummary {
    fn from(table: &DataTable) -> Self {
        Self { id: table.id, name: table.name.clone(), table_type: table.table_type.clone(), shop_id: table.shop_id }
    }
}

async fn load_table(state: &AppState, table_id: i64) -> ApiResult<DataTable> {
    db::data_tables::find(&state.db, table_id).await?.ok_or_else(|| ApiError::not_found("Data table"))
}

async fn list(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(table_id): Path<i64>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<RowPage>> {
    let table = load_table(&state, table_id).await?;
    let page = Page::new(params.skip, params.limit, 20, 1000);
    let total = db::table_data::count(&state.db, table_id).await?;
    let rows = db::table_data::list(&state.db, table_id, page).await?;
    Ok(Json(RowPage {
        total,
        items: rows.into_iter().map(TableRow::into_item).collect(),
        skip: page.skip,
        limit: page.limit,
        fields: table.fields.0,
        data_table: None,
    }))
}

async fn create(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(table_id): Path<i64>,
    ValidatedJson(mut payload): ValidatedJson<RowPayload>,
) -> ApiResult<Json<JsonMap>> {
    let table = load_table(&state, table_id).await?;
    validate_row(&table.fields, &payload.data)?;
    normalize_row(&table.fields, &mut payload.data);
    let mut conn = state.db.acquire().await?;
    let row = db::table_data::insert(&mut *conn, table_id, &payload.data).await?;
    drop(conn);
    state.audit.record(AuditEntry::created(TABLE, row.id, &row.data).by(user.id)).await;
    Ok(Json(row.into_item()))
}

async fn fetch(State(state): State<AppState>, _user: CurrentUser, Path((table_id, row_id)): Path<(i64, i64)>) -> ApiResult<Json<JsonMap>> {
    let row = db::table_data::find(&state.db, table_id, row_id).await?.ok_or_else(|| ApiError::not_found("Row"))?;
    Ok(Json(row.into_item()))
}

async fn replace(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((table_id, row_id)): Path<(i64, i64)>,
    ValidatedJson(mut payload): ValidatedJson<RowPayload>,
) -> ApiResult<Json<JsonMap>> {
    let table = load_table(&state, table_id).await?;
    let old = db::table_data::find(&state.db, table_id, row_id).await?.ok_or_else(|| ApiError::not_found("Row"))?;
    validate_row(&table.fields, &payload.data)?;
    normalize_row(&table.fields, &mut payload.data);
    let row = db::table_data::replace(&state.db, table_id, row_id, &payload.data)
        .await?
        .ok_or_else(|| ApiError::not_found("Row"))?;
    state.audit.record(AuditEntry::updated(TABLE, row_id, &old.data, &row.data).by(user.id)).await;
    Ok(Json(row.into_item()))
}

async fn remove(State(state): State<AppState>, user: CurrentUser, Path((table_id, row_id)): Path<(i64, i64)>) -> ApiResult<Json<MessageResponse>> {
    let old = db::table_data::find(&state.db, table_id, row_id).await?.ok_or_else(|| ApiError::not_found("Row"))?;
    db::table_data::delete(&state.db, table_id, row_id).await?;
    state.audit.record(AuditEntry::deleted(TABLE, row_id, &old.data).by(user.id)).await;
    Ok(Json(MessageResponse::new("Row deleted")))
}

async fn query(State(state): State<AppState>, _user: CurrentUser, ValidatedJson(req): ValidatedJson<QueryRequest>) -> ApiResult<Json<RowPage>> {
    let filters = req.filters.as_ref().map(parse_filters).transpose()?.unwrap_or_default();
    let table = db::data_tables::find_for_query(&state.db, req.table_type.trim(), req.shop_id, req.data_table_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Data table of type {}", req.table_type.trim())))?;

    let page = Page::new(req.skip, req.limit, 20, 100);
    let row_query = RowQuery {
        data_table_id: table.id,
        fields: table.fields.0.clone(),
        filters,
        sort_by: req.sort_by,
        sort_order: req.sort_order,
        page,
    };
    let mut count_query = row_query.count()?;
    let mut select_query = row_query.select()?;

    let total: i64 = count_query.build_query_scalar().fetch_one(&state.db).await?;
    let rows: Vec<TableRow> = select_query.build_query_as().fetch_all(&state.db).await?;

    Ok(Json(RowPage {
        total,
        items: rows.into_iter().map(TableRow::into_item).collect(),
        skip: page.skip,
        limit: page.limit,
        data_table: Some(TableSummary::from(&table)),
        fields: row_query.fields,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_request_limits() {
        let req: QueryRequest = serde_json::from_value(json!({"table_type": "inventory", "limit": 101})).unwrap();
        assert!(req.validate().is_err());
        let req: QueryRequest = serde_json::from_value(json!({"table_type": "inventory", "skip": 0, "limit": 100})).unwrap();
        assert!(req.validate().is_ok());
        assert_eq!(req.sort_order, SortOrder::Desc);
        let req: QueryRequest = serde_json::from_value(json!({"table_type": "inventory", "skip": -1})).unwrap();
        assert!(req.validate().is_err());
    }
}
