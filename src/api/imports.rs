//! Spreadsheet uploads
//!
//! `Upload` collects a multipart body (one `file` part plus text parts) and is
//! shared with the data table endpoints.

use std::collections::HashMap;
use std::str::FromStr;

use axum::extract::{Multipart, Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{ApiError, ApiResult, Paginated};
use crate::auth::CurrentUser;
use crate::db;
use crate::domain::aggregates::{FieldConfig, JsonMap};
use crate::domain::value_objects::{ErrorStrategy, FieldType, ImportMode, Page};
use crate::import::{self, sales_fields, ImportOptions, ImportReport, ImportTarget, Sheet};
use crate::models::ImportRecord;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/upload", post(upload))
        .route("/history", get(history))
        .route("/templates/:target", get(template))
}

#[derive(Debug, Default)]
pub struct Upload {
    pub file_name: String,
    pub bytes: Vec<u8>,
    fields: HashMap<String, String>,
}

impl Upload {
    pub async fn read(mut multipart: Multipart) -> ApiResult<Self> {
        let mut upload = Upload::default();
        let mut has_file = false;
        while let Some(field) = multipart.next_field().await? {
            let Some(name) = field.name().map(str::to_string) else { continue };
            if name == "file" {
                upload.file_name = field.file_name().unwrap_or_default().to_string();
                upload.bytes = field.bytes().await?.to_vec();
                has_file = true;
            } else {
                let value = field.text().await?;
                upload.fields.insert(name, value.trim().to_string());
            }
        }
        if !has_file {
            return Err(ApiError::bad_request("Missing multipart field \"file\""));
        }
        if upload.bytes.is_empty() {
            return Err(ApiError::bad_request("Uploaded file is empty"));
        }
        Ok(upload)
    }

    /// Parses a text part. Absent or blank parts are `None`.
    pub fn field<T>(&self, name: &str) -> ApiResult<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.fields.get(name).filter(|v| !v.is_empty()) {
            None => Ok(None),
            Some(raw) => raw.parse().map(Some).map_err(|e| ApiError::bad_request(format!("Invalid {name}: {e}"))),
        }
    }

    pub fn required<T>(&self, name: &str) -> ApiResult<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.field(name)?.ok_or_else(|| ApiError::bad_request(format!("Missing multipart field \"{name}\"")))
    }

    /// Decodes the file off the async runtime.
    pub async fn into_sheet(self) -> ApiResult<(String, Sheet)> {
        let Upload { file_name, bytes, .. } = self;
        let name = file_name.clone();
        let sheet = tokio::task::spawn_blocking(move || Sheet::parse(&name, bytes))
            .await
            .map_err(|e| ApiError::Internal(format!("spreadsheet decoder panicked: {e}")))??;
        Ok((file_name, sheet))
    }
}

/// Runs `target` over the uploaded file and publishes the outcome.
pub async fn run_import(state: &AppState, user: &CurrentUser, target: ImportTarget, upload: Upload) -> ApiResult<Json<ImportReport>> {
    let mode: ImportMode = upload.field("mode")?.unwrap_or_default();
    let strategy: ErrorStrategy = upload.field("strategy")?.unwrap_or_default();
    let (file_name, sheet) = upload.into_sheet().await?;
    let options = ImportOptions { file_name, mode, strategy, user_id: Some(user.id) };
    let report = import::execute(&state.db, &target, &sheet, &options).await?;
    state.audit.publish(&report.to_event(&target)).await;
    Ok(Json(report))
}

/// Resolves a data table import target, rejecting tables without fields.
pub async fn data_table_target(state: &AppState, data_table_id: i64) -> ApiResult<ImportTarget> {
    let table = db::data_tables::find(&state.db, data_table_id).await?.ok_or_else(|| ApiError::not_found("Data table"))?;
    Ok(ImportTarget::DataTable { id: table.id, fields: table.fields.0 })
}

/// `target` is `sales` (needs `shop_id`) or `data_table` (needs `data_table_id`).
async fn upload(State(state): State<AppState>, user: CurrentUser, multipart: Multipart) -> ApiResult<Json<ImportReport>> {
    let upload = Upload::read(multipart).await?;
    let target_name: String = upload.field("target")?.unwrap_or_else(|| "sales".to_string());
    let target = match target_name.as_str() {
        "sales" => {
            let shop_id: i64 = upload.required("shop_id")?;
            if db::shops::find(&state.db, shop_id).await?.is_none() {
                return Err(ApiError::not_found("Shop"));
            }
            ImportTarget::Sales { shop_id }
        }
        "data_table" | "data-table" => data_table_target(&state, upload.required("data_table_id")?).await?,
        other => return Err(ApiError::bad_request(format!("Unknown import target {other:?}; use sales or data_table"))),
    };
    run_import(&state, &user, target, upload).await
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

async fn history(State(state): State<AppState>, _user: CurrentUser, Query(params): Query<HistoryParams>) -> ApiResult<Json<Paginated<ImportRecord>>> {
    let page = Page::new(params.skip, params.limit, 20, 100);
    let total = db::imports::count(&state.db).await?;
    let items = db::imports::list(&state.db, page).await?;
    Ok(Json(Paginated { total, items, skip: page.skip, limit: page.limit }))
}

#[derive(Debug, Serialize)]
pub struct ImportTemplate {
    pub target: String,
    pub columns: Vec<FieldConfig>,
    pub example: JsonMap,
}

fn example_value(field: &FieldConfig) -> Value {
    match field.field_type {
        FieldType::Text => json!(format!("{} example", field.name)),
        FieldType::Number => json!(1),
        FieldType::Date => json!(Utc::now().date_naive().format("%Y-%m-%d").to_string()),
        FieldType::Boolean => json!(true),
    }
}

fn sales_example() -> JsonMap {
    let mut example = JsonMap::new();
    example.insert("sku".into(), json!("SKU-001"));
    example.insert("product_title".into(), json!("Sample product"));
    example.insert("order_id".into(), json!("ORD-10001"));
    example.insert("quantity".into(), json!(2));
    example.insert("amount".into(), json!(59.8));
    example.insert("profit".into(), json!(12.5));
    example.insert("sale_date".into(), json!(Utc::now().date_naive().format("%Y-%m-%d").to_string()));
    example
}

/// Column list plus an example row for `sales` or `data-table:{id}`.
async fn template(State(state): State<AppState>, _user: CurrentUser, Path(target): Path<String>) -> ApiResult<Json<ImportTemplate>> {
    if target == "sales" {
        return Ok(Json(ImportTemplate { target, columns: sales_fields(), example: sales_example() }));
    }
    let id = target
        .strip_prefix("data-table:")
        .and_then(|id| id.parse::<i64>().ok())
        .ok_or_else(|| ApiError::bad_request(format!("Unknown template {target:?}; use sales or data-table:{{id}}")))?;
    let table = db::data_tables::find(&state.db, id).await?.ok_or_else(|| ApiError::not_found("Data table"))?;
    let columns = table.fields.0;
    let example = columns.iter().map(|f| (f.name.clone(), example_value(f))).collect();
    Ok(Json(ImportTemplate { target, columns, example }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_fields() {
        let mut upload = Upload::default();
        upload.fields.insert("mode".into(), "overwrite".into());
        upload.fields.insert("shop_id".into(), "x1".into());
        upload.fields.insert("strategy".into(), "".into());
        assert_eq!(upload.field::<ImportMode>("mode").unwrap(), Some(ImportMode::Overwrite));
        assert_eq!(upload.field::<ErrorStrategy>("strategy").unwrap(), None);
        assert!(upload.field::<i64>("shop_id").is_err());
        assert!(upload.required::<i64>("data_table_id").is_err());
    }

    #[test]
    fn test_sales_example_covers_every_column() {
        let example = sales_example();
        for field in sales_fields() {
            assert!(example.contains_key(&field.name), "{}", field.name);
        }
        assert_eq!(example_value(&FieldConfig::new("stock", FieldType::Number, true)), json!(1));
    }
}
