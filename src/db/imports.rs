use sqlx::{PgConnection, PgPool};

use crate::domain::value_objects::{ErrorStrategy, ImportMode, ImportStatus, Page};
use crate::models::ImportRecord;

/// Summary of one import run, written to `import_history`.
#[derive(Debug, Clone)]
pub struct NewImportRecord {
    pub user_id: Option<i64>,
    pub file_name: String,
    pub target: String,
    pub data_table_id: Option<i64>,
    pub shop_id: Option<i64>,
    pub mode: ImportMode,
    pub strategy: ErrorStrategy,
    pub status: ImportStatus,
    pub total_rows: i32,
    pub success_rows: i32,
    pub error_message: Option<String>,
}

pub async fn insert(conn: &mut PgConnection, record: &NewImportRecord) -> Result<ImportRecord, sqlx::Error> {
    sqlx::query_as::<_, ImportRecord>(
        "INSERT INTO import_history
            (user_id, file_name, target, data_table_id, shop_id, mode, strategy, status, total_rows, success_rows, error_message)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) RETURNING *",
    )
    .bind(record.user_id)
    .bind(&record.file_name)
    .bind(&record.target)
    .bind(record.data_table_id)
    .bind(record.shop_id)
    .bind(record.mode.as_str())
    .bind(record.strategy.as_str())
    .bind(record.status.as_str())
    .bind(record.total_rows)
    .bind(record.success_rows)
    .bind(&record.error_message)
    .fetch_one(conn)
    .await
}

pub async fn list(pool: &PgPool, page: Page) -> Result<Vec<ImportRecord>, sqlx::Error> {
    sqlx::query_as::<_, ImportRecord>("SELECT * FROM import_history ORDER BY created_at DESC, id DESC LIMIT $1 OFFSET $2")
        .bind(page.limit)
        .bind(page.skip)
        .fetch_all(pool)
        .await
}

pub async fn count(pool: &PgPool) -> Result<i64, sqlx::Error> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM import_history").fetch_one(pool).await?;
    Ok(row.0)
}
