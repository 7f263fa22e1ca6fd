use serde::Deserialize;
use sqlx::PgPool;
use validator::Validate;

use crate::domain::value_objects::{Page, PlatformCode};
use crate::models::{Platform, Shop};

#[derive(Debug, Deserialize, Validate)]
pub struct NewPlatform {
    #[validate(length(min = 1, max = 50))]
    pub name: String,
    pub code: PlatformCode,
    #[validate(length(max = 255))]
    pub icon: Option<String>,
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub sort_order: i32,
    pub config: Option<serde_json::Value>,
}

fn default_true() -> bool { true }

#[derive(Debug, Default, Deserialize, Validate)]
pub struct PlatformUpdate {
    #[validate(length(min = 1, max = 50))]
    pub name: Option<String>,
    pub code: Option<PlatformCode>,
    #[validate(length(max = 255))]
    pub icon: Option<String>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
    pub sort_order: Option<i32>,
    pub config: Option<serde_json::Value>,
}

pub async fn list(pool: &PgPool, is_active: Option<bool>, page: Page) -> Result<Vec<Platform>, sqlx::Error> {
    sqlx::query_as::<_, Platform>(
        "SELECT * FROM platforms WHERE ($1::BOOLEAN IS NULL OR is_active = $1)
         ORDER BY sort_order, id LIMIT $2 OFFSET $3",
    )
    .bind(is_active)
    .bind(page.limit)
    .bind(page.skip)
    .fetch_all(pool)
    .await
}

pub async fn find(pool: &PgPool, id: i64) -> Result<Option<Platform>, sqlx::Error> {
    sqlx::query_as::<_, Platform>("SELECT * FROM platforms WHERE id = $1").bind(id).fetch_optional(pool).await
}

pub async fn code_taken(pool: &PgPool, code: &str, except_id: Option<i64>) -> Result<bool, sqlx::Error> {
    let row: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM platforms WHERE code = $1 AND ($2::BIGINT IS NULL OR id <> $2))")
        .bind(code).bind(except_id).fetch_one(pool).await?;
    Ok(row.0)
}

pub async fn name_taken(pool: &PgPool, name: &str, except_id: Option<i64>) -> Result<bool, sqlx::Error> {
    let row: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM platforms WHERE name = $1 AND ($2::BIGINT IS NULL OR id <> $2))")
        .bind(name).bind(except_id).fetch_one(pool).await?;
    Ok(row.0)
}

pub async fn insert(pool: &PgPool, new: &NewPlatform) -> Result<Platform, sqlx::Error> {
    sqlx::query_as::<_, Platform>(
        "INSERT INTO platforms (name, code, icon, description, is_active, sort_order, config)
         VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING *",
    )
    .bind(new.name.trim())
    .bind(new.code.as_str())
    .bind(&new.icon)
    .bind(&new.description)
    .bind(new.is_active)
    .bind(new.sort_order)
    .bind(&new.config)
    .fetch_one(pool)
    .await
}

pub async fn update(pool: &PgPool, id: i64, patch: &PlatformUpdate) -> Result<Option<Platform>, sqlx::Error> {
    sqlx::query_as::<_, Platform>(
        "UPDATE platforms SET
            name = COALESCE($2, name),
            code = COALESCE($3, code),
            icon = COALESCE($4, icon),
            description = COALESCE($5, description),
            is_active = COALESCE($6, is_active),
            sort_order = COALESCE($7, sort_order),
            config = COALESCE($8, config),
            updated_at = NOW()
         WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(patch.name.as_deref().map(str::trim))
    .bind(patch.code.as_ref().map(PlatformCode::as_str))
    .bind(&patch.icon)
    .bind(&patch.description)
    .bind(patch.is_active)
    .bind(patch.sort_order)
    .bind(&patch.config)
    .fetch_optional(pool)
    .await
}

pub async fn delete(pool: &PgPool, id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM platforms WHERE id = $1").bind(id).execute(pool).await?;
    Ok(result.rows_affected() > 0)
}

pub async fn count_shops(pool: &PgPool, id: i64) -> Result<i64, sqlx::Error> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM shops WHERE platform_id = $1").bind(id).fetch_one(pool).await?;
    Ok(row.0)
}

pub async fn shops(pool: &PgPool, id: i64) -> Result<Vec<Shop>, sqlx::Error> {
    sqlx::query_as::<_, Shop>("SELECT * FROM shops WHERE platform_id = $1 ORDER BY id").bind(id).fetch_all(pool).await
}
