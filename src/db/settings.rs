use serde::Deserialize;
use sqlx::{PgConnection, PgPool};
use validator::Validate;

use crate::domain::value_objects::SettingValueType;
use crate::models::SystemSetting;

#[derive(Debug, Deserialize, Validate)]
pub struct NewSetting {
    #[validate(length(min = 1, max = 100))]
    pub key: String,
    pub value: Option<String>,
    #[serde(default)]
    pub value_type: SettingValueType,
    #[validate(length(max = 255))]
    pub description: Option<String>,
    #[validate(length(max = 50))]
    pub group_name: Option<String>,
    #[serde(default)]
    pub is_public: bool,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct SettingUpdate {
    pub value: Option<String>,
    pub value_type: Option<SettingValueType>,
    #[validate(length(max = 255))]
    pub description: Option<String>,
    #[validate(length(max = 50))]
    pub group_name: Option<String>,
    pub is_public: Option<bool>,
}

pub async fn list(pool: &PgPool, group_name: Option<&str>, public_only: bool) -> Result<Vec<SystemSetting>, sqlx::Error> {
    sqlx::query_as::<_, SystemSetting>(
        "SELECT * FROM system_settings
         WHERE ($1::TEXT IS NULL OR group_name = $1) AND (NOT $2 OR is_public)
         ORDER BY group_name NULLS LAST, key",
    )
    .bind(group_name)
    .bind(public_only)
    .fetch_all(pool)
    .await
}

pub async fn find_by_key(pool: &PgPool, key: &str) -> Result<Option<SystemSetting>, sqlx::Error> {
    sqlx::query_as::<_, SystemSetting>("SELECT * FROM system_settings WHERE key = $1").bind(key).fetch_optional(pool).await
}

pub async fn lock_by_key(conn: &mut PgConnection, key: &str) -> Result<Option<SystemSetting>, sqlx::Error> {
    sqlx::query_as::<_, SystemSetting>("SELECT * FROM system_settings WHERE key = $1 FOR UPDATE")
        .bind(key)
        .fetch_optional(conn)
        .await
}

pub async fn insert(pool: &PgPool, new: &NewSetting) -> Result<SystemSetting, sqlx::Error> {
    sqlx::query_as::<_, SystemSetting>(
        "INSERT INTO system_settings (key, value, value_type, description, group_name, is_public)
         VALUES ($1, $2, $3, $4, $5, $6) RETURNING *",
    )
    .bind(new.key.trim())
    .bind(&new.value)
    .bind(new.value_type.as_str())
    .bind(&new.description)
    .bind(&new.group_name)
    .bind(new.is_public)
    .fetch_one(pool)
    .await
}

pub async fn update(pool: &PgPool, id: i64, patch: &SettingUpdate) -> Result<Option<SystemSetting>, sqlx::Error> {
    sqlx::query_as::<_, SystemSetting>(
        "UPDATE system_settings SET
            value = COALESCE($2, value),
            value_type = COALESCE($3, value_type),
            description = COALESCE($4, description),
            group_name = COALESCE($5, group_name),
            is_public = COALESCE($6, is_public),
            updated_at = NOW()
         WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(&patch.value)
    .bind(patch.value_type.map(|t| t.as_str()))
    .bind(&patch.description)
    .bind(&patch.group_name)
    .bind(patch.is_public)
    .fetch_optional(pool)
    .await
}

pub async fn set_value(conn: &mut PgConnection, id: i64, value: Option<&str>) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE system_settings SET value = $2, updated_at = NOW() WHERE id = $1")
        .bind(id)
        .bind(value)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn delete(pool: &PgPool, id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM system_settings WHERE id = $1").bind(id).execute(pool).await?;
    Ok(result.rows_affected() > 0)
}
