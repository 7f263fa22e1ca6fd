use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use validator::Validate;

use crate::models::MenuItem;

#[derive(Debug, Deserialize, Validate)]
pub struct NewMenuItem {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(max = 50))]
    pub icon: Option<String>,
    #[validate(length(max = 255))]
    pub path: Option<String>,
    pub parent_id: Option<i64>,
    #[serde(default)]
    pub sort_order: i32,
    #[serde(default = "default_visible")]
    pub is_visible: bool,
    #[validate(length(max = 50))]
    pub required_role: Option<String>,
    #[validate(length(max = 255))]
    pub component: Option<String>,
}

fn default_visible() -> bool { true }

/// Partial update. `parent_id: 0` moves the item to the top level.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct MenuItemUpdate {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    #[validate(length(max = 50))]
    pub icon: Option<String>,
    #[validate(length(max = 255))]
    pub path: Option<String>,
    pub parent_id: Option<i64>,
    pub sort_order: Option<i32>,
    pub is_visible: Option<bool>,
    #[validate(length(max = 50))]
    pub required_role: Option<String>,
    #[validate(length(max = 255))]
    pub component: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MenuSort {
    pub id: i64,
    pub sort_order: i32,
}

pub async fn list_all(pool: &PgPool) -> Result<Vec<MenuItem>, sqlx::Error> {
    sqlx::query_as::<_, MenuItem>("SELECT * FROM menu_items ORDER BY sort_order, id").fetch_all(pool).await
}

pub async fn list_visible(pool: &PgPool) -> Result<Vec<MenuItem>, sqlx::Error> {
    sqlx::query_as::<_, MenuItem>("SELECT * FROM menu_items WHERE is_visible ORDER BY sort_order, id").fetch_all(pool).await
}

pub async fn find(pool: &PgPool, id: i64) -> Result<Option<MenuItem>, sqlx::Error> {
    sqlx::query_as::<_, MenuItem>("SELECT * FROM menu_items WHERE id = $1").bind(id).fetch_optional(pool).await
}

pub async fn exists(pool: &PgPool, id: i64) -> Result<bool, sqlx::Error> {
    let row: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM menu_items WHERE id = $1)").bind(id).fetch_one(pool).await?;
    Ok(row.0)
}

/// Every `(id, parent_id)` pair, for cycle checks.
pub async fn links(pool: &PgPool) -> Result<Vec<(i64, Option<i64>)>, sqlx::Error> {
    sqlx::query_as("SELECT id, parent_id FROM menu_items").fetch_all(pool).await
}

pub async fn count_children(pool: &PgPool, id: i64) -> Result<i64, sqlx::Error> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM menu_items WHERE parent_id = $1").bind(id).fetch_one(pool).await?;
    Ok(row.0)
}

pub async fn insert(pool: &PgPool, new: &NewMenuItem) -> Result<MenuItem, sqlx::Error> {
    sqlx::query_as::<_, MenuItem>(
        "INSERT INTO menu_items (name, icon, path, parent_id, sort_order, is_visible, required_role, component)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING *",
    )
    .bind(new.name.trim())
    .bind(&new.icon)
    .bind(&new.path)
    .bind(new.parent_id.filter(|id| *id > 0))
    .bind(new.sort_order)
    .bind(new.is_visible)
    .bind(&new.required_role)
    .bind(&new.component)
    .fetch_one(pool)
    .await
}

pub async fn update(pool: &PgPool, id: i64, patch: &MenuItemUpdate) -> Result<Option<MenuItem>, sqlx::Error> {
    sqlx::query_as::<_, MenuItem>(
        "UPDATE menu_items SET
            name = COALESCE($2, name),
            icon = COALESCE($3, icon),
            path = COALESCE($4, path),
            parent_id = CASE WHEN $5::BIGINT IS NULL THEN parent_id WHEN $5 = 0 THEN NULL ELSE $5 END,
            sort_order = COALESCE($6, sort_order),
            is_visible = COALESCE($7, is_visible),
            required_role = COALESCE($8, required_role),
            component = COALESCE($9, component),
            updated_at = NOW()
         WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(patch.name.as_deref().map(str::trim))
    .bind(&patch.icon)
    .bind(&patch.path)
    .bind(patch.parent_id)
    .bind(patch.sort_order)
    .bind(patch.is_visible)
    .bind(&patch.required_role)
    .bind(&patch.component)
    .fetch_optional(pool)
    .await
}

pub async fn delete(pool: &PgPool, id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM menu_items WHERE id = $1").bind(id).execute(pool).await?;
    Ok(result.rows_affected() > 0)
}

/// Applies every sort order in one transaction. Unknown ids are ignored.
pub async fn apply_sort(pool: &PgPool, items: &[MenuSort]) -> Result<u64, sqlx::Error> {
    let mut tx = pool.begin().await?;
    let mut updated = 0;
    for item in items {
        let result = sqlx::query("UPDATE menu_items SET sort_order = $2, updated_at = NOW() WHERE id = $1")
            .bind(item.id)
            .bind(item.sort_order)
            .execute(&mut *tx)
            .await?;
        updated += result.rows_affected();
    }
    tx.commit().await?;
    Ok(updated)
}
