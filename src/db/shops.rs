use serde::Deserialize;
use sqlx::{PgPool, Postgres, QueryBuilder};
use validator::Validate;

use crate::domain::value_objects::{Page, ShopStatus};
use crate::models::{Shop, ShopView};

#[derive(Debug, Deserialize, Validate)]
pub struct NewShop {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    pub platform_id: i64,
    #[validate(length(max = 100))]
    pub account: Option<String>,
    pub manager_id: Option<i64>,
    #[serde(default)]
    pub status: ShopStatus,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct ShopUpdate {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    pub platform_id: Option<i64>,
    #[validate(length(max = 100))]
    pub account: Option<String>,
    pub manager_id: Option<i64>,
    pub status: Option<ShopStatus>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ShopFilter {
    pub platform_id: Option<i64>,
    pub status: Option<ShopStatus>,
}

const VIEW_SELECT: &str = "SELECT s.*, p.name AS platform_name, u.name AS manager_name
    FROM shops s
    LEFT JOIN platforms p ON p.id = s.platform_id
    LEFT JOIN users u ON u.id = s.manager_id";

pub fn list_query(filter: &ShopFilter, page: Page) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(VIEW_SELECT);
    qb.push(" WHERE 1=1");
    if let Some(platform_id) = filter.platform_id {
        qb.push(" AND s.platform_id = ").push_bind(platform_id);
    }
    if let Some(status) = filter.status {
        qb.push(" AND s.status = ").push_bind(status.as_str());
    }
    qb.push(" ORDER BY s.id LIMIT ").push_bind(page.limit).push(" OFFSET ").push_bind(page.skip);
    qb
}

pub async fn list(pool: &PgPool, filter: &ShopFilter, page: Page) -> Result<Vec<ShopView>, sqlx::Error> {
    let mut qb = list_query(filter, page);
    qb.build_query_as::<ShopView>().fetch_all(pool).await
}

pub async fn find(pool: &PgPool, id: i64) -> Result<Option<Shop>, sqlx::Error> {
    sqlx::query_as::<_, Shop>("SELECT * FROM shops WHERE id = $1").bind(id).fetch_optional(pool).await
}

pub async fn find_view(pool: &PgPool, id: i64) -> Result<Option<ShopView>, sqlx::Error> {
    sqlx::query_as::<_, ShopView>(&format!("{VIEW_SELECT} WHERE s.id = $1")).bind(id).fetch_optional(pool).await
}

pub async fn name_taken(pool: &PgPool, name: &str, except_id: Option<i64>) -> Result<bool, sqlx::Error> {
    let row: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM shops WHERE name = $1 AND ($2::BIGINT IS NULL OR id <> $2))")
        .bind(name).bind(except_id).fetch_one(pool).await?;
    Ok(row.0)
}

pub async fn count(pool: &PgPool) -> Result<i64, sqlx::Error> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM shops").fetch_one(pool).await?;
    Ok(row.0)
}

pub async fn insert(pool: &PgPool, new: &NewShop) -> Result<Shop, sqlx::Error> {
    sqlx::query_as::<_, Shop>(
        "INSERT INTO shops (name, platform_id, account, manager_id, status)
         VALUES ($1, $2, $3, $4, $5) RETURNING *",
    )
    .bind(new.name.trim())
    .bind(new.platform_id)
    .bind(&new.account)
    .bind(new.manager_id)
    .bind(new.status.as_str())
    .fetch_one(pool)
    .await
}

pub async fn update(pool: &PgPool, id: i64, patch: &ShopUpdate) -> Result<Option<Shop>, sqlx::Error> {
    sqlx::query_as::<_, Shop>(
        "UPDATE shops SET
            name = COALESCE($2, name),
            platform_id = COALESCE($3, platform_id),
            account = COALESCE($4, account),
            manager_id = COALESCE($5, manager_id),
            status = COALESCE($6, status),
            updated_at = NOW()
         WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(patch.name.as_deref().map(str::trim))
    .bind(patch.platform_id)
    .bind(&patch.account)
    .bind(patch.manager_id)
    .bind(patch.status.map(|s| s.as_str()))
    .fetch_optional(pool)
    .await
}

pub async fn delete(pool: &PgPool, id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM shops WHERE id = $1").bind(id).execute(pool).await?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_query_filters() {
        let filter = ShopFilter { platform_id: Some(2), status: Some(ShopStatus::Active) };
        let qb = list_query(&filter, Page { skip: 10, limit: 5 });
        let sql = qb.sql();
        assert!(sql.ends_with("WHERE 1=1 AND s.platform_id = $1 AND s.status = $2 ORDER BY s.id LIMIT $3 OFFSET $4"));
        assert!(sql.contains("p.name AS platform_name"));
    }

    #[test]
    fn test_new_shop_status_default() {
        let new: NewShop = serde_json::from_value(serde_json::json!({"name": "Flagship", "platform_id": 1})).unwrap();
        assert_eq!(new.status, ShopStatus::Active);
        assert!(new.validate().is_ok());
    }
}
