use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use validator::Validate;

use crate::domain::aggregates::FieldConfig;
use crate::domain::value_objects::Page;
use crate::models::{DataTable, Platform, Shop};

#[derive(Debug, Deserialize, Validate)]
pub struct NewDataTable {
    pub shop_id: i64,
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(min = 1, max = 50))]
    pub table_type: String,
    pub description: Option<String>,
    pub fields: Vec<FieldConfig>,
    #[serde(default)]
    pub sort_order: i32,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool { true }

#[derive(Debug, Default, Deserialize, Validate)]
pub struct DataTableUpdate {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 50))]
    pub table_type: Option<String>,
    pub description: Option<String>,
    pub fields: Option<Vec<FieldConfig>>,
    pub sort_order: Option<i32>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DataTableFilter {
    pub shop_id: Option<i64>,
    pub table_type: Option<String>,
}

/// Platform → shop → data table navigation tree.
#[derive(Debug, Serialize)]
pub struct PlatformNode {
    #[serde(flatten)]
    pub platform: Platform,
    pub shops: Vec<ShopNode>,
}

#[derive(Debug, Serialize)]
pub struct ShopNode {
    #[serde(flatten)]
    pub shop: Shop,
    pub data_tables: Vec<DataTable>,
}

pub fn list_query(filter: &DataTableFilter, page: Page) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new("SELECT * FROM data_tables WHERE 1=1");
    if let Some(shop_id) = filter.shop_id {
        qb.push(" AND shop_id = ").push_bind(shop_id);
    }
    if let Some(table_type) = filter.table_type.clone() {
        qb.push(" AND table_type = ").push_bind(table_type);
    }
    qb.push(" ORDER BY sort_order, id LIMIT ").push_bind(page.limit).push(" OFFSET ").push_bind(page.skip);
    qb
}

pub async fn list(pool: &PgPool, filter: &DataTableFilter, page: Page) -> Result<Vec<DataTable>, sqlx::Error> {
    let mut qb = list_query(filter, page);
    qb.build_query_as::<DataTable>().fetch_all(pool).await
}

pub async fn find(pool: &PgPool, id: i64) -> Result<Option<DataTable>, sqlx::Error> {
    sqlx::query_as::<_, DataTable>("SELECT * FROM data_tables WHERE id = $1").bind(id).fetch_optional(pool).await
}

/// First table of a type, optionally narrowed to a shop or an id, by sort order.
pub async fn find_for_query(pool: &PgPool, table_type: &str, shop_id: Option<i64>, id: Option<i64>) -> Result<Option<DataTable>, sqlx::Error> {
    sqlx::query_as::<_, DataTable>(
        "SELECT * FROM data_tables
         WHERE table_type = $1 AND ($2::BIGINT IS NULL OR shop_id = $2) AND ($3::BIGINT IS NULL OR id = $3)
         ORDER BY sort_order, id LIMIT 1",
    )
    .bind(table_type)
    .bind(shop_id)
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub async fn insert(pool: &PgPool, new: &NewDataTable) -> Result<DataTable, sqlx::Error> {
    sqlx::query_as::<_, DataTable>(
        "INSERT INTO data_tables (shop_id, name, table_type, description, fields, sort_order, is_active)
         VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING *",
    )
    .bind(new.shop_id)
    .bind(new.name.trim())
    .bind(new.table_type.trim())
    .bind(&new.description)
    .bind(Json(&new.fields))
    .bind(new.sort_order)
    .bind(new.is_active)
    .fetch_one(pool)
    .await
}

pub async fn update(pool: &PgPool, id: i64, patch: &DataTableUpdate) -> Result<Option<DataTable>, sqlx::Error> {
    sqlx::query_as::<_, DataTable>(
        "UPDATE data_tables SET
            name = COALESCE($2, name),
            table_type = COALESCE($3, table_type),
            description = COALESCE($4, description),
            fields = COALESCE($5, fields),
            sort_order = COALESCE($6, sort_order),
            is_active = COALESCE($7, is_active),
            updated_at = NOW()
         WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(patch.name.as_deref().map(str::trim))
    .bind(patch.table_type.as_deref().map(str::trim))
    .bind(&patch.description)
    .bind(patch.fields.as_ref().map(Json))
    .bind(patch.sort_order)
    .bind(patch.is_active)
    .fetch_optional(pool)
    .await
}

pub async fn delete(pool: &PgPool, id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM data_tables WHERE id = $1").bind(id).execute(pool).await?;
    Ok(result.rows_affected() > 0)
}

/// Active platforms, their active shops and active tables, each level by sort order.
pub async fn tree(pool: &PgPool, platform_id: Option<i64>) -> Result<Vec<PlatformNode>, sqlx::Error> {
    let platforms = sqlx::query_as::<_, Platform>(
        "SELECT * FROM platforms WHERE is_active AND ($1::BIGINT IS NULL OR id = $1) ORDER BY sort_order, id",
    )
    .bind(platform_id)
    .fetch_all(pool)
    .await?;
    let platform_ids: Vec<i64> = platforms.iter().map(|p| p.id).collect();

    let shops = sqlx::query_as::<_, Shop>("SELECT * FROM shops WHERE status = 'active' AND platform_id = ANY($1) ORDER BY id")
        .bind(&platform_ids)
        .fetch_all(pool)
        .await?;
    let shop_ids: Vec<i64> = shops.iter().map(|s| s.id).collect();

    let tables = sqlx::query_as::<_, DataTable>("SELECT * FROM data_tables WHERE is_active AND shop_id = ANY($1) ORDER BY sort_order, id")
        .bind(&shop_ids)
        .fetch_all(pool)
        .await?;

    Ok(assemble_tree(platforms, shops, tables))
}

fn assemble_tree(platforms: Vec<Platform>, shops: Vec<Shop>, tables: Vec<DataTable>) -> Vec<PlatformNode> {
    let mut shop_nodes: Vec<ShopNode> = shops.into_iter().map(|shop| ShopNode { shop, data_tables: Vec::new() }).collect();
    for table in tables {
        if let Some(node) = shop_nodes.iter_mut().find(|n| n.shop.id == table.shop_id) {
            node.data_tables.push(table);
        }
    }
    platforms
        .into_iter()
        .map(|platform| {
            let (mine, rest): (Vec<_>, Vec<_>) = shop_nodes.drain(..).partition(|n| n.shop.platform_id == Some(platform.id));
            shop_nodes = rest;
            PlatformNode { platform, shops: mine }
        })
        .collect()
}
