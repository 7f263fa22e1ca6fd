//! Persisted entities, one struct per table row.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;

use crate::domain::aggregates::{FieldConfig, JsonMap};
use crate::domain::value_objects::{ActionType, ErrorStrategy, ImportMode, ImportStatus, Role, SettingValueType, ShopStatus};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Platform {
    pub id: i64, pub name: String, pub code: String, pub icon: Option<String>, pub description: Option<String>,
    pub is_active: bool, pub sort_order: i32, pub config: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>, pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: i64, pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub name: String,
    #[sqlx(try_from = "String")]
    pub role: Role,
    pub avatar: Option<String>, pub email: Option<String>, pub phone: Option<String>,
    pub permissions: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>, pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn is_admin(&self) -> bool { self.role == Role::Admin }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Shop {
    pub id: i64, pub name: String, pub platform_id: Option<i64>, pub account: Option<String>, pub manager_id: Option<i64>,
    #[sqlx(try_from = "String")]
    pub status: ShopStatus,
    pub created_at: DateTime<Utc>, pub updated_at: DateTime<Utc>,
}

/// Shop with its platform and manager names joined in.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ShopView {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub shop: Shop,
    pub platform_name: Option<String>,
    pub manager_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct MenuItem {
    pub id: i64, pub name: String, pub icon: Option<String>, pub path: Option<String>, pub parent_id: Option<i64>,
    pub sort_order: i32, pub is_visible: bool, pub required_role: Option<String>, pub component: Option<String>,
    pub created_at: DateTime<Utc>, pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SystemSetting {
    pub id: i64, pub key: String, pub value: Option<String>,
    #[sqlx(try_from = "String")]
    pub value_type: SettingValueType,
    pub description: Option<String>, pub group_name: Option<String>, pub is_public: bool,
    pub created_at: DateTime<Utc>, pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct DataTable {
    pub id: i64, pub shop_id: i64, pub name: String, pub table_type: String, pub description: Option<String>,
    pub fields: Json<Vec<FieldConfig>>,
    pub sort_order: i32, pub is_active: bool,
    pub created_at: DateTime<Utc>, pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct TableRow {
    pub id: i64, pub data_table_id: i64,
    pub data: Json<JsonMap>,
    pub created_at: DateTime<Utc>, pub updated_at: DateTime<Utc>,
}

impl TableRow {
    /// Row payload with `id` and the legacy `_id` alias merged in, as list endpoints return it.
    pub fn into_item(self) -> JsonMap {
        let mut item = self.data.0;
        item.insert("id".into(), self.id.into());
        item.insert("_id".into(), self.id.into());
        item
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Sale {
    pub id: i64, pub shop_id: i64, pub sku: Option<String>, pub product_title: String, pub order_id: Option<String>,
    pub quantity: i32, pub amount: Decimal, pub profit: Option<Decimal>, pub sale_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct OperationLog {
    pub id: i64, pub user_id: Option<i64>, pub user_name: Option<String>,
    #[sqlx(try_from = "String")]
    pub action_type: ActionType,
    pub table_name: String, pub record_id: Option<i64>,
    pub old_value: Option<serde_json::Value>, pub new_value: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ImportRecord {
    pub id: i64, pub user_id: Option<i64>, pub file_name: String, pub target: String,
    pub data_table_id: Option<i64>, pub shop_id: Option<i64>,
    #[sqlx(try_from = "String")]
    pub mode: ImportMode,
    #[sqlx(try_from = "String")]
    pub strategy: ErrorStrategy,
    #[sqlx(try_from = "String")]
    pub status: ImportStatus,
    pub total_rows: i32, pub success_rows: i32, pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_row_item_merges_ids() {
        let mut data = JsonMap::new();
        data.insert("sku".into(), "A-1".into());
        let row = TableRow { id: 7, data_table_id: 1, data: Json(data), created_at: Utc::now(), updated_at: Utc::now() };
        let item = row.into_item();
        assert_eq!(item["id"], 7);
        assert_eq!(item["_id"], 7);
        assert_eq!(item["sku"], "A-1");
    }

    #[test]
    fn test_user_hides_password_hash() {
        let user = User {
            id: 1, username: "admin".into(), password_hash: "$argon2id$secret".into(), name: "Admin".into(), role: Role::Admin,
            avatar: None, email: None, phone: None, permissions: None, created_at: Utc::now(), updated_at: Utc::now(),
        };
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["role"], "admin");
    }
}
