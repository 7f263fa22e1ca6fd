//! JSON row storage and the dynamic row query
//!
//! Rows live in `table_data.data` as JSONB. Queries project a field with
//! `data ->> $n`; fields typed `number` go through a guarded numeric cast so
//! non-numeric text yields NULL and never matches a comparison. Field names
//! and values are always bound, never spliced.

use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use thiserror::Error;

use crate::domain::aggregates::data_table::find_field;
use crate::domain::aggregates::{FieldConfig, JsonMap};
use crate::domain::value_objects::{FieldType, Page, SortOrder};
use crate::models::TableRow;

/// Text Postgres can cast to `numeric`: sign, decimal point, exponent.
const NUMERIC_PATTERN: &str = r"^\s*[-+]?([0-9]+\.?[0-9]*|\.[0-9]+)([eE][-+]?[0-9]{1,3})?\s*$";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOp { Eq, Ne, Contains, Gt, Gte, Lt, Lte }

impl FilterOp {
    fn parse(s: &str) -> Option<Self> {
        Some(match s.trim().to_ascii_lowercase().as_str() {
            "eq" | "=" => Self::Eq,
            "ne" | "!=" => Self::Ne,
            "contains" | "like" => Self::Contains,
            "gt" | ">" => Self::Gt,
            "gte" | ">=" => Self::Gte,
            "lt" | "<" => Self::Lt,
            "lte" | "<=" => Self::Lte,
            _ => return None,
        })
    }

    fn sql(self) -> &'static str {
        match self {
            Self::Eq => " = ",
            Self::Ne => " <> ",
            Self::Gt => " > ",
            Self::Gte => " >= ",
            Self::Lt => " < ",
            Self::Lte => " <= ",
            Self::Contains => " ILIKE ",
        }
    }

    fn is_ordering(self) -> bool { matches!(self, Self::Gt | Self::Gte | Self::Lt | Self::Lte) }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
    pub field: String,
    pub op: FilterOp,
    pub value: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    #[error("unknown filter operator {op:?} on field {field:?}")]
    UnknownOp { field: String, op: String },
    #[error("filter on field {0:?} must be a value or {{\"op\", \"value\"}}")]
    Malformed(String),
    #[error("filter on number field {field:?} needs a numeric value, got {value:?}")]
    NotNumeric { field: String, value: String },
}

/// Text form a JSON value takes under `->>`.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

/// Reads `{field: value}` and `{field: {"op": .., "value": ..}}` entries. Null values are dropped.
pub fn parse_filters(raw: &JsonMap) -> Result<Vec<FieldFilter>, FilterError> {
    let mut filters = Vec::with_capacity(raw.len());
    for (field, condition) in raw {
        let (op, value) = match condition {
            Value::Object(obj) => {
                let op = match obj.get("op") {
                    Some(Value::String(op)) => FilterOp::parse(op).ok_or_else(|| FilterError::UnknownOp { field: field.clone(), op: op.clone() })?,
                    None => FilterOp::Eq,
                    Some(_) => return Err(FilterError::Malformed(field.clone())),
                };
                let value = obj.get("value").ok_or_else(|| FilterError::Malformed(field.clone()))?;
                if value.is_object() || value.is_array() { return Err(FilterError::Malformed(field.clone())); }
                (op, value)
            }
            Value::Array(_) => return Err(FilterError::Malformed(field.clone())),
            value => (FilterOp::Eq, value),
        };
        if let Some(value) = scalar_text(value) {
            filters.push(FieldFilter { field: field.clone(), op, value });
        }
    }
    Ok(filters)
}

/// Resolved row query for one data table.
#[derive(Debug, Clone)]
pub struct RowQuery {
    pub data_table_id: i64,
    pub fields: Vec<FieldConfig>,
    pub filters: Vec<FieldFilter>,
    pub sort_by: Option<String>,
    pub sort_order: SortOrder,
    pub page: Page,
}

fn is_number_field(fields: &[FieldConfig], name: &str) -> bool {
    matches!(find_field(fields, name), Some(f) if f.field_type == FieldType::Number)
}

fn push_text_projection(qb: &mut QueryBuilder<'static, Postgres>, field: &str) {
    qb.push("(data ->> ").push_bind(field.to_string()).push(")");
}

fn push_numeric_projection(qb: &mut QueryBuilder<'static, Postgres>, field: &str) {
    qb.push("(CASE WHEN (data ->> ")
        .push_bind(field.to_string())
        .push(") ~ ")
        .push_bind(NUMERIC_PATTERN)
        .push(" THEN (data ->> ")
        .push_bind(field.to_string())
        .push(")::numeric END)");
}

/// Filter operand for a number field; `,` separators and exponents allowed.
fn parse_decimal(s: &str) -> Option<Decimal> {
    let cleaned: String = s.trim().chars().filter(|c| *c != ',').collect();
    cleaned.parse::<Decimal>().ok().or_else(|| Decimal::from_scientific(&cleaned).ok())
}

impl RowQuery {
    fn push_conditions(&self, qb: &mut QueryBuilder<'static, Postgres>) -> Result<(), FilterError> {
        qb.push(" WHERE data_table_id = ").push_bind(self.data_table_id);
        for filter in &self.filters {
            qb.push(" AND ");
            let numeric = is_number_field(&self.fields, &filter.field) && filter.op != FilterOp::Contains;
            let number = if numeric { parse_decimal(&filter.value) } else { None };
            match (filter.op, number) {
                (FilterOp::Contains, _) => {
                    push_text_projection(qb, &filter.field);
                    qb.push(filter.op.sql()).push_bind(super::contains_pattern(&filter.value));
                }
                (op, Some(number)) => {
                    push_numeric_projection(qb, &filter.field);
                    qb.push(op.sql()).push_bind(number);
                }
                (op, None) if numeric && op.is_ordering() => {
                    return Err(FilterError::NotNumeric { field: filter.field.clone(), value: filter.value.clone() });
                }
                (op, None) => {
                    push_text_projection(qb, &filter.field);
                    qb.push(op.sql()).push_bind(filter.value.clone());
                }
            }
        }
        Ok(())
    }

    pub fn select(&self) -> Result<QueryBuilder<'static, Postgres>, FilterError> {
        let mut qb = QueryBuilder::new("SELECT * FROM table_data");
        self.push_conditions(&mut qb)?;
        qb.push(" ORDER BY ");
        if let Some(sort_by) = self.sort_by.as_deref().filter(|s| !s.trim().is_empty()) {
            if is_number_field(&self.fields, sort_by) {
                push_numeric_projection(&mut qb, sort_by);
            } else {
                push_text_projection(&mut qb, sort_by);
            }
            qb.push(match self.sort_order {
                SortOrder::Asc => " ASC NULLS LAST, ",
                SortOrder::Desc => " DESC NULLS LAST, ",
            });
        }
        qb.push("id DESC LIMIT ").push_bind(self.page.limit).push(" OFFSET ").push_bind(self.page.skip);
        Ok(qb)
    }

    pub fn count(&self) -> Result<QueryBuilder<'static, Postgres>, FilterError> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM table_data");
        self.push_conditions(&mut qb)?;
        Ok(qb)
    }
}

pub async fn count(pool: &PgPool, data_table_id: i64) -> Result<i64, sqlx::Error> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM table_data WHERE data_table_id = $1")
        .bind(data_table_id).fetch_one(pool).await?;
    Ok(row.0)
}

/// Newest first.
pub async fn list(pool: &PgPool, data_table_id: i64, page: Page) -> Result<Vec<TableRow>, sqlx::Error> {
    sqlx::query_as::<_, TableRow>("SELECT * FROM table_data WHERE data_table_id = $1 ORDER BY id DESC LIMIT $2 OFFSET $3")
        .bind(data_table_id)
        .bind(page.limit)
        .bind(page.skip)
        .fetch_all(pool)
        .await
}

pub async fn find(pool: &PgPool, data_table_id: i64, id: i64) -> Result<Option<TableRow>, sqlx::Error> {
    sqlx::query_as::<_, TableRow>("SELECT * FROM table_data WHERE id = $1 AND data_table_id = $2")
        .bind(id).bind(data_table_id).fetch_optional(pool).await
}

pub async fn insert(conn: &mut PgConnection, data_table_id: i64, data: &JsonMap) -> Result<TableRow, sqlx::Error> {
    sqlx::query_as::<_, TableRow>("INSERT INTO table_data (data_table_id, data) VALUES ($1, $2) RETURNING *")
        .bind(data_table_id)
        .bind(Json(data))
        .fetch_one(conn)
        .await
}

pub async fn replace(pool: &PgPool, data_table_id: i64, id: i64, data: &JsonMap) -> Result<Option<TableRow>, sqlx::Error> {
    sqlx::query_as::<_, TableRow>(
        "UPDATE table_data SET data = $3, updated_at = NOW() WHERE id = $1 AND data_table_id = $2 RETURNING *",
    )
    .bind(id)
    .bind(data_table_id)
    .bind(Json(data))
    .fetch_optional(pool)
    .await
}

pub async fn delete(pool: &PgPool, data_table_id: i64, id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM table_data WHERE id = $1 AND data_table_id = $2")
        .bind(id).bind(data_table_id).execute(pool).await?;
    Ok(result.rows_affected() > 0)
}

pub async fn delete_all(conn: &mut PgConnection, data_table_id: i64) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM table_data WHERE data_table_id = $1").bind(data_table_id).execute(conn).await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields() -> Vec<FieldConfig> {
        vec![FieldConfig::new("sku", FieldType::Text, true), FieldConfig::new("stock", FieldType::Number, false)]
    }

    fn query(filters: Value) -> RowQuery {
        RowQuery {
            data_table_id: 7,
            fields: fields(),
            filters: parse_filters(filters.as_object().unwrap()).unwrap(),
            sort_by: None,
            sort_order: SortOrder::Desc,
            page: Page { skip: 0, limit: 20 },
        }
    }

    #[test]
    fn test_parse_filters() {
        let raw = json!({"sku": "A-1", "stock": {"op": "gte", "value": 5}, "note": null, "flag": true});
        let filters = parse_filters(raw.as_object().unwrap()).unwrap();
        assert_eq!(filters.len(), 3);
        assert!(filters.contains(&FieldFilter { field: "stock".into(), op: FilterOp::Gte, value: "5".into() }));
        assert!(filters.contains(&FieldFilter { field: "flag".into(), op: FilterOp::Eq, value: "true".into() }));

        let bad = json!({"sku": {"op": "regex", "value": "x"}});
        assert!(matches!(parse_filters(bad.as_object().unwrap()), Err(FilterError::UnknownOp { .. })));
        let bad = json!({"sku": [1, 2]});
        assert!(matches!(parse_filters(bad.as_object().unwrap()), Err(FilterError::Malformed(_))));
    }

    #[test]
    fn test_select_binds_everything() {
        let qb = query(json!({"sku": "A-1"})).select().unwrap();
        assert_eq!(
            qb.sql(),
            "SELECT * FROM table_data WHERE data_table_id = $1 AND (data ->> $2) = $3 ORDER BY id DESC LIMIT $4 OFFSET $5"
        );
    }

    #[test]
    fn test_numeric_comparison_uses_guarded_cast() {
        let qb = query(json!({"stock": {"op": "gt", "value": "10"}})).select().unwrap();
        assert_eq!(
            qb.sql(),
            "SELECT * FROM table_data WHERE data_table_id = $1 AND (CASE WHEN (data ->> $2) ~ $3 THEN (data ->> $4)::numeric END) > $5 ORDER BY id DESC LIMIT $6 OFFSET $7"
        );
    }

    #[test]
    fn test_contains_and_sort() {
        let mut q = query(json!({"sku": {"op": "contains", "value": "50%"}}));
        q.sort_by = Some("stock".into());
        q.sort_order = SortOrder::Asc;
        let sql = q.select().unwrap().sql().to_string();
        assert!(sql.contains("AND (data ->> $2) ILIKE $3"));
        assert!(sql.contains("ORDER BY (CASE WHEN (data ->> $4) ~ $5 THEN (data ->> $6)::numeric END) ASC NULLS LAST, id DESC"));
    }

    #[test]
    fn test_numeric_ordering_needs_number() {
        let q = query(json!({"stock": {"op": "lt", "value": "lots"}}));
        assert!(matches!(q.select(), Err(FilterError::NotNumeric { .. })));
        assert!(query(json!({"stock": "lots"})).count().is_ok());
    }

    #[test]
    fn test_numeric_operands() {
        assert_eq!(parse_decimal(" 1,200 "), Some(Decimal::from(1200)));
        assert_eq!(parse_decimal("1e3"), Some(Decimal::from(1000)));
        assert_eq!(parse_decimal("+3"), Some(Decimal::from(3)));
        assert!(parse_decimal("ten").is_none());
        assert!(query(json!({"stock": {"op": "gte", "value": "2.5e1"}})).select().is_ok());
    }

    #[test]
    fn test_count_query() {
        let qb = query(json!({"sku": {"op": "ne", "value": "B"}})).count().unwrap();
        assert_eq!(qb.sql(), "SELECT COUNT(*) FROM table_data WHERE data_table_id = $1 AND (data ->> $2) <> $3");
    }
}
