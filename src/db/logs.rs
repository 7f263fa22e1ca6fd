use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::collections::BTreeMap;

use crate::audit::AuditEntry;
use crate::domain::value_objects::{ActionType, Page};
use crate::models::OperationLog;

#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    pub user_id: Option<i64>,
    pub action_type: Option<ActionType>,
    pub table_name: Option<String>,
    /// Inclusive lower bound.
    pub from: Option<DateTime<Utc>>,
    /// Exclusive upper bound.
    pub until: Option<DateTime<Utc>>,
}

impl LogFilter {
    fn push_where(&self, qb: &mut QueryBuilder<'static, Postgres>) {
        qb.push(" WHERE 1=1");
        if let Some(user_id) = self.user_id {
            qb.push(" AND l.user_id = ").push_bind(user_id);
        }
        if let Some(action) = self.action_type {
            qb.push(" AND l.action_type = ").push_bind(action.as_str());
        }
        if let Some(table_name) = self.table_name.clone() {
            qb.push(" AND l.table_name = ").push_bind(table_name);
        }
        if let Some(from) = self.from {
            qb.push(" AND l.created_at >= ").push_bind(from);
        }
        if let Some(until) = self.until {
            qb.push(" AND l.created_at < ").push_bind(until);
        }
    }
}

pub async fn insert(pool: &PgPool, entry: &AuditEntry) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO operation_logs (user_id, action_type, table_name, record_id, old_value, new_value)
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(entry.user_id)
    .bind(entry.action.as_str())
    .bind(entry.table_name)
    .bind(entry.record_id)
    .bind(&entry.old_value)
    .bind(&entry.new_value)
    .execute(pool)
    .await?;
    Ok(())
}

pub fn list_query(filter: &LogFilter, page: Page) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new("SELECT l.*, u.name AS user_name FROM operation_logs l LEFT JOIN users u ON u.id = l.user_id");
    filter.push_where(&mut qb);
    qb.push(" ORDER BY l.created_at DESC, l.id DESC LIMIT ").push_bind(page.limit).push(" OFFSET ").push_bind(page.skip);
    qb
}

pub async fn list(pool: &PgPool, filter: &LogFilter, page: Page) -> Result<Vec<OperationLog>, sqlx::Error> {
    let mut qb = list_query(filter, page);
    qb.build_query_as::<OperationLog>().fetch_all(pool).await
}

pub async fn count(pool: &PgPool, filter: &LogFilter) -> Result<i64, sqlx::Error> {
    let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM operation_logs l");
    filter.push_where(&mut qb);
    let row: (i64,) = qb.build_query_as().fetch_one(pool).await?;
    Ok(row.0)
}

pub async fn find(pool: &PgPool, id: i64) -> Result<Option<OperationLog>, sqlx::Error> {
    sqlx::query_as::<_, OperationLog>(
        "SELECT l.*, u.name AS user_name FROM operation_logs l LEFT JOIN users u ON u.id = l.user_id WHERE l.id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct UserStat {
    pub user_id: Option<i64>,
    pub user_name: Option<String>,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogStats {
    pub total: i64,
    pub action_stats: BTreeMap<String, i64>,
    pub table_stats: BTreeMap<String, i64>,
    pub user_stats: Vec<UserStat>,
}

pub async fn stats(pool: &PgPool, filter: &LogFilter) -> Result<LogStats, sqlx::Error> {
    let mut qb = QueryBuilder::new("SELECT l.action_type, COUNT(*) FROM operation_logs l");
    filter.push_where(&mut qb);
    qb.push(" GROUP BY l.action_type");
    let by_action: Vec<(String, i64)> = qb.build_query_as().fetch_all(pool).await?;

    let mut qb = QueryBuilder::new("SELECT l.table_name, COUNT(*) FROM operation_logs l");
    filter.push_where(&mut qb);
    qb.push(" GROUP BY l.table_name");
    let by_table: Vec<(String, i64)> = qb.build_query_as().fetch_all(pool).await?;

    let mut qb = QueryBuilder::new(
        "SELECT l.user_id, MAX(u.name) AS user_name, COUNT(*) AS count FROM operation_logs l LEFT JOIN users u ON u.id = l.user_id",
    );
    filter.push_where(&mut qb);
    qb.push(" GROUP BY l.user_id ORDER BY count DESC");
    let user_stats: Vec<UserStat> = qb.build_query_as().fetch_all(pool).await?;

    Ok(assemble_stats(by_action, by_table, user_stats))
}

/// Every action type appears in `action_stats`, zero when absent.
fn assemble_stats(by_action: Vec<(String, i64)>, by_table: Vec<(String, i64)>, user_stats: Vec<UserStat>) -> LogStats {
    let mut action_stats: BTreeMap<String, i64> = ActionType::ALL.iter().map(|a| (a.as_str().to_string(), 0)).collect();
    action_stats.extend(by_action);
    let total = action_stats.values().sum();
    LogStats { total, action_stats, table_stats: by_table.into_iter().collect(), user_stats }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_query() {
        let filter = LogFilter { action_type: Some(ActionType::Delete), table_name: Some("shops".into()), ..Default::default() };
        let qb = list_query(&filter, Page { skip: 50, limit: 50 });
        assert!(qb.sql().contains("WHERE 1=1 AND l.action_type = $1 AND l.table_name = $2 ORDER BY l.created_at DESC"));
    }

    #[test]
    fn test_assemble_stats_fills_actions() {
        let stats = assemble_stats(vec![("update".into(), 3)], vec![("shops".into(), 3)], Vec::new());
        assert_eq!(stats.total, 3);
        assert_eq!(stats.action_stats["create"], 0);
        assert_eq!(stats.action_stats["update"], 3);
        assert_eq!(stats.table_stats["shops"], 3);
    }
}
