//! Sales rows and dashboard aggregations
//!
//! Every aggregation shares one filter: an inclusive date range plus optional
//! shop and platform id sets.

use chrono::{Datelike, Duration, NaiveDate};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};

use crate::domain::value_objects::TrendBucket;

pub const DEFAULT_RANGE_DAYS: i64 = 30;

/// Calendar years a filter bound may fall in.
pub const SUPPORTED_YEARS: std::ops::RangeInclusive<i32> = 1..=9999;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SalesFilter {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub shop_ids: Vec<i64>,
    pub platform_ids: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DateRangeError {
    #[error("start_date {start} is after end_date {end}")]
    Reversed { start: NaiveDate, end: NaiveDate },
    #[error("{0} is outside the supported years 1-9999")]
    OutOfRange(NaiveDate),
}

fn in_range(date: NaiveDate) -> Result<NaiveDate, DateRangeError> {
    if SUPPORTED_YEARS.contains(&date.year()) { Ok(date) } else { Err(DateRangeError::OutOfRange(date)) }
}

impl SalesFilter {
    /// Missing bounds default to the `DEFAULT_RANGE_DAYS` days ending `today`.
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>, today: NaiveDate) -> Result<Self, DateRangeError> {
        let end = in_range(end.unwrap_or(today))?;
        let start = match start {
            Some(start) => in_range(start)?,
            None => end
                .checked_sub_signed(Duration::days(DEFAULT_RANGE_DAYS - 1))
                .and_then(|d| in_range(d).ok())
                .ok_or(DateRangeError::OutOfRange(end))?,
        };
        if start > end {
            return Err(DateRangeError::Reversed { start, end });
        }
        Ok(Self { start, end, shop_ids: Vec::new(), platform_ids: Vec::new() })
    }

    pub fn with_shop(mut self, shop_id: Option<i64>) -> Self {
        self.shop_ids.extend(shop_id);
        self
    }

    pub fn with_platform(mut self, platform_id: Option<i64>) -> Self {
        self.platform_ids.extend(platform_id);
        self
    }

    fn push_where(&self, qb: &mut QueryBuilder<'static, Postgres>) {
        qb.push(" WHERE s.sale_date BETWEEN ").push_bind(self.start).push(" AND ").push_bind(self.end);
        if !self.shop_ids.is_empty() {
            qb.push(" AND s.shop_id = ANY(").push_bind(self.shop_ids.clone()).push(")");
        }
        if !self.platform_ids.is_empty() {
            qb.push(" AND sh.platform_id = ANY(").push_bind(self.platform_ids.clone()).push(")");
        }
    }

    fn query(&self, select: &str) -> QueryBuilder<'static, Postgres> {
        let mut qb = QueryBuilder::new(select);
        qb.push(FROM);
        self.push_where(&mut qb);
        qb
    }
}

const FROM: &str = " FROM sales s JOIN shops sh ON sh.id = s.shop_id LEFT JOIN platforms p ON p.id = sh.platform_id";

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Summary {
    pub total_sales: Decimal,
    pub total_orders: i64,
    pub avg_order_amount: Decimal,
    pub active_shops: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct TrendPoint {
    pub date: NaiveDate,
    pub total_amount: Decimal,
    pub quantity: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ProductRank {
    pub sku: Option<String>,
    pub product_name: String,
    pub total_amount: Decimal,
    pub quantity: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ShopRank {
    pub shop_id: i64,
    pub shop_name: String,
    pub total_amount: Decimal,
    pub quantity: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ProductAnalysis {
    pub sku: Option<String>,
    pub product_name: String,
    pub total_amount: Decimal,
    pub total_quantity: i64,
    pub avg_price: Decimal,
    pub order_count: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ShopComparison {
    pub shop_id: i64,
    pub shop_name: String,
    pub platform_name: Option<String>,
    pub total_amount: Decimal,
    pub total_quantity: i64,
    pub total_profit: Decimal,
    pub order_count: i64,
    #[sqlx(default)]
    pub profit_rate: Decimal,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SalesTotal {
    pub total_amount: Decimal,
    pub total_quantity: i64,
    pub total_orders: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct DailySales {
    pub date: NaiveDate,
    pub amount: Decimal,
    pub quantity: i64,
}

/// Profit as a percentage of revenue, two decimals. Zero revenue gives zero.
pub fn profit_rate(profit: Decimal, amount: Decimal) -> Decimal {
    if amount.is_zero() {
        return Decimal::ZERO;
    }
    (profit / amount * Decimal::ONE_HUNDRED).round_dp(2)
}

pub fn summary_query(filter: &SalesFilter) -> QueryBuilder<'static, Postgres> {
    filter.query(
        "SELECT COALESCE(SUM(s.amount), 0) AS total_sales, COUNT(s.id) AS total_orders, \
         ROUND(COALESCE(AVG(s.amount), 0), 2) AS avg_order_amount, COUNT(DISTINCT s.shop_id) AS active_shops",
    )
}

pub async fn summary(pool: &PgPool, filter: &SalesFilter) -> Result<Summary, sqlx::Error> {
    let mut qb = summary_query(filter);
    qb.build_query_as::<Summary>().fetch_one(pool).await
}

pub fn trend_query(filter: &SalesFilter, bucket: TrendBucket) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new("SELECT date_trunc(");
    qb.push_bind(bucket.as_str())
        .push(", s.sale_date::timestamp)::date AS date, SUM(s.amount) AS total_amount, SUM(s.quantity)::BIGINT AS quantity")
        .push(FROM);
    filter.push_where(&mut qb);
    qb.push(" GROUP BY 1 ORDER BY 1");
    qb
}

pub async fn trend(pool: &PgPool, filter: &SalesFilter, bucket: TrendBucket) -> Result<Vec<TrendPoint>, sqlx::Error> {
    let mut qb = trend_query(filter, bucket);
    qb.build_query_as::<TrendPoint>().fetch_all(pool).await
}

pub async fn product_ranking(pool: &PgPool, filter: &SalesFilter, limit: i64) -> Result<Vec<ProductRank>, sqlx::Error> {
    let mut qb = filter.query(
        "SELECT s.sku, s.product_title AS product_name, SUM(s.amount) AS total_amount, SUM(s.quantity)::BIGINT AS quantity",
    );
    qb.push(" GROUP BY s.sku, s.product_title ORDER BY total_amount DESC LIMIT ").push_bind(limit);
    qb.build_query_as::<ProductRank>().fetch_all(pool).await
}

pub async fn shop_ranking(pool: &PgPool, filter: &SalesFilter, limit: i64) -> Result<Vec<ShopRank>, sqlx::Error> {
    let mut qb = filter.query(
        "SELECT s.shop_id, sh.name AS shop_name, SUM(s.amount) AS total_amount, SUM(s.quantity)::BIGINT AS quantity",
    );
    qb.push(" GROUP BY s.shop_id, sh.name ORDER BY total_amount DESC LIMIT ").push_bind(limit);
    qb.build_query_as::<ShopRank>().fetch_all(pool).await
}

pub async fn product_analysis(pool: &PgPool, filter: &SalesFilter) -> Result<Vec<ProductAnalysis>, sqlx::Error> {
    let mut qb = filter.query(
        "SELECT s.sku, s.product_title AS product_name, SUM(s.amount) AS total_amount, \
         SUM(s.quantity)::BIGINT AS total_quantity, \
         COALESCE(ROUND(SUM(s.amount) / NULLIF(SUM(s.quantity), 0), 2), 0) AS avg_price, COUNT(s.id) AS order_count",
    );
    qb.push(" GROUP BY s.sku, s.product_title ORDER BY total_amount DESC");
    qb.build_query_as::<ProductAnalysis>().fetch_all(pool).await
}

pub async fn shop_comparison(pool: &PgPool, filter: &SalesFilter) -> Result<Vec<ShopComparison>, sqlx::Error> {
    let mut qb = filter.query(
        "SELECT s.shop_id, sh.name AS shop_name, p.name AS platform_name, SUM(s.amount) AS total_amount, \
         SUM(s.quantity)::BIGINT AS total_quantity, COALESCE(SUM(s.profit), 0) AS total_profit, COUNT(s.id) AS order_count",
    );
    qb.push(" GROUP BY s.shop_id, sh.name, p.name ORDER BY total_amount DESC");
    let mut rows = qb.build_query_as::<ShopComparison>().fetch_all(pool).await?;
    for row in &mut rows {
        row.profit_rate = profit_rate(row.total_profit, row.total_amount);
    }
    Ok(rows)
}

pub async fn sales_total(pool: &PgPool, filter: &SalesFilter) -> Result<SalesTotal, sqlx::Error> {
    let mut qb = filter.query(
        "SELECT COALESCE(SUM(s.amount), 0) AS total_amount, COALESCE(SUM(s.quantity), 0)::BIGINT AS total_quantity, COUNT(s.id) AS total_orders",
    );
    qb.build_query_as::<SalesTotal>().fetch_one(pool).await
}

pub async fn sales_by_date(pool: &PgPool, filter: &SalesFilter) -> Result<Vec<DailySales>, sqlx::Error> {
    let mut qb = filter.query("SELECT s.sale_date AS date, SUM(s.amount) AS amount, SUM(s.quantity)::BIGINT AS quantity");
    qb.push(" GROUP BY s.sale_date ORDER BY s.sale_date");
    qb.build_query_as::<DailySales>().fetch_all(pool).await
}

/// A sales row ready to insert.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSale {
    pub sku: Option<String>,
    pub product_title: String,
    pub order_id: Option<String>,
    pub quantity: i32,
    pub amount: Decimal,
    pub profit: Option<Decimal>,
    pub sale_date: NaiveDate,
}

pub async fn insert(conn: &mut PgConnection, shop_id: i64, sale: &NewSale) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO sales (shop_id, sku, product_title, order_id, quantity, amount, profit, sale_date)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
    )
    .bind(shop_id)
    .bind(&sale.sku)
    .bind(&sale.product_title)
    .bind(&sale.order_id)
    .bind(sale.quantity)
    .bind(sale.amount)
    .bind(sale.profit)
    .bind(sale.sale_date)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn delete_for_shop(conn: &mut PgConnection, shop_id: i64) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM sales WHERE shop_id = $1").bind(shop_id).execute(conn).await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn day(s: &str) -> NaiveDate { NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap() }

    #[test]
    fn test_default_range_is_thirty_days_inclusive() {
        let filter = SalesFilter::new(None, None, day("2024-03-31")).unwrap();
        assert_eq!(filter.start, day("2024-03-02"));
        assert_eq!(filter.end, day("2024-03-31"));
        assert!(SalesFilter::new(Some(day("2024-04-02")), Some(day("2024-04-01")), day("2024-05-01")).is_err());
    }

    #[test]
    fn test_extreme_dates_are_rejected() {
        let today = day("2024-05-01");
        let min = NaiveDate::MIN;
        assert_eq!(SalesFilter::new(None, Some(min), today), Err(DateRangeError::OutOfRange(min)));
        assert!(SalesFilter::new(Some(NaiveDate::MIN), None, today).is_err());
        assert!(SalesFilter::new(None, Some(NaiveDate::MAX), today).is_err());
        let first = NaiveDate::from_ymd_opt(1, 1, 10).unwrap();
        assert_eq!(SalesFilter::new(None, Some(first), today), Err(DateRangeError::OutOfRange(first)));
    }

    #[test]
    fn test_filter_sql() {
        let filter = SalesFilter::new(None, None, day("2024-03-31")).unwrap().with_shop(Some(4)).with_platform(Some(2));
        let qb = summary_query(&filter);
        assert!(qb.sql().ends_with("WHERE s.sale_date BETWEEN $1 AND $2 AND s.shop_id = ANY($3) AND sh.platform_id = ANY($4)"));

        let qb = trend_query(&SalesFilter::new(None, None, day("2024-03-31")).unwrap(), TrendBucket::Week);
        assert!(qb.sql().starts_with("SELECT date_trunc($1, s.sale_date::timestamp)::date AS date"));
        assert!(qb.sql().ends_with("BETWEEN $2 AND $3 GROUP BY 1 ORDER BY 1"));
    }

    #[test]
    fn test_profit_rate() {
        let d = |s: &str| Decimal::from_str(s).unwrap();
        assert_eq!(profit_rate(d("25"), d("200")), d("12.50"));
        assert_eq!(profit_rate(d("10"), d("0")), Decimal::ZERO);
        assert_eq!(profit_rate(d("1"), d("3")), d("33.33"));
    }
}
