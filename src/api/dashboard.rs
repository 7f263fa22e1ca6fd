//! Sales dashboards
//!
//! Every endpoint reads the same date range and shop/platform filters; a
//! missing range means the last 30 days.

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{ApiError, ApiResult};
use crate::auth::CurrentUser;
use crate::db;
use crate::db::sales::{DailySales, ProductAnalysis, ProductRank, SalesFilter, SalesTotal, ShopComparison, ShopRank, Summary, TrendPoint};
use crate::domain::value_objects::TrendBucket;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/summary", get(summary))
        .route("/sales/trend", get(trend))
        .route("/sales/ranking", get(ranking))
        .route("/products/analysis", get(product_analysis))
        .route("/shops/comparison", get(shop_comparison))
        .route("/query", post(query))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RankingKind {
    #[default]
    Product,
    Shop,
}

/// Query string shared by the GET endpoints; each reads the parts it needs.
#[derive(Debug, Default, Deserialize)]
pub struct RangeParams {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub shop_id: Option<i64>,
    pub platform_id: Option<i64>,
    #[serde(default)]
    pub group_by: TrendBucket,
    #[serde(rename = "type", default)]
    pub kind: RankingKind,
    pub limit: Option<i64>,
}

impl RangeParams {
    fn filter(&self) -> ApiResult<SalesFilter> {
        let filter = SalesFilter::new(self.start_date, self.end_date, Utc::now().date_naive())
            .map_err(|e| ApiError::bad_request(e.to_string()))?;
        Ok(filter.with_shop(self.shop_id).with_platform(self.platform_id))
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Ranking {
    Products(Vec<ProductRank>),
    Shops(Vec<ShopRank>),
}

async fn summary(State(state): State<AppState>, _user: CurrentUser, Query(params): Query<RangeParams>) -> ApiResult<Json<Summary>> {
    let filter = params.filter()?;
    Ok(Json(db::sales::summary(&state.db, &filter).await?))
}

async fn trend(State(state): State<AppState>, _user: CurrentUser, Query(params): Query<RangeParams>) -> ApiResult<Json<Vec<TrendPoint>>> {
    let filter = params.filter()?;
    Ok(Json(db::sales::trend(&state.db, &filter, params.group_by).await?))
}

async fn ranking(State(state): State<AppState>, _user: CurrentUser, Query(params): Query<RangeParams>) -> ApiResult<Json<Ranking>> {
    let filter = params.filter()?;
    let limit = params.limit.unwrap_or(10).clamp(1, 100);
    let ranking = match params.kind {
        RankingKind::Product => Ranking::Products(db::sales::product_ranking(&state.db, &filter, limit).await?),
        RankingKind::Shop => Ranking::Shops(db::sales::shop_ranking(&state.db, &filter, limit).await?),
    };
    Ok(Json(ranking))
}

async fn product_analysis(State(state): State<AppState>, _user: CurrentUser, Query(params): Query<RangeParams>) -> ApiResult<Json<Vec<ProductAnalysis>>> {
    let filter = params.filter()?;
    Ok(Json(db::sales::product_analysis(&state.db, &filter).await?))
}

async fn shop_comparison(State(state): State<AppState>, _user: CurrentUser, Query(params): Query<RangeParams>) -> ApiResult<Json<Vec<ShopComparison>>> {
    let filter = params.filter()?;
    Ok(Json(db::sales::shop_comparison(&state.db, &filter).await?))
}

#[derive(Debug, Deserialize)]
pub struct MetricQuery {
    pub metric: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub shop_ids: Vec<i64>,
    #[serde(default)]
    pub platform_ids: Vec<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Metric {
    SalesTotal,
    SalesByDate,
}

impl Metric {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "sales_total" => Some(Self::SalesTotal),
            "sales_by_date" => Some(Self::SalesByDate),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum MetricData {
    Total(SalesTotal),
    ByDate(Vec<DailySales>),
}

#[derive(Debug, Serialize)]
pub struct MetricResponse {
    pub metric: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub data: MetricData,
}

async fn query(State(state): State<AppState>, _user: CurrentUser, Json(req): Json<MetricQuery>) -> ApiResult<Json<MetricResponse>> {
    let metric = Metric::parse(req.metric.trim())
        .ok_or_else(|| ApiError::bad_request(format!("Unknown metric {:?}; use sales_total or sales_by_date", req.metric)))?;
    let mut filter = SalesFilter::new(req.start_date, req.end_date, Utc::now().date_naive())
        .map_err(|e| ApiError::bad_request(e.to_string()))?;
    filter.shop_ids = req.shop_ids;
    filter.platform_ids = req.platform_ids;

    let data = match metric {
        Metric::SalesTotal => MetricData::Total(db::sales::sales_total(&state.db, &filter).await?),
        Metric::SalesByDate => MetricData::ByDate(db::sales::sales_by_date(&state.db, &filter).await?),
    };
    Ok(Json(MetricResponse { metric: req.metric, start_date: filter.start, end_date: filter.end, data }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_params() {
        let params = RangeParams { shop_id: Some(4), ..Default::default() };
        let filter = params.filter().unwrap();
        assert_eq!((filter.end - filter.start).num_days(), 29);
        assert_eq!(filter.shop_ids, vec![4]);
        assert!(filter.platform_ids.is_empty());

        let reversed = RangeParams {
            start_date: NaiveDate::from_ymd_opt(2024, 5, 2),
            end_date: NaiveDate::from_ymd_opt(2024, 5, 1),
            ..Default::default()
        };
        assert!(reversed.filter().is_err());
    }

    #[test]
    fn test_range_params_at_the_calendar_edge() {
        let uri: axum::http::Uri = "/summary?end_date=-262143-01-01".parse().unwrap();
        let Query(params) = Query::<RangeParams>::try_from_uri(&uri).unwrap();
        let err = params.filter().unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);

        let params = RangeParams { end_date: Some(NaiveDate::MAX), ..Default::default() };
        assert!(params.filter().is_err());
    }

    #[test]
    fn test_metric_names() {
        assert_eq!(Metric::parse("sales_total"), Some(Metric::SalesTotal));
        assert_eq!(Metric::parse("sales_by_date"), Some(Metric::SalesByDate));
        assert_eq!(Metric::parse("profit"), None);
    }
}
