use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Datelike, Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ApiError, ApiResult};
use crate::auth::CurrentUser;
use crate::db;
use crate::db::logs::{LogFilter, LogStats};
use crate::db::sales::SUPPORTED_YEARS;
use crate::domain::aggregates::data_table::parse_date;
use crate::domain::value_objects::{ActionType, Page};
use crate::models::OperationLog;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list))
        .route("/count", get(count))
        .route("/stats/summary", get(stats))
        .route("/:id", get(fetch))
}

#[derive(Debug, Default, Deserialize)]
pub struct LogParams {
    pub user_id: Option<i64>,
    pub action_type: Option<ActionType>,
    pub table_name: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct LogCount {
    pub total: i64,
}

fn parse_bound(name: &str, raw: &str) -> ApiResult<NaiveDateTime> {
    let parsed = parse_date(raw).ok_or_else(|| ApiError::bad_request(format!("Invalid {name} {raw:?}")))?;
    if !SUPPORTED_YEARS.contains(&parsed.year()) {
        return Err(ApiError::bad_request(format!("{name} {raw:?} is outside the supported years 1-9999")));
    }
    Ok(parsed)
}

/// A bare date as `end_date` covers that whole day.
fn is_date_only(raw: &str) -> bool {
    let raw = raw.trim();
    !raw.contains(':') && !raw.contains('T')
}

impl LogParams {
    fn filter(&self) -> ApiResult<LogFilter> {
        let from = self
            .start_date
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(|raw| parse_bound("start_date", raw))
            .transpose()?;
        let until = self
            .end_date
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(|raw| {
                let end = parse_bound("end_date", raw)?;
                let step = if is_date_only(raw) { Duration::days(1) } else { Duration::seconds(1) };
                end.checked_add_signed(step).ok_or_else(|| ApiError::bad_request(format!("end_date {raw:?} is out of range")))
            })
            .transpose()?;
        if let (Some(from), Some(until)) = (from, until) {
            if from >= until {
                return Err(ApiError::bad_request("start_date must not be after end_date"));
            }
        }
        Ok(LogFilter {
            user_id: self.user_id,
            action_type: self.action_type,
            table_name: self.table_name.clone().filter(|t| !t.trim().is_empty()),
            from: from.map(|dt| DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc)),
            until: until.map(|dt| DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc)),
        })
    }
}

async fn list(State(state): State<AppState>, _user: CurrentUser, Query(params): Query<LogParams>) -> ApiResult<Json<Vec<OperationLog>>> {
    let filter = params.filter()?;
    let page = Page::from_page(params.page, params.page_size, 50, 500);
    Ok(Json(db::logs::list(&state.db, &filter, page).await?))
}

async fn count(State(state): State<AppState>, _user: CurrentUser, Query(params): Query<LogParams>) -> ApiResult<Json<LogCount>> {
    let filter = params.filter()?;
    Ok(Json(LogCount { total: db::logs::count(&state.db, &filter).await? }))
}

async fn fetch(State(state): State<AppState>, _user: CurrentUser, Path(id): Path<i64>) -> ApiResult<Json<OperationLog>> {
    let log = db::logs::find(&state.db, id).await?.ok_or_else(|| ApiError::not_found("Log"))?;
    Ok(Json(log))
}

async fn stats(State(state): State<AppState>, _user: CurrentUser, Query(params): Query<LogParams>) -> ApiResult<Json<LogStats>> {
    let filter = params.filter()?;
    Ok(Json(db::logs::stats(&state.db, &filter).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_date_only_end_is_inclusive() {
        let params = LogParams { start_date: Some("2024-05-01".into()), end_date: Some("2024-05-01".into()), ..Default::default() };
        let filter = params.filter().unwrap();
        assert_eq!(filter.from, Some(Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()));
        assert_eq!(filter.until, Some(Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap()));
    }

    #[test]
    fn test_timestamp_end_and_bad_dates() {
        let params = LogParams { end_date: Some("2024-05-01 12:30:00".into()), ..Default::default() };
        assert_eq!(params.filter().unwrap().until, Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 1).unwrap()));

        let params = LogParams { start_date: Some("yesterday".into()), ..Default::default() };
        assert!(params.filter().is_err());

        let params = LogParams { start_date: Some("2024-05-03".into()), end_date: Some("2024-05-01".into()), ..Default::default() };
        assert!(params.filter().is_err());
    }

    #[test]
    fn test_end_date_at_the_calendar_edge() {
        for raw in ["+262143-12-31", "262143-12-31 23:59:59", "10000-01-01", "0000-12-31"] {
            let params = LogParams { end_date: Some(raw.into()), ..Default::default() };
            let err = params.filter().unwrap_err();
            assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST, "{raw}");
        }
        let params = LogParams { end_date: Some("9999-12-31".into()), ..Default::default() };
        assert_eq!(params.filter().unwrap().until, Some(Utc.with_ymd_and_hms(10000, 1, 1, 0, 0, 0).unwrap()));
    }
}
