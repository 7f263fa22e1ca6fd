//! Spreadsheet import
//!
//! parse → map header columns → coerce cells → validate rows → insert.
//! Everything a run writes, including the overwrite delete, shares one
//! transaction. Each insert runs in its own savepoint, so a row the database
//! refuses counts as a bad row like any validation failure. With the `abort`
//! strategy the first bad row rolls the whole run back; with `skip` bad rows
//! are reported and the rest are kept. A run that keeps no rows is rolled back
//! as well, so a broken file never wipes a target in overwrite mode. Every run
//! leaves an `import_history` record.

pub mod coerce;
pub mod infer;
pub mod pipeline;
pub mod sheet;

pub use infer::{describe, ParsedSheet};
pub use pipeline::{sales_fields, RowError};
pub use sheet::Sheet;

use chrono::Utc;
use serde::Serialize;
use sqlx::{Acquire, PgConnection, PgPool};
use thiserror::Error;
use uuid::Uuid;

use crate::db;
use crate::db::sales::NewSale;
use crate::domain::aggregates::{FieldConfig, JsonMap};
use crate::domain::events::{DomainEvent, ImportEvent};
use crate::domain::value_objects::{ErrorStrategy, ImportMode, ImportStatus};

/// Errors reported in `import_history.error_message` are capped at this many entries.
const MAX_LOGGED_ERRORS: usize = 20;

/// Width of `import_history.file_name`.
const MAX_FILE_NAME_LEN: usize = 255;

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("unsupported file format {0:?}; upload .csv, .xlsx, .xls or .ods")]
    UnsupportedFormat(String),

    #[error("the file has no header row")]
    Empty,

    #[error("could not read the file: {0}")]
    Parse(String),

    #[error("the file is missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("the data table has no fields configured")]
    NoFields,

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

#[derive(Debug, Clone)]
pub enum ImportTarget {
    DataTable { id: i64, fields: Vec<FieldConfig> },
    Sales { shop_id: i64 },
}

impl ImportTarget {
    pub fn name(&self) -> &'static str {
        match self {
            Self::DataTable { .. } => "data_table",
            Self::Sales { .. } => "sales",
        }
    }

    pub fn fields(&self) -> Vec<FieldConfig> {
        match self {
            Self::DataTable { fields, .. } => fields.clone(),
            Self::Sales { .. } => sales_fields(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub file_name: String,
    pub mode: ImportMode,
    pub strategy: ErrorStrategy,
    pub user_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub import_id: i64,
    pub total_rows: usize,
    pub success_rows: usize,
    pub error_count: usize,
    pub errors: Vec<RowError>,
    pub status: ImportStatus,
}

impl ImportReport {
    pub fn to_event(&self, target: &ImportTarget) -> DomainEvent {
        DomainEvent::ImportFinished(ImportEvent {
            event_id: Uuid::now_v7(),
            import_id: self.import_id,
            target: target.name().to_string(),
            status: self.status,
            total_rows: self.total_rows,
            success_rows: self.success_rows,
            occurred_at: Utc::now(),
        })
    }
}

/// Outcome of the row loop, before anything is committed.
#[derive(Debug, Default)]
struct Tally {
    success_rows: usize,
    errors: Vec<RowError>,
    aborted: bool,
}

/// Inserts one prepared row.
async fn insert_row(conn: &mut PgConnection, target: &ImportTarget, data: &JsonMap, sale: Option<&NewSale>) -> Result<(), sqlx::Error> {
    match (target, sale) {
        (ImportTarget::Sales { shop_id }, Some(sale)) => db::sales::insert(conn, *shop_id, sale).await,
        (ImportTarget::DataTable { id, .. }, _) => db::table_data::insert(conn, *id, data).await.map(|_| ()),
        (ImportTarget::Sales { .. }, None) => Ok(()),
    }
}

/// What a row error shows for a statement the database rejected.
fn rejection_message(e: &sqlx::Error) -> String {
    match e {
        sqlx::Error::Database(db) => format!("rejected by the database: {}", db.message()),
        other => format!("rejected by the database: {other}"),
    }
}

fn summarize(errors: &[RowError]) -> Option<String> {
    if errors.is_empty() {
        return None;
    }
    let mut message = errors.iter().take(MAX_LOGGED_ERRORS).map(ToString::to_string).collect::<Vec<_>>().join("; ");
    if errors.len() > MAX_LOGGED_ERRORS {
        message.push_str(&format!("; and {} more", errors.len() - MAX_LOGGED_ERRORS));
    }
    Some(message)
}

/// Runs one import and records it in `import_history`.
pub async fn execute(pool: &PgPool, target: &ImportTarget, sheet: &Sheet, options: &ImportOptions) -> Result<ImportReport, ImportError> {
    let fields = target.fields();
    if fields.is_empty() {
        return Err(ImportError::NoFields);
    }
    let columns = pipeline::map_columns(sheet, &fields)?;

    let mut tx = pool.begin().await?;
    if options.mode == ImportMode::Overwrite {
        let removed = match target {
            ImportTarget::DataTable { id, .. } => db::table_data::delete_all(&mut *tx, *id).await?,
            ImportTarget::Sales { shop_id } => db::sales::delete_for_shop(&mut *tx, *shop_id).await?,
        };
        tracing::debug!(import_target = target.name(), removed, "overwrite cleared existing rows");
    }

    let mut tally = Tally::default();
    for row in &sheet.rows {
        let prepared = pipeline::prepare_row(row, &fields, &columns).and_then(|data| match target {
            ImportTarget::DataTable { .. } => Ok((data, None)),
            ImportTarget::Sales { .. } => pipeline::to_new_sale(row.number, &data).map(|sale| (data, Some(sale))).map_err(|e| vec![e]),
        });
        let outcome = match prepared {
            Ok((data, sale)) => {
                let mut savepoint = tx.begin().await?;
                match insert_row(&mut *savepoint, target, &data, sale.as_ref()).await {
                    Ok(()) => {
                        savepoint.commit().await?;
                        Ok(())
                    }
                    Err(e) => {
                        savepoint.rollback().await?;
                        tracing::warn!(import_target = target.name(), row = row.number, error = %e, "row rejected by the database");
                        Err(vec![RowError::new(row.number, None, rejection_message(&e))])
                    }
                }
            }
            Err(errors) => Err(errors),
        };
        match outcome {
            Ok(()) => tally.success_rows += 1,
            Err(errors) => {
                tally.errors.extend(errors);
                if options.strategy == ErrorStrategy::Abort {
                    tally.aborted = true;
                    break;
                }
            }
        }
    }

    let total_rows = sheet.rows.len();
    let keep = !tally.aborted && tally.success_rows > 0;
    let success_rows = if keep { tally.success_rows } else { 0 };
    let status = if tally.aborted { ImportStatus::Failed } else { ImportStatus::from_counts(total_rows, success_rows) };

    let mut error_message = summarize(&tally.errors);
    if tally.aborted {
        error_message = error_message.map(|m| format!("aborted, nothing imported: {m}"));
    }
    let record = db::imports::NewImportRecord {
        user_id: options.user_id,
        file_name: options.file_name.chars().take(MAX_FILE_NAME_LEN).collect(),
        target: target.name().to_string(),
        data_table_id: match target { ImportTarget::DataTable { id, .. } => Some(*id), _ => None },
        shop_id: match target { ImportTarget::Sales { shop_id } => Some(*shop_id), _ => None },
        mode: options.mode,
        strategy: options.strategy,
        status,
        total_rows: i32::try_from(total_rows).unwrap_or(i32::MAX),
        success_rows: i32::try_from(success_rows).unwrap_or(i32::MAX),
        error_message,
    };

    let history = if keep {
        let history = db::imports::insert(&mut *tx, &record).await?;
        tx.commit().await?;
        history
    } else {
        tx.rollback().await?;
        let mut conn = pool.acquire().await?;
        db::imports::insert(&mut *conn, &record).await?
    };

    tracing::info!(
        import_id = history.id, import_target = target.name(), file = %options.file_name, mode = %options.mode,
        strategy = %options.strategy, total_rows, success_rows, errors = tally.errors.len(), status = %status,
        "import finished"
    );

    Ok(ImportReport { import_id: history.id, total_rows, success_rows, error_count: tally.errors.len(), errors: tally.errors, status })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summarize_caps_errors() {
        let errors: Vec<RowError> = (2..30).map(|row| RowError::new(row, Some("qty"), "bad")).collect();
        let message = summarize(&errors).unwrap();
        assert!(message.starts_with("row 2 qty: bad; row 3 qty: bad"));
        assert!(message.ends_with("; and 8 more"));
        assert!(summarize(&[]).is_none());
    }

    #[test]
    fn test_target_fields() {
        let target = ImportTarget::Sales { shop_id: 1 };
        assert_eq!(target.name(), "sales");
        assert_eq!(target.fields().len(), 7);
        assert!(ImportError::MissingColumns(vec!["a".into(), "b".into()]).to_string().ends_with("a, b"));
    }
}
