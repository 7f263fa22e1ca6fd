//! Domain events
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::value_objects::{ActionType, ImportStatus};

pub const SUBJECT_PREFIX: &str = "storeops";

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DomainEvent {
    Operation(OperationEvent),
    ImportFinished(ImportEvent),
}

/// A create/update/delete that was written to the operation log.
#[derive(Clone, Debug, Serialize)]
pub struct OperationEvent {
    pub event_id: Uuid,
    pub action: ActionType,
    pub table_name: String,
    pub record_id: Option<i64>,
    pub user_id: Option<i64>,
    pub old_value: Option<serde_json::Value>,
    pub new_value: Option<serde_json::Value>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ImportEvent {
    pub event_id: Uuid,
    pub import_id: i64,
    pub target: String,
    pub status: ImportStatus,
    pub total_rows: usize,
    pub success_rows: usize,
    pub occurred_at: DateTime<Utc>,
}

impl DomainEvent {
    /// NATS subject the event is published on.
    pub fn subject(&self) -> String {
        match self {
            Self::Operation(e) => format!("{SUBJECT_PREFIX}.audit.{}.{}", e.table_name, e.action),
            Self::ImportFinished(e) => format!("{SUBJECT_PREFIX}.import.{}", e.status),
        }
    }
}
