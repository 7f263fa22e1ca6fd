//! Operation log writer
//!
//! Entries are written after the business change has committed. A failed
//! write is logged and swallowed so the request still succeeds.

use chrono::Utc;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db;
use crate::domain::events::{DomainEvent, OperationEvent};
use crate::domain::value_objects::ActionType;

#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub user_id: Option<i64>,
    pub action: ActionType,
    pub table_name: &'static str,
    pub record_id: Option<i64>,
    pub old_value: Option<serde_json::Value>,
    pub new_value: Option<serde_json::Value>,
}

fn snapshot(value: &impl Serialize) -> Option<serde_json::Value> {
    serde_json::to_value(value).ok()
}

impl AuditEntry {
    pub fn created(table_name: &'static str, record_id: i64, new: &impl Serialize) -> Self {
        Self { user_id: None, action: ActionType::Create, table_name, record_id: Some(record_id), old_value: None, new_value: snapshot(new) }
    }

    pub fn updated(table_name: &'static str, record_id: i64, old: &impl Serialize, new: &impl Serialize) -> Self {
        Self { user_id: None, action: ActionType::Update, table_name, record_id: Some(record_id), old_value: snapshot(old), new_value: snapshot(new) }
    }

    pub fn deleted(table_name: &'static str, record_id: i64, old: &impl Serialize) -> Self {
        Self { user_id: None, action: ActionType::Delete, table_name, record_id: Some(record_id), old_value: snapshot(old), new_value: None }
    }

    pub fn by(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    fn to_event(&self) -> DomainEvent {
        DomainEvent::Operation(OperationEvent {
            event_id: Uuid::now_v7(),
            action: self.action,
            table_name: self.table_name.to_string(),
            record_id: self.record_id,
            user_id: self.user_id,
            old_value: self.old_value.clone(),
            new_value: self.new_value.clone(),
            occurred_at: Utc::now(),
        })
    }
}

#[derive(Clone)]
pub struct AuditLog {
    db: PgPool,
    nats: Option<async_nats::Client>,
}

impl AuditLog {
    pub fn new(db: PgPool, nats: Option<async_nats::Client>) -> Self {
        Self { db, nats }
    }

    pub async fn record(&self, entry: AuditEntry) {
        if let Err(e) = db::logs::insert(&self.db, &entry).await {
            tracing::warn!(table = entry.table_name, action = %entry.action, record_id = ?entry.record_id, error = %e, "failed to write operation log");
            return;
        }
        self.publish(&entry.to_event()).await;
    }

    /// Best-effort NATS publication. No-op without a client.
    pub async fn publish(&self, event: &DomainEvent) {
        let Some(nats) = &self.nats else { return };
        let payload = match serde_json::to_vec(event) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode event");
                return;
            }
        };
        let subject = event.subject();
        if let Err(e) = nats.publish(subject.clone(), payload.into()).await {
            tracing::warn!(subject = %subject, error = %e, "failed to publish event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entry_snapshots() {
        let entry = AuditEntry::updated("shops", 3, &json!({"name": "old"}), &json!({"name": "new"})).by(1);
        assert_eq!(entry.action, ActionType::Update);
        assert_eq!(entry.user_id, Some(1));
        assert_eq!(entry.old_value, Some(json!({"name": "old"})));

        let event = entry.to_event();
        assert_eq!(event.subject(), "storeops.audit.shops.update");
    }

    #[test]
    fn test_delete_has_no_new_value() {
        let entry = AuditEntry::deleted("platforms", 9, &json!({"code": "jd"}));
        assert!(entry.new_value.is_none());
        assert_eq!(entry.record_id, Some(9));
        assert!(entry.user_id.is_none());
    }
}
