use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};

use crate::entities;

/// One authorization decision (or action) for compliance logging.
#[derive(Debug, Clone)]
pub struct AuditRecord {
    pub actor: String,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub decision: String,
    pub recorded_at: i64,
}

/// Fire-and-forget compliance sink. Implementations must never block the
/// request path or surface failures to the caller: an unreachable sink is
/// logged locally and otherwise ignored.
pub trait AuditSink: Send + Sync {
    fn record(&self, record: AuditRecord);
}

/// Writes audit records to the `audit_events` table from a spawned task.
#[derive(Clone)]
pub struct DbAuditSink {
    db: DatabaseConnection,
}

impl DbAuditSink {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

impl AuditSink for DbAuditSink {
    fn record(&self, record: AuditRecord) {
        let db = self.db.clone();
        tokio::spawn(async move {
            let event = entities::audit_event::ActiveModel {
                actor: Set(record.actor.clone()),
                action: Set(record.action.clone()),
                entity_type: Set(record.entity_type.clone()),
                entity_id: Set(record.entity_id.clone()),
                decision: Set(record.decision.clone()),
                recorded_at: Set(record.recorded_at),
                ..Default::default()
            };
            if let Err(err) = event.insert(&db).await {
                tracing::warn!(
                    %err,
                    actor = %record.actor,
                    action = %record.action,
                    "audit sink write failed; decision already enforced"
                );
            }
        });
    }
}
