use std::sync::Arc;

use uuid::Uuid;

use barangay_core::clock::Clock;
use barangay_core::model::{Action, ActorId, AuditRecord, ResourceType};
use barangay_core::policy::{ActorIdentity, DenyReason};
use barangay_storage::{RegistryTransaction, StorageError};

#[derive(Clone)]
pub struct AuditLogger {
    clock: Arc<dyn Clock>,
}

impl AuditLogger {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn record<T: RegistryTransaction>(
        &self,
        tx: &mut T,
        actor_id: &ActorId,
        action: Action,
        resource_type: ResourceType,
        resource_id: String,
        before: Option<serde_json::Value>,
        after: serde_json::Value,
    ) -> Result<AuditRecord, StorageError> {
        let record = AuditRecord {
            id: Uuid::new_v4(),
            actor_id: actor_id.clone(),
            action,
            resource_type,
            resource_id,
            before,
            after,
            timestamp: self.clock.now(),
        };
        tx.append_audit(&record).await?;
        Ok(record)
    }
}

pub fn audit_committed(record: &AuditRecord) {
    tracing::info!(
        target: "audit",
        event = "mutation_committed",
        audit_id = %record.id,
        actor_id = %record.actor_id,
        action = record.action.as_str(),
        resource_type = record.resource_type.as_str(),
        resource_id = %record.resource_id,
        "mutation committed"
    );
}

pub fn audit_denied(
    actor: &ActorIdentity,
    action: Action,
    resource_type: ResourceType,
    reason: DenyReason,
) {
    tracing::warn!(
        target: "audit",
        event = "authorization_denied",
        actor_id = %actor.id,
        role = actor.role.as_str(),
        action = action.as_str(),
        resource_type = resource_type.as_str(),
        reason = reason.as_str(),
        "authorization denied"
    );
}

pub fn audit_reference_refresh(actor_id: &ActorId, previous_version: u64, version: u64) {
    tracing::info!(
        target: "audit",
        event = "reference_data_refreshed",
        actor_id = %actor_id,
        previous_version = previous_version,
        version = version,
        "geographic reference data refreshed"
    );
}
