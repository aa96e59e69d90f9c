use serde::Serialize;

use barangay_core::derive::{ConsistencyError, DerivationPolicy, verify_household, verify_resident};
use barangay_core::model::UnitCode;
use barangay_storage::{PageRequest, RegistryStore, RegistryTransaction, StorageError};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciliationReport {
    pub unit_code: UnitCode,
    pub residents_checked: usize,
    pub households_checked: usize,
    pub mismatches: Vec<ConsistencyError>,
}

impl ReconciliationReport {
    pub fn is_consistent(&self) -> bool {
        self.mismatches.is_empty()
    }
}

pub async fn reconcile_unit<S: RegistryStore>(
    store: &S,
    unit_code: &UnitCode,
    policy: &DerivationPolicy,
) -> Result<ReconciliationReport, StorageError> {
    let mut tx = store.begin_transaction().await?;
    let result = reconcile_in(&mut tx, unit_code, policy).await;
    if let Err(e) = tx.rollback().await {
        tracing::warn!(error = %e, "reconciliation rollback failed");
    }
    let report = result?;

    tracing::info!(
        unit_code = %report.unit_code,
        residents = report.residents_checked,
        households = report.households_checked,
        mismatches = report.mismatches.len(),
        "reconciliation finished"
    );
    Ok(report)
}

async fn reconcile_in<T: RegistryTransaction>(
    tx: &mut T,
    unit_code: &UnitCode,
    policy: &DerivationPolicy,
) -> Result<ReconciliationReport, StorageError> {
    let mut report = ReconciliationReport {
        unit_code: unit_code.clone(),
        residents_checked: 0,
        households_checked: 0,
        mismatches: Vec::new(),
    };

    let mut page = PageRequest::default();
    loop {
        let batch = tx.residents_by_unit_code(unit_code, page).await?;
        for resident in &batch.items {
            report.residents_checked += 1;
            if let Err(e) = verify_resident(resident, policy) {
                log_drift(&e);
                report.mismatches.push(e);
            }
        }
        match batch.next_offset {
            Some(offset) => page = PageRequest::new(offset, page.limit),
            None => break,
        }
    }

    let mut page = PageRequest::default();
    loop {
        let batch = tx.households_by_unit_code(unit_code, page).await?;
        for household in &batch.items {
            report.households_checked += 1;
            let members = tx.residents_in_household(household.id).await?;
            if let Err(e) = verify_household(household, &members) {
                log_drift(&e);
                report.mismatches.push(e);
            }
        }
        match batch.next_offset {
            Some(offset) => page = PageRequest::new(offset, page.limit),
            None => break,
        }
    }

    Ok(report)
}

pub(crate) fn log_drift(err: &ConsistencyError) {
    for diff in &err.diffs {
        tracing::error!(
            target: "consistency",
            resource_type = err.resource_type.as_str(),
            resource_id = %err.resource_id,
            field = diff.field.as_str(),
            stored = %diff.stored,
            recomputed = %diff.recomputed,
            "stored derived field differs from recomputation"
        );
    }
}
