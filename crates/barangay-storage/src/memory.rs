use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use barangay_core::model::{
    AuditRecord, Household, HouseholdId, Resident, ResidentId, ResourceType, UnitCode,
};

use crate::traits::{Page, PageRequest, RegistryStore, RegistryTransaction, StorageError};

#[derive(Debug, Clone)]
struct Versioned<T> {
    version: u64,
    value: T,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum RowKey {
    Resident(ResidentId),
    Household(HouseholdId),
}

impl RowKey {
    fn conflict(self) -> StorageError {
        match self {
            Self::Resident(id) => StorageError::Conflict {
                resource_type: ResourceType::Resident,
                id: id.to_string(),
            },
            Self::Household(id) => StorageError::Conflict {
                resource_type: ResourceType::Household,
                id: id.to_string(),
            },
        }
    }
}

#[derive(Debug, Default)]
struct InnerState {
    residents: BTreeMap<ResidentId, Versioned<Resident>>,
    households: BTreeMap<HouseholdId, Versioned<Household>>,
    audit_log: Vec<AuditRecord>,
    fail_audit_writes: bool,
}

impl InnerState {
    fn version_of(&self, key: RowKey) -> u64 {
        match key {
            RowKey::Resident(id) => self.residents.get(&id).map_or(0, |r| r.version),
            RowKey::Household(id) => self.households.get(&id).map_or(0, |h| h.version),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<InnerState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_audit_writes(&self, fail: bool) {
        self.lock().fail_audit_writes = fail;
    }

    pub fn residents(&self) -> Vec<Resident> {
        self.lock()
            .residents
            .values()
            .map(|r| r.value.clone())
            .collect()
    }

    pub fn households(&self) -> Vec<Household> {
        self.lock()
            .households
            .values()
            .map(|h| h.value.clone())
            .collect()
    }

    pub fn overwrite_resident(&self, resident: Resident) {
        let mut state = self.lock();
        let version = state.version_of(RowKey::Resident(resident.id));
        state.residents.insert(
            resident.id,
            Versioned {
                version,
                value: resident,
            },
        );
    }

    pub fn overwrite_household(&self, household: Household) {
        let mut state = self.lock();
        let version = state.version_of(RowKey::Household(household.id));
        state.households.insert(
            household.id,
            Versioned {
                version,
                value: household,
            },
        );
    }

    pub fn audit_log_len(&self) -> usize {
        self.lock().audit_log.len()
    }

    fn lock(&self) -> MutexGuard<'_, InnerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RegistryStore for InMemoryStore {
    type Transaction = InMemoryTransaction;

    async fn begin_transaction(&self) -> Result<InMemoryTransaction, StorageError> {
        Ok(InMemoryTransaction {
            state: Arc::clone(&self.state),
            seen_versions: HashMap::new(),
            residents: BTreeMap::new(),
            households: BTreeMap::new(),
            audit: Vec::new(),
        })
    }

    async fn audit_records(&self, resource_id: &str) -> Result<Vec<AuditRecord>, StorageError> {
        Ok(self
            .lock()
            .audit_log
            .iter()
            .filter(|r| r.resource_id == resource_id)
            .cloned()
            .collect())
    }
}

#[derive(Debug)]
pub struct InMemoryTransaction {
    state: Arc<Mutex<InnerState>>,
    seen_versions: HashMap<RowKey, u64>,
    residents: BTreeMap<ResidentId, Resident>,
    households: BTreeMap<HouseholdId, Household>,
    audit: Vec<AuditRecord>,
}

impl InMemoryTransaction {
    fn lock(&self) -> MutexGuard<'_, InnerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn observe(&mut self, key: RowKey) {
        if !self.seen_versions.contains_key(&key) {
            let version = self.lock().version_of(key);
            self.seen_versions.insert(key, version);
        }
    }

    fn merged_residents<F>(&self, keep: F) -> Vec<Resident>
    where
        F: Fn(&Resident) -> bool,
    {
        let state = self.lock();
        let mut merged: BTreeMap<ResidentId, Resident> = state
            .residents
            .iter()
            .filter(|(id, _)| !self.residents.contains_key(id))
            .map(|(id, r)| (*id, r.value.clone()))
            .collect();
        drop(state);
        merged.extend(self.residents.iter().map(|(id, r)| (*id, r.clone())));
        merged.into_values().filter(|r| keep(r)).collect()
    }

    fn merged_households<F>(&self, keep: F) -> Vec<Household>
    where
        F: Fn(&Household) -> bool,
    {
        let state = self.lock();
        let mut merged: BTreeMap<HouseholdId, Household> = state
            .households
            .iter()
            .filter(|(id, _)| !self.households.contains_key(id))
            .map(|(id, h)| (*id, h.value.clone()))
            .collect();
        drop(state);
        merged.extend(self.households.iter().map(|(id, h)| (*id, h.clone())));
        merged.into_values().filter(|h| keep(h)).collect()
    }
}

impl RegistryTransaction for InMemoryTransaction {
    async fn get_resident(&mut self, id: ResidentId) -> Result<Option<Resident>, StorageError> {
        if let Some(staged) = self.residents.get(&id) {
            return Ok(Some(staged.clone()));
        }
        Ok(self.lock().residents.get(&id).map(|r| r.value.clone()))
    }

    async fn get_resident_for_update(
        &mut self,
        id: ResidentId,
    ) -> Result<Option<Resident>, StorageError> {
        self.observe(RowKey::Resident(id));
        self.get_resident(id).await
    }

    async fn get_household(&mut self, id: HouseholdId) -> Result<Option<Household>, StorageError> {
        if let Some(staged) = self.households.get(&id) {
            return Ok(Some(staged.clone()));
        }
        Ok(self.lock().households.get(&id).map(|h| h.value.clone()))
    }

    async fn get_household_for_update(
        &mut self,
        id: HouseholdId,
    ) -> Result<Option<Household>, StorageError> {
        self.observe(RowKey::Household(id));
        self.get_household(id).await
    }

    async fn residents_in_household(
        &mut self,
        id: HouseholdId,
    ) -> Result<Vec<Resident>, StorageError> {
        Ok(self.merged_residents(|r| r.household_id == Some(id)))
    }

    async fn residents_by_unit_code(
        &mut self,
        unit_code: &UnitCode,
        page: PageRequest,
    ) -> Result<Page<Resident>, StorageError> {
        let all = self.merged_residents(|r| r.unit_code() == unit_code);
        Ok(Page::from_sorted(all, page))
    }

    async fn households_by_unit_code(
        &mut self,
        unit_code: &UnitCode,
        page: PageRequest,
    ) -> Result<Page<Household>, StorageError> {
        let all = self.merged_households(|h| h.unit_code() == unit_code);
        Ok(Page::from_sorted(all, page))
    }

    async fn upsert_resident(&mut self, resident: &Resident) -> Result<(), StorageError> {
        self.observe(RowKey::Resident(resident.id));
        self.residents.insert(resident.id, resident.clone());
        Ok(())
    }

    async fn upsert_household(&mut self, household: &Household) -> Result<(), StorageError> {
        self.observe(RowKey::Household(household.id));
        self.households.insert(household.id, household.clone());
        Ok(())
    }

    async fn append_audit(&mut self, record: &AuditRecord) -> Result<(), StorageError> {
        if self.lock().fail_audit_writes {
            return Err(StorageError::AuditWriteFailed(format!(
                "audit log rejected record {}",
                record.id
            )));
        }
        self.audit.push(record.clone());
        Ok(())
    }

    async fn commit(self) -> Result<(), StorageError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        let written = self
            .residents
            .keys()
            .map(|id| RowKey::Resident(*id))
            .chain(self.households.keys().map(|id| RowKey::Household(*id)));
        for key in written {
            let seen = self.seen_versions.get(&key).copied().unwrap_or(0);
            if state.version_of(key) != seen {
                let err = key.conflict();
                tracing::debug!(error = %err, "in-memory commit rejected");
                return Err(err);
            }
        }

        for (id, resident) in self.residents {
            let version = state.version_of(RowKey::Resident(id)) + 1;
            state.residents.insert(
                id,
                Versioned {
                    version,
                    value: resident,
                },
            );
        }
        for (id, household) in self.households {
            let version = state.version_of(RowKey::Household(id)) + 1;
            state.households.insert(
                id,
                Versioned {
                    version,
                    value: household,
                },
            );
        }
        state.audit_log.extend(self.audit);

        Ok(())
    }

    async fn rollback(self) -> Result<(), StorageError> {
        Ok(())
    }
}
