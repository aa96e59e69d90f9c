pub mod migrations;
mod queries;

use sqlx::{PgPool, Postgres, Transaction};

use barangay_core::model::{AuditRecord, Household, HouseholdId, Resident, ResidentId, UnitCode};

use crate::traits::{Page, PageRequest, RegistryStore, RegistryTransaction, StorageError};

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str) -> Result<Self, StorageError> {
        let pool = PgPool::connect(url)
            .await
            .map_err(|e| StorageError::Internal(e.to_string()))?;
        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> Result<(), StorageError> {
        migrations::run_migrations(&self.pool)
            .await
            .map_err(|e| StorageError::Internal(e.to_string()))
    }
}

impl RegistryStore for PostgresStore {
    type Transaction = PostgresTransaction;

    async fn begin_transaction(&self) -> Result<PostgresTransaction, StorageError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Internal(e.to_string()))?;
        Ok(PostgresTransaction { tx })
    }

    async fn audit_records(&self, resource_id: &str) -> Result<Vec<AuditRecord>, StorageError> {
        queries::select_audit_records(&self.pool, resource_id).await
    }
}

pub struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
}

impl RegistryTransaction for PostgresTransaction {
    async fn get_resident(&mut self, id: ResidentId) -> Result<Option<Resident>, StorageError> {
        queries::select_resident(&mut self.tx, id).await
    }

    async fn get_resident_for_update(
        &mut self,
        id: ResidentId,
    ) -> Result<Option<Resident>, StorageError> {
        queries::select_resident_for_update(&mut self.tx, id).await
    }

    async fn get_household(&mut self, id: HouseholdId) -> Result<Option<Household>, StorageError> {
        queries::select_household(&mut self.tx, id).await
    }

    async fn get_household_for_update(
        &mut self,
        id: HouseholdId,
    ) -> Result<Option<Household>, StorageError> {
        queries::select_household_for_update(&mut self.tx, id).await
    }

    async fn residents_in_household(
        &mut self,
        id: HouseholdId,
    ) -> Result<Vec<Resident>, StorageError> {
        queries::select_household_members(&mut self.tx, id).await
    }

    async fn residents_by_unit_code(
        &mut self,
        unit_code: &UnitCode,
        page: PageRequest,
    ) -> Result<Page<Resident>, StorageError> {
        queries::select_residents_by_unit(&mut self.tx, unit_code, page).await
    }

    async fn households_by_unit_code(
        &mut self,
        unit_code: &UnitCode,
        page: PageRequest,
    ) -> Result<Page<Household>, StorageError> {
        queries::select_households_by_unit(&mut self.tx, unit_code, page).await
    }

    async fn upsert_resident(&mut self, resident: &Resident) -> Result<(), StorageError> {
        queries::upsert_resident(&mut self.tx, resident).await
    }

    async fn upsert_household(&mut self, household: &Household) -> Result<(), StorageError> {
        queries::upsert_household(&mut self.tx, household).await
    }

    async fn append_audit(&mut self, record: &AuditRecord) -> Result<(), StorageError> {
        queries::insert_audit_record(&mut self.tx, record).await
    }

    async fn commit(self) -> Result<(), StorageError> {
        self.tx
            .commit()
            .await
            .map_err(|e| StorageError::Internal(e.to_string()))
    }

    async fn rollback(self) -> Result<(), StorageError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| StorageError::Internal(e.to_string()))
    }
}
