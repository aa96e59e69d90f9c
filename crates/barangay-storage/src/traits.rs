use barangay_core::model::{
    AuditRecord, Household, HouseholdId, Resident, ResidentId, ResourceType, UnitCode,
};

pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const MAX_PAGE_SIZE: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("{resource_type} {id} was modified by a concurrent transaction")]
    Conflict {
        resource_type: ResourceType,
        id: String,
    },
    #[error("audit write failed: {0}")]
    AuditWriteFailed(String),
    #[error("internal storage error: {0}")]
    Internal(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub offset: usize,
    pub limit: usize,
}

impl PageRequest {
    pub fn new(offset: usize, limit: usize) -> Self {
        Self {
            offset,
            limit: limit.clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn next(self) -> Self {
        Self {
            offset: self.offset + self.limit,
            ..self
        }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(0, DEFAULT_PAGE_SIZE)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_offset: Option<usize>,
}

impl<T> Page<T> {
    pub fn from_sorted(all: Vec<T>, request: PageRequest) -> Self {
        let total = all.len();
        let items: Vec<T> = all
            .into_iter()
            .skip(request.offset)
            .take(request.limit)
            .collect();
        let end = request.offset + items.len();
        Self {
            next_offset: (end < total).then_some(end),
            items,
        }
    }
}

pub trait RegistryStore: Send + Sync {
    type Transaction: RegistryTransaction;

    fn begin_transaction(
        &self,
    ) -> impl Future<Output = Result<Self::Transaction, StorageError>> + Send;

    fn audit_records(
        &self,
        resource_id: &str,
    ) -> impl Future<Output = Result<Vec<AuditRecord>, StorageError>> + Send;
}

pub trait RegistryTransaction: Send {
    fn get_resident(
        &mut self,
        id: ResidentId,
    ) -> impl Future<Output = Result<Option<Resident>, StorageError>> + Send;

    // Rows read for update stay locked (or version-pinned) until the
    // transaction ends. Writers lock residents before households, and
    // households in id order.
    fn get_resident_for_update(
        &mut self,
        id: ResidentId,
    ) -> impl Future<Output = Result<Option<Resident>, StorageError>> + Send;

    fn get_household(
        &mut self,
        id: HouseholdId,
    ) -> impl Future<Output = Result<Option<Household>, StorageError>> + Send;

    fn get_household_for_update(
        &mut self,
        id: HouseholdId,
    ) -> impl Future<Output = Result<Option<Household>, StorageError>> + Send;

    // Never locks member rows; membership changes serialize on the
    // household row instead.
    fn residents_in_household(
        &mut self,
        id: HouseholdId,
    ) -> impl Future<Output = Result<Vec<Resident>, StorageError>> + Send;

    fn residents_by_unit_code(
        &mut self,
        unit_code: &UnitCode,
        page: PageRequest,
    ) -> impl Future<Output = Result<Page<Resident>, StorageError>> + Send;

    fn households_by_unit_code(
        &mut self,
        unit_code: &UnitCode,
        page: PageRequest,
    ) -> impl Future<Output = Result<Page<Household>, StorageError>> + Send;

    fn upsert_resident(
        &mut self,
        resident: &Resident,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    fn upsert_household(
        &mut self,
        household: &Household,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    fn append_audit(
        &mut self,
        record: &AuditRecord,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    fn commit(self) -> impl Future<Output = Result<(), StorageError>> + Send;

    fn rollback(self) -> impl Future<Output = Result<(), StorageError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_request_clamps_limit() {
        assert_eq!(PageRequest::new(0, 0).limit, 1);
        assert_eq!(PageRequest::new(0, 10_000).limit, MAX_PAGE_SIZE);
    }

    #[test]
    fn page_reports_next_offset_until_exhausted() {
        let first = Page::from_sorted((0..5).collect(), PageRequest::new(0, 2));
        assert_eq!(first.items, vec![0, 1]);
        assert_eq!(first.next_offset, Some(2));

        let last = Page::from_sorted((0..5).collect(), PageRequest::new(4, 2));
        assert_eq!(last.items, vec![4]);
        assert_eq!(last.next_offset, None);
    }

    #[test]
    fn page_past_the_end_is_empty() {
        let page = Page::from_sorted((0..3).collect::<Vec<i32>>(), PageRequest::new(10, 2));

        assert!(page.items.is_empty());
        assert_eq!(page.next_offset, None);
    }
}
