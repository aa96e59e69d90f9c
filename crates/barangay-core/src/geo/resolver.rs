use std::sync::{Arc, PoisonError, RwLock};

use crate::model::{GeoPlacement, UnitCode};

use super::GeoError;
use super::tree::GeoTree;
use super::types::UnitChain;

#[derive(Debug)]
pub struct HierarchyResolver {
    current: RwLock<Arc<GeoTree>>,
}

impl HierarchyResolver {
    pub fn new(tree: GeoTree) -> Self {
        Self {
            current: RwLock::new(Arc::new(tree)),
        }
    }

    pub fn snapshot(&self) -> Arc<GeoTree> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    pub fn version(&self) -> u64 {
        self.snapshot().version()
    }

    pub fn resolve(&self, code: &UnitCode) -> Result<UnitChain, GeoError> {
        self.snapshot().resolve(code)
    }

    pub fn validate_chain(
        &self,
        unit_code: &UnitCode,
        declared_parent_codes: &[UnitCode],
    ) -> Result<UnitChain, GeoError> {
        self.snapshot()
            .validate_chain(unit_code, declared_parent_codes)
    }

    pub fn placement(&self, unit_code: &UnitCode) -> Result<GeoPlacement, GeoError> {
        self.snapshot().placement(unit_code)
    }

    pub fn refresh(&self, tree: GeoTree) -> Result<u64, GeoError> {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let current = guard.version();
        if tree.version() <= current && !guard.is_empty() {
            return Err(GeoError::StaleReferenceData {
                current,
                offered: tree.version(),
            });
        }
        *guard = Arc::new(tree);
        Ok(current)
    }
}

impl Default for HierarchyResolver {
    fn default() -> Self {
        Self::new(GeoTree::default())
    }
}
