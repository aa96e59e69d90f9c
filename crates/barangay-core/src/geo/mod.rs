mod resolver;
mod tree;
pub mod types;

pub use resolver::HierarchyResolver;
pub use tree::GeoTree;
pub use types::{GeographicUnit, ReferenceData, UnitChain, UnitLevel};

use crate::model::UnitCode;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GeoError {
    #[error("unit code not found: {0}")]
    NotFound(UnitCode),

    #[error("unit '{code}' is a {level}, not a local unit")]
    NotLeafUnit { code: UnitCode, level: UnitLevel },

    #[error("declared ancestor '{declared}' is not part of the chain of '{unit_code}'")]
    InconsistentChain {
        unit_code: UnitCode,
        declared: UnitCode,
    },

    #[error("reference data version {offered} is not newer than current {current}")]
    StaleReferenceData { current: u64, offered: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HierarchyError {
    #[error("unit '{name}' has an empty code")]
    EmptyCode { name: String },

    #[error("duplicate unit code: {0}")]
    DuplicateCode(UnitCode),

    #[error("region '{0}' must not have a parent")]
    UnexpectedParent(UnitCode),

    #[error("unit '{0}' is missing its parent code")]
    MissingParent(UnitCode),

    #[error("unit '{code}' references unknown parent '{parent_code}'")]
    UnknownParent {
        code: UnitCode,
        parent_code: UnitCode,
    },

    #[error("{level} '{code}' cannot have {parent_level} '{parent_code}' as parent")]
    LevelMismatch {
        code: UnitCode,
        level: UnitLevel,
        parent_code: UnitCode,
        parent_level: UnitLevel,
    },
}
