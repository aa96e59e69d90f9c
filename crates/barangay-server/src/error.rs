use std::fmt;

use barangay_core::derive::{ConsistencyError, DerivationError};
use barangay_core::geo::{GeoError, HierarchyError};
use barangay_core::model::{HouseholdId, ResidentId, ResourceType, UnitCode};
use barangay_core::policy::DenyReason;
use barangay_storage::StorageError;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error(transparent)]
    Geo(#[from] GeoError),

    #[error(transparent)]
    Derivation(#[from] DerivationError),

    #[error("household not found: {0}")]
    UnknownHousehold(HouseholdId),

    #[error(
        "household {household_id} belongs to unit {household_unit}, not {resident_unit}"
    )]
    HouseholdUnitMismatch {
        household_id: HouseholdId,
        household_unit: UnitCode,
        resident_unit: UnitCode,
    },

    #[error("resident {resident_id} is not an active member of household {household_id}")]
    HeadNotActiveMember {
        resident_id: ResidentId,
        household_id: HouseholdId,
    },

    #[error("resident {0} is deactivated")]
    ResidentInactive(ResidentId),

    #[error("invalid {field}: {reason}")]
    InvalidField { field: String, reason: String },

    #[error("update changes no fields")]
    NoChanges,
}

impl ValidationError {
    pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Geo(_) | Self::HouseholdUnitMismatch { .. } => Some("unit_code"),
            Self::Derivation(_) => Some("birthdate"),
            Self::UnknownHousehold(_) => Some("household_id"),
            Self::HeadNotActiveMember { .. } => Some("head_resident_id"),
            Self::ResidentInactive(_) => Some("is_active"),
            Self::InvalidField { field, .. } => Some(field),
            Self::NoChanges => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("access denied: {0}")]
    Denied(DenyReason),

    #[error("{resource_type} not found: {id}")]
    NotFound {
        resource_type: ResourceType,
        id: String,
    },

    #[error(transparent)]
    Consistency(#[from] ConsistencyError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("invalid reference data: {0}")]
    ReferenceData(String),
}

impl ApiError {
    pub fn resident_not_found(id: ResidentId) -> Self {
        Self::NotFound {
            resource_type: ResourceType::Resident,
            id: id.to_string(),
        }
    }

    pub fn household_not_found(id: HouseholdId) -> Self {
        Self::NotFound {
            resource_type: ResourceType::Household,
            id: id.to_string(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::Denied(reason) => reason.as_str(),
            Self::NotFound { .. } => "not_found",
            Self::Consistency(_) => "consistency_error",
            Self::Storage(_) => "retry",
            Self::ReferenceData(_) => "invalid_reference_data",
        }
    }
}

impl From<GeoError> for ApiError {
    fn from(err: GeoError) -> Self {
        Self::Validation(ValidationError::Geo(err))
    }
}

impl From<HierarchyError> for ApiError {
    fn from(err: HierarchyError) -> Self {
        Self::ReferenceData(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MutationStage {
    Received,
    Authorized,
    Validated,
    Derived,
    Persisted,
    Audited,
    Committed,
}

impl MutationStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Authorized => "authorized",
            Self::Validated => "validated",
            Self::Derived => "derived",
            Self::Persisted => "persisted",
            Self::Audited => "audited",
            Self::Committed => "committed",
        }
    }
}

impl fmt::Display for MutationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("mutation rejected before reaching {stage}: {error}")]
pub struct Rejection {
    pub stage: MutationStage,
    #[source]
    pub error: ApiError,
}

impl Rejection {
    pub fn new(stage: MutationStage, error: impl Into<ApiError>) -> Self {
        Self {
            stage,
            error: error.into(),
        }
    }
}
