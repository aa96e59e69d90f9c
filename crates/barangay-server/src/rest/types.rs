use serde::{Deserialize, Serialize};

use barangay_core::derive::FieldDiff;
use barangay_core::geo::{GeographicUnit, UnitChain};
use barangay_core::model::{Resident, ResidentId};

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<&'static str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub diffs: Vec<FieldDiff>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListResidentsQuery {
    #[serde(default)]
    pub offset: Option<usize>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ResidentPageResponse {
    pub residents: Vec<Resident>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_offset: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct SetHeadRequest {
    pub head_resident_id: Option<ResidentId>,
}

#[derive(Debug, Serialize)]
pub struct GeographyResponse {
    pub version: u64,
    pub chain: UnitChain,
    pub children: Vec<GeographicUnit>,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub previous_version: u64,
    pub version: u64,
}
