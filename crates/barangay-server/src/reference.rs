use std::path::Path;

use barangay_core::geo::{GeoTree, HierarchyError, ReferenceData, UnitLevel};

#[derive(Debug, thiserror::Error)]
pub enum ReferenceError {
    #[error("failed to read geography file '{0}': {1}")]
    ReadFile(String, String),

    #[error("failed to parse geography file: {0}")]
    Parse(String),

    #[error(transparent)]
    Hierarchy(#[from] HierarchyError),
}

pub fn load_geography(path: &Path) -> Result<GeoTree, ReferenceError> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| ReferenceError::ReadFile(path.display().to_string(), e.to_string()))?;
    let data: ReferenceData =
        serde_json::from_str(&contents).map_err(|e| ReferenceError::Parse(e.to_string()))?;
    Ok(GeoTree::from_reference(data)?)
}

pub fn level_counts(tree: &GeoTree) -> [(UnitLevel, usize); 4] {
    let levels = [
        UnitLevel::Region,
        UnitLevel::Province,
        UnitLevel::City,
        UnitLevel::LocalUnit,
    ];
    levels.map(|level| (level, tree.units().filter(|u| u.level == level).count()))
}
