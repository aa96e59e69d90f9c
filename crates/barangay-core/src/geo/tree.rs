use std::collections::HashMap;

use crate::model::{GeoPlacement, UnitCode};

use super::types::{GeographicUnit, ReferenceData, UnitChain, UnitLevel};
use super::{GeoError, HierarchyError};

#[derive(Debug, Clone, Default)]
pub struct GeoTree {
    version: u64,
    units: HashMap<UnitCode, GeographicUnit>,
    children: HashMap<UnitCode, Vec<UnitCode>>,
}

impl GeoTree {
    pub fn build(version: u64, units: Vec<GeographicUnit>) -> Result<Self, HierarchyError> {
        let mut by_code: HashMap<UnitCode, GeographicUnit> = HashMap::with_capacity(units.len());

        for unit in units {
            if unit.code.as_str().trim().is_empty() {
                return Err(HierarchyError::EmptyCode { name: unit.name });
            }
            if by_code.contains_key(&unit.code) {
                return Err(HierarchyError::DuplicateCode(unit.code));
            }
            by_code.insert(unit.code.clone(), unit);
        }

        let mut children: HashMap<UnitCode, Vec<UnitCode>> = HashMap::new();

        for unit in by_code.values() {
            match (unit.level.parent_level(), &unit.parent_code) {
                (None, None) => {}
                (None, Some(_)) => {
                    return Err(HierarchyError::UnexpectedParent(unit.code.clone()));
                }
                (Some(_), None) => {
                    return Err(HierarchyError::MissingParent(unit.code.clone()));
                }
                (Some(expected), Some(parent_code)) => {
                    let parent = by_code.get(parent_code).ok_or_else(|| {
                        HierarchyError::UnknownParent {
                            code: unit.code.clone(),
                            parent_code: parent_code.clone(),
                        }
                    })?;
                    if parent.level != expected {
                        return Err(HierarchyError::LevelMismatch {
                            code: unit.code.clone(),
                            level: unit.level,
                            parent_code: parent_code.clone(),
                            parent_level: parent.level,
                        });
                    }
                    children
                        .entry(parent_code.clone())
                        .or_default()
                        .push(unit.code.clone());
                }
            }
        }

        for codes in children.values_mut() {
            codes.sort();
        }

        Ok(Self {
            version,
            units: by_code,
            children,
        })
    }

    pub fn from_reference(data: ReferenceData) -> Result<Self, HierarchyError> {
        Self::build(data.version, data.units)
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn units(&self) -> impl Iterator<Item = &GeographicUnit> {
        self.units.values()
    }

    pub fn get(&self, code: &UnitCode) -> Option<&GeographicUnit> {
        self.units.get(code)
    }

    pub fn resolve(&self, code: &UnitCode) -> Result<UnitChain, GeoError> {
        let mut current = self
            .units
            .get(code)
            .ok_or_else(|| GeoError::NotFound(code.clone()))?;

        let mut chain = vec![current.clone()];
        while let Some(parent_code) = &current.parent_code {
            // parents were checked at build time
            current = self
                .units
                .get(parent_code)
                .ok_or_else(|| GeoError::NotFound(parent_code.clone()))?;
            chain.push(current.clone());
        }
        chain.reverse();

        Ok(UnitChain::new(chain))
    }

    pub fn resolve_leaf(&self, code: &UnitCode) -> Result<UnitChain, GeoError> {
        let chain = self.resolve(code)?;
        let leaf = chain.leaf();
        if leaf.level != UnitLevel::LocalUnit {
            return Err(GeoError::NotLeafUnit {
                code: code.clone(),
                level: leaf.level,
            });
        }
        Ok(chain)
    }

    pub fn validate_chain(
        &self,
        unit_code: &UnitCode,
        declared_parent_codes: &[UnitCode],
    ) -> Result<UnitChain, GeoError> {
        let chain = self.resolve(unit_code)?;
        let ancestors = chain.ancestor_codes();

        let mut position = 0;
        for declared in declared_parent_codes {
            match ancestors[position..].iter().position(|a| a == declared) {
                Some(offset) => position += offset + 1,
                None => {
                    return Err(GeoError::InconsistentChain {
                        unit_code: unit_code.clone(),
                        declared: declared.clone(),
                    });
                }
            }
        }

        Ok(chain)
    }

    pub fn placement(&self, unit_code: &UnitCode) -> Result<GeoPlacement, GeoError> {
        let chain = self.resolve_leaf(unit_code)?;
        chain.to_placement().ok_or_else(|| GeoError::NotLeafUnit {
            code: unit_code.clone(),
            level: chain.leaf().level,
        })
    }

    pub fn validate_placement(&self, placement: &GeoPlacement) -> Result<(), GeoError> {
        self.resolve_leaf(&placement.unit_code)?;
        self.validate_chain(&placement.unit_code, &placement.ancestor_codes())?;
        Ok(())
    }

    pub fn children(&self, code: &UnitCode) -> Result<Vec<&GeographicUnit>, GeoError> {
        if !self.units.contains_key(code) {
            return Err(GeoError::NotFound(code.clone()));
        }
        Ok(self
            .children
            .get(code)
            .map(|codes| codes.iter().filter_map(|c| self.units.get(c)).collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(code: &str, level: UnitLevel, parent: Option<&str>, name: &str) -> GeographicUnit {
        GeographicUnit {
            code: UnitCode::from(code),
            level,
            parent_code: parent.map(UnitCode::from),
            name: name.to_string(),
        }
    }

    fn sample_units() -> Vec<GeographicUnit> {
        vec![
            unit("130000000", UnitLevel::Region, None, "NCR"),
            unit(
                "137400000",
                UnitLevel::Province,
                Some("130000000"),
                "Second District",
            ),
            unit(
                "137404000",
                UnitLevel::City,
                Some("137400000"),
                "Quezon City",
            ),
            unit(
                "137404001",
                UnitLevel::LocalUnit,
                Some("137404000"),
                "Alicia",
            ),
            unit(
                "137404002",
                UnitLevel::LocalUnit,
                Some("137404000"),
                "Amihan",
            ),
        ]
    }

    fn sample_tree() -> GeoTree {
        GeoTree::build(1, sample_units()).unwrap()
    }

    #[test]
    fn resolve_returns_root_to_leaf_chain() {
        let tree = sample_tree();

        let chain = tree.resolve(&UnitCode::from("137404001")).unwrap();

        assert_eq!(
            chain.codes(),
            vec![
                UnitCode::from("130000000"),
                UnitCode::from("137400000"),
                UnitCode::from("137404000"),
                UnitCode::from("137404001"),
            ]
        );
        assert_eq!(chain.root().level, UnitLevel::Region);
        assert_eq!(chain.leaf().name, "Alicia");
    }

    #[test]
    fn resolve_unknown_code_is_not_found() {
        let tree = sample_tree();

        let result = tree.resolve(&UnitCode::from("nonexistent"));

        assert!(
            matches!(result, Err(GeoError::NotFound(ref code)) if code.as_str() == "nonexistent")
        );
    }

    #[test]
    fn resolve_is_idempotent() {
        let tree = sample_tree();
        let code = UnitCode::from("137404002");

        assert_eq!(tree.resolve(&code).unwrap(), tree.resolve(&code).unwrap());
    }

    #[test]
    fn resolve_of_intermediate_unit_stops_at_that_unit() {
        let tree = sample_tree();

        let chain = tree.resolve(&UnitCode::from("137404000")).unwrap();

        assert_eq!(chain.len(), 3);
        assert!(chain.to_placement().is_none());
    }

    #[test]
    fn resolve_leaf_rejects_city() {
        let tree = sample_tree();

        let result = tree.resolve_leaf(&UnitCode::from("137404000"));

        assert!(matches!(
            result,
            Err(GeoError::NotLeafUnit {
                level: UnitLevel::City,
                ..
            })
        ));
    }

    #[test]
    fn placement_derives_full_code_chain() {
        let tree = sample_tree();

        let placement = tree.placement(&UnitCode::from("137404001")).unwrap();

        assert_eq!(placement.region_code.as_str(), "130000000");
        assert_eq!(placement.province_code.as_str(), "137400000");
        assert_eq!(placement.city_code.as_str(), "137404000");
        assert_eq!(placement.unit_code.as_str(), "137404001");
    }

    #[test]
    fn validate_chain_accepts_full_and_partial_declarations() {
        let tree = sample_tree();
        let code = UnitCode::from("137404001");

        assert!(
            tree.validate_chain(
                &code,
                &[
                    UnitCode::from("130000000"),
                    UnitCode::from("137400000"),
                    UnitCode::from("137404000"),
                ],
            )
            .is_ok()
        );
        assert!(
            tree.validate_chain(&code, &[UnitCode::from("137404000")])
                .is_ok()
        );
        assert!(tree.validate_chain(&code, &[]).is_ok());
    }

    #[test]
    fn validate_chain_rejects_foreign_ancestor() {
        let tree = sample_tree();

        let result = tree.validate_chain(
            &UnitCode::from("137404001"),
            &[UnitCode::from("130000000"), UnitCode::from("137404002")],
        );

        assert!(matches!(
            result,
            Err(GeoError::InconsistentChain { ref declared, .. }) if declared.as_str() == "137404002"
        ));
    }

    #[test]
    fn validate_chain_rejects_out_of_order_ancestors() {
        let tree = sample_tree();

        let result = tree.validate_chain(
            &UnitCode::from("137404001"),
            &[UnitCode::from("137404000"), UnitCode::from("130000000")],
        );

        assert!(matches!(result, Err(GeoError::InconsistentChain { .. })));
    }

    #[test]
    fn validate_chain_unknown_unit_is_not_found() {
        let tree = sample_tree();

        let result = tree.validate_chain(&UnitCode::from("999999999"), &[]);

        assert!(matches!(result, Err(GeoError::NotFound(_))));
    }

    #[test]
    fn validate_placement_detects_drifted_city() {
        let tree = sample_tree();
        let mut placement = tree.placement(&UnitCode::from("137404001")).unwrap();
        placement.city_code = UnitCode::from("137400000");

        assert!(tree.validate_placement(&placement).is_err());
    }

    #[test]
    fn build_rejects_duplicate_code() {
        let mut units = sample_units();
        units.push(unit(
            "137404001",
            UnitLevel::LocalUnit,
            Some("137404000"),
            "Duplicate",
        ));

        let result = GeoTree::build(1, units);

        assert!(matches!(result, Err(HierarchyError::DuplicateCode(_))));
    }

    #[test]
    fn build_rejects_unknown_parent() {
        let mut units = sample_units();
        units.push(unit(
            "137404003",
            UnitLevel::LocalUnit,
            Some("137499000"),
            "Orphan",
        ));

        let result = GeoTree::build(1, units);

        assert!(matches!(result, Err(HierarchyError::UnknownParent { .. })));
    }

    #[test]
    fn build_rejects_parent_that_skips_a_level() {
        let mut units = sample_units();
        units.push(unit(
            "137404003",
            UnitLevel::LocalUnit,
            Some("137400000"),
            "Skipper",
        ));

        let result = GeoTree::build(1, units);

        assert!(matches!(
            result,
            Err(HierarchyError::LevelMismatch {
                parent_level: UnitLevel::Province,
                ..
            })
        ));
    }

    #[test]
    fn build_rejects_region_with_parent_and_orphaned_province() {
        let with_parent = vec![
            unit("010000000", UnitLevel::Region, None, "Ilocos"),
            unit("020000000", UnitLevel::Region, Some("010000000"), "Bad"),
        ];
        let orphan = vec![unit("012800000", UnitLevel::Province, None, "Ilocos Norte")];

        assert!(matches!(
            GeoTree::build(1, with_parent),
            Err(HierarchyError::UnexpectedParent(_))
        ));
        assert!(matches!(
            GeoTree::build(1, orphan),
            Err(HierarchyError::MissingParent(_))
        ));
    }

    #[test]
    fn build_rejects_blank_code() {
        let units = vec![unit("  ", UnitLevel::Region, None, "Nowhere")];

        assert!(matches!(
            GeoTree::build(1, units),
            Err(HierarchyError::EmptyCode { .. })
        ));
    }

    #[test]
    fn children_are_sorted_by_code() {
        let tree = sample_tree();

        let children = tree.children(&UnitCode::from("137404000")).unwrap();

        let codes: Vec<&str> = children.iter().map(|u| u.code.as_str()).collect();
        assert_eq!(codes, vec!["137404001", "137404002"]);
        assert!(
            tree.children(&UnitCode::from("137404001"))
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn reference_data_parses_from_json() {
        let json = r#"{
            "version": 7,
            "units": [
                {"code": "130000000", "level": "region", "name": "NCR"},
                {"code": "137400000", "level": "province", "parent_code": "130000000", "name": "Second District"}
            ]
        }"#;
        let data: ReferenceData = serde_json::from_str(json).unwrap();

        let tree = GeoTree::from_reference(data).unwrap();

        assert_eq!(tree.version(), 7);
        assert_eq!(tree.len(), 2);
    }
}
