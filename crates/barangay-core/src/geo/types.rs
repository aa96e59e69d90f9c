use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::{GeoPlacement, UnitCode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitLevel {
    Region,
    Province,
    City,
    LocalUnit,
}

impl UnitLevel {
    pub fn parent_level(self) -> Option<UnitLevel> {
        match self {
            Self::Region => None,
            Self::Province => Some(Self::Region),
            Self::City => Some(Self::Province),
            Self::LocalUnit => Some(Self::City),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Region => "region",
            Self::Province => "province",
            Self::City => "city",
            Self::LocalUnit => "local_unit",
        }
    }
}

impl fmt::Display for UnitLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeographicUnit {
    pub code: UnitCode,
    pub level: UnitLevel,
    #[serde(default)]
    pub parent_code: Option<UnitCode>,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceData {
    pub version: u64,
    pub units: Vec<GeographicUnit>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct UnitChain(Vec<GeographicUnit>);

impl UnitChain {
    pub(crate) fn new(units: Vec<GeographicUnit>) -> Self {
        Self(units)
    }

    pub fn units(&self) -> &[GeographicUnit] {
        &self.0
    }

    pub fn leaf(&self) -> &GeographicUnit {
        // a chain always holds at least the resolved unit
        &self.0[self.0.len() - 1]
    }

    pub fn root(&self) -> &GeographicUnit {
        &self.0[0]
    }

    pub fn codes(&self) -> Vec<UnitCode> {
        self.0.iter().map(|u| u.code.clone()).collect()
    }

    pub fn ancestor_codes(&self) -> Vec<UnitCode> {
        self.0[..self.0.len() - 1]
            .iter()
            .map(|u| u.code.clone())
            .collect()
    }

    pub fn contains(&self, code: &UnitCode) -> bool {
        self.0.iter().any(|u| &u.code == code)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_placement(&self) -> Option<GeoPlacement> {
        match self.0.as_slice() {
            [region, province, city, unit]
                if region.level == UnitLevel::Region
                    && province.level == UnitLevel::Province
                    && city.level == UnitLevel::City
                    && unit.level == UnitLevel::LocalUnit =>
            {
                Some(GeoPlacement {
                    region_code: region.code.clone(),
                    province_code: province.code.clone(),
                    city_code: city.code.clone(),
                    unit_code: unit.code.clone(),
                })
            }
            _ => None,
        }
    }
}
