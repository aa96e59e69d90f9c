use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResidentId(Uuid);

impl ResidentId {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for ResidentId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for ResidentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HouseholdId(Uuid);

impl HouseholdId {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for HouseholdId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for HouseholdId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitCode(String);

impl UnitCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for UnitCode {
    fn from(code: &str) -> Self {
        Self(code.to_string())
    }
}

impl From<String> for UnitCode {
    fn from(code: String) -> Self {
        Self(code)
    }
}

impl fmt::Display for UnitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(String);

impl ActorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sex {
    Male,
    Female,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmploymentStatus {
    Employed,
    SelfEmployed,
    NotEmployed,
    Retired,
}

impl EmploymentStatus {
    pub fn is_employed(self) -> bool {
        matches!(self, Self::Employed | Self::SelfEmployed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EducationStatus {
    CurrentlyEnrolled,
    NotEnrolled,
    DroppedOut,
    Graduated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentLoad {
    FullTime,
    PartTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonName {
    pub first_name: String,
    #[serde(default)]
    pub middle_name: Option<String>,
    pub last_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    #[serde(default)]
    pub mobile_number: Option<String>,
    #[serde(default)]
    pub telephone_number: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResidentFacts {
    pub birthdate: NaiveDate,
    pub sex: Sex,
    pub employment_status: EmploymentStatus,
    pub education_status: EducationStatus,
    #[serde(default)]
    pub enrollment_load: Option<EnrollmentLoad>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GeoPlacement {
    pub region_code: UnitCode,
    pub province_code: UnitCode,
    pub city_code: UnitCode,
    pub unit_code: UnitCode,
}

impl GeoPlacement {
    pub fn ancestor_codes(&self) -> Vec<UnitCode> {
        vec![
            self.region_code.clone(),
            self.province_code.clone(),
            self.city_code.clone(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedResidentFields {
    pub as_of: NaiveDate,
    pub age: u32,
    pub is_minor: bool,
    pub is_senior_citizen: bool,
    pub is_out_of_school_youth: bool,
    pub is_unemployed: bool,
    pub is_employed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resident {
    pub id: ResidentId,
    pub name: PersonName,
    #[serde(flatten)]
    pub facts: ResidentFacts,
    pub contact: ContactInfo,
    pub is_active: bool,
    pub household_id: Option<HouseholdId>,
    pub placement: GeoPlacement,
    pub derived: DerivedResidentFields,
}

impl Resident {
    pub fn unit_code(&self) -> &UnitCode {
        &self.placement.unit_code
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedHouseholdFields {
    pub total_members: u32,
    pub adult_count: u32,
    pub minor_count: u32,
    pub senior_count: u32,
    pub employed_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Household {
    pub id: HouseholdId,
    pub placement: GeoPlacement,
    pub head_resident_id: Option<ResidentId>,
    pub derived: DerivedHouseholdFields,
}

impl Household {
    pub fn unit_code(&self) -> &UnitCode {
        &self.placement.unit_code
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Resident,
    Household,
}

impl ResourceType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Resident => "resident",
            Self::Household => "household",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "resident" => Ok(Self::Resident),
            "household" => Ok(Self::Household),
            other => Err(format!("unknown resource type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Read,
    Create,
    Update,
    Deactivate,
    Rederive,
}

impl Action {
    pub fn is_read(self) -> bool {
        matches!(self, Self::Read)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Create => "create",
            Self::Update => "update",
            Self::Deactivate => "deactivate",
            Self::Rederive => "rederive",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read" => Ok(Self::Read),
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "deactivate" => Ok(Self::Deactivate),
            "rederive" => Ok(Self::Rederive),
            other => Err(format!("unknown action: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub actor_id: ActorId,
    pub action: Action,
    pub resource_type: ResourceType,
    pub resource_id: String,
    pub before: Option<serde_json::Value>,
    pub after: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}
