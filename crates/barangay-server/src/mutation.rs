use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

use barangay_core::model::{
    Action, AuditRecord, ContactInfo, EducationStatus, EmploymentStatus, EnrollmentLoad,
    Household, HouseholdId, PersonName, Resident, ResidentFacts, ResidentId, Sex, UnitCode,
};

fn deserialize_some<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    T::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewResident {
    pub name: PersonName,
    #[serde(flatten)]
    pub facts: ResidentFacts,
    #[serde(default)]
    pub contact: ContactInfo,
    pub unit_code: UnitCode,
    #[serde(default)]
    pub declared_parent_codes: Vec<UnitCode>,
    #[serde(default)]
    pub household_id: Option<HouseholdId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResidentChanges {
    pub first_name: Option<String>,
    #[serde(deserialize_with = "deserialize_some")]
    pub middle_name: Option<Option<String>>,
    pub last_name: Option<String>,
    pub birthdate: Option<NaiveDate>,
    pub sex: Option<Sex>,
    pub employment_status: Option<EmploymentStatus>,
    pub education_status: Option<EducationStatus>,
    #[serde(deserialize_with = "deserialize_some")]
    pub enrollment_load: Option<Option<EnrollmentLoad>>,
    #[serde(deserialize_with = "deserialize_some")]
    pub mobile_number: Option<Option<String>>,
    #[serde(deserialize_with = "deserialize_some")]
    pub telephone_number: Option<Option<String>>,
    #[serde(deserialize_with = "deserialize_some")]
    pub email: Option<Option<String>>,
    #[serde(deserialize_with = "deserialize_some")]
    pub household_id: Option<Option<HouseholdId>>,
    pub unit_code: Option<UnitCode>,
    pub declared_parent_codes: Vec<UnitCode>,
}

fn set<T: Clone + PartialEq>(
    target: &mut T,
    value: &Option<T>,
    name: &'static str,
    changed: &mut BTreeSet<String>,
) {
    if let Some(v) = value
        && v != target
    {
        *target = v.clone();
        changed.insert(name.to_string());
    }
}

impl ResidentChanges {
    pub fn apply(&self, resident: &Resident) -> (Resident, BTreeSet<String>) {
        let mut next = resident.clone();
        let mut changed = BTreeSet::new();

        set(&mut next.name.first_name, &self.first_name, "first_name", &mut changed);
        set(&mut next.name.middle_name, &self.middle_name, "middle_name", &mut changed);
        set(&mut next.name.last_name, &self.last_name, "last_name", &mut changed);
        set(&mut next.facts.birthdate, &self.birthdate, "birthdate", &mut changed);
        set(&mut next.facts.sex, &self.sex, "sex", &mut changed);
        set(
            &mut next.facts.employment_status,
            &self.employment_status,
            "employment_status",
            &mut changed,
        );
        set(
            &mut next.facts.education_status,
            &self.education_status,
            "education_status",
            &mut changed,
        );
        set(
            &mut next.facts.enrollment_load,
            &self.enrollment_load,
            "enrollment_load",
            &mut changed,
        );
        set(
            &mut next.contact.mobile_number,
            &self.mobile_number,
            "mobile_number",
            &mut changed,
        );
        set(
            &mut next.contact.telephone_number,
            &self.telephone_number,
            "telephone_number",
            &mut changed,
        );
        set(&mut next.contact.email, &self.email, "email", &mut changed);
        set(&mut next.household_id, &self.household_id, "household_id", &mut changed);

        if let Some(unit_code) = &self.unit_code
            && unit_code != resident.unit_code()
        {
            changed.insert("unit_code".to_string());
        }

        (next, changed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewHousehold {
    pub unit_code: UnitCode,
    #[serde(default)]
    pub declared_parent_codes: Vec<UnitCode>,
    #[serde(default)]
    pub head_resident_id: Option<ResidentId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    RegisterResident(NewResident),
    UpdateResident {
        id: ResidentId,
        changes: ResidentChanges,
    },
    DeactivateResident {
        id: ResidentId,
    },
    RederiveResident {
        id: ResidentId,
    },
    CreateHousehold(NewHousehold),
    SetHouseholdHead {
        household_id: HouseholdId,
        head_resident_id: Option<ResidentId>,
    },
}

impl Mutation {
    pub fn action(&self) -> Action {
        match self {
            Self::RegisterResident(_) | Self::CreateHousehold(_) => Action::Create,
            Self::UpdateResident { .. } | Self::SetHouseholdHead { .. } => Action::Update,
            Self::DeactivateResident { .. } => Action::Deactivate,
            Self::RederiveResident { .. } => Action::Rederive,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::RegisterResident(_) => "register_resident",
            Self::UpdateResident { .. } => "update_resident",
            Self::DeactivateResident { .. } => "deactivate_resident",
            Self::RederiveResident { .. } => "rederive_resident",
            Self::CreateHousehold(_) => "create_household",
            Self::SetHouseholdHead { .. } => "set_household_head",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "resource_type", content = "record", rename_all = "snake_case")]
pub enum Committed {
    Resident(Resident),
    Household(Household),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MutationOutcome {
    pub committed: Committed,
    pub affected_households: Vec<Household>,
    pub audit: AuditRecord,
}
