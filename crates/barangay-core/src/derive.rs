use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::model::{
    DerivedHouseholdFields, DerivedResidentFields, EducationStatus, EmploymentStatus,
    EnrollmentLoad, Household, Resident, ResidentFacts, ResourceType,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DerivationPolicy {
    pub minor_age_below: u32,
    pub senior_age_from: u32,
    pub oosy_min_age: u32,
    pub oosy_max_age: u32,
    pub labor_force_min_age: u32,
    pub part_time_counts_as_enrolled: bool,
}

impl Default for DerivationPolicy {
    fn default() -> Self {
        Self {
            minor_age_below: 18,
            senior_age_from: 60,
            oosy_min_age: 15,
            oosy_max_age: 24,
            labor_force_min_age: 15,
            part_time_counts_as_enrolled: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DerivationError {
    #[error("birthdate {birthdate} is after the evaluation date {as_of}")]
    BirthdateInFuture {
        birthdate: NaiveDate,
        as_of: NaiveDate,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDiff {
    pub field: String,
    pub stored: serde_json::Value,
    pub recomputed: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[error("stored derived data of {resource_type} {resource_id} differs from recomputation in: {}", field_names(.diffs))]
pub struct ConsistencyError {
    pub resource_type: ResourceType,
    pub resource_id: String,
    pub diffs: Vec<FieldDiff>,
}

fn field_names(diffs: &[FieldDiff]) -> String {
    diffs
        .iter()
        .map(|d| d.field.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn is_leap_year(year: i32) -> bool {
    NaiveDate::from_ymd_opt(year, 2, 29).is_some()
}

pub fn age(birthdate: NaiveDate, as_of: NaiveDate) -> Result<u32, DerivationError> {
    if birthdate > as_of {
        return Err(DerivationError::BirthdateInFuture { birthdate, as_of });
    }

    let birthday = if birthdate.month() == 2 && birthdate.day() == 29 && !is_leap_year(as_of.year())
    {
        (2, 28)
    } else {
        (birthdate.month(), birthdate.day())
    };

    let mut years = as_of.year() - birthdate.year();
    if (as_of.month(), as_of.day()) < birthday {
        years -= 1;
    }

    Ok(u32::try_from(years).unwrap_or(0))
}

pub fn derive_resident(
    facts: &ResidentFacts,
    as_of: NaiveDate,
    policy: &DerivationPolicy,
) -> Result<DerivedResidentFields, DerivationError> {
    let age = age(facts.birthdate, as_of)?;

    let enrolled = facts.education_status == EducationStatus::CurrentlyEnrolled;
    let part_time = facts.enrollment_load == Some(EnrollmentLoad::PartTime);
    let counts_as_enrolled = enrolled && (!part_time || policy.part_time_counts_as_enrolled);
    let enrolled_full_time = enrolled && !part_time;
    let not_employed = facts.employment_status == EmploymentStatus::NotEmployed;

    let is_out_of_school_youth = (policy.oosy_min_age..=policy.oosy_max_age).contains(&age)
        && !counts_as_enrolled
        && facts.education_status != EducationStatus::Graduated
        && not_employed;

    let is_unemployed = age >= policy.labor_force_min_age && not_employed && !enrolled_full_time;

    Ok(DerivedResidentFields {
        as_of,
        age,
        is_minor: age < policy.minor_age_below,
        is_senior_citizen: age >= policy.senior_age_from,
        is_out_of_school_youth,
        is_unemployed,
        is_employed: facts.employment_status.is_employed(),
    })
}

pub fn derive_household<'a, I>(members: I) -> DerivedHouseholdFields
where
    I: IntoIterator<Item = &'a Resident>,
{
    members
        .into_iter()
        .filter(|m| m.is_active)
        .fold(DerivedHouseholdFields::default(), |mut acc, m| {
            acc.total_members += 1;
            if m.derived.is_minor {
                acc.minor_count += 1;
            } else {
                acc.adult_count += 1;
            }
            if m.derived.is_senior_citizen {
                acc.senior_count += 1;
            }
            if m.derived.is_employed {
                acc.employed_count += 1;
            }
            acc
        })
}

pub fn verify_resident(
    resident: &Resident,
    policy: &DerivationPolicy,
) -> Result<(), ConsistencyError> {
    let recomputed = match derive_resident(&resident.facts, resident.derived.as_of, policy) {
        Ok(fields) => serde_json::to_value(fields).unwrap_or_default(),
        Err(e) => serde_json::Value::String(e.to_string()),
    };
    let stored = serde_json::to_value(&resident.derived).unwrap_or_default();

    check(
        ResourceType::Resident,
        resident.id.to_string(),
        &stored,
        &recomputed,
    )
}

pub fn verify_household<'a, I>(household: &Household, members: I) -> Result<(), ConsistencyError>
where
    I: IntoIterator<Item = &'a Resident>,
{
    let recomputed = serde_json::to_value(derive_household(members)).unwrap_or_default();
    let stored = serde_json::to_value(household.derived).unwrap_or_default();

    check(
        ResourceType::Household,
        household.id.to_string(),
        &stored,
        &recomputed,
    )
}

fn check(
    resource_type: ResourceType,
    resource_id: String,
    stored: &serde_json::Value,
    recomputed: &serde_json::Value,
) -> Result<(), ConsistencyError> {
    let diffs = diff_fields(stored, recomputed);
    if diffs.is_empty() {
        Ok(())
    } else {
        Err(ConsistencyError {
            resource_type,
            resource_id,
            diffs,
        })
    }
}

fn diff_fields(stored: &serde_json::Value, recomputed: &serde_json::Value) -> Vec<FieldDiff> {
    match (stored.as_object(), recomputed.as_object()) {
        (Some(stored), Some(recomputed)) => {
            let mut keys: Vec<&String> = stored.keys().chain(recomputed.keys()).collect();
            keys.sort();
            keys.dedup();
            keys.into_iter()
                .filter_map(|key| {
                    let s = stored.get(key).cloned().unwrap_or_default();
                    let r = recomputed.get(key).cloned().unwrap_or_default();
                    (s != r).then(|| FieldDiff {
                        field: key.clone(),
                        stored: s,
                        recomputed: r,
                    })
                })
                .collect()
        }
        _ if stored == recomputed => Vec::new(),
        _ => vec![FieldDiff {
            field: "derived".to_string(),
            stored: stored.clone(),
            recomputed: recomputed.clone(),
        }],
    }
}
