#![allow(dead_code)]

use std::sync::Arc;

use chrono::NaiveDate;

use barangay_core::clock::FixedClock;
use barangay_core::derive::DerivationPolicy;
use barangay_core::geo::{GeoTree, GeographicUnit, HierarchyResolver, UnitLevel};
use barangay_core::model::{
    ContactInfo, EducationStatus, EmploymentStatus, Household, PersonName, Resident,
    ResidentFacts, Sex, UnitCode,
};
use barangay_core::policy::{AccessPolicy, ActorIdentity};
use barangay_server::coordinator::MutationCoordinator;
use barangay_server::metrics::Metrics;
use barangay_server::mutation::{Committed, Mutation, MutationOutcome, NewHousehold, NewResident};
use barangay_storage::{InMemoryStore, RegistryStore};

pub const REGION: &str = "130000000";
pub const PROVINCE: &str = "137400000";
pub const CITY: &str = "137404000";
pub const UNIT_A: &str = "137404001";
pub const UNIT_B: &str = "137404002";

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn today() -> NaiveDate {
    date(2020, 6, 1)
}

fn unit(code: &str, level: UnitLevel, parent: Option<&str>, name: &str) -> GeographicUnit {
    GeographicUnit {
        code: UnitCode::from(code),
        level,
        parent_code: parent.map(UnitCode::from),
        name: name.to_string(),
    }
}

pub fn psgc_units(suffix: &str) -> Vec<GeographicUnit> {
    vec![
        unit(REGION, UnitLevel::Region, None, &format!("NCR{suffix}")),
        unit(
            PROVINCE,
            UnitLevel::Province,
            Some(REGION),
            &format!("NCR Second District{suffix}"),
        ),
        unit(CITY, UnitLevel::City, Some(PROVINCE), &format!("Quezon City{suffix}")),
        unit(UNIT_A, UnitLevel::LocalUnit, Some(CITY), &format!("Alicia{suffix}")),
        unit(
            UNIT_B,
            UnitLevel::LocalUnit,
            Some(CITY),
            &format!("Bagong Pag-asa{suffix}"),
        ),
    ]
}

pub fn psgc_tree(version: u64) -> GeoTree {
    GeoTree::build(version, psgc_units("")).unwrap()
}

pub struct Harness {
    pub coordinator: MutationCoordinator<InMemoryStore>,
    pub store: InMemoryStore,
    pub metrics: Arc<Metrics>,
}

pub fn harness() -> Harness {
    harness_with(AccessPolicy::default())
}

pub fn harness_with(access: AccessPolicy) -> Harness {
    let store = InMemoryStore::new();
    let metrics = Arc::new(Metrics::new());
    let coordinator = coordinator_over(Arc::new(store.clone()), access, Arc::clone(&metrics));
    Harness {
        coordinator,
        store,
        metrics,
    }
}

pub fn coordinator_over<S: RegistryStore>(
    store: Arc<S>,
    access: AccessPolicy,
    metrics: Arc<Metrics>,
) -> MutationCoordinator<S> {
    MutationCoordinator::new(
        store,
        Arc::new(HierarchyResolver::new(psgc_tree(1))),
        access,
        DerivationPolicy::default(),
        Arc::new(FixedClock::on(today())),
        metrics,
    )
}

pub fn admin() -> ActorIdentity {
    ActorIdentity::global_admin("registrar")
}

pub fn new_resident(unit_code: &str, birthdate: NaiveDate) -> NewResident {
    NewResident {
        name: PersonName {
            first_name: "Melchora".to_string(),
            middle_name: None,
            last_name: "Aquino".to_string(),
        },
        facts: ResidentFacts {
            birthdate,
            sex: Sex::Female,
            employment_status: EmploymentStatus::Employed,
            education_status: EducationStatus::Graduated,
            enrollment_load: None,
        },
        contact: ContactInfo::default(),
        unit_code: UnitCode::from(unit_code),
        declared_parent_codes: Vec::new(),
        household_id: None,
    }
}

pub fn committed_resident(outcome: MutationOutcome) -> Resident {
    match outcome.committed {
        Committed::Resident(r) => r,
        other => panic!("expected a resident, got {other:?}"),
    }
}

pub fn committed_household(outcome: MutationOutcome) -> Household {
    match outcome.committed {
        Committed::Household(h) => h,
        other => panic!("expected a household, got {other:?}"),
    }
}

impl Harness {
    pub async fn register(&self, new: NewResident) -> Resident {
        committed_resident(
            self.coordinator
                .execute(&admin(), Mutation::RegisterResident(new))
                .await
                .unwrap(),
        )
    }

    pub async fn create_household(&self, unit_code: &str) -> Household {
        committed_household(
            self.coordinator
                .execute(
                    &admin(),
                    Mutation::CreateHousehold(NewHousehold {
                        unit_code: UnitCode::from(unit_code),
                        declared_parent_codes: Vec::new(),
                        head_resident_id: None,
                    }),
                )
                .await
                .unwrap(),
        )
    }

    pub async fn household_with(&self, unit_code: &str, births: &[NaiveDate]) -> (Household, Vec<Resident>) {
        let household = self.create_household(unit_code).await;
        let mut members = Vec::new();
        for birthdate in births {
            let mut new = new_resident(unit_code, *birthdate);
            new.household_id = Some(household.id);
            members.push(self.register(new).await);
        }
        let household = self
            .store
            .households()
            .into_iter()
            .find(|h| h.id == household.id)
            .unwrap();
        (household, members)
    }

    pub fn stored_household(&self, household: &Household) -> Household {
        self.store
            .households()
            .into_iter()
            .find(|h| h.id == household.id)
            .unwrap()
    }

    pub fn stored_resident(&self, resident: &Resident) -> Resident {
        self.store
            .residents()
            .into_iter()
            .find(|r| r.id == resident.id)
            .unwrap()
    }
}
