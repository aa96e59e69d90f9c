use chrono::NaiveDate;
use criterion::{Criterion, criterion_group, criterion_main};

use barangay_core::derive::{DerivationPolicy, derive_household, derive_resident};
use barangay_core::geo::{GeoTree, GeographicUnit, UnitLevel};
use barangay_core::model::{
    Action, ContactInfo, EducationStatus, EmploymentStatus, PersonName, Resident, ResidentFacts,
    ResidentId, ResourceType, Sex, UnitCode,
};
use barangay_core::policy::{AccessPolicy, ActorIdentity, ResourceDescriptor};

fn unit(code: String, level: UnitLevel, parent: Option<String>) -> GeographicUnit {
    GeographicUnit {
        name: code.clone(),
        code: UnitCode::from(code),
        level,
        parent_code: parent.map(UnitCode::from),
    }
}

fn wide_tree(regions: usize) -> GeoTree {
    let mut units = Vec::new();
    for r in 0..regions {
        let region = format!("R{r:02}");
        units.push(unit(region.clone(), UnitLevel::Region, None));
        for p in 0..5 {
            let province = format!("{region}P{p}");
            units.push(unit(province.clone(), UnitLevel::Province, Some(region.clone())));
            for c in 0..5 {
                let city = format!("{province}C{c}");
                units.push(unit(city.clone(), UnitLevel::City, Some(province.clone())));
                for l in 0..20 {
                    units.push(unit(
                        format!("{city}L{l:02}"),
                        UnitLevel::LocalUnit,
                        Some(city.clone()),
                    ));
                }
            }
        }
    }
    GeoTree::build(1, units).unwrap()
}

fn facts(year: i32) -> ResidentFacts {
    ResidentFacts {
        birthdate: NaiveDate::from_ymd_opt(year, 2, 29)
            .or_else(|| NaiveDate::from_ymd_opt(year, 3, 1))
            .unwrap(),
        sex: Sex::Female,
        employment_status: EmploymentStatus::NotEmployed,
        education_status: EducationStatus::DroppedOut,
        enrollment_load: None,
    }
}

fn household_members(tree: &GeoTree, count: usize, as_of: NaiveDate) -> Vec<Resident> {
    let placement = tree.placement(&UnitCode::from("R00P0C0L00")).unwrap();
    (0..count)
        .map(|i| {
            let facts = facts(1950 + (i as i32 * 7) % 70);
            Resident {
                id: ResidentId::generate(),
                name: PersonName {
                    first_name: format!("Member {i}"),
                    middle_name: None,
                    last_name: "Reyes".to_string(),
                },
                derived: derive_resident(&facts, as_of, &DerivationPolicy::default()).unwrap(),
                facts,
                contact: ContactInfo::default(),
                is_active: i % 5 != 0,
                household_id: None,
                placement: placement.clone(),
            }
        })
        .collect()
}

fn bench_derive_resident(c: &mut Criterion) {
    let facts = facts(2004);
    let as_of = NaiveDate::from_ymd_opt(2021, 2, 28).unwrap();
    let policy = DerivationPolicy::default();

    c.bench_function("derive_resident", |b| {
        b.iter(|| derive_resident(&facts, as_of, &policy).unwrap());
    });
}

fn bench_derive_household_50(c: &mut Criterion) {
    let tree = wide_tree(1);
    let as_of = NaiveDate::from_ymd_opt(2020, 6, 1).unwrap();
    let members = household_members(&tree, 50, as_of);

    c.bench_function("derive_household_50", |b| {
        b.iter(|| derive_household(&members));
    });
}

fn bench_resolve_leaf_in_wide_tree(c: &mut Criterion) {
    let tree = wide_tree(17);
    let code = UnitCode::from("R16P4C4L19");

    c.bench_function("resolve_leaf_in_wide_tree", |b| {
        b.iter(|| tree.resolve_leaf(&code).unwrap());
    });
}

fn bench_unit_admin_subtree_check(c: &mut Criterion) {
    let tree = wide_tree(3);
    let chain = tree.resolve(&UnitCode::from("R02P3C1L07")).unwrap();
    let resource = ResourceDescriptor::unit(ResourceType::Resident, &chain);
    let actor = ActorIdentity::unit_admin("admin-1", "R02P3C1");
    let policy = AccessPolicy {
        allow_subtree_scope: true,
        ..AccessPolicy::default()
    };

    c.bench_function("unit_admin_subtree_check", |b| {
        b.iter(|| policy.evaluate(&actor, Action::Update, &resource));
    });
}

criterion_group!(
    benches,
    bench_derive_resident,
    bench_derive_household_50,
    bench_resolve_leaf_in_wide_tree,
    bench_unit_admin_subtree_check,
);
criterion_main!(benches);
