use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::geo::UnitChain;
use crate::model::{
    Action, ActorId, GeoPlacement, Household, HouseholdId, Resident, ResidentId, ResourceType,
    UnitCode,
};

pub const DEFAULT_SELF_EDITABLE_FIELDS: [&str; 3] = ["mobile_number", "telephone_number", "email"];

pub const RESIDENT_FIELDS: [&str; 14] = [
    "first_name",
    "middle_name",
    "last_name",
    "birthdate",
    "sex",
    "employment_status",
    "education_status",
    "enrollment_load",
    "mobile_number",
    "telephone_number",
    "email",
    "household_id",
    "unit_code",
    "is_active",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    GlobalAdmin,
    UnitAdmin,
    SelfService,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GlobalAdmin => "global_admin",
            Self::UnitAdmin => "unit_admin",
            Self::SelfService => "self_service",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "global_admin" => Ok(Self::GlobalAdmin),
            "unit_admin" => Ok(Self::UnitAdmin),
            "self_service" => Ok(Self::SelfService),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorIdentity {
    pub id: ActorId,
    pub role: Role,
    #[serde(default)]
    pub scoped_unit_code: Option<UnitCode>,
    #[serde(default)]
    pub resident_id: Option<ResidentId>,
    #[serde(default)]
    pub household_id: Option<HouseholdId>,
}

impl ActorIdentity {
    pub fn global_admin(id: impl Into<String>) -> Self {
        Self {
            id: ActorId::new(id),
            role: Role::GlobalAdmin,
            scoped_unit_code: None,
            resident_id: None,
            household_id: None,
        }
    }

    pub fn unit_admin(id: impl Into<String>, unit_code: impl Into<UnitCode>) -> Self {
        Self {
            id: ActorId::new(id),
            role: Role::UnitAdmin,
            scoped_unit_code: Some(unit_code.into()),
            resident_id: None,
            household_id: None,
        }
    }

    pub fn self_service(
        id: impl Into<String>,
        resident_id: ResidentId,
        household_id: Option<HouseholdId>,
    ) -> Self {
        Self {
            id: ActorId::new(id),
            role: Role::SelfService,
            scoped_unit_code: None,
            resident_id: Some(resident_id),
            household_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDescriptor {
    pub resource_type: ResourceType,
    pub resident_id: Option<ResidentId>,
    pub household_id: Option<HouseholdId>,
    pub unit_code: UnitCode,
    pub ancestor_codes: Vec<UnitCode>,
    pub changed_fields: BTreeSet<String>,
}

impl ResourceDescriptor {
    pub fn resident(resident: &Resident) -> Self {
        Self::resident_at(resident.id, resident.household_id, &resident.placement)
    }

    pub fn resident_at(
        id: ResidentId,
        household_id: Option<HouseholdId>,
        placement: &GeoPlacement,
    ) -> Self {
        Self {
            resource_type: ResourceType::Resident,
            resident_id: Some(id),
            household_id,
            unit_code: placement.unit_code.clone(),
            ancestor_codes: placement.ancestor_codes(),
            changed_fields: BTreeSet::new(),
        }
    }

    pub fn household(household: &Household) -> Self {
        Self {
            resource_type: ResourceType::Household,
            resident_id: None,
            household_id: Some(household.id),
            unit_code: household.placement.unit_code.clone(),
            ancestor_codes: household.placement.ancestor_codes(),
            changed_fields: BTreeSet::new(),
        }
    }

    pub fn unit(resource_type: ResourceType, chain: &UnitChain) -> Self {
        Self {
            resource_type,
            resident_id: None,
            household_id: None,
            unit_code: chain.leaf().code.clone(),
            ancestor_codes: chain.ancestor_codes(),
            changed_fields: BTreeSet::new(),
        }
    }

    pub fn with_changed_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.changed_fields = fields.into_iter().map(Into::into).collect();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    OutOfScope,
    NotOwner,
    FieldNotSelfEditable,
    MalformedActor,
}

impl DenyReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OutOfScope => "out_of_scope",
            Self::NotOwner => "not_owner",
            Self::FieldNotSelfEditable => "field_not_self_editable",
            Self::MalformedActor => "malformed_actor",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", content = "reason", rename_all = "snake_case")]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPolicy {
    pub self_editable_fields: BTreeSet<String>,
    pub allow_subtree_scope: bool,
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self {
            self_editable_fields: DEFAULT_SELF_EDITABLE_FIELDS
                .iter()
                .map(|f| f.to_string())
                .collect(),
            allow_subtree_scope: false,
        }
    }
}

impl AccessPolicy {
    pub fn evaluate(
        &self,
        actor: &ActorIdentity,
        action: Action,
        resource: &ResourceDescriptor,
    ) -> Decision {
        match actor.role {
            Role::GlobalAdmin => Decision::Allow,
            Role::UnitAdmin => self.evaluate_unit_admin(actor, resource),
            Role::SelfService => {
                let Some(resident_id) = actor.resident_id else {
                    return Decision::Deny(DenyReason::MalformedActor);
                };
                if action.is_read() {
                    evaluate_self_read(resident_id, actor.household_id, resource)
                } else {
                    self.evaluate_self_write(resident_id, resource)
                }
            }
        }
    }

    fn evaluate_unit_admin(&self, actor: &ActorIdentity, resource: &ResourceDescriptor) -> Decision {
        let Some(scope) = actor.scoped_unit_code.as_ref() else {
            return Decision::Deny(DenyReason::MalformedActor);
        };
        if scope.as_str().is_empty() {
            return Decision::Deny(DenyReason::MalformedActor);
        }

        if &resource.unit_code == scope
            || (self.allow_subtree_scope && resource.ancestor_codes.contains(scope))
        {
            Decision::Allow
        } else {
            Decision::Deny(DenyReason::OutOfScope)
        }
    }

    fn evaluate_self_write(&self, resident_id: ResidentId, resource: &ResourceDescriptor) -> Decision {
        if resource.resource_type != ResourceType::Resident
            || resource.resident_id != Some(resident_id)
        {
            return Decision::Deny(DenyReason::NotOwner);
        }

        let all_editable = !resource.changed_fields.is_empty()
            && resource
                .changed_fields
                .iter()
                .all(|field| self.self_editable_fields.contains(field));
        if all_editable {
            Decision::Allow
        } else {
            Decision::Deny(DenyReason::FieldNotSelfEditable)
        }
    }
}

fn evaluate_self_read(
    resident_id: ResidentId,
    household_id: Option<HouseholdId>,
    resource: &ResourceDescriptor,
) -> Decision {
    let own_record = resource.resource_type == ResourceType::Resident
        && resource.resident_id == Some(resident_id);
    let own_household = household_id.is_some() && resource.household_id == household_id;

    if own_record || own_household {
        Decision::Allow
    } else {
        Decision::Deny(DenyReason::NotOwner)
    }
}
