use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;

use barangay_core::clock::Clock;
use barangay_core::derive::{
    ConsistencyError, DerivationPolicy, derive_household, derive_resident, verify_household,
    verify_resident,
};
use barangay_core::geo::{GeoTree, HierarchyResolver};
use barangay_core::model::{
    Action, GeoPlacement, Household, HouseholdId, Resident, ResidentId, ResourceType, UnitCode,
};
use barangay_core::policy::{
    AccessPolicy, ActorIdentity, Decision, DenyReason, RESIDENT_FIELDS, ResourceDescriptor, Role,
};
use barangay_storage::{Page, PageRequest, RegistryStore, RegistryTransaction};

use crate::audit::{AuditLogger, audit_committed, audit_denied, audit_reference_refresh};
use crate::error::{ApiError, MutationStage, Rejection, ValidationError};
use crate::metrics::Metrics;
use crate::reconcile::log_drift;
use crate::mutation::{Committed, Mutation, MutationOutcome, NewHousehold, NewResident, ResidentChanges};

fn at<E: Into<ApiError>>(stage: MutationStage) -> impl FnOnce(E) -> Rejection {
    move |e| Rejection::new(stage, e)
}

fn snapshot_json<T: Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or(serde_json::Value::Null)
}

struct HouseholdState {
    household: Household,
    members: Vec<Resident>,
}

impl HouseholdState {
    fn recompute(mut self, changed: &[&Resident]) -> Household {
        let id = self.household.id;
        self.members
            .retain(|m| !changed.iter().any(|c| c.id == m.id));
        self.members.extend(
            changed
                .iter()
                .filter(|c| c.household_id == Some(id))
                .map(|c| (*c).clone()),
        );

        self.household.derived = derive_household(&self.members);
        if let Some(head) = self.household.head_resident_id
            && !self.members.iter().any(|m| m.id == head && m.is_active)
        {
            self.household.head_resident_id = None;
        }
        self.household
    }
}

// Sorted, so every writer locks households in the same order.
fn affected(before: Option<HouseholdId>, after: Option<HouseholdId>) -> Vec<HouseholdId> {
    let mut ids: Vec<HouseholdId> = before.into_iter().chain(after).collect();
    ids.sort();
    ids.dedup();
    ids
}

fn place(
    tree: &GeoTree,
    unit_code: &UnitCode,
    declared_parent_codes: &[UnitCode],
) -> Result<GeoPlacement, ValidationError> {
    tree.validate_chain(unit_code, declared_parent_codes)?;
    Ok(tree.placement(unit_code)?)
}

fn lenient_ancestors(tree: &GeoTree, unit_code: &UnitCode) -> Vec<UnitCode> {
    tree.resolve(unit_code)
        .map(|chain| chain.ancestor_codes())
        .unwrap_or_default()
}

fn ensure_same_unit(household: &Household, unit_code: &UnitCode) -> Result<(), ValidationError> {
    if household.unit_code() != unit_code {
        return Err(ValidationError::HouseholdUnitMismatch {
            household_id: household.id,
            household_unit: household.unit_code().clone(),
            resident_unit: unit_code.clone(),
        });
    }
    Ok(())
}

pub struct MutationCoordinator<S: RegistryStore> {
    store: Arc<S>,
    resolver: Arc<HierarchyResolver>,
    access: AccessPolicy,
    derivation: DerivationPolicy,
    clock: Arc<dyn Clock>,
    audit: AuditLogger,
    metrics: Arc<Metrics>,
}

impl<S: RegistryStore> MutationCoordinator<S> {
    pub fn new(
        store: Arc<S>,
        resolver: Arc<HierarchyResolver>,
        access: AccessPolicy,
        derivation: DerivationPolicy,
        clock: Arc<dyn Clock>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            store,
            resolver,
            access,
            derivation,
            audit: AuditLogger::new(Arc::clone(&clock)),
            clock,
            metrics,
        }
    }

    pub fn resolver(&self) -> &Arc<HierarchyResolver> {
        &self.resolver
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub async fn execute(
        &self,
        actor: &ActorIdentity,
        mutation: Mutation,
    ) -> Result<MutationOutcome, Rejection> {
        let name = mutation.name();
        let mut tx = match self.store.begin_transaction().await {
            Ok(tx) => tx,
            Err(e) => return Err(self.rejected(name, Rejection::new(MutationStage::Received, e))),
        };

        let result = match mutation {
            Mutation::RegisterResident(new) => self.register_resident(&mut tx, actor, new).await,
            Mutation::UpdateResident { id, changes } => {
                self.update_resident(&mut tx, actor, id, changes).await
            }
            Mutation::DeactivateResident { id } => {
                self.deactivate_resident(&mut tx, actor, id).await
            }
            Mutation::RederiveResident { id } => self.rederive_resident(&mut tx, actor, id).await,
            Mutation::CreateHousehold(new) => self.create_household(&mut tx, actor, new).await,
            Mutation::SetHouseholdHead {
                household_id,
                head_resident_id,
            } => {
                self.set_household_head(&mut tx, actor, household_id, head_resident_id)
                    .await
            }
        };

        match result {
            Ok(outcome) => {
                if let Err(e) = tx.commit().await {
                    return Err(self.rejected(name, Rejection::new(MutationStage::Committed, e)));
                }
                audit_committed(&outcome.audit);
                self.metrics.record_commit();
                Ok(outcome)
            }
            Err(rejection) => {
                if let Err(e) = tx.rollback().await {
                    tracing::warn!(mutation = name, error = %e, "rollback failed");
                }
                Err(self.rejected(name, rejection))
            }
        }
    }

    fn rejected(&self, name: &'static str, rejection: Rejection) -> Rejection {
        tracing::info!(
            mutation = name,
            stage = %rejection.stage,
            code = rejection.error.code(),
            error = %rejection.error,
            "mutation rejected"
        );
        self.metrics.record_rejection(rejection.stage);
        rejection
    }

    async fn effective_actor(
        &self,
        tx: &mut S::Transaction,
        actor: &ActorIdentity,
    ) -> Result<ActorIdentity, ApiError> {
        let mut actor = actor.clone();
        if actor.role == Role::SelfService {
            let Some(resident_id) = actor.resident_id else {
                return Err(ApiError::Denied(DenyReason::MalformedActor));
            };
            let Some(own) = tx.get_resident(resident_id).await? else {
                return Err(ApiError::Denied(DenyReason::MalformedActor));
            };
            actor.household_id = own.household_id;
        }
        Ok(actor)
    }

    fn authorize(
        &self,
        actor: &ActorIdentity,
        action: Action,
        resource: &ResourceDescriptor,
    ) -> Result<(), ApiError> {
        match self.access.evaluate(actor, action, resource) {
            Decision::Allow => Ok(()),
            Decision::Deny(reason) => {
                audit_denied(actor, action, resource.resource_type, reason);
                self.metrics.record_denial();
                Err(ApiError::Denied(reason))
            }
        }
    }

    async fn load_resident(
        &self,
        tx: &mut S::Transaction,
        id: ResidentId,
    ) -> Result<Resident, ApiError> {
        tx.get_resident_for_update(id)
            .await?
            .ok_or_else(|| ApiError::resident_not_found(id))
    }

    fn check_resident(&self, resident: &Resident) -> Result<(), ApiError> {
        verify_resident(resident, &self.derivation).map_err(|e| self.consistency_violation(e))
    }

    fn check_households(&self, states: &[HouseholdState]) -> Result<(), ApiError> {
        for state in states {
            verify_household(&state.household, &state.members)
                .map_err(|e| self.consistency_violation(e))?;
        }
        Ok(())
    }

    async fn household_state(
        &self,
        tx: &mut S::Transaction,
        id: HouseholdId,
    ) -> Result<HouseholdState, ApiError> {
        let household = tx
            .get_household_for_update(id)
            .await?
            .ok_or(ValidationError::UnknownHousehold(id))?;
        let members = tx.residents_in_household(id).await?;
        Ok(HouseholdState { household, members })
    }

    async fn household_states(
        &self,
        tx: &mut S::Transaction,
        ids: &[HouseholdId],
    ) -> Result<Vec<HouseholdState>, ApiError> {
        let mut states = Vec::with_capacity(ids.len());
        for id in ids {
            states.push(self.household_state(tx, *id).await?);
        }
        Ok(states)
    }

    async fn persist(
        &self,
        tx: &mut S::Transaction,
        resident: Option<&Resident>,
        households: &[Household],
    ) -> Result<(), Rejection> {
        if let Some(resident) = resident {
            tx.upsert_resident(resident)
                .await
                .map_err(at(MutationStage::Persisted))?;
        }
        for household in households {
            tx.upsert_household(household)
                .await
                .map_err(at(MutationStage::Persisted))?;
        }
        Ok(())
    }

    async fn register_resident(
        &self,
        tx: &mut S::Transaction,
        actor: &ActorIdentity,
        new: NewResident,
    ) -> Result<MutationOutcome, Rejection> {
        let tree = self.resolver.snapshot();
        let id = ResidentId::generate();

        let actor = self
            .effective_actor(tx, actor)
            .await
            .map_err(at(MutationStage::Authorized))?;
        let descriptor = ResourceDescriptor {
            resource_type: ResourceType::Resident,
            resident_id: Some(id),
            household_id: new.household_id,
            unit_code: new.unit_code.clone(),
            ancestor_codes: lenient_ancestors(&tree, &new.unit_code),
            changed_fields: BTreeSet::new(),
        }
        .with_changed_fields(RESIDENT_FIELDS);
        self.authorize(&actor, Action::Create, &descriptor)
            .map_err(at(MutationStage::Authorized))?;

        let placement = place(&tree, &new.unit_code, &new.declared_parent_codes)
            .map_err(at(MutationStage::Validated))?;
        let state = match new.household_id {
            Some(household_id) => {
                let state = self
                    .household_state(tx, household_id)
                    .await
                    .map_err(at(MutationStage::Validated))?;
                ensure_same_unit(&state.household, &placement.unit_code)
                    .map_err(at(MutationStage::Validated))?;
                self.check_households(std::slice::from_ref(&state))
                    .map_err(at(MutationStage::Validated))?;
                Some(state)
            }
            None => None,
        };

        let derived = derive_resident(&new.facts, self.clock.today(), &self.derivation)
            .map_err(|e| Rejection::new(MutationStage::Derived, ValidationError::from(e)))?;
        let resident = Resident {
            id,
            name: new.name,
            facts: new.facts,
            contact: new.contact,
            is_active: true,
            household_id: new.household_id,
            placement,
            derived,
        };
        let households: Vec<Household> = state
            .into_iter()
            .map(|s| s.recompute(&[&resident]))
            .collect();

        self.persist(tx, Some(&resident), &households).await?;

        let audit = self
            .audit
            .record(
                tx,
                &actor.id,
                Action::Create,
                ResourceType::Resident,
                id.to_string(),
                None,
                snapshot_json(&resident),
            )
            .await
            .map_err(at(MutationStage::Audited))?;

        Ok(MutationOutcome {
            committed: Committed::Resident(resident),
            affected_households: households,
            audit,
        })
    }

    async fn update_resident(
        &self,
        tx: &mut S::Transaction,
        actor: &ActorIdentity,
        id: ResidentId,
        changes: ResidentChanges,
    ) -> Result<MutationOutcome, Rejection> {
        let tree = self.resolver.snapshot();

        let current = self
            .load_resident(tx, id)
            .await
            .map_err(at(MutationStage::Received))?;
        let actor = self
            .effective_actor(tx, actor)
            .await
            .map_err(at(MutationStage::Authorized))?;
        let (mut next, changed) = changes.apply(&current);
        let moving = changed.contains("unit_code");

        let descriptor = ResourceDescriptor::resident(&current).with_changed_fields(changed.clone());
        self.authorize(&actor, Action::Update, &descriptor)
            .map_err(at(MutationStage::Authorized))?;
        if let Some(unit_code) = changes.unit_code.as_ref().filter(|_| moving) {
            let destination = ResourceDescriptor {
                unit_code: unit_code.clone(),
                ancestor_codes: lenient_ancestors(&tree, unit_code),
                ..descriptor
            };
            self.authorize(&actor, Action::Update, &destination)
                .map_err(at(MutationStage::Authorized))?;
        }

        if !current.is_active {
            return Err(Rejection::new(
                MutationStage::Validated,
                ValidationError::ResidentInactive(id),
            ));
        }
        if changed.is_empty() {
            return Err(Rejection::new(MutationStage::Validated, ValidationError::NoChanges));
        }
        self.check_resident(&current)
            .map_err(at(MutationStage::Validated))?;
        next.placement = match changes.unit_code.as_ref() {
            Some(unit_code) => place(&tree, unit_code, &changes.declared_parent_codes),
            None => tree
                .validate_chain(current.unit_code(), &changes.declared_parent_codes)
                .map(|_| current.placement.clone())
                .map_err(ValidationError::from),
        }
        .map_err(at(MutationStage::Validated))?;

        let ids = affected(current.household_id, next.household_id);
        let states = self
            .household_states(tx, &ids)
            .await
            .map_err(at(MutationStage::Validated))?;
        self.check_households(&states)
            .map_err(at(MutationStage::Validated))?;
        if let Some(target) = next.household_id
            && let Some(state) = states.iter().find(|s| s.household.id == target)
        {
            ensure_same_unit(&state.household, next.unit_code())
                .map_err(at(MutationStage::Validated))?;
        }

        next.derived = derive_resident(&next.facts, self.clock.today(), &self.derivation)
            .map_err(|e| Rejection::new(MutationStage::Derived, ValidationError::from(e)))?;
        let households: Vec<Household> = states
            .into_iter()
            .map(|s| s.recompute(&[&next]))
            .collect();

        self.persist(tx, Some(&next), &households).await?;

        let audit = self
            .audit
            .record(
                tx,
                &actor.id,
                Action::Update,
                ResourceType::Resident,
                id.to_string(),
                Some(snapshot_json(&current)),
                snapshot_json(&next),
            )
            .await
            .map_err(at(MutationStage::Audited))?;

        Ok(MutationOutcome {
            committed: Committed::Resident(next),
            affected_households: households,
            audit,
        })
    }

    async fn deactivate_resident(
        &self,
        tx: &mut S::Transaction,
        actor: &ActorIdentity,
        id: ResidentId,
    ) -> Result<MutationOutcome, Rejection> {
        let current = self
            .load_resident(tx, id)
            .await
            .map_err(at(MutationStage::Received))?;
        let actor = self
            .effective_actor(tx, actor)
            .await
            .map_err(at(MutationStage::Authorized))?;
        let descriptor = ResourceDescriptor::resident(&current).with_changed_fields(["is_active"]);
        self.authorize(&actor, Action::Deactivate, &descriptor)
            .map_err(at(MutationStage::Authorized))?;

        if !current.is_active {
            return Err(Rejection::new(
                MutationStage::Validated,
                ValidationError::ResidentInactive(id),
            ));
        }
        self.check_resident(&current)
            .map_err(at(MutationStage::Validated))?;
        let ids = affected(current.household_id, None);
        let states = self
            .household_states(tx, &ids)
            .await
            .map_err(at(MutationStage::Validated))?;
        self.check_households(&states)
            .map_err(at(MutationStage::Validated))?;

        let mut next = current.clone();
        next.is_active = false;
        next.derived = derive_resident(&next.facts, self.clock.today(), &self.derivation)
            .map_err(|e| Rejection::new(MutationStage::Derived, ValidationError::from(e)))?;
        let households: Vec<Household> = states
            .into_iter()
            .map(|s| s.recompute(&[&next]))
            .collect();

        self.persist(tx, Some(&next), &households).await?;

        let audit = self
            .audit
            .record(
                tx,
                &actor.id,
                Action::Deactivate,
                ResourceType::Resident,
                id.to_string(),
                Some(snapshot_json(&current)),
                snapshot_json(&next),
            )
            .await
            .map_err(at(MutationStage::Audited))?;

        Ok(MutationOutcome {
            committed: Committed::Resident(next),
            affected_households: households,
            audit,
        })
    }

    async fn rederive_resident(
        &self,
        tx: &mut S::Transaction,
        actor: &ActorIdentity,
        id: ResidentId,
    ) -> Result<MutationOutcome, Rejection> {
        let tree = self.resolver.snapshot();

        let current = self
            .load_resident(tx, id)
            .await
            .map_err(at(MutationStage::Received))?;
        let actor = self
            .effective_actor(tx, actor)
            .await
            .map_err(at(MutationStage::Authorized))?;
        let descriptor = ResourceDescriptor::resident(&current).with_changed_fields(["derived"]);
        self.authorize(&actor, Action::Rederive, &descriptor)
            .map_err(at(MutationStage::Authorized))?;

        tree.validate_placement(&current.placement)
            .map_err(at(MutationStage::Validated))?;
        let ids = affected(current.household_id, None);
        let states = self
            .household_states(tx, &ids)
            .await
            .map_err(at(MutationStage::Validated))?;

        let drifted = verify_resident(&current, &self.derivation)
            .err()
            .into_iter()
            .chain(
                states
                    .iter()
                    .filter_map(|s| verify_household(&s.household, &s.members).err()),
            );
        for err in drifted {
            tracing::info!(
                target: "consistency",
                resource_type = err.resource_type.as_str(),
                resource_id = %err.resource_id,
                diffs = err.diffs.len(),
                "rederive repairs drifted derived fields"
            );
        }

        let mut next = current.clone();
        next.derived = derive_resident(&next.facts, self.clock.today(), &self.derivation)
            .map_err(|e| Rejection::new(MutationStage::Derived, ValidationError::from(e)))?;
        let households: Vec<Household> = states
            .into_iter()
            .map(|s| s.recompute(&[&next]))
            .collect();

        self.persist(tx, Some(&next), &households).await?;

        let audit = self
            .audit
            .record(
                tx,
                &actor.id,
                Action::Rederive,
                ResourceType::Resident,
                id.to_string(),
                Some(snapshot_json(&current)),
                snapshot_json(&next),
            )
            .await
            .map_err(at(MutationStage::Audited))?;

        Ok(MutationOutcome {
            committed: Committed::Resident(next),
            affected_households: households,
            audit,
        })
    }

    async fn create_household(
        &self,
        tx: &mut S::Transaction,
        actor: &ActorIdentity,
        new: NewHousehold,
    ) -> Result<MutationOutcome, Rejection> {
        let tree = self.resolver.snapshot();
        let id = HouseholdId::generate();

        let actor = self
            .effective_actor(tx, actor)
            .await
            .map_err(at(MutationStage::Authorized))?;
        let mut fields = vec!["unit_code"];
        if new.head_resident_id.is_some() {
            fields.push("head_resident_id");
        }
        let descriptor = ResourceDescriptor {
            resource_type: ResourceType::Household,
            resident_id: None,
            household_id: Some(id),
            unit_code: new.unit_code.clone(),
            ancestor_codes: lenient_ancestors(&tree, &new.unit_code),
            changed_fields: BTreeSet::new(),
        }
        .with_changed_fields(fields);
        self.authorize(&actor, Action::Create, &descriptor)
            .map_err(at(MutationStage::Authorized))?;

        let placement = place(&tree, &new.unit_code, &new.declared_parent_codes)
            .map_err(at(MutationStage::Validated))?;
        let mut household = Household {
            id,
            placement,
            head_resident_id: new.head_resident_id,
            derived: Default::default(),
        };

        let mut moved = None;
        let mut previous = None;
        if let Some(head_id) = new.head_resident_id {
            let head = tx
                .get_resident_for_update(head_id)
                .await
                .map_err(at(MutationStage::Validated))?
                .ok_or_else(|| {
                    Rejection::new(
                        MutationStage::Validated,
                        ValidationError::invalid_field(
                            "head_resident_id",
                            format!("resident {head_id} not found"),
                        ),
                    )
                })?;
            if !head.is_active {
                return Err(Rejection::new(
                    MutationStage::Validated,
                    ValidationError::ResidentInactive(head_id),
                ));
            }
            ensure_same_unit(&household, head.unit_code())
                .map_err(at(MutationStage::Validated))?;
            self.check_resident(&head)
                .map_err(at(MutationStage::Validated))?;
            if let Some(old) = head.household_id {
                let state = self
                    .household_state(tx, old)
                    .await
                    .map_err(at(MutationStage::Validated))?;
                self.check_households(std::slice::from_ref(&state))
                    .map_err(at(MutationStage::Validated))?;
                previous = Some(state);
            }
            let mut head = head;
            head.household_id = Some(id);
            moved = Some(head);
        }

        household.derived = derive_household(moved.iter());
        let mut households = vec![household.clone()];
        if let (Some(state), Some(head)) = (previous, moved.as_ref()) {
            households.push(state.recompute(&[head]));
        }

        // The new household row must exist before a resident can reference it.
        self.persist(tx, None, &households[..1]).await?;
        self.persist(tx, moved.as_ref(), &households[1..]).await?;

        let audit = self
            .audit
            .record(
                tx,
                &actor.id,
                Action::Create,
                ResourceType::Household,
                id.to_string(),
                None,
                snapshot_json(&household),
            )
            .await
            .map_err(at(MutationStage::Audited))?;

        Ok(MutationOutcome {
            committed: Committed::Household(household),
            affected_households: households.split_off(1),
            audit,
        })
    }

    async fn set_household_head(
        &self,
        tx: &mut S::Transaction,
        actor: &ActorIdentity,
        household_id: HouseholdId,
        head_resident_id: Option<ResidentId>,
    ) -> Result<MutationOutcome, Rejection> {
        let current = tx
            .get_household_for_update(household_id)
            .await
            .map_err(at(MutationStage::Received))?
            .ok_or_else(|| {
                Rejection::new(
                    MutationStage::Received,
                    ApiError::household_not_found(household_id),
                )
            })?;
        let actor = self
            .effective_actor(tx, actor)
            .await
            .map_err(at(MutationStage::Authorized))?;
        let descriptor =
            ResourceDescriptor::household(&current).with_changed_fields(["head_resident_id"]);
        self.authorize(&actor, Action::Update, &descriptor)
            .map_err(at(MutationStage::Authorized))?;

        let members = tx
            .residents_in_household(household_id)
            .await
            .map_err(at(MutationStage::Validated))?;
        verify_household(&current, &members)
            .map_err(|e| Rejection::new(MutationStage::Validated, self.consistency_violation(e)))?;
        if let Some(head) = head_resident_id
            && !members.iter().any(|m| m.id == head && m.is_active)
        {
            return Err(Rejection::new(
                MutationStage::Validated,
                ValidationError::HeadNotActiveMember {
                    resident_id: head,
                    household_id,
                },
            ));
        }

        let mut next = current.clone();
        next.head_resident_id = head_resident_id;
        next.derived = derive_household(&members);

        self.persist(tx, None, std::slice::from_ref(&next)).await?;

        let audit = self
            .audit
            .record(
                tx,
                &actor.id,
                Action::Update,
                ResourceType::Household,
                household_id.to_string(),
                Some(snapshot_json(&current)),
                snapshot_json(&next),
            )
            .await
            .map_err(at(MutationStage::Audited))?;

        Ok(MutationOutcome {
            committed: Committed::Household(next),
            affected_households: Vec::new(),
            audit,
        })
    }

    fn consistency_violation(&self, err: ConsistencyError) -> ApiError {
        log_drift(&err);
        self.metrics.record_consistency_violation();
        ApiError::Consistency(err)
    }

    pub async fn read_resident(
        &self,
        actor: &ActorIdentity,
        id: ResidentId,
    ) -> Result<Resident, ApiError> {
        let mut tx = self.store.begin_transaction().await?;
        let result = self.read_resident_in(&mut tx, actor, id).await;
        if let Err(e) = tx.rollback().await {
            tracing::warn!(error = %e, "read rollback failed");
        }
        result
    }

    async fn read_resident_in(
        &self,
        tx: &mut S::Transaction,
        actor: &ActorIdentity,
        id: ResidentId,
    ) -> Result<Resident, ApiError> {
        let resident = tx
            .get_resident(id)
            .await?
            .ok_or_else(|| ApiError::resident_not_found(id))?;
        let actor = self.effective_actor(tx, actor).await?;
        self.authorize(&actor, Action::Read, &ResourceDescriptor::resident(&resident))?;
        verify_resident(&resident, &self.derivation).map_err(|e| self.consistency_violation(e))?;
        Ok(resident)
    }

    pub async fn read_household(
        &self,
        actor: &ActorIdentity,
        id: HouseholdId,
    ) -> Result<HouseholdView, ApiError> {
        let mut tx = self.store.begin_transaction().await?;
        let result = self.read_household_in(&mut tx, actor, id).await;
        if let Err(e) = tx.rollback().await {
            tracing::warn!(error = %e, "read rollback failed");
        }
        result
    }

    async fn read_household_in(
        &self,
        tx: &mut S::Transaction,
        actor: &ActorIdentity,
        id: HouseholdId,
    ) -> Result<HouseholdView, ApiError> {
        let household = tx
            .get_household(id)
            .await?
            .ok_or_else(|| ApiError::household_not_found(id))?;
        let actor = self.effective_actor(tx, actor).await?;
        self.authorize(&actor, Action::Read, &ResourceDescriptor::household(&household))?;

        let members = tx.residents_in_household(id).await?;
        verify_household(&household, &members).map_err(|e| self.consistency_violation(e))?;
        Ok(HouseholdView { household, members })
    }

    pub async fn list_residents(
        &self,
        actor: &ActorIdentity,
        unit_code: &UnitCode,
        page: PageRequest,
    ) -> Result<Page<Resident>, ApiError> {
        self.resolver.snapshot().resolve_leaf(unit_code)?;

        let mut tx = self.store.begin_transaction().await?;
        let result = self.list_residents_in(&mut tx, actor, unit_code, page).await;
        if let Err(e) = tx.rollback().await {
            tracing::warn!(error = %e, "read rollback failed");
        }
        result
    }

    async fn list_residents_in(
        &self,
        tx: &mut S::Transaction,
        actor: &ActorIdentity,
        unit_code: &UnitCode,
        page: PageRequest,
    ) -> Result<Page<Resident>, ApiError> {
        let actor = self.effective_actor(tx, actor).await?;
        let Page { items, next_offset } = tx.residents_by_unit_code(unit_code, page).await?;

        let mut visible = Vec::with_capacity(items.len());
        for resident in items {
            let decision =
                self.access
                    .evaluate(&actor, Action::Read, &ResourceDescriptor::resident(&resident));
            if !decision.is_allowed() {
                continue;
            }
            verify_resident(&resident, &self.derivation)
                .map_err(|e| self.consistency_violation(e))?;
            visible.push(resident);
        }

        Ok(Page {
            items: visible,
            next_offset,
        })
    }

    pub fn refresh_geography(&self, actor: &ActorIdentity, tree: GeoTree) -> Result<u64, ApiError> {
        if actor.role != Role::GlobalAdmin {
            tracing::warn!(
                target: "audit",
                event = "authorization_denied",
                actor_id = %actor.id,
                role = actor.role.as_str(),
                action = "refresh_reference_data",
                reason = DenyReason::OutOfScope.as_str(),
                "authorization denied"
            );
            self.metrics.record_denial();
            return Err(ApiError::Denied(DenyReason::OutOfScope));
        }

        let version = tree.version();
        let previous = self.resolver.refresh(tree)?;
        audit_reference_refresh(&actor.id, previous, version);
        self.metrics.record_refresh();
        Ok(previous)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HouseholdView {
    pub household: Household,
    pub members: Vec<Resident>,
}
