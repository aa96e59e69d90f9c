use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};

use barangay_core::geo::{GeoTree, ReferenceData};
use barangay_core::model::{HouseholdId, ResidentId, UnitCode};
use barangay_core::policy::ActorIdentity;
use barangay_storage::{DEFAULT_PAGE_SIZE, PageRequest, RegistryStore};

use crate::error::{ApiError, Rejection};
use crate::mutation::{Mutation, NewHousehold, NewResident, ResidentChanges};

use super::AppState;
use super::types::*;

fn status_of(err: &ApiError) -> StatusCode {
    match err {
        ApiError::Validation(_) | ApiError::ReferenceData(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ApiError::Denied(_) => StatusCode::FORBIDDEN,
        ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
        ApiError::Consistency(_) => StatusCode::INTERNAL_SERVER_ERROR,
        ApiError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

fn error_body(err: ApiError, stage: Option<&'static str>) -> (StatusCode, Json<ErrorResponse>) {
    let status = status_of(&err);
    let field = match &err {
        ApiError::Validation(v) => v.field().map(str::to_string),
        _ => None,
    };
    let code = err.code();
    let error = err.to_string();
    let diffs = match err {
        ApiError::Consistency(c) => c.diffs,
        _ => Vec::new(),
    };

    (
        status,
        Json(ErrorResponse {
            error,
            code,
            field,
            stage,
            diffs,
        }),
    )
}

fn api_error_to_response(err: ApiError) -> Response {
    error_body(err, None).into_response()
}

fn rejection_to_response(rejection: Rejection) -> Response {
    let stage = rejection.stage.as_str();
    error_body(rejection.error, Some(stage)).into_response()
}

async fn mutate<S: RegistryStore + 'static>(
    state: &AppState<S>,
    actor: &ActorIdentity,
    mutation: Mutation,
    success: StatusCode,
) -> Response {
    match state.coordinator.execute(actor, mutation).await {
        Ok(outcome) => (success, Json(outcome)).into_response(),
        Err(rejection) => rejection_to_response(rejection),
    }
}

pub async fn register_resident<S: RegistryStore + 'static>(
    State(state): State<AppState<S>>,
    Extension(actor): Extension<ActorIdentity>,
    Json(req): Json<NewResident>,
) -> Response {
    mutate(
        &state,
        &actor,
        Mutation::RegisterResident(req),
        StatusCode::CREATED,
    )
    .await
}

pub async fn get_resident<S: RegistryStore + 'static>(
    State(state): State<AppState<S>>,
    Extension(actor): Extension<ActorIdentity>,
    Path(id): Path<ResidentId>,
) -> Response {
    match state.coordinator.read_resident(&actor, id).await {
        Ok(resident) => (StatusCode::OK, Json(resident)).into_response(),
        Err(e) => api_error_to_response(e),
    }
}

pub async fn update_resident<S: RegistryStore + 'static>(
    State(state): State<AppState<S>>,
    Extension(actor): Extension<ActorIdentity>,
    Path(id): Path<ResidentId>,
    Json(changes): Json<ResidentChanges>,
) -> Response {
    mutate(
        &state,
        &actor,
        Mutation::UpdateResident { id, changes },
        StatusCode::OK,
    )
    .await
}

pub async fn deactivate_resident<S: RegistryStore + 'static>(
    State(state): State<AppState<S>>,
    Extension(actor): Extension<ActorIdentity>,
    Path(id): Path<ResidentId>,
) -> Response {
    mutate(
        &state,
        &actor,
        Mutation::DeactivateResident { id },
        StatusCode::OK,
    )
    .await
}

pub async fn rederive_resident<S: RegistryStore + 'static>(
    State(state): State<AppState<S>>,
    Extension(actor): Extension<ActorIdentity>,
    Path(id): Path<ResidentId>,
) -> Response {
    mutate(
        &state,
        &actor,
        Mutation::RederiveResident { id },
        StatusCode::OK,
    )
    .await
}

pub async fn list_unit_residents<S: RegistryStore + 'static>(
    State(state): State<AppState<S>>,
    Extension(actor): Extension<ActorIdentity>,
    Path(unit_code): Path<UnitCode>,
    Query(query): Query<ListResidentsQuery>,
) -> Response {
    let page = PageRequest::new(
        query.offset.unwrap_or(0),
        query.limit.unwrap_or(DEFAULT_PAGE_SIZE),
    );

    match state
        .coordinator
        .list_residents(&actor, &unit_code, page)
        .await
    {
        Ok(page) => (
            StatusCode::OK,
            Json(ResidentPageResponse {
                residents: page.items,
                next_offset: page.next_offset,
            }),
        )
            .into_response(),
        Err(e) => api_error_to_response(e),
    }
}

pub async fn create_household<S: RegistryStore + 'static>(
    State(state): State<AppState<S>>,
    Extension(actor): Extension<ActorIdentity>,
    Json(req): Json<NewHousehold>,
) -> Response {
    mutate(
        &state,
        &actor,
        Mutation::CreateHousehold(req),
        StatusCode::CREATED,
    )
    .await
}

pub async fn get_household<S: RegistryStore + 'static>(
    State(state): State<AppState<S>>,
    Extension(actor): Extension<ActorIdentity>,
    Path(id): Path<HouseholdId>,
) -> Response {
    match state.coordinator.read_household(&actor, id).await {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(e) => api_error_to_response(e),
    }
}

pub async fn set_household_head<S: RegistryStore + 'static>(
    State(state): State<AppState<S>>,
    Extension(actor): Extension<ActorIdentity>,
    Path(household_id): Path<HouseholdId>,
    Json(req): Json<SetHeadRequest>,
) -> Response {
    mutate(
        &state,
        &actor,
        Mutation::SetHouseholdHead {
            household_id,
            head_resident_id: req.head_resident_id,
        },
        StatusCode::OK,
    )
    .await
}

pub async fn get_geography<S: RegistryStore + 'static>(
    State(state): State<AppState<S>>,
    Path(code): Path<UnitCode>,
) -> Response {
    let tree = state.coordinator.resolver().snapshot();
    let result = tree.resolve(&code).and_then(|chain| {
        let children = tree.children(&code)?.into_iter().cloned().collect();
        Ok(GeographyResponse {
            version: tree.version(),
            chain,
            children,
        })
    });

    match result {
        Ok(body) => (StatusCode::OK, Json(body)).into_response(),
        Err(e) => api_error_to_response(e.into()),
    }
}

pub async fn refresh_geography<S: RegistryStore + 'static>(
    State(state): State<AppState<S>>,
    Extension(actor): Extension<ActorIdentity>,
    Json(data): Json<ReferenceData>,
) -> Response {
    let version = data.version;
    let result = GeoTree::from_reference(data)
        .map_err(ApiError::from)
        .and_then(|tree| state.coordinator.refresh_geography(&actor, tree));

    match result {
        Ok(previous_version) => (
            StatusCode::OK,
            Json(RefreshResponse {
                previous_version,
                version,
            }),
        )
            .into_response(),
        Err(e) => api_error_to_response(e),
    }
}

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({"status": "ok"})))
}
