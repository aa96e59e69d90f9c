use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use barangay_core::model::{ActorId, ResidentId, UnitCode};
use barangay_core::policy::{ActorIdentity, Role};

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";
pub const ACTOR_UNIT_CODE_HEADER: &str = "x-actor-unit-code";
pub const ACTOR_RESIDENT_ID_HEADER: &str = "x-actor-resident-id";

fn skip_identity(path: &str) -> bool {
    matches!(path, "/healthz" | "/metrics")
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Result<Option<&'a str>, String> {
    match headers.get(name) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .map(|v| Some(v.trim()).filter(|v| !v.is_empty()))
            .map_err(|_| format!("{name} is not valid ASCII")),
    }
}

pub fn actor_from_headers(headers: &HeaderMap) -> Result<ActorIdentity, String> {
    let id = header(headers, ACTOR_ID_HEADER)?
        .ok_or_else(|| format!("missing {ACTOR_ID_HEADER} header"))?;
    let role: Role = header(headers, ACTOR_ROLE_HEADER)?
        .ok_or_else(|| format!("missing {ACTOR_ROLE_HEADER} header"))?
        .parse()?;
    let scoped_unit_code = header(headers, ACTOR_UNIT_CODE_HEADER)?.map(UnitCode::from);
    let resident_id = header(headers, ACTOR_RESIDENT_ID_HEADER)?
        .map(|v| {
            v.parse::<uuid::Uuid>()
                .map(ResidentId::new)
                .map_err(|_| format!("{ACTOR_RESIDENT_ID_HEADER} is not a valid UUID"))
        })
        .transpose()?;

    Ok(ActorIdentity {
        id: ActorId::new(id),
        role,
        scoped_unit_code,
        resident_id,
        household_id: None,
    })
}

pub async fn identity_middleware(mut request: Request<Body>, next: Next) -> Response {
    if skip_identity(request.uri().path()) {
        return next.run(request).await;
    }

    match actor_from_headers(request.headers()) {
        Ok(actor) => {
            request.extensions_mut().insert(actor);
            next.run(request).await
        }
        Err(msg) => error_json(StatusCode::UNAUTHORIZED, &msg),
    }
}

fn error_json(status: StatusCode, msg: &str) -> Response {
    let body = serde_json::json!({"error": msg, "code": "unauthenticated"});
    (status, axum::Json(body)).into_response()
}
