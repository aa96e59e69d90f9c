mod common;

use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::TestServer;
use serde_json::{Value, json};

use barangay_server::middleware::identity::{
    ACTOR_ID_HEADER, ACTOR_RESIDENT_ID_HEADER, ACTOR_ROLE_HEADER, ACTOR_UNIT_CODE_HEADER,
};
use barangay_server::rest::{AppState, create_router};
use barangay_storage::InMemoryStore;

use common::*;

fn make_test_server() -> (TestServer, InMemoryStore) {
    let h = harness();
    let store = h.store.clone();
    let app = create_router(AppState {
        coordinator: Arc::new(h.coordinator),
        metrics: h.metrics,
    });
    (TestServer::new(app).unwrap(), store)
}

fn header(name: &'static str) -> HeaderName {
    HeaderName::from_static(name)
}

fn value(v: &str) -> HeaderValue {
    HeaderValue::from_str(v).unwrap()
}

trait AsActor {
    fn as_global_admin(self) -> Self;
    fn as_unit_admin(self, unit_code: &str) -> Self;
    fn as_resident(self, resident_id: &str) -> Self;
}

impl AsActor for axum_test::TestRequest {
    fn as_global_admin(self) -> Self {
        self.add_header(header(ACTOR_ID_HEADER), value("registrar"))
            .add_header(header(ACTOR_ROLE_HEADER), value("global_admin"))
    }

    fn as_unit_admin(self, unit_code: &str) -> Self {
        self.add_header(header(ACTOR_ID_HEADER), value("clerk"))
            .add_header(header(ACTOR_ROLE_HEADER), value("unit_admin"))
            .add_header(header(ACTOR_UNIT_CODE_HEADER), value(unit_code))
    }

    fn as_resident(self, resident_id: &str) -> Self {
        self.add_header(header(ACTOR_ID_HEADER), value("resident"))
            .add_header(header(ACTOR_ROLE_HEADER), value("self_service"))
            .add_header(header(ACTOR_RESIDENT_ID_HEADER), value(resident_id))
    }
}

fn resident_body(unit_code: &str, birthdate: &str) -> Value {
    json!({
        "name": {"first_name": "Juan", "last_name": "Luna"},
        "birthdate": birthdate,
        "sex": "male",
        "employment_status": "employed",
        "education_status": "graduated",
        "unit_code": unit_code,
        "declared_parent_codes": [REGION, CITY],
    })
}

async fn register(server: &TestServer, unit_code: &str, birthdate: &str) -> Value {
    let response = server
        .post("/v1/residents")
        .as_global_admin()
        .json(&resident_body(unit_code, birthdate))
        .await;
    response.assert_status(StatusCode::CREATED);
    response.json::<Value>()["committed"]["record"].clone()
}

#[tokio::test]
async fn healthz_needs_no_identity() {
    let (server, _) = make_test_server();

    let response = server.get("/healthz").await;

    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["status"], "ok");
}

#[tokio::test]
async fn request_without_identity_is_unauthorized() {
    let (server, _) = make_test_server();

    let response = server
        .post("/v1/residents")
        .json(&resident_body(UNIT_A, "1960-01-01"))
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn register_then_read_resident() {
    let (server, store) = make_test_server();

    let created = server
        .post("/v1/residents")
        .as_global_admin()
        .json(&resident_body(UNIT_A, "1960-01-01"))
        .await;
    created.assert_status(StatusCode::CREATED);
    let body: Value = created.json();
    assert_eq!(body["committed"]["resource_type"], "resident");
    assert_eq!(body["audit"]["action"], "create");
    let record = &body["committed"]["record"];
    assert_eq!(record["derived"]["age"], 60);
    assert_eq!(record["derived"]["is_senior_citizen"], true);
    assert_eq!(record["placement"]["province_code"], PROVINCE);

    let id = record["id"].as_str().unwrap();
    let read = server
        .get(&format!("/v1/residents/{id}"))
        .as_unit_admin(UNIT_A)
        .await;
    read.assert_status_ok();
    assert_eq!(read.json::<Value>()["id"], id);
    assert_eq!(store.audit_log_len(), 1);
}

#[tokio::test]
async fn out_of_scope_update_is_forbidden() {
    let (server, store) = make_test_server();
    let resident = register(&server, UNIT_B, "1990-01-01").await;
    let id = resident["id"].as_str().unwrap();

    let response = server
        .patch(&format!("/v1/residents/{id}"))
        .as_unit_admin(UNIT_A)
        .json(&json!({"first_name": "Antonio"}))
        .await;

    response.assert_status(StatusCode::FORBIDDEN);
    let body: Value = response.json();
    assert_eq!(body["code"], "out_of_scope");
    assert_eq!(body["stage"], "authorized");
    assert_eq!(store.audit_log_len(), 1);
}

#[tokio::test]
async fn non_leaf_unit_is_unprocessable() {
    let (server, _) = make_test_server();

    let response = server
        .post("/v1/residents")
        .as_global_admin()
        .json(&json!({
            "name": {"first_name": "Juan", "last_name": "Luna"},
            "birthdate": "1990-01-01",
            "sex": "male",
            "employment_status": "employed",
            "education_status": "graduated",
            "unit_code": CITY,
        }))
        .await;

    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = response.json();
    assert_eq!(body["code"], "validation_error");
    assert_eq!(body["field"], "unit_code");
    assert_eq!(body["stage"], "validated");
}

#[tokio::test]
async fn household_lifecycle_over_http() {
    let (server, _) = make_test_server();

    let created = server
        .post("/v1/households")
        .as_unit_admin(UNIT_A)
        .json(&json!({"unit_code": UNIT_A}))
        .await;
    created.assert_status(StatusCode::CREATED);
    let household_id = created.json::<Value>()["committed"]["record"]["id"]
        .as_str()
        .unwrap()
        .to_string();

    let mut body = resident_body(UNIT_A, "1955-05-05");
    body["household_id"] = json!(household_id);
    let resident = server
        .post("/v1/residents")
        .as_unit_admin(UNIT_A)
        .json(&body)
        .await;
    resident.assert_status(StatusCode::CREATED);
    let resident_body: Value = resident.json();
    let resident_id = resident_body["committed"]["record"]["id"]
        .as_str()
        .unwrap()
        .to_string();
    assert_eq!(
        resident_body["affected_households"][0]["derived"]["senior_count"],
        1
    );

    server
        .put(&format!("/v1/households/{household_id}/head"))
        .as_unit_admin(UNIT_A)
        .json(&json!({"head_resident_id": resident_id}))
        .await
        .assert_status_ok();

    let view = server
        .get(&format!("/v1/households/{household_id}"))
        .as_resident(&resident_id)
        .await;
    view.assert_status_ok();
    let view: Value = view.json();
    assert_eq!(view["household"]["head_resident_id"], resident_id);
    assert_eq!(view["household"]["derived"]["total_members"], 1);
    assert_eq!(view["members"].as_array().unwrap().len(), 1);

    server
        .post(&format!("/v1/residents/{resident_id}/deactivate"))
        .as_unit_admin(UNIT_A)
        .await
        .assert_status_ok();

    let view: Value = server
        .get(&format!("/v1/households/{household_id}"))
        .as_global_admin()
        .await
        .json();
    assert_eq!(view["household"]["derived"]["total_members"], 0);
    assert_eq!(view["household"]["head_resident_id"], Value::Null);
}

#[tokio::test]
async fn self_service_patch_respects_allow_list() {
    let (server, _) = make_test_server();
    let resident = register(&server, UNIT_A, "1990-01-01").await;
    let id = resident["id"].as_str().unwrap();

    server
        .patch(&format!("/v1/residents/{id}"))
        .as_resident(id)
        .json(&json!({"email": "juan@example.ph"}))
        .await
        .assert_status_ok();

    let denied = server
        .patch(&format!("/v1/residents/{id}"))
        .as_resident(id)
        .json(&json!({"employment_status": "retired"}))
        .await;
    denied.assert_status(StatusCode::FORBIDDEN);
    assert_eq!(denied.json::<Value>()["code"], "field_not_self_editable");
}

#[tokio::test]
async fn drifted_record_reads_as_consistency_error() {
    let (server, store) = make_test_server();
    let resident = register(&server, UNIT_A, "1950-01-01").await;
    let id = resident["id"].as_str().unwrap();

    let mut drifted = store.residents().pop().unwrap();
    drifted.derived.age = 12;
    store.overwrite_resident(drifted);

    let response = server
        .get(&format!("/v1/residents/{id}"))
        .as_global_admin()
        .await;
    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json();
    assert_eq!(body["code"], "consistency_error");
    assert_eq!(body["diffs"][0]["field"], "age");

    server
        .post(&format!("/v1/residents/{id}/rederive"))
        .as_global_admin()
        .await
        .assert_status_ok();
    server
        .get(&format!("/v1/residents/{id}"))
        .as_global_admin()
        .await
        .assert_status_ok();
}

#[tokio::test]
async fn unit_listing_pages_through_residents() {
    let (server, _) = make_test_server();
    for birthdate in ["1980-01-01", "1981-01-01", "1982-01-01"] {
        register(&server, UNIT_A, birthdate).await;
    }

    let first: Value = server
        .get(&format!("/v1/units/{UNIT_A}/residents"))
        .add_query_param("limit", 2)
        .as_unit_admin(UNIT_A)
        .await
        .json();
    assert_eq!(first["residents"].as_array().unwrap().len(), 2);
    assert_eq!(first["next_offset"], 2);

    let rest: Value = server
        .get(&format!("/v1/units/{UNIT_A}/residents"))
        .add_query_param("offset", 2)
        .add_query_param("limit", 2)
        .as_unit_admin(UNIT_A)
        .await
        .json();
    assert_eq!(rest["residents"].as_array().unwrap().len(), 1);
    assert!(rest.get("next_offset").is_none());
}

#[tokio::test]
async fn geography_lookup_and_refresh() {
    let (server, _) = make_test_server();

    let city: Value = server
        .get(&format!("/v1/geography/{CITY}"))
        .as_unit_admin(UNIT_A)
        .await
        .json();
    assert_eq!(city["version"], 1);
    assert_eq!(city["chain"].as_array().unwrap().len(), 3);
    assert_eq!(city["children"].as_array().unwrap().len(), 2);

    let refresh = json!({"version": 2, "units": psgc_units("")});
    server
        .post("/v1/geography/refresh")
        .as_unit_admin(UNIT_A)
        .json(&refresh)
        .await
        .assert_status(StatusCode::FORBIDDEN);

    let response = server
        .post("/v1/geography/refresh")
        .as_global_admin()
        .json(&refresh)
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["previous_version"], 1);
    assert_eq!(body["version"], 2);

    server
        .post("/v1/geography/refresh")
        .as_global_admin()
        .json(&refresh)
        .await
        .assert_status(StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn metrics_endpoint_counts_requests_and_commits() {
    let (server, _) = make_test_server();
    register(&server, UNIT_A, "1990-01-01").await;

    let response = server.get("/metrics").await;

    response.assert_status_ok();
    let text = response.text();
    assert!(text.contains("barangay_mutations_committed_total 1"), "{text}");
    assert!(text.contains("barangay_requests_success_total 1"), "{text}");
}
