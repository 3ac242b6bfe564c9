//! API integration tests

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::Router;
use siteops::api::{self, ACTOR_HEADER};
use siteops::models::{GrantSpec, Role};
use siteops::AppState;
use sqlx::sqlite::SqlitePoolOptions;
use tower::ServiceExt;
use uuid::Uuid;

struct TestApp {
    app: Router,
    state: Arc<AppState>,
    tenant: Uuid,
    manager: Uuid,
    employee: Uuid,
}

async fn setup_app() -> TestApp {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");

    let state = AppState::new(pool, Duration::from_secs(5));
    state.store.migrate().await.expect("Failed to run migrations");

    let tenant = state.store.create_tenant("Acme").await.unwrap();
    let manager = state
        .store
        .create_actor(Role::CompanyManager, Some(tenant.id), true)
        .await
        .unwrap();
    let employee = state
        .store
        .create_actor(Role::Employee, Some(tenant.id), true)
        .await
        .unwrap();
    state
        .store
        .create_module_definition("inspections", "Inspections", Some("Safety"))
        .await
        .unwrap();
    state
        .store
        .upsert_module_grant(tenant.id, "inspections", &GrantSpec::indefinite())
        .await
        .unwrap();

    TestApp {
        app: api::router(state.clone()),
        state,
        tenant: tenant.id,
        manager: manager.id,
        employee: employee.id,
    }
}

fn request(method: &str, uri: &str, actor: Option<Uuid>, body: Option<serde_json::Value>) -> hyper::Request<Body> {
    let mut builder = hyper::Request::builder().method(method).uri(uri);
    if let Some(actor) = actor {
        builder = builder.header(ACTOR_HEADER, actor.to_string());
    }
    match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let t = setup_app().await;
    let response = t
        .app
        .oneshot(request("GET", "/health", None, None))
        .await
        .unwrap();
    assert_eq!(response.status(), hyper::StatusCode::OK);
}

#[tokio::test]
async fn test_missing_actor_header() {
    let t = setup_app().await;
    let response = t
        .app
        .oneshot(request("GET", "/entitlements", None, None))
        .await
        .unwrap();
    assert_eq!(response.status(), hyper::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_entitlements_for_manager() {
    let t = setup_app().await;
    let response = t
        .app
        .oneshot(request("GET", "/entitlements", Some(t.manager), None))
        .await
        .unwrap();
    assert_eq!(response.status(), hyper::StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body[0]["module_key"], "inspections");
    assert_eq!(body[0]["category"], "Safety");
}

#[tokio::test]
async fn test_inactive_actor_gets_empty_list() {
    let t = setup_app().await;
    t.state
        .store
        .set_actor_active(t.manager, false)
        .await
        .unwrap();

    let response = t
        .app
        .oneshot(request("GET", "/entitlements", Some(t.manager), None))
        .await
        .unwrap();
    assert_eq!(response.status(), hyper::StatusCode::OK);
    assert_eq!(json_body(response).await, serde_json::json!([]));
}

#[tokio::test]
async fn test_review_flow_over_http() {
    let t = setup_app().await;
    let access = serde_json::json!({
        "target_actor_id": t.employee,
        "module_key": "inspections",
    });

    let response = t
        .app
        .clone()
        .oneshot(request("POST", "/access", Some(t.manager), Some(access)))
        .await
        .unwrap();
    assert_eq!(response.status(), hyper::StatusCode::NO_CONTENT);

    let create = serde_json::json!({
        "tenant_id": t.tenant,
        "module_key": "inspections",
        "taxonomy": "review",
        "details": {"form": "confined-space"},
    });
    let response = t
        .app
        .clone()
        .oneshot(request("POST", "/workflow-items", Some(t.employee), Some(create)))
        .await
        .unwrap();
    assert_eq!(response.status(), hyper::StatusCode::CREATED);
    let item = json_body(response).await;
    assert_eq!(item["status"], "pending");
    let item_id = item["id"].as_str().unwrap().to_string();
    let transition_uri = format!("/workflow-items/{}/transition", item_id);

    // Creator cannot decide their own item
    let response = t
        .app
        .clone()
        .oneshot(request(
            "POST",
            &transition_uri,
            Some(t.employee),
            Some(serde_json::json!({"target_status": "approved"})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), hyper::StatusCode::FORBIDDEN);

    let response = t
        .app
        .clone()
        .oneshot(request(
            "POST",
            &transition_uri,
            Some(t.manager),
            Some(serde_json::json!({"target_status": "rejected", "reason": "Unsigned"})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), hyper::StatusCode::OK);
    let rejected = json_body(response).await;
    assert_eq!(rejected["status"], "rejected");
    assert_eq!(rejected["rejection_reason"], "Unsigned");

    let response = t
        .app
        .clone()
        .oneshot(request(
            "POST",
            &transition_uri,
            Some(t.manager),
            Some(serde_json::json!({"target_status": "approved"})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), hyper::StatusCode::CONFLICT);

    let response = t
        .app
        .oneshot(request(
            "GET",
            &format!("/workflow-items/{}", item_id),
            Some(t.employee),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), hyper::StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "rejected");
}

#[tokio::test]
async fn test_unknown_item_is_not_found() {
    let t = setup_app().await;
    let response = t
        .app
        .oneshot(request(
            "GET",
            &format!("/workflow-items/{}", Uuid::new_v4()),
            Some(t.manager),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), hyper::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_module_administration_requires_admin() {
    let t = setup_app().await;
    let body = serde_json::json!({"key": "permits", "display_name": "Permits"});

    let response = t
        .app
        .clone()
        .oneshot(request("POST", "/modules", Some(t.manager), Some(body.clone())))
        .await
        .unwrap();
    assert_eq!(response.status(), hyper::StatusCode::FORBIDDEN);

    let admin = t
        .state
        .store
        .create_actor(Role::SystemAdmin, None, true)
        .await
        .unwrap();
    let response = t
        .app
        .clone()
        .oneshot(request("POST", "/modules", Some(admin.id), Some(body)))
        .await
        .unwrap();
    assert_eq!(response.status(), hyper::StatusCode::CREATED);

    let response = t
        .app
        .oneshot(request(
            "PUT",
            &format!("/tenants/{}/grants/permits", t.tenant),
            Some(t.manager),
            Some(serde_json::json!({"is_active": true, "indefinite": true, "category_override": "Work"})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), hyper::StatusCode::OK);
}
