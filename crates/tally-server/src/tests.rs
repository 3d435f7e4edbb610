//! Server API tests

use super::*;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use tally_core::db::Database;
use tally_core::models::NewUser;
use tower::ServiceExt;

const TEST_SECRET: &str = "test-secret";

fn setup() -> (Router, Database) {
    let db = Database::in_memory().unwrap();
    let config = ServerConfig {
        jwt_secret: TEST_SECRET.to_string(),
        token_ttl_hours: 24,
        allowed_origins: vec![],
    };
    let app = create_router(db.clone(), None, config);
    (app, db)
}

/// Create a verified user directly through the store
fn seed_user(db: &Database, email: &str, username: &str) -> i64 {
    let (id, token) = db
        .create_user(&NewUser {
            email: email.to_string(),
            username: username.to_string(),
            password: "secret1".to_string(),
            first_name: None,
            last_name: None,
        })
        .unwrap();
    db.verify_email(&token).unwrap();
    id
}

fn bearer(user_id: i64) -> String {
    format!("Bearer {}", token::issue(TEST_SECRET, user_id, 24).unwrap())
}

fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn authed_request(method: &str, uri: &str, auth: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", auth)
        .body(Body::empty())
        .unwrap()
}

fn authed_json_request(
    method: &str,
    uri: &str,
    auth: &str,
    body: serde_json::Value,
) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", auth)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

async fn get_body_json(response: axum::response::Response) -> serde_json::Value {
    let body = response.into_body();
    let bytes = body.collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

// ========== Auth flow ==========

#[tokio::test]
async fn test_register_verify_login_flow() {
    let (app, db) = setup();

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/auth/register",
            serde_json::json!({
                "email": "a@x.com",
                "username": "alice",
                "password": "secret1"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let json = get_body_json(response).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["data"]["email"], "a@x.com");

    // Login is refused until the email is verified
    let login = serde_json::json!({"email": "a@x.com", "password": "secret1"});
    let response = app
        .clone()
        .oneshot(json_request("POST", "/api/auth/login", login.clone()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = get_body_json(response).await;
    assert_eq!(json["success"], false);
    assert_eq!(json["message"], "Please verify your email before logging in");

    // The token is logged, not emailed; fetch it from the store
    let verify_token = db
        .get_user_by_email("a@x.com")
        .unwrap()
        .unwrap()
        .verify_token
        .unwrap();
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/auth/verify-email/{}", verify_token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(json_request("POST", "/api/auth/login", login))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert!(json["data"]["token"].as_str().unwrap().len() > 20);
    assert_eq!(json["data"]["user"]["username"], "alice");
}

#[tokio::test]
async fn test_missing_token_is_unauthorized() {
    let (app, _db) = setup();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/balance")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = get_body_json(response).await;
    assert_eq!(json["success"], false);
}

#[tokio::test]
async fn test_garbage_token_is_unauthorized() {
    let (app, _db) = setup();

    let response = app
        .oneshot(authed_request("GET", "/api/balance", "Bearer not-a-jwt"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = get_body_json(response).await;
    assert_eq!(json["message"], "Invalid authentication token");
}

#[tokio::test]
async fn test_deleted_account_token_is_unauthorized() {
    let (app, db) = setup();
    let id = seed_user(&db, "a@x.com", "alice");
    let auth = bearer(id);
    db.soft_delete_user(id).unwrap();

    let response = app
        .oneshot(authed_request("GET", "/api/balance", &auth))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// ========== Feature gates ==========

#[tokio::test]
async fn test_free_tier_denied_advanced_analytics() {
    let (app, db) = setup();
    let id = seed_user(&db, "a@x.com", "alice");

    let response = app
        .oneshot(authed_request(
            "GET",
            "/api/analytics/advanced",
            &bearer(id),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let json = get_body_json(response).await;
    assert_eq!(json["success"], false);
    assert_eq!(json["required_feature"], "advanced_analytics");
}

#[tokio::test]
async fn test_free_tier_denied_custom_categories_and_export() {
    let (app, db) = setup();
    let id = seed_user(&db, "a@x.com", "alice");
    let auth = bearer(id);

    let response = app
        .clone()
        .oneshot(authed_json_request(
            "POST",
            "/api/categories",
            &auth,
            serde_json::json!({"name": "Pets", "kind": "expense"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let json = get_body_json(response).await;
    assert_eq!(json["required_feature"], "custom_categories");

    let response = app
        .oneshot(authed_request("GET", "/api/analytics/export", &auth))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let json = get_body_json(response).await;
    assert_eq!(json["required_feature"], "data_export");
}

#[tokio::test]
async fn test_pro_tier_passes_feature_gates() {
    let (app, db) = setup();
    let id = seed_user(&db, "a@x.com", "alice");
    db.set_subscription_tier(id, "pro").unwrap();
    let auth = bearer(id);

    let response = app
        .clone()
        .oneshot(authed_request(
            "GET",
            "/api/analytics/advanced",
            &auth,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert!(json["data"]["monthly"].is_array());
    assert!(json["data"]["categories"].is_array());

    let response = app
        .oneshot(authed_request("GET", "/api/analytics/export", &auth))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.starts_with("text/csv"));
}

// ========== Ledger ==========

#[tokio::test]
async fn test_transaction_flow_over_http() {
    let (app, db) = setup();
    let id = seed_user(&db, "a@x.com", "alice");
    let auth = bearer(id);

    // First entry is an expense; the balance goes negative
    let response = app
        .clone()
        .oneshot(authed_json_request(
            "POST",
            "/api/transactions",
            &auth,
            serde_json::json!({
                "kind": "expense",
                "amount": 100.0,
                "description": "Groceries"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["data"]["current_balance"], -100.0);

    let response = app
        .clone()
        .oneshot(authed_json_request(
            "POST",
            "/api/transactions",
            &auth,
            serde_json::json!({
                "kind": "income",
                "amount": 250.5,
                "description": "Pay"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["data"]["current_balance"], 150.5);

    let response = app
        .clone()
        .oneshot(authed_request("GET", "/api/balance", &auth))
        .await
        .unwrap();
    let json = get_body_json(response).await;
    assert_eq!(json["data"]["current_balance"], 150.5);
    assert_eq!(json["data"]["total_income"], 250.5);

    // The income view filters out the expense
    let response = app
        .oneshot(authed_request("GET", "/api/income", &auth))
        .await
        .unwrap();
    let json = get_body_json(response).await;
    let income = json["data"].as_array().unwrap();
    assert_eq!(income.len(), 1);
    assert_eq!(income[0]["description"], "Pay");
}

#[tokio::test]
async fn test_kind_fixed_routes_set_kind_from_path() {
    let (app, db) = setup();
    let id = seed_user(&db, "a@x.com", "alice");
    let auth = bearer(id);

    let response = app
        .clone()
        .oneshot(authed_json_request(
            "POST",
            "/api/income",
            &auth,
            serde_json::json!({"amount": 2000.0, "description": "Salary"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["data"]["kind"], "income");

    let response = app
        .clone()
        .oneshot(authed_json_request(
            "POST",
            "/api/expenses",
            &auth,
            serde_json::json!({"amount": 45.25, "description": "Utilities"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["data"]["kind"], "expense");
    assert_eq!(json["data"]["current_balance"], 1954.75);

    let response = app
        .oneshot(authed_request("GET", "/api/expenses", &auth))
        .await
        .unwrap();
    let json = get_body_json(response).await;
    assert_eq!(json["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_invalid_transaction_is_bad_request() {
    let (app, db) = setup();
    let id = seed_user(&db, "a@x.com", "alice");

    let response = app
        .oneshot(authed_json_request(
            "POST",
            "/api/transactions",
            &bearer(id),
            serde_json::json!({
                "kind": "expense",
                "amount": 0.0,
                "description": "zero"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = get_body_json(response).await;
    assert_eq!(json["success"], false);
}

// ========== Subscription & payments ==========

#[tokio::test]
async fn test_subscription_endpoint_reports_features() {
    let (app, db) = setup();
    let id = seed_user(&db, "a@x.com", "alice");

    let response = app
        .oneshot(authed_request("GET", "/api/subscriptions", &bearer(id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["data"]["subscription"]["tier"], "free");
    let features = json["data"]["features"].as_array().unwrap();
    assert!(features.iter().any(|f| f == "basic_tracking"));
}

#[tokio::test]
async fn test_incomplete_payment_is_rejected() {
    let (app, db) = setup();
    let id = seed_user(&db, "a@x.com", "alice");

    let response = app
        .oneshot(authed_json_request(
            "POST",
            "/api/payments/verify-paypal",
            &bearer(id),
            serde_json::json!({
                "order_id": "ORDER-1",
                "status": "PENDING",
                "amount": 9.99
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = get_body_json(response).await;
    assert_eq!(json["success"], false);

    assert_eq!(
        db.get_or_create_subscription(id).unwrap().tier.as_str(),
        "free"
    );
}

#[tokio::test]
async fn test_completed_payment_upgrades_subscription() {
    let (app, db) = setup();
    let id = seed_user(&db, "a@x.com", "alice");

    let response = app
        .oneshot(authed_json_request(
            "POST",
            "/api/payments/verify-paypal",
            &bearer(id),
            serde_json::json!({
                "order_id": "ORDER-1",
                "status": "COMPLETED",
                "amount": 9.99
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["data"]["subscription"]["tier"], "pro");
    assert_eq!(json["data"]["payment"]["amount"], 9.99);
}

#[tokio::test]
async fn test_payment_with_inline_registration() {
    let (app, db) = setup();

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/payments/verify-paypal",
            serde_json::json!({
                "order_id": "ORDER-2",
                "status": "COMPLETED",
                "amount": 9.99,
                "registration": {
                    "email": "new@x.com",
                    "username": "newbie",
                    "password": "secret1"
                }
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["data"]["subscription"]["tier"], "pro");

    let user = db.get_user_by_email("new@x.com").unwrap().unwrap();
    assert!(!user.email_verified);
}

// ========== Goals ==========

#[tokio::test]
async fn test_goal_creation_is_gated_but_listing_is_open() {
    let (app, db) = setup();
    let id = seed_user(&db, "a@x.com", "alice");
    let auth = bearer(id);

    let body = serde_json::json!({"amount": 500.0, "description": "Emergency fund"});
    let response = app
        .clone()
        .oneshot(authed_json_request("POST", "/api/goals", &auth, body.clone()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let json = get_body_json(response).await;
    assert_eq!(json["required_feature"], "budget_goals");

    let response = app
        .clone()
        .oneshot(authed_request("GET", "/api/goals", &auth))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    db.set_subscription_tier(id, "pro").unwrap();
    let response = app
        .oneshot(authed_json_request("POST", "/api/goals", &auth, body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["data"]["amount"], 500.0);
    assert_eq!(json["data"]["is_completed"], false);
}
