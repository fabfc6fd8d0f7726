#![allow(dead_code)]
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{DateTime, Duration, Local, NaiveDate, Utc};
use serde_json::{json, Value};
use signout_kiosk::auth::AdminGate;
use signout_kiosk::models::{SignOutRecord, Student};
use signout_kiosk::store::MemoryStore;
use signout_kiosk::{app, AppState};
use tower::ServiceExt;
use uuid::Uuid;

pub const ADMIN_PASSWORD: &str = "0000";

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// One class with three students: Ada and Grace in K1, Alan in K2.
pub async fn kindergarten(store: &MemoryStore) -> Vec<Student> {
    let k1 = store.add_class("K1").await;
    let k2 = store.add_class("K2").await;
    vec![
        store.add_student("Ada", "Lovelace", k1.id).await,
        store.add_student("Grace", "Hopper", k1.id).await,
        store.add_student("Alan", "Turing", k2.id).await,
    ]
}

pub fn signed_out(
    student_id: Uuid,
    signer_name: &str,
    signed_out_at: DateTime<Utc>,
) -> SignOutRecord {
    SignOutRecord {
        id: Uuid::new_v4(),
        student_id,
        signer_name: signer_name.to_string(),
        signature_data: Some("data:image/png;base64,iVBORw0KGgo=".to_string()),
        signature_url: None,
        signed_out_at,
        signed_back_in_at: None,
    }
}

/// Signs every student out a few seconds apart, oldest first.
pub async fn sign_out_all(store: &MemoryStore, students: &[Student]) -> Vec<SignOutRecord> {
    let base = Utc::now() - Duration::seconds(students.len() as i64);
    let mut records = Vec::new();
    for (i, student) in students.iter().enumerate() {
        let record = signed_out(
            student.id,
            &format!("Guardian of {}", student.first_name),
            base + Duration::seconds(i as i64),
        );
        store.insert_record(record.clone()).await;
        records.push(record);
    }
    records
}

pub fn kiosk(store: Arc<MemoryStore>) -> Router {
    let gate = AdminGate::new(ADMIN_PASSWORD, Duration::hours(1)).expect("admin gate");
    app(AppState {
        store,
        gate: Arc::new(gate),
    })
}

pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.expect("router is infallible");
    let status = response.status();
    let bytes = hyper::body::to_bytes(response.into_body())
        .await
        .expect("read body");
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    (status, body)
}

pub fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

pub fn admin_request(method: &str, uri: &str, session_id: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {}", session_id))
        .body(Body::empty())
        .expect("request")
}

pub async fn login(app: &Router) -> String {
    let (status, body) = send(
        app,
        post_json("/api/admin/login", json!({ "password": ADMIN_PASSWORD })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "login failed: {}", body);
    body["session_id"]
        .as_str()
        .expect("session_id")
        .to_string()
}
