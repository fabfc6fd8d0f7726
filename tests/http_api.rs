use std::sync::Arc;

use axum::http::StatusCode;
use chrono::{Duration, Utc};
use serde_json::json;
use signout_kiosk::store::memory::Faults;
use signout_kiosk::store::MemoryStore;

mod common;
use common::{
    admin_request, get, kindergarten, kiosk, login, post_json, send, signed_out, today,
};

#[tokio::test]
async fn admin_routes_need_a_session() {
    let app = kiosk(Arc::new(MemoryStore::default()));
    for (method, uri) in [
        ("POST", "/api/reset-day"),
        ("GET", "/api/history"),
        ("GET", "/api/admin/records"),
    ] {
        let (status, body) = send(&app, admin_request(method, uri, "not-a-session")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{} {}", method, uri);
        assert_eq!(body["kind"], "AuthenticationFailure");
    }
}

#[tokio::test]
async fn wrong_password_is_refused() {
    let app = kiosk(Arc::new(MemoryStore::default()));
    let (status, body) = send(
        &app,
        post_json("/api/admin/login", json!({ "password": "1234" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Incorrect password. Please try again.");
}

#[tokio::test]
async fn logout_ends_the_session() {
    let app = kiosk(Arc::new(MemoryStore::default()));
    let session = login(&app).await;

    let (status, body) = send(&app, admin_request("POST", "/api/admin/logout", &session)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["drop_success"], true);

    let (status, _) = send(&app, admin_request("GET", "/api/history", &session)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn sign_out_then_reset_day_archives_the_records() {
    let store = Arc::new(MemoryStore::default());
    let students = kindergarten(&store).await;
    let app = kiosk(store.clone());

    for student in &students[..2] {
        let (status, body) = send(
            &app,
            post_json(
                "/api/sign-out",
                json!({
                    "student_id": student.id,
                    "signer_name": format!("  Parent of {}  ", student.first_name),
                    "signature_data": "data:image/png;base64,iVBORw0KGgo=",
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        assert_eq!(body["success"], true);
        assert_eq!(
            body["record"]["signer_name"],
            format!("Parent of {}", student.first_name)
        );
    }

    let session = login(&app).await;
    let (status, body) = send(&app, admin_request("GET", "/api/admin/records", &session)).await;
    assert_eq!(status, StatusCode::OK);
    let records = body["records"].as_array().unwrap();
    assert_eq!(records.len(), 2);
    assert!(records
        .iter()
        .all(|r| r["student"]["class_name"] == "K1"));

    let (status, body) = send(&app, admin_request("POST", "/api/reset-day", &session)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true, "archived": 2 }));
    assert_eq!(store.live_count().await, 0);

    let (status, body) = send(&app, admin_request("POST", "/api/reset-day", &session)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true, "archived": 0 }));

    let (status, body) = send(&app, admin_request("GET", "/api/history", &session)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["days"][0]["day"], today().to_string());
    assert!(body.get("note").is_none());

    let uri = format!("/api/history/{}", today());
    let (status, body) = send(&app, admin_request("GET", &uri, &session)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["archive"]["data"]["day"], today().to_string());
    assert_eq!(body["archive"]["data"]["records"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn reset_day_with_nothing_signed_out() {
    let app = kiosk(Arc::new(MemoryStore::default()));
    let session = login(&app).await;
    let (status, body) = send(&app, admin_request("POST", "/api/reset-day", &session)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true, "archived": 0 }));
}

#[tokio::test]
async fn reset_day_reports_missing_schema() {
    let app = kiosk(Arc::new(MemoryStore::with_faults(Faults {
        tables_missing: true,
        ..Faults::default()
    })));
    let session = login(&app).await;
    let (status, body) = send(&app, admin_request("POST", "/api/reset-day", &session)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["kind"], "SetupRequired");
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("001_kiosk_schema.sql"));
}

#[tokio::test]
async fn reset_day_reports_total_failure() {
    let store = Arc::new(MemoryStore::with_faults(Faults {
        archive_writes_fail: true,
        ..Faults::default()
    }));
    let students = kindergarten(&store).await;
    store
        .insert_record(signed_out(students[0].id, "Mum", Utc::now()))
        .await;
    let app = kiosk(store.clone());
    let session = login(&app).await;

    let (status, body) = send(&app, admin_request("POST", "/api/reset-day", &session)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().is_some());
    assert_eq!(store.live_count().await, 1);
}

#[tokio::test]
async fn student_cannot_be_signed_out_twice() {
    let store = Arc::new(MemoryStore::default());
    let students = kindergarten(&store).await;
    let app = kiosk(store);
    let request = json!({ "student_id": students[0].id, "signer_name": "Dad" });

    let (status, body) = send(&app, post_json("/api/sign-out", request.clone())).await;
    assert_eq!(status, StatusCode::OK);
    let record_id = body["record"]["id"].as_str().unwrap().to_string();

    let (status, body) = send(&app, post_json("/api/sign-out", request.clone())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "AlreadySignedOut");
    assert_eq!(body["error"], "Student is already signed out");

    let (status, body) = send(
        &app,
        post_json(&format!("/api/sign-in/{}", record_id), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["record"]["signed_back_in_at"].is_string());

    let (status, _) = send(&app, post_json("/api/sign-out", request)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &app,
        post_json(&format!("/api/sign-in/{}", record_id), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn sign_out_validates_signer_and_signature() {
    let store = Arc::new(MemoryStore::default());
    let students = kindergarten(&store).await;
    let app = kiosk(store.clone());

    let (status, body) = send(
        &app,
        post_json(
            "/api/sign-out",
            json!({ "student_id": students[0].id, "signer_name": "   " }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "InvalidPayload");

    let (status, _) = send(
        &app,
        post_json(
            "/api/sign-out",
            json!({
                "student_id": students[0].id,
                "signer_name": "Mum",
                "signature_data": "data:image/png;base64,AAAA",
                "signature_url": "signatures/a.png",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(store.live_count().await, 0);
}

#[tokio::test]
async fn history_normalises_bare_array_archives() {
    let store = Arc::new(MemoryStore::default());
    let students = kindergarten(&store).await;
    let day = today() - Duration::days(3);
    let at = Utc::now() - Duration::days(3);
    let r1 = json!({
        "id": uuid::Uuid::new_v4(),
        "student_id": students[0].id,
        "signer_name": "Mum",
        "signature_data": null,
        "signed_out_at": at,
        "signed_back_in_at": null,
        "student": { "first_name": "Ada", "last_name": "Lovelace", "class_name": "K1" },
    });
    let r2 = json!({
        "id": uuid::Uuid::new_v4(),
        "student_id": students[1].id,
        "signer_name": "Dad",
        "signed_out_at": at,
        "student": null,
    });
    store.insert_raw_archive(day, json!([r1, r2])).await;
    let app = kiosk(store);
    let session = login(&app).await;

    let uri = format!("/api/history/{}", day);
    let (status, body) = send(&app, admin_request("GET", &uri, &session)).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["archive"]["day"], day.to_string());
    assert_eq!(body["archive"]["data"]["day"], day.to_string());
    let records = body["archive"]["data"]["records"].as_array().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["student"]["first_name"], "Ada");
    assert!(records[1]["student"].is_null());
}

#[tokio::test]
async fn history_rejects_bad_and_unknown_days() {
    let app = kiosk(Arc::new(MemoryStore::default()));
    let session = login(&app).await;

    let malformed = admin_request("GET", "/api/history/yesterday", &session);
    let (status, body) = send(&app, malformed).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "InvalidPayload");

    let unknown = admin_request("GET", "/api/history/2001-01-01", &session);
    let (status, body) = send(&app, unknown).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "NotFound");
}

#[tokio::test]
async fn history_without_archive_table_is_empty_with_note() {
    let app = kiosk(Arc::new(MemoryStore::with_faults(Faults {
        tables_missing: true,
        ..Faults::default()
    })));
    let session = login(&app).await;

    let (status, body) = send(&app, admin_request("GET", "/api/history", &session)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["days"], json!([]));
    assert!(body["note"].as_str().unwrap().contains("Archive table missing"));

    let uri = format!("/api/history/{}", today());
    let (status, body) = send(&app, admin_request("GET", &uri, &session)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["kind"], "SetupRequired");
}

#[tokio::test]
async fn unknown_path_is_a_json_404() {
    let app = kiosk(Arc::new(MemoryStore::default()));
    let (status, body) = send(&app, post_json("/api/nope", json!({}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Invalid path: /api/nope");
}

#[tokio::test]
async fn kiosk_lists_classes_and_students_still_in() {
    let store = Arc::new(MemoryStore::default());
    let students = kindergarten(&store).await;
    let app = kiosk(store.clone());

    let (status, body) = send(&app, get("/api/classes")).await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = body["classes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["K1", "K2"]);

    let k1 = students[0].class_id.unwrap();
    let uri = format!("/api/students/{}", k1);
    let (status, body) = send(&app, get(&uri)).await;
    assert_eq!(status, StatusCode::OK);
    let first_names: Vec<&str> = body["students"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["first_name"].as_str().unwrap())
        .collect();
    assert_eq!(first_names, ["Ada", "Grace"]);

    store
        .insert_record(signed_out(students[0].id, "Mum", Utc::now()))
        .await;
    let (_, body) = send(&app, get(&uri)).await;
    let remaining = body["students"].as_array().unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0]["first_name"], "Grace");
}

#[tokio::test]
async fn class_students_rejects_malformed_ids_and_ignores_unknown_classes() {
    let store = Arc::new(MemoryStore::default());
    kindergarten(&store).await;
    let app = kiosk(store);

    let (status, body) = send(&app, get("/api/students/not-a-class")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "InvalidPayload");

    let uri = format!("/api/students/{}", uuid::Uuid::new_v4());
    let (status, body) = send(&app, get(&uri)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["students"], json!([]));
}
