mod common;

use axum::http::StatusCode;
use chrono::{Duration, Utc};
use common::{parse_body, TestApp};
use guest_pass_backend::domain::models::guest_pass::{GuestPass, NewGuestPassParams, PassStatus};
use serde_json::json;

async fn insert_pass(app: &TestApp, status: PassStatus, expired_minutes_ago: i64) -> GuestPass {
    let (mut pass, _) = GuestPass::new(NewGuestPassParams {
        event_id: "evt-reaper".into(),
        event_start_at: Utc::now() + Duration::hours(4) - Duration::minutes(expired_minutes_ago),
        expiry_hours: 4,
        cover_charge: None,
    });
    pass.status = status;
    app.state.guest_pass_repo.create(&pass).await.unwrap()
}

#[tokio::test]
async fn test_reaper_expires_due_passes_once() {
    let app = TestApp::new().await;

    let pending = insert_pass(&app, PassStatus::Pending, 10).await;
    let active = insert_pass(&app, PassStatus::Active, 10).await;
    let used = insert_pass(&app, PassStatus::Used, 10).await;
    let revoked = insert_pass(&app, PassStatus::Revoked, 10).await;
    let future = insert_pass(&app, PassStatus::Active, -60).await;

    let first = app.state.expiration_reaper.sweep().await.unwrap();
    assert_eq!(first, 2);

    let second = app.state.expiration_reaper.sweep().await.unwrap();
    assert_eq!(second, 0);

    let repo = &app.state.guest_pass_repo;
    let status_of = |id: String| async move { repo.find_by_id(&id).await.unwrap().unwrap().status };
    assert_eq!(status_of(pending.id).await, PassStatus::Expired);
    assert_eq!(status_of(active.id).await, PassStatus::Expired);
    assert_eq!(status_of(used.id).await, PassStatus::Used);
    assert_eq!(status_of(revoked.id).await, PassStatus::Revoked);
    assert_eq!(status_of(future.id).await, PassStatus::Active);
}

#[tokio::test]
async fn test_active_pass_expires_on_access_past_cutoff() {
    let app = TestApp::new().await;
    let pass = app.issue_pass(8, None).await;
    assert_eq!(app.rsvp(&pass.token, json!({})).await.status(), StatusCode::OK);

    // Pull the cutoff into the past without waiting for the reaper.
    sqlx::query("UPDATE guest_passes SET expires_at = ? WHERE id = ?")
        .bind(Utc::now() - Duration::seconds(1))
        .bind(&pass.id)
        .execute(&app.pool)
        .await
        .unwrap();

    let response = app.get(&format!("/api/v1/guest-passes/{}/qr", pass.token)).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(parse_body(response).await["code"], "EXPIRED");

    let stored = app.state.guest_pass_repo.find_by_id(&pass.id).await.unwrap().unwrap();
    assert_eq!(stored.status, PassStatus::Expired);

    assert_eq!(app.state.expiration_reaper.sweep().await.unwrap(), 0);
}

#[tokio::test]
async fn test_rotation_sweep_only_touches_stale_active_passes() {
    let app = TestApp::with_config(|c| c.qr_rotation_interval = std::time::Duration::from_secs(60)).await;
    let (fresh, _) = app.active_pass().await;
    let (stale, stale_qr) = app.active_pass().await;

    sqlx::query("UPDATE guest_passes SET qr_generated_at = ? WHERE id = ?")
        .bind(Utc::now() - Duration::minutes(5))
        .bind(&stale.id)
        .execute(&app.pool)
        .await
        .unwrap();

    let rotated = app.state.rotation_engine.rotate_due(100).await.unwrap();
    assert_eq!(rotated, 1);

    let repo = &app.state.guest_pass_repo;
    let stale_now = repo.find_by_id(&stale.id).await.unwrap().unwrap();
    assert_ne!(stale_now.qr_secret, stale_qr["nonce"].as_str().unwrap());
    assert!(stale_now.qr_generated_at > Utc::now() - Duration::minutes(1));

    let fresh_qr = app.qr(&fresh.token).await;
    let fresh_now = repo.find_by_id(&fresh.id).await.unwrap().unwrap();
    assert_eq!(fresh_now.qr_secret, fresh_qr["nonce"].as_str().unwrap());

    assert_eq!(app.state.rotation_engine.rotate_due(100).await.unwrap(), 0);
}

#[tokio::test]
async fn test_stale_code_rotates_when_displayed() {
    let app = TestApp::new().await;
    let (pass, qr) = app.active_pass().await;

    sqlx::query("UPDATE guest_passes SET qr_generated_at = ? WHERE id = ?")
        .bind(Utc::now() - Duration::minutes(2))
        .bind(&pass.id)
        .execute(&app.pool)
        .await
        .unwrap();

    let refreshed = app.qr(&pass.token).await;
    assert_ne!(refreshed["nonce"], qr["nonce"]);

    let entry = app.state.guest_pass_repo
        .find_retired_nonce(&pass.id, &guest_pass_backend::domain::services::nonce_verifier::nonce_digest(qr["nonce"].as_str().unwrap()))
        .await
        .unwrap();
    assert!(entry.is_some());
}
