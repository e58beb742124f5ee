use guest_pass_backend::{
    api::router::create_router,
    config::Config,
    domain::models::{guest_pass::GuestPass, nonce_ledger::NonceLedgerEntry},
    domain::ports::{GuestPassRepository, RsvpDetails},
    domain::services::qr_rotation::Rotation,
    error::AppError,
    infra::factory::run_sqlite_migrations,
    infra::repositories::sqlite_guest_pass_repo::SqliteGuestPassRepo,
    state::AppState,
};
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request},
    response::Response,
    Router,
};
use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use sqlx::{sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions}, Pool, Sqlite};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tower::ServiceExt;
use uuid::Uuid;

#[allow(dead_code)]
pub struct TestApp {
    pub router: Router,
    pub pool: Pool<Sqlite>,
    pub db_filename: String,
    pub state: Arc<AppState>,
}

#[allow(dead_code)]
pub struct IssuedPass {
    pub id: String,
    pub token: String,
}

#[allow(dead_code)]
impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    pub async fn with_config(customize: impl FnOnce(&mut Config)) -> Self {
        Self::build(customize, |repo| Arc::new(repo) as Arc<dyn GuestPassRepository>).await
    }

    /// App whose store can be made slow or failing from the test.
    pub async fn with_faulty_store(customize: impl FnOnce(&mut Config)) -> (Self, Arc<FaultyRepo>) {
        let mut faulty = None;
        let app = Self::build(customize, |repo| {
            let wrapped = Arc::new(FaultyRepo::new(repo));
            faulty = Some(wrapped.clone());
            wrapped as Arc<dyn GuestPassRepository>
        })
        .await;
        (app, faulty.unwrap())
    }

    async fn build(
        customize: impl FnOnce(&mut Config),
        wrap: impl FnOnce(SqliteGuestPassRepo) -> Arc<dyn GuestPassRepository>,
    ) -> Self {
        let db_filename = format!("test_{}.db", Uuid::new_v4());
        let db_url = format!("sqlite://{}?mode=rwc", db_filename);

        let connection_options = SqliteConnectOptions::from_str(&db_url)
            .unwrap()
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(StdDuration::from_secs(10));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connection_options)
            .await
            .expect("Failed to connect to test db");

        run_sqlite_migrations(&pool)
            .await
            .expect("Failed to migrate test db");

        let mut config = Config::local(db_url);
        config.store_timeout = StdDuration::from_secs(10);
        customize(&mut config);

        let repo = wrap(SqliteGuestPassRepo::new(pool.clone()));
        let state = Arc::new(AppState::new(config, repo));
        let router = create_router(state.clone());

        Self { router, pool, db_filename, state }
    }

    pub async fn send(&self, req: Request<Body>) -> Response {
        self.router.clone().oneshot(req).await.unwrap()
    }

    pub async fn post_json(&self, uri: &str, body: Value) -> Response {
        self.send(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    pub async fn get(&self, uri: &str) -> Response {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap()).await
    }

    /// Issues a pass for an event starting `hours_until_start` from now.
    pub async fn issue_pass(&self, hours_until_start: i64, cover_charge: Option<Value>) -> IssuedPass {
        let mut payload = json!({
            "event_id": "evt-rooftop",
            "event_start_time": (Utc::now() + Duration::hours(hours_until_start)).to_rfc3339(),
        });
        if let Some(cover) = cover_charge {
            payload["cover_charge"] = cover;
        }

        let response = self.post_json("/api/v1/guest-passes", payload).await;
        assert_eq!(response.status(), 201, "pass creation failed");
        let body = parse_body(response).await;

        IssuedPass {
            id: body["pass"]["id"].as_str().unwrap().to_string(),
            token: body["token"].as_str().unwrap().to_string(),
        }
    }

    pub async fn rsvp(&self, token: &str, body: Value) -> Response {
        self.post_json(&format!("/api/v1/guest-passes/{token}/rsvp"), body).await
    }

    /// Issues and activates a pass, returning it with the QR payload currently displayed.
    pub async fn active_pass(&self) -> (IssuedPass, Value) {
        let pass = self.issue_pass(8, None).await;
        let response = self.rsvp(&pass.token, json!({ "name": "Ada" })).await;
        assert_eq!(response.status(), 200);
        let qr = self.qr(&pass.token).await;
        (pass, qr)
    }

    pub async fn qr(&self, token: &str) -> Value {
        let response = self.get(&format!("/api/v1/guest-passes/{token}/qr")).await;
        assert_eq!(response.status(), 200, "qr display failed");
        parse_body(response).await
    }

    pub async fn scan(&self, token: &str, body: Value) -> Response {
        self.post_json(&format!("/api/v1/guest-passes/{token}/scan"), body).await
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.db_filename);
        let _ = std::fs::remove_file(format!("{}-wal", self.db_filename));
        let _ = std::fs::remove_file(format!("{}-shm", self.db_filename));
    }
}

#[allow(dead_code)]
pub async fn parse_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Delegates to SQLite, with switches for slow lookups and sweeps, failing
/// rotations, and an activation lost to a concurrent RSVP.
#[allow(dead_code)]
pub struct FaultyRepo {
    inner: SqliteGuestPassRepo,
    lookup_delay_ms: AtomicU64,
    sweep_delay_ms: AtomicU64,
    pub fail_rotations: AtomicBool,
    pub lose_activation_race: AtomicBool,
}

#[allow(dead_code)]
impl FaultyRepo {
    pub fn new(inner: SqliteGuestPassRepo) -> Self {
        Self {
            inner,
            lookup_delay_ms: AtomicU64::new(0),
            sweep_delay_ms: AtomicU64::new(0),
            fail_rotations: AtomicBool::new(false),
            lose_activation_race: AtomicBool::new(false),
        }
    }

    pub fn delay_lookups(&self, delay: StdDuration) {
        self.lookup_delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn delay_sweeps(&self, delay: StdDuration) {
        self.sweep_delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    async fn pause(delay_ms: &AtomicU64) {
        let ms = delay_ms.load(Ordering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(StdDuration::from_millis(ms)).await;
        }
    }
}

#[async_trait]
impl GuestPassRepository for FaultyRepo {
    async fn create(&self, pass: &GuestPass) -> Result<GuestPass, AppError> {
        self.inner.create(pass).await
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<GuestPass>, AppError> {
        self.inner.find_by_id(id).await
    }

    async fn find_by_token_hash(&self, token_hash: &str) -> Result<Option<GuestPass>, AppError> {
        Self::pause(&self.lookup_delay_ms).await;
        self.inner.find_by_token_hash(token_hash).await
    }

    async fn list_by_event(&self, event_id: &str) -> Result<Vec<GuestPass>, AppError> {
        self.inner.list_by_event(event_id).await
    }

    async fn record_rsvp(&self, id: &str, details: &RsvpDetails, now: DateTime<Utc>) -> Result<bool, AppError> {
        self.inner.record_rsvp(id, details, now).await
    }

    async fn activate(&self, id: &str, details: &RsvpDetails, rotation: &Rotation, now: DateTime<Utc>) -> Result<bool, AppError> {
        if self.lose_activation_race.load(Ordering::SeqCst) {
            // Another request activates the pass first.
            self.inner.activate(id, details, rotation, now).await?;
            return Ok(false);
        }
        self.inner.activate(id, details, rotation, now).await
    }

    async fn rotate_secret(&self, id: &str, rotation: &Rotation, now: DateTime<Utc>) -> Result<bool, AppError> {
        if self.fail_rotations.load(Ordering::SeqCst) {
            return Err(AppError::StorageUnavailable);
        }
        self.inner.rotate_secret(id, rotation, now).await
    }

    async fn consume(&self, id: &str, secret: &str, now: DateTime<Utc>) -> Result<bool, AppError> {
        self.inner.consume(id, secret, now).await
    }

    async fn revoke(&self, id: &str, now: DateTime<Utc>) -> Result<bool, AppError> {
        self.inner.revoke(id, now).await
    }

    async fn expire(&self, id: &str, now: DateTime<Utc>) -> Result<bool, AppError> {
        self.inner.expire(id, now).await
    }

    async fn expire_due(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        Self::pause(&self.sweep_delay_ms).await;
        self.inner.expire_due(now).await
    }

    async fn find_due_for_rotation(&self, generated_before: DateTime<Utc>, limit: i64) -> Result<Vec<GuestPass>, AppError> {
        self.inner.find_due_for_rotation(generated_before, limit).await
    }

    async fn find_retired_nonce(&self, pass_id: &str, nonce_hash: &str) -> Result<Option<NonceLedgerEntry>, AppError> {
        self.inner.find_retired_nonce(pass_id, nonce_hash).await
    }
}
