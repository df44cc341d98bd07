//! End-to-end tests driving the router against an in-memory store.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use async_trait::async_trait;
use axum::Router;
use cc_api::{router, AppState, ResolvePolicy};
use cc_auth_jwt::JwtIdentityProvider;
use cc_core::models::{
    Contest, ContestStatus, Platform, Submission, SubmissionStatus, VideoMetadata, VideoReference,
};
use cc_core::traits::{ContestRepo, MetadataFetcher, ProfileStore, SubmissionRepo};
use cc_core::{MockMetadataFetcher, MockProfileStore, Role};
use cc_db_sqlite::SqliteStore;
use cc_meta_oembed::NoopFetcher;
use jsonwebtoken::{encode, EncodingKey, Header};
use secrecy::SecretString;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

const SECRET: &str = "integration-test-secret";

struct Harness {
    app: Router,
    store: Arc<SqliteStore>,
}

async fn harness() -> Harness {
    let store = Arc::new(SqliteStore::in_memory().await.unwrap());
    Harness::build(store.clone(), store.clone(), Arc::new(NoopFetcher), Duration::from_millis(500))
}

fn token_for(user_id: Uuid, user_name: &str) -> String {
    let claims = json!({
        "sub": user_id.to_string(),
        "aud": "authenticated",
        "exp": chrono::Utc::now().timestamp() + 3600,
        "user_metadata": { "user_name": user_name },
    });
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
}

impl Harness {
    /// Profiles and contests always come from `store`; submissions and
    /// metadata can be swapped out.
    fn build(
        store: Arc<SqliteStore>,
        submissions: Arc<dyn SubmissionRepo>,
        metadata: Arc<dyn MetadataFetcher>,
        metadata_timeout: Duration,
    ) -> Self {
        let identity = JwtIdentityProvider::new(&SecretString::from(SECRET.to_string()), Some("authenticated"));
        let state = AppState::new(
            store.clone(),
            store.clone(),
            submissions,
            Arc::new(identity),
            metadata,
            ResolvePolicy::default(),
            metadata_timeout,
        );
        Harness { app: router(state), store }
    }

    async fn call(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    /// Logs a new user in (creating the profile) and gives them `role`.
    async fn login(&self, name: &str, role: Role) -> (Uuid, String) {
        let id = Uuid::new_v4();
        let token = token_for(id, name);
        let (status, _) = self.call(Method::GET, "/api/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        if role != Role::Viewer {
            self.store.set_role(id, role).await.unwrap();
        }
        (id, token)
    }

    async fn new_contest(&self, token: &str, title: &str) -> String {
        let (status, body) = self
            .call(Method::POST, "/api/contests", Some(token), Some(json!({ "title": title })))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        body["id"].as_str().unwrap().to_string()
    }
}

#[tokio::test]
async fn health_is_public() {
    let h = harness().await;
    let (status, body) = h.call(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn validate_endpoint_classifies_links() {
    let h = harness().await;
    let (status, body) = h
        .call(
            Method::POST,
            "/api/videos/validate",
            None,
            Some(json!({ "url": "https://www.tiktok.com/@user/video/7123456789012345678" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], true);
    assert_eq!(body["platform"], "tiktok");
    assert_eq!(body["video_id"], "7123456789012345678");

    let (_, body) = h
        .call(Method::POST, "/api/videos/validate", None, Some(json!({ "url": "https://youtube.com.evil.io/watch?v=x" })))
        .await;
    assert_eq!(body["valid"], false);
}

#[tokio::test]
async fn me_requires_valid_token_and_creates_viewer() {
    let h = harness().await;

    let (status, _) = h.call(Method::GET, "/api/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = h.call(Method::GET, "/api/me", Some("not-a-token"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let id = Uuid::new_v4();
    let (status, body) = h.call(Method::GET, "/api/me", Some(&token_for(id, "newbie")), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], id.to_string());
    assert_eq!(body["username"], "newbie");
    assert_eq!(body["role"], "viewer");
    assert_eq!(body["is_banned"], false);
}

#[tokio::test]
async fn only_streamers_and_above_create_contests() {
    let h = harness().await;
    let (_, viewer) = h.login("viewer", Role::Viewer).await;
    let (_, moderator) = h.login("mod", Role::Moderator).await;
    let (_, streamer) = h.login("streamer", Role::Streamer).await;
    let (_, admin) = h.login("admin", Role::Admin).await;
    let body = json!({ "title": "Clip of the week", "tags": ["funny", "Funny", "fails"] });

    for token in [&viewer, &moderator] {
        let (status, body) = h.call(Method::POST, "/api/contests", Some(token), Some(body.clone())).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "access denied");
    }

    let (status, created) = h.call(Method::POST, "/api/contests", Some(&streamer), Some(body.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["status"], "active");
    assert_eq!(created["tags"], json!(["funny", "fails"]));

    let (status, _) = h.call(Method::POST, "/api/contests", Some(&admin), Some(body)).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, list) = h.call(Method::GET, "/api/contests", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn submission_moderation_flow() {
    let h = harness().await;
    let (_, streamer) = h.login("streamer", Role::Streamer).await;
    let (_, viewer) = h.login("viewer", Role::Viewer).await;
    let (_, moderator) = h.login("mod", Role::Moderator).await;
    let contest = h.new_contest(&streamer, "Best plays").await;
    let submissions = format!("/api/contests/{contest}/submissions");

    let (status, body) = h
        .call(Method::POST, &submissions, Some(&viewer), Some(json!({ "url": "https://evil.com/watch?v=abc" })))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "please enter a valid YouTube, TikTok or Twitch Clip link");

    let (status, submission) = h
        .call(
            Method::POST,
            &submissions,
            Some(&viewer),
            Some(json!({ "url": "https://www.youtube.com/watch?v=dQw4w9WgXcQ" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(submission["status"], "pending");
    assert_eq!(submission["platform"], "youtube");
    assert_eq!(submission["title"], "YouTube video");
    assert_eq!(
        submission["thumbnail_url"],
        "https://img.youtube.com/vi/dQw4w9WgXcQ/hqdefault.jpg"
    );

    // Same video through a different link form.
    let (status, _) = h
        .call(Method::POST, &submissions, Some(&moderator), Some(json!({ "url": "https://youtu.be/dQw4w9WgXcQ" })))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, public) = h.call(Method::GET, &submissions, None, None).await;
    assert!(public.as_array().unwrap().is_empty());

    let queue = format!("/api/moderation/contests/{contest}/submissions?status=pending");
    let (status, _) = h.call(Method::GET, &queue, Some(&viewer), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, pending) = h.call(Method::GET, &queue, Some(&moderator), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(pending.as_array().unwrap().len(), 1);

    let (status, _) = h
        .call(
            Method::GET,
            &format!("/api/moderation/contests/{contest}/submissions?status=bogus"),
            Some(&moderator),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let review = format!("/api/submissions/{}/review", submission["id"].as_str().unwrap());
    let (status, _) = h.call(Method::POST, &review, Some(&viewer), Some(json!({ "status": "approved" }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = h.call(Method::POST, &review, Some(&moderator), Some(json!({ "status": "pending" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, reviewed) = h
        .call(Method::POST, &review, Some(&moderator), Some(json!({ "status": "approved" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reviewed["status"], "approved");
    assert!(reviewed["reviewed_by"].is_string());

    let (_, public) = h.call(Method::GET, &submissions, None, None).await;
    assert_eq!(public.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn banned_users_are_denied_everywhere_gated() {
    let h = harness().await;
    let (_, streamer) = h.login("streamer", Role::Streamer).await;
    let (_, admin) = h.login("admin", Role::Admin).await;
    let (troll_id, troll) = h.login("troll", Role::Moderator).await;
    let contest = h.new_contest(&streamer, "Open contest").await;

    let (status, body) = h
        .call(Method::POST, &format!("/api/admin/profiles/{troll_id}/ban"), Some(&admin), Some(json!({ "banned": true })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_banned"], true);

    let (status, _) = h
        .call(
            Method::POST,
            &format!("/api/contests/{contest}/submissions"),
            Some(&troll),
            Some(json!({ "url": "https://youtu.be/dQw4w9WgXcQ" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = h
        .call(Method::GET, &format!("/api/moderation/contests/{contest}/submissions"), Some(&troll), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Their own profile stays readable.
    let (status, me) = h.call(Method::GET, "/api/me", Some(&troll), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["is_banned"], true);
}

#[tokio::test]
async fn admin_routes_are_admin_only() {
    let h = harness().await;
    let (admin_id, admin) = h.login("admin", Role::Admin).await;
    let (_, streamer) = h.login("streamer", Role::Streamer).await;
    let (viewer_id, _) = h.login("viewer", Role::Viewer).await;

    let (status, _) = h.call(Method::GET, "/api/admin/profiles", Some(&streamer), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, profiles) = h.call(Method::GET, "/api/admin/profiles", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profiles.as_array().unwrap().len(), 3);

    let (status, promoted) = h
        .call(
            Method::POST,
            &format!("/api/admin/profiles/{viewer_id}/role"),
            Some(&admin),
            Some(json!({ "role": "moderator" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(promoted["role"], "moderator");

    let (status, _) = h
        .call(
            Method::POST,
            &format!("/api/admin/profiles/{admin_id}/role"),
            Some(&admin),
            Some(json!({ "role": "viewer" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = h
        .call(Method::POST, &format!("/api/admin/profiles/{admin_id}/ban"), Some(&admin), Some(json!({ "banned": true })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = h
        .call(
            Method::POST,
            &format!("/api/admin/profiles/{}/role", Uuid::new_v4()),
            Some(&admin),
            Some(json!({ "role": "streamer" })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn contest_owners_manage_their_contests() {
    let h = harness().await;
    let (_, owner) = h.login("owner", Role::Streamer).await;
    let (_, rival) = h.login("rival", Role::Streamer).await;
    let (_, admin) = h.login("admin", Role::Admin).await;
    let (_, viewer) = h.login("viewer", Role::Viewer).await;
    let contest = h.new_contest(&owner, "Owner's contest").await;

    let tags = format!("/api/contests/{contest}/tags");
    let (status, _) = h.call(Method::POST, &tags, Some(&rival), Some(json!({ "name": "speedrun" }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = h.call(Method::POST, &tags, Some(&owner), Some(json!({ "name": "speedrun" }))).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = h.call(Method::POST, &tags, Some(&owner), Some(json!({ "name": "SpeedRun" }))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let status_uri = format!("/api/contests/{contest}/status");
    let (status, _) = h.call(Method::POST, &status_uri, Some(&rival), Some(json!({ "status": "closed" }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, closed) = h.call(Method::POST, &status_uri, Some(&admin), Some(json!({ "status": "closed" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(closed["status"], "closed");

    let (status, _) = h
        .call(
            Method::POST,
            &format!("/api/contests/{contest}/submissions"),
            Some(&viewer),
            Some(json!({ "url": "https://clips.twitch.tv/AwkwardHelplessSalamanderSwiftRage" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, view) = h.call(Method::GET, &format!("/api/contests/{contest}"), None, None).await;
    assert_eq!(view["tags"], json!(["speedrun"]));
}

#[tokio::test]
async fn unknown_contest_is_not_found() {
    let h = harness().await;
    let (_, viewer) = h.login("viewer", Role::Viewer).await;
    let missing = Uuid::new_v4();

    let (status, _) = h.call(Method::GET, &format!("/api/contests/{missing}"), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = h
        .call(
            Method::POST,
            &format!("/api/contests/{missing}/submissions"),
            Some(&viewer),
            Some(json!({ "url": "https://youtu.be/dQw4w9WgXcQ" })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

/// Never answers within the configured metadata timeout.
struct StalledFetcher;

#[async_trait]
impl MetadataFetcher for StalledFetcher {
    async fn fetch(&self, _video: &VideoReference) -> Option<VideoMetadata> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        None
    }
}

/// Reports no existing submission on lookup, like a concurrent request
/// writing between the duplicate check and the insert.
struct BlindLookup(Arc<SqliteStore>);

#[async_trait]
impl SubmissionRepo for BlindLookup {
    async fn create_submission(&self, submission: Submission) -> anyhow::Result<()> {
        self.0.create_submission(submission).await
    }
    async fn get_submission(&self, id: Uuid) -> anyhow::Result<Option<Submission>> {
        self.0.get_submission(id).await
    }
    async fn find_by_video(&self, _contest_id: Uuid, _platform: Platform, _video_id: &str) -> anyhow::Result<Option<Submission>> {
        Ok(None)
    }
    async fn list_submissions(&self, contest_id: Uuid, status: Option<SubmissionStatus>) -> anyhow::Result<Vec<Submission>> {
        self.0.list_submissions(contest_id, status).await
    }
    async fn set_status(&self, id: Uuid, status: SubmissionStatus, reviewed_by: Uuid) -> anyhow::Result<Option<Submission>> {
        self.0.set_status(id, status, reviewed_by).await
    }
}

#[tokio::test]
async fn slow_metadata_falls_back_and_submission_succeeds() {
    let store = Arc::new(SqliteStore::in_memory().await.unwrap());
    let h = Harness::build(store.clone(), store, Arc::new(StalledFetcher), Duration::from_millis(50));
    let (_, streamer) = h.login("streamer", Role::Streamer).await;
    let (_, viewer) = h.login("viewer", Role::Viewer).await;
    let contest = h.new_contest(&streamer, "Slow oEmbed").await;

    let (status, submission) = h
        .call(
            Method::POST,
            &format!("/api/contests/{contest}/submissions"),
            Some(&viewer),
            Some(json!({ "url": "https://youtu.be/dQw4w9WgXcQ" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(submission["title"], "YouTube video");
    assert_eq!(
        submission["thumbnail_url"],
        "https://img.youtube.com/vi/dQw4w9WgXcQ/hqdefault.jpg"
    );
}

#[tokio::test]
async fn fetched_metadata_is_stored_with_the_submission() {
    let mut fetcher = MockMetadataFetcher::new();
    fetcher.expect_fetch().times(1).returning(|_| {
        Some(VideoMetadata {
            title: "Triple kill".to_string(),
            thumbnail_url: Some("https://cdn.example/t.jpg".to_string()),
        })
    });
    let store = Arc::new(SqliteStore::in_memory().await.unwrap());
    let h = Harness::build(store.clone(), store, Arc::new(fetcher), Duration::from_millis(500));
    let (_, streamer) = h.login("streamer", Role::Streamer).await;
    let contest = h.new_contest(&streamer, "Highlights").await;

    let (status, submission) = h
        .call(
            Method::POST,
            &format!("/api/contests/{contest}/submissions"),
            Some(&streamer),
            Some(json!({ "url": "https://www.tiktok.com/@user/video/7123456789012345678" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(submission["title"], "Triple kill");
    assert_eq!(submission["thumbnail_url"], "https://cdn.example/t.jpg");
}

#[tokio::test]
async fn concurrent_duplicate_is_a_conflict_not_a_server_error() {
    let store = Arc::new(SqliteStore::in_memory().await.unwrap());
    let blind = Arc::new(BlindLookup(store.clone()));
    let h = Harness::build(store, blind, Arc::new(NoopFetcher), Duration::from_millis(500));
    let (_, streamer) = h.login("streamer", Role::Streamer).await;
    let contest = h.new_contest(&streamer, "Race").await;
    let uri = format!("/api/contests/{contest}/submissions");
    let body = json!({ "url": "https://youtu.be/abc" });

    let (first, _) = h.call(Method::POST, &uri, Some(&streamer), Some(body.clone())).await;
    assert_eq!(first, StatusCode::CREATED);
    let (second, err) = h.call(Method::POST, &uri, Some(&streamer), Some(body)).await;
    assert_eq!(second, StatusCode::CONFLICT);
    assert_eq!(err["error"], "conflict: this video has already been submitted to the contest");
}

#[tokio::test]
async fn submissions_after_the_deadline_are_rejected() {
    let h = harness().await;
    let (streamer_id, _) = h.login("streamer", Role::Streamer).await;
    let (_, viewer) = h.login("viewer", Role::Viewer).await;
    let now = chrono::Utc::now();
    let contest = Contest {
        id: Uuid::new_v4(),
        title: "Yesterday's contest".into(),
        description: None,
        created_by: streamer_id,
        status: ContestStatus::Active,
        submission_deadline: Some(now - chrono::Duration::hours(1)),
        created_at: now - chrono::Duration::days(2),
    };
    h.store.create_contest(contest.clone(), vec![]).await.unwrap();

    let (status, body) = h
        .call(
            Method::POST,
            &format!("/api/contests/{}/submissions", contest.id),
            Some(&viewer),
            Some(json!({ "url": "https://youtu.be/dQw4w9WgXcQ" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation error: this contest is not accepting submissions");
}

#[tokio::test]
async fn unreachable_profile_store_denies_even_own_profile() {
    let mut profiles = MockProfileStore::new();
    profiles
        .expect_get_profile()
        .returning(|_| Err(anyhow::anyhow!("connection refused")));
    let store = Arc::new(SqliteStore::in_memory().await.unwrap());
    let identity = JwtIdentityProvider::new(&SecretString::from(SECRET.to_string()), Some("authenticated"));
    let policy = ResolvePolicy {
        timeout: Duration::from_millis(100),
        retries: 0,
        retry_delay: Duration::from_millis(1),
    };
    let state = AppState::new(
        Arc::new(profiles),
        store.clone(),
        store.clone(),
        Arc::new(identity),
        Arc::new(NoopFetcher),
        policy,
        Duration::from_millis(500),
    );
    let h = Harness { app: router(state), store };
    let token = token_for(Uuid::new_v4(), "ghost");

    let (status, body) = h.call(Method::GET, "/api/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "access denied");

    let (status, _) = h
        .call(Method::POST, "/api/contests", Some(&token), Some(json!({ "title": "nope" })))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}
