//! # cc-api
//!
//! The HTTP layer for clip-contest: routes, the request-scoped caller, and
//! the mapping from domain errors to responses.

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod session;

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use cc_core::traits::{ContestRepo, IdentityProvider, MetadataFetcher, ProfileStore, SubmissionRepo};

pub use error::ApiError;
pub use session::{Caller, ProfileResolver, ResolvePolicy};

/// State shared across all requests. Every collaborator is injected by the
/// binary (or a test) at startup.
#[derive(Clone)]
pub struct AppState {
    pub profiles: ProfileResolver,
    pub profile_store: Arc<dyn ProfileStore>,
    pub contests: Arc<dyn ContestRepo>,
    pub submissions: Arc<dyn SubmissionRepo>,
    pub identity: Arc<dyn IdentityProvider>,
    pub metadata: Arc<dyn MetadataFetcher>,
    /// Upper bound on a metadata lookup during submission
    pub metadata_timeout: Duration,
}

impl AppState {
    pub fn new(
        profile_store: Arc<dyn ProfileStore>,
        contests: Arc<dyn ContestRepo>,
        submissions: Arc<dyn SubmissionRepo>,
        identity: Arc<dyn IdentityProvider>,
        metadata: Arc<dyn MetadataFetcher>,
        policy: ResolvePolicy,
        metadata_timeout: Duration,
    ) -> Self {
        Self {
            profiles: ProfileResolver::new(profile_store.clone(), policy),
            profile_store,
            contests,
            submissions,
            identity,
            metadata,
            metadata_timeout,
        }
    }
}

/// Builds the full route table. Middleware is applied separately with
/// [`middleware::with_middleware`] so tests can drive the bare router.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/videos/validate", post(handlers::validate_url))
        .route("/me", get(handlers::me))
        .route("/contests", get(handlers::list_contests).post(handlers::create_contest))
        .route("/contests/{id}", get(handlers::get_contest))
        .route("/contests/{id}/status", post(handlers::set_contest_status))
        .route("/contests/{id}/tags", post(handlers::add_tag))
        .route(
            "/contests/{id}/submissions",
            get(handlers::list_public_submissions).post(handlers::submit_video),
        )
        .route("/moderation/contests/{id}/submissions", get(handlers::list_for_review))
        .route("/submissions/{id}/review", post(handlers::review_submission))
        .route("/admin/profiles", get(handlers::list_profiles))
        .route("/admin/profiles/{id}/role", post(handlers::set_role))
        .route("/admin/profiles/{id}/ban", post(handlers::set_ban));

    Router::new()
        .route("/health", get(handlers::health))
        .nest("/api", api)
        .with_state(state)
}
