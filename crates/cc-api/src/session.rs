//! # Session resolution
//!
//! Turns a bearer token into a [`Caller`]: identity from the provider,
//! profile from the store (created on first login). Profile lookups go
//! through [`resolve_with_timeout`]; a lookup that fails or times out leaves
//! the caller without a profile and the access gate denies.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use cc_core::{
    AppError, GateEvaluation, GateState, Identity, Profile, ProfileAccess, ProfileStore, RoleSet,
};
use tracing::{info, warn};

use crate::error::ApiError;
use crate::AppState;

/// Timeout and retry policy for collaborator lookups. There is no cache
/// fallback: once retries are exhausted the result is `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvePolicy {
    /// Per attempt
    pub timeout: Duration,
    /// Extra attempts after the first
    pub retries: u32,
    pub retry_delay: Duration,
}

impl Default for ResolvePolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(3),
            retries: 1,
            retry_delay: Duration::from_millis(200),
        }
    }
}

/// Runs `op` under `policy`, returning `None` once every attempt has failed
/// or timed out.
pub async fn resolve_with_timeout<T, F, Fut>(policy: &ResolvePolicy, what: &'static str, mut op: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let attempts = policy.retries.saturating_add(1);
    for attempt in 1..=attempts {
        match tokio::time::timeout(policy.timeout, op()).await {
            Ok(Ok(value)) => return Some(value),
            Ok(Err(e)) => warn!(what, attempt, error = %e, "lookup failed"),
            Err(_) => warn!(what, attempt, timeout_ms = policy.timeout.as_millis() as u64, "lookup timed out"),
        }
        if attempt < attempts {
            tokio::time::sleep(policy.retry_delay).await;
        }
    }
    None
}

/// Profile lookup with first-login creation, wrapped in a [`ResolvePolicy`].
#[derive(Clone)]
pub struct ProfileResolver {
    store: Arc<dyn ProfileStore>,
    policy: ResolvePolicy,
}

impl ProfileResolver {
    pub fn new(store: Arc<dyn ProfileStore>, policy: ResolvePolicy) -> Self {
        Self { store, policy }
    }

    pub async fn resolve(&self, identity: &Identity) -> Option<Profile> {
        resolve_with_timeout(&self.policy, "profile", || get_or_create(self.store.as_ref(), identity)).await
    }
}

async fn get_or_create(store: &dyn ProfileStore, identity: &Identity) -> anyhow::Result<Profile> {
    if let Some(profile) = store.get_profile(identity.user_id).await? {
        return Ok(profile);
    }
    info!(user_id = %identity.user_id, username = %identity.username, "creating profile on first login");
    store
        .create_profile(Profile::first_login(
            identity.user_id,
            identity.username.clone(),
            identity.avatar_url.clone(),
        ))
        .await
}

/// The authenticated caller of a request. `profile` is `None` when it could
/// not be resolved in time.
#[derive(Debug, Clone)]
pub struct Caller {
    pub identity: Identity,
    pub profile: Option<Profile>,
}

impl Caller {
    /// Runs the access gate for this caller.
    pub fn require(&self, required: RoleSet) -> Result<&Profile, ApiError> {
        let mut gate = GateEvaluation::new(required);
        gate.begin();
        match gate.resolve(self.profile.as_ref().map(ProfileAccess::from)) {
            GateState::Allowed => self.profile.as_ref().ok_or(ApiError(AppError::Forbidden)),
            state => {
                info!(user_id = %self.identity.user_id, ?state, required = ?gate.required(), "access denied");
                Err(ApiError(AppError::Forbidden))
            }
        }
    }
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

impl FromRequestParts<AppState> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)
            .ok_or_else(|| AppError::Unauthorized("missing bearer token".into()))?;
        let identity = state.identity.authenticate(token)?;
        let profile = state.profiles.resolve(&identity).await;
        Ok(Caller { identity, profile })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::http::HeaderValue;
    use cc_core::{MockProfileStore, Role};
    use uuid::Uuid;

    fn policy(timeout_ms: u64, retries: u32) -> ResolvePolicy {
        ResolvePolicy {
            timeout: Duration::from_millis(timeout_ms),
            retries,
            retry_delay: Duration::from_millis(1),
        }
    }

    fn identity() -> Identity {
        Identity {
            user_id: Uuid::new_v4(),
            username: "kit".into(),
            avatar_url: None,
        }
    }

    /// Never answers within any reasonable timeout.
    struct StalledStore;

    #[async_trait]
    impl ProfileStore for StalledStore {
        async fn get_profile(&self, _id: Uuid) -> anyhow::Result<Option<Profile>> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(None)
        }
        async fn create_profile(&self, profile: Profile) -> anyhow::Result<Profile> {
            Ok(profile)
        }
        async fn list_profiles(&self) -> anyhow::Result<Vec<Profile>> {
            Ok(vec![])
        }
        async fn set_role(&self, _id: Uuid, _role: Role) -> anyhow::Result<Option<Profile>> {
            Ok(None)
        }
        async fn set_banned(&self, _id: Uuid, _banned: bool) -> anyhow::Result<Option<Profile>> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_existing_profile_is_returned() {
        let who = identity();
        let mut existing = Profile::first_login(who.user_id, "kit".into(), None);
        existing.role = Role::Moderator;
        let expected = existing.clone();

        let mut store = MockProfileStore::new();
        store
            .expect_get_profile()
            .times(1)
            .returning(move |_| Ok(Some(existing.clone())));
        store.expect_create_profile().never();

        let resolver = ProfileResolver::new(Arc::new(store), policy(500, 0));
        assert_eq!(resolver.resolve(&who).await, Some(expected));
    }

    #[tokio::test]
    async fn test_first_login_creates_viewer_profile() {
        let who = identity();
        let mut store = MockProfileStore::new();
        store.expect_get_profile().returning(|_| Ok(None));
        store
            .expect_create_profile()
            .times(1)
            .returning(|profile| Ok(profile));

        let resolver = ProfileResolver::new(Arc::new(store), policy(500, 0));
        let profile = resolver.resolve(&who).await.unwrap();
        assert_eq!(profile.id, who.user_id);
        assert_eq!(profile.role, Role::Viewer);
    }

    #[tokio::test]
    async fn test_failure_is_retried() {
        let who = identity();
        let existing = Profile::first_login(who.user_id, "kit".into(), None);
        let mut calls = 0;
        let mut store = MockProfileStore::new();
        store.expect_get_profile().times(2).returning(move |_| {
            calls += 1;
            if calls == 1 {
                Err(anyhow::anyhow!("connection reset"))
            } else {
                Ok(Some(existing.clone()))
            }
        });

        let resolver = ProfileResolver::new(Arc::new(store), policy(500, 1));
        assert!(resolver.resolve(&who).await.is_some());
    }

    #[tokio::test]
    async fn test_persistent_failure_resolves_to_none() {
        let mut store = MockProfileStore::new();
        store
            .expect_get_profile()
            .times(3)
            .returning(|_| Err(anyhow::anyhow!("db down")));

        let resolver = ProfileResolver::new(Arc::new(store), policy(500, 2));
        assert_eq!(resolver.resolve(&identity()).await, None);
    }

    #[tokio::test]
    async fn test_timeout_resolves_to_none() {
        let resolver = ProfileResolver::new(Arc::new(StalledStore), policy(20, 1));
        assert_eq!(resolver.resolve(&identity()).await, None);
    }

    #[test]
    fn test_unresolved_caller_is_denied() {
        let caller = Caller { identity: identity(), profile: None };
        let err = caller.require(RoleSet::all()).unwrap_err();
        assert!(matches!(err.0, AppError::Forbidden));
    }

    #[test]
    fn test_gate_applies_to_resolved_caller() {
        let who = identity();
        let mut profile = Profile::first_login(who.user_id, "kit".into(), None);
        profile.role = Role::Admin;
        let caller = Caller { identity: who, profile: Some(profile.clone()) };
        assert!(caller.require(RoleSet::at_least(Role::Moderator)).is_ok());
        assert!(caller.require(RoleSet::only(Role::Streamer)).is_err());

        profile.is_banned = true;
        let banned = Caller { identity: caller.identity.clone(), profile: Some(profile) };
        assert!(banned.require(RoleSet::all()).is_err());
    }

    #[test]
    fn test_bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def.ghi"));
        assert_eq!(bearer_token(&headers), Some("abc.def.ghi"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("bearer   tok"));
        assert_eq!(bearer_token(&headers), Some("tok"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic dXNlcjpwYXNz"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);
    }
}
