//! # cc-api Handlers
//!
//! Each handler runs the access gate first (through [`Caller::require`]),
//! then coordinates the core traits.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use cc_core::models::{
    Contest, ContestStatus, ContestTag, Platform, Profile, Role, Submission, SubmissionStatus,
    VideoMetadata,
};
use cc_core::{classify_video_url, AppError, RoleSet};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{not_found, ApiError};
use crate::session::Caller;
use crate::AppState;

type ApiResult<T> = Result<T, ApiError>;

const MAX_TITLE_LEN: usize = 120;
const MAX_TAG_LEN: usize = 32;

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

// --- videos -----------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct UrlBody {
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct ValidateResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,
}

/// Live link check for the submit form. Never fails; an unusable link is `valid: false`.
pub async fn validate_url(Json(body): Json<UrlBody>) -> Json<ValidateResponse> {
    let video = classify_video_url(&body.url);
    Json(ValidateResponse {
        valid: video.is_some(),
        platform: video.as_ref().map(|v| v.platform()),
        video_id: video.map(|v| v.video_id().to_string()),
    })
}

// --- profile ----------------------------------------------------------------

/// The caller's own profile. Banned users can still read it.
///
/// A valid token whose profile could not be loaded in time (store down or too
/// slow) gets 403 "access denied", the same fail-closed answer every gated
/// route gives; retrying later is the remedy.
pub async fn me(caller: Caller) -> ApiResult<Json<Profile>> {
    caller.profile.map(Json).ok_or(ApiError(AppError::Forbidden))
}

// --- contests ---------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct ContestView {
    #[serde(flatten)]
    pub contest: Contest,
    pub tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct NewContest {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub submission_deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusBody<S> {
    pub status: S,
}

#[derive(Debug, Deserialize)]
pub struct TagBody {
    pub name: String,
}

async fn contest_view(state: &AppState, contest: Contest) -> ApiResult<ContestView> {
    let tags = state
        .contests
        .list_tags(contest.id)
        .await?
        .into_iter()
        .map(|t| t.name)
        .collect();
    Ok(ContestView { contest, tags })
}

async fn load_contest(state: &AppState, id: Uuid) -> ApiResult<Contest> {
    state
        .contests
        .get_contest(id)
        .await?
        .ok_or_else(|| not_found("contest", id))
}

/// Streamers manage their own contests; admins manage any.
fn ensure_manages(profile: &Profile, contest: &Contest) -> ApiResult<()> {
    if profile.role == Role::Admin || contest.created_by == profile.id {
        Ok(())
    } else {
        Err(ApiError(AppError::Forbidden))
    }
}

fn clean_tag(raw: &str) -> ApiResult<String> {
    let name = raw.trim();
    if name.is_empty() || name.chars().count() > MAX_TAG_LEN {
        return Err(ApiError(AppError::ValidationError(format!(
            "tag must be 1 to {MAX_TAG_LEN} characters"
        ))));
    }
    Ok(name.to_string())
}

pub async fn list_contests(State(state): State<AppState>) -> ApiResult<Json<Vec<ContestView>>> {
    let contests = state.contests.list_active_contests().await?;
    let mut views = Vec::with_capacity(contests.len());
    for contest in contests {
        views.push(contest_view(&state, contest).await?);
    }
    Ok(Json(views))
}

pub async fn get_contest(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ContestView>> {
    let contest = load_contest(&state, id).await?;
    Ok(Json(contest_view(&state, contest).await?))
}

pub async fn create_contest(
    State(state): State<AppState>,
    caller: Caller,
    Json(body): Json<NewContest>,
) -> ApiResult<(StatusCode, Json<ContestView>)> {
    let profile = caller.require(RoleSet::at_least(Role::Streamer))?;

    let title = body.title.trim();
    if title.is_empty() || title.chars().count() > MAX_TITLE_LEN {
        return Err(ApiError(AppError::ValidationError(format!(
            "title must be 1 to {MAX_TITLE_LEN} characters"
        ))));
    }
    let now = Utc::now();
    if body.submission_deadline.is_some_and(|deadline| deadline <= now) {
        return Err(ApiError(AppError::ValidationError(
            "submission deadline must be in the future".into(),
        )));
    }
    let mut tags: Vec<String> = Vec::new();
    for raw in &body.tags {
        let name = clean_tag(raw)?;
        if !tags.iter().any(|t| t.eq_ignore_ascii_case(&name)) {
            tags.push(name);
        }
    }

    let contest = Contest {
        id: Uuid::new_v4(),
        title: title.to_string(),
        description: body.description.map(|d| d.trim().to_string()).filter(|d| !d.is_empty()),
        created_by: profile.id,
        status: ContestStatus::Active,
        submission_deadline: body.submission_deadline,
        created_at: now,
    };
    let rows = tags
        .iter()
        .map(|name| ContestTag { id: Uuid::new_v4(), contest_id: contest.id, name: name.clone() })
        .collect();
    state.contests.create_contest(contest.clone(), rows).await?;
    info!(contest_id = %contest.id, created_by = %profile.id, "contest created");

    Ok((StatusCode::CREATED, Json(ContestView { contest, tags })))
}

pub async fn set_contest_status(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Json(body): Json<StatusBody<ContestStatus>>,
) -> ApiResult<Json<Contest>> {
    let profile = caller.require(RoleSet::at_least(Role::Streamer))?;
    let contest = load_contest(&state, id).await?;
    ensure_manages(profile, &contest)?;

    let updated = state
        .contests
        .set_contest_status(id, body.status)
        .await?
        .ok_or_else(|| not_found("contest", id))?;
    info!(contest_id = %id, status = body.status.as_str(), by = %profile.id, "contest status changed");
    Ok(Json(updated))
}

pub async fn add_tag(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Json(body): Json<TagBody>,
) -> ApiResult<(StatusCode, Json<ContestTag>)> {
    let profile = caller.require(RoleSet::at_least(Role::Streamer))?;
    let contest = load_contest(&state, id).await?;
    ensure_manages(profile, &contest)?;

    let name = clean_tag(&body.name)?;
    let existing = state.contests.list_tags(id).await?;
    if existing.iter().any(|t| t.name.eq_ignore_ascii_case(&name)) {
        return Err(ApiError(AppError::Conflict(format!("tag '{name}' already exists"))));
    }
    let tag = ContestTag { id: Uuid::new_v4(), contest_id: id, name };
    state.contests.add_tag(tag.clone()).await?;
    Ok((StatusCode::CREATED, Json(tag)))
}

// --- submissions ------------------------------------------------------------

/// Submits a clip to a contest. Order: gate, link, contest state, duplicate,
/// metadata (best-effort), insert.
pub async fn submit_video(
    State(state): State<AppState>,
    caller: Caller,
    Path(contest_id): Path<Uuid>,
    Json(body): Json<UrlBody>,
) -> ApiResult<(StatusCode, Json<Submission>)> {
    let profile = caller.require(RoleSet::all())?;
    let video = classify_video_url(&body.url).ok_or(ApiError(AppError::InvalidVideoUrl))?;

    let contest = load_contest(&state, contest_id).await?;
    if !contest.accepts_submissions(Utc::now()) {
        return Err(ApiError(AppError::ValidationError(
            "this contest is not accepting submissions".into(),
        )));
    }
    if state
        .submissions
        .find_by_video(contest_id, video.platform(), video.video_id())
        .await?
        .is_some()
    {
        return Err(ApiError(AppError::Conflict(
            "this video has already been submitted to the contest".into(),
        )));
    }

    let metadata = match tokio::time::timeout(state.metadata_timeout, state.metadata.fetch(&video)).await {
        Ok(Some(metadata)) => metadata,
        Ok(None) => VideoMetadata::fallback(&video),
        Err(_) => {
            warn!(platform = %video.platform(), video_id = video.video_id(), "metadata lookup timed out");
            VideoMetadata::fallback(&video)
        }
    };

    let submission = Submission::pending(contest_id, profile.id, body.url.trim().to_string(), &video, metadata);
    state.submissions.create_submission(submission.clone()).await?;
    info!(
        submission_id = %submission.id,
        contest_id = %contest_id,
        platform = %video.platform(),
        "submission received"
    );
    Ok((StatusCode::CREATED, Json(submission)))
}

/// Approved clips and winners, newest first.
pub async fn list_public_submissions(
    State(state): State<AppState>,
    Path(contest_id): Path<Uuid>,
) -> ApiResult<Json<Vec<Submission>>> {
    load_contest(&state, contest_id).await?;
    let visible = state
        .submissions
        .list_submissions(contest_id, None)
        .await?
        .into_iter()
        .filter(|s| s.status.is_public())
        .collect();
    Ok(Json(visible))
}

#[derive(Debug, Deserialize)]
pub struct ReviewQuery {
    #[serde(default)]
    pub status: Option<String>,
}

pub async fn list_for_review(
    State(state): State<AppState>,
    caller: Caller,
    Path(contest_id): Path<Uuid>,
    Query(query): Query<ReviewQuery>,
) -> ApiResult<Json<Vec<Submission>>> {
    caller.require(RoleSet::at_least(Role::Moderator))?;
    let status = query
        .status
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(str::parse::<SubmissionStatus>)
        .transpose()?;

    load_contest(&state, contest_id).await?;
    Ok(Json(state.submissions.list_submissions(contest_id, status).await?))
}

pub async fn review_submission(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Json(body): Json<StatusBody<SubmissionStatus>>,
) -> ApiResult<Json<Submission>> {
    let profile = caller.require(RoleSet::at_least(Role::Moderator))?;
    if !body.status.is_review_outcome() {
        return Err(ApiError(AppError::ValidationError(
            "review must approve, deny or pick a winner".into(),
        )));
    }

    let updated = state
        .submissions
        .set_status(id, body.status, profile.id)
        .await?
        .ok_or_else(|| not_found("submission", id))?;
    info!(submission_id = %id, status = body.status.as_str(), reviewer = %profile.id, "submission reviewed");
    Ok(Json(updated))
}

// --- admin ------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct RoleBody {
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct BanBody {
    pub banned: bool,
}

pub async fn list_profiles(State(state): State<AppState>, caller: Caller) -> ApiResult<Json<Vec<Profile>>> {
    caller.require(RoleSet::only(Role::Admin))?;
    Ok(Json(state.profile_store.list_profiles().await?))
}

pub async fn set_role(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Json(body): Json<RoleBody>,
) -> ApiResult<Json<Profile>> {
    let admin = caller.require(RoleSet::only(Role::Admin))?;
    if admin.id == id {
        return Err(ApiError(AppError::ValidationError("admins cannot change their own role".into())));
    }
    let updated = state
        .profile_store
        .set_role(id, body.role)
        .await?
        .ok_or_else(|| not_found("profile", id))?;
    info!(profile_id = %id, role = %body.role, by = %admin.id, "role changed");
    Ok(Json(updated))
}

pub async fn set_ban(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Json(body): Json<BanBody>,
) -> ApiResult<Json<Profile>> {
    let admin = caller.require(RoleSet::only(Role::Admin))?;
    if admin.id == id {
        return Err(ApiError(AppError::ValidationError("admins cannot ban themselves".into())));
    }
    let updated = state
        .profile_store
        .set_banned(id, body.banned)
        .await?
        .ok_or_else(|| not_found("profile", id))?;
    info!(profile_id = %id, banned = body.banned, by = %admin.id, "ban status changed");
    Ok(Json(updated))
}
