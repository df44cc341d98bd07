//! # Core Traits (Ports)
//!
//! Any plugin must implement these traits to be used by the binary.
//! Instances are constructed once and injected; nothing here is global.

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{
    Contest, ContestStatus, ContestTag, Platform, Profile, Role, Submission, SubmissionStatus,
    VideoMetadata, VideoReference,
};

/// Persistence contract for the `profiles` table.
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get_profile(&self, id: Uuid) -> anyhow::Result<Option<Profile>>;
    /// Inserts the profile unless one with the same id exists; returns the stored row.
    async fn create_profile(&self, profile: Profile) -> anyhow::Result<Profile>;
    async fn list_profiles(&self) -> anyhow::Result<Vec<Profile>>;
    /// Returns `None` when no profile has this id.
    async fn set_role(&self, id: Uuid, role: Role) -> anyhow::Result<Option<Profile>>;
    /// Returns `None` when no profile has this id.
    async fn set_banned(&self, id: Uuid, banned: bool) -> anyhow::Result<Option<Profile>>;
}

/// Persistence contract for `contests` and `contest_tags`.
///
/// A duplicate tag name (case-insensitive) fails with an error that downcasts
/// to [`AppError::Conflict`](crate::AppError::Conflict).
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait ContestRepo: Send + Sync {
    /// Stores the contest and its tags together, or neither.
    async fn create_contest(&self, contest: Contest, tags: Vec<ContestTag>) -> anyhow::Result<()>;
    async fn get_contest(&self, id: Uuid) -> anyhow::Result<Option<Contest>>;
    async fn list_active_contests(&self) -> anyhow::Result<Vec<Contest>>;
    async fn set_contest_status(&self, id: Uuid, status: ContestStatus) -> anyhow::Result<Option<Contest>>;
    async fn add_tag(&self, tag: ContestTag) -> anyhow::Result<()>;
    async fn list_tags(&self, contest_id: Uuid) -> anyhow::Result<Vec<ContestTag>>;
}

/// Persistence contract for the `submissions` table.
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait SubmissionRepo: Send + Sync {
    /// A second submission of the same (platform, video_id) to one contest
    /// fails with an error that downcasts to
    /// [`AppError::Conflict`](crate::AppError::Conflict).
    async fn create_submission(&self, submission: Submission) -> anyhow::Result<()>;
    async fn get_submission(&self, id: Uuid) -> anyhow::Result<Option<Submission>>;
    async fn find_by_video(
        &self,
        contest_id: Uuid,
        platform: Platform,
        video_id: &str,
    ) -> anyhow::Result<Option<Submission>>;
    /// Newest first. `None` lists every status.
    async fn list_submissions(
        &self,
        contest_id: Uuid,
        status: Option<SubmissionStatus>,
    ) -> anyhow::Result<Vec<Submission>>;
    async fn set_status(
        &self,
        id: Uuid,
        status: SubmissionStatus,
        reviewed_by: Uuid,
    ) -> anyhow::Result<Option<Submission>>;
}

/// Who the identity provider says the caller is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Uuid,
    pub username: String,
    pub avatar_url: Option<String>,
}

/// Verifies credentials issued by the OAuth provider.
#[cfg_attr(feature = "testing", mockall::automock)]
pub trait IdentityProvider: Send + Sync {
    fn authenticate(&self, bearer_token: &str) -> crate::Result<Identity>;
}

/// Best-effort display metadata for a classified link.
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait MetadataFetcher: Send + Sync {
    /// `None` on any failure; callers fall back to [`VideoMetadata::fallback`].
    async fn fetch(&self, video: &VideoReference) -> Option<VideoMetadata>;
}
