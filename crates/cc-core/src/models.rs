//! # Domain Models
//!
//! These structs mirror the four backing tables (`profiles`, `contests`,
//! `contest_tags`, `submissions`) plus the value types produced by the
//! URL classifier.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Caller role stored on a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Viewer,
    Moderator,
    Streamer,
    Admin,
}

impl Role {
    /// Lowest to highest privilege. `RoleSet::at_least` is derived from this
    /// table and nothing else.
    pub const HIERARCHY: [Role; 4] = [Role::Viewer, Role::Moderator, Role::Streamer, Role::Admin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Viewer => "viewer",
            Role::Moderator => "moderator",
            Role::Streamer => "streamer",
            Role::Admin => "admin",
        }
    }

    /// Position in [`Role::HIERARCHY`].
    pub fn rank(&self) -> usize {
        Role::HIERARCHY
            .iter()
            .position(|r| r == self)
            .unwrap_or_default()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = crate::AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "viewer" => Ok(Role::Viewer),
            "moderator" => Ok(Role::Moderator),
            "streamer" => Ok(Role::Streamer),
            "admin" => Ok(Role::Admin),
            other => Err(crate::AppError::ValidationError(format!("unknown role '{other}'"))),
        }
    }
}

/// Video host a submission points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    YouTube,
    TikTok,
    Twitch,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::YouTube => "youtube",
            Platform::TikTok => "tiktok",
            Platform::Twitch => "twitch",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = crate::AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "youtube" => Ok(Platform::YouTube),
            "tiktok" => Ok(Platform::TikTok),
            "twitch" => Ok(Platform::Twitch),
            other => Err(crate::AppError::ValidationError(format!("unknown platform '{other}'"))),
        }
    }
}

/// A successfully classified video link.
///
/// The id is never empty; the only constructor enforces it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct VideoReference {
    platform: Platform,
    video_id: String,
}

impl VideoReference {
    pub fn new(platform: Platform, video_id: impl Into<String>) -> Option<Self> {
        let video_id = video_id.into();
        if video_id.is_empty() {
            return None;
        }
        Some(Self { platform, video_id })
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn video_id(&self) -> &str {
        &self.video_id
    }
}

/// Display data for a submission. Best-effort; see [`VideoMetadata::fallback`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub title: String,
    pub thumbnail_url: Option<String>,
}

impl VideoMetadata {
    /// Metadata derivable without any network call.
    pub fn fallback(video: &VideoReference) -> Self {
        match video.platform() {
            Platform::YouTube => Self {
                title: "YouTube video".to_string(),
                thumbnail_url: Some(format!(
                    "https://img.youtube.com/vi/{}/hqdefault.jpg",
                    video.video_id()
                )),
            },
            Platform::TikTok => Self {
                title: "TikTok video".to_string(),
                thumbnail_url: None,
            },
            Platform::Twitch => Self {
                title: "Twitch clip".to_string(),
                thumbnail_url: None,
            },
        }
    }
}

/// A row of the `profiles` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Same id the identity provider issues for the user.
    pub id: Uuid,
    pub username: String,
    pub avatar_url: Option<String>,
    pub role: Role,
    pub is_banned: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    /// Default profile for a user logging in for the first time.
    pub fn first_login(id: Uuid, username: String, avatar_url: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            username,
            avatar_url,
            role: Role::Viewer,
            is_banned: false,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContestStatus {
    Active,
    Closed,
}

impl ContestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContestStatus::Active => "active",
            ContestStatus::Closed => "closed",
        }
    }
}

impl FromStr for ContestStatus {
    type Err = crate::AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(ContestStatus::Active),
            "closed" => Ok(ContestStatus::Closed),
            other => Err(crate::AppError::ValidationError(format!("unknown contest status '{other}'"))),
        }
    }
}

/// A row of the `contests` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contest {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub created_by: Uuid,
    pub status: ContestStatus,
    pub submission_deadline: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Contest {
    /// Whether new submissions are accepted at `now`.
    pub fn accepts_submissions(&self, now: DateTime<Utc>) -> bool {
        self.status == ContestStatus::Active
            && self.submission_deadline.map_or(true, |deadline| now < deadline)
    }
}

/// A row of the `contest_tags` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContestTag {
    pub id: Uuid,
    pub contest_id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    Pending,
    Approved,
    Denied,
    Winner,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::Pending => "pending",
            SubmissionStatus::Approved => "approved",
            SubmissionStatus::Denied => "denied",
            SubmissionStatus::Winner => "winner",
        }
    }

    /// Pending is the initial state only; a review always settles on one of the others.
    pub fn is_review_outcome(&self) -> bool {
        !matches!(self, SubmissionStatus::Pending)
    }

    /// Visible on the public contest page.
    pub fn is_public(&self) -> bool {
        matches!(self, SubmissionStatus::Approved | SubmissionStatus::Winner)
    }
}

impl FromStr for SubmissionStatus {
    type Err = crate::AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(SubmissionStatus::Pending),
            "approved" => Ok(SubmissionStatus::Approved),
            "denied" => Ok(SubmissionStatus::Denied),
            "winner" => Ok(SubmissionStatus::Winner),
            other => Err(crate::AppError::ValidationError(format!("unknown submission status '{other}'"))),
        }
    }
}

/// A row of the `submissions` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub id: Uuid,
    pub contest_id: Uuid,
    pub submitted_by: Uuid,
    /// The link exactly as the viewer entered it
    pub video_url: String,
    pub platform: Platform,
    pub video_id: String,
    pub title: String,
    pub thumbnail_url: Option<String>,
    pub status: SubmissionStatus,
    pub reviewed_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Submission {
    /// Builds a pending submission from a classified link.
    pub fn pending(
        contest_id: Uuid,
        submitted_by: Uuid,
        video_url: String,
        video: &VideoReference,
        metadata: VideoMetadata,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            contest_id,
            submitted_by,
            video_url,
            platform: video.platform(),
            video_id: video.video_id().to_string(),
            title: metadata.title,
            thumbnail_url: metadata.thumbnail_url,
            status: SubmissionStatus::Pending,
            reviewed_by: None,
            created_at: now,
            updated_at: now,
        }
    }
}
