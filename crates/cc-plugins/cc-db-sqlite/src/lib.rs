//! # cc-db-sqlite Implementation
//!
//! This module implements the data mapping between the SQLite relational model
//! and the `cc-core` domain models. One `SqliteStore` backs all three
//! repository ports.

use std::str::FromStr;

use async_trait::async_trait;
use cc_core::models::{
    Contest, ContestStatus, ContestTag, Platform, Profile, Role, Submission, SubmissionStatus,
};
use cc_core::error::AppError;
use cc_core::traits::{ContestRepo, ProfileStore, SubmissionRepo};
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tracing::debug;
use uuid::Uuid;

/// Idempotent schema, applied on every connect.
const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS profiles (
        id          BLOB PRIMARY KEY NOT NULL,
        username    TEXT NOT NULL,
        avatar_url  TEXT,
        role        TEXT NOT NULL DEFAULT 'viewer',
        is_banned   INTEGER NOT NULL DEFAULT 0,
        created_at  TEXT NOT NULL,
        updated_at  TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS contests (
        id                  BLOB PRIMARY KEY NOT NULL,
        title               TEXT NOT NULL,
        description         TEXT,
        created_by          BLOB NOT NULL REFERENCES profiles(id),
        status              TEXT NOT NULL DEFAULT 'active',
        submission_deadline TEXT,
        created_at          TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS contest_tags (
        id          BLOB PRIMARY KEY NOT NULL,
        contest_id  BLOB NOT NULL REFERENCES contests(id) ON DELETE CASCADE,
        name        TEXT NOT NULL,
        UNIQUE (contest_id, name COLLATE NOCASE)
    )",
    "CREATE TABLE IF NOT EXISTS submissions (
        id            BLOB PRIMARY KEY NOT NULL,
        contest_id    BLOB NOT NULL REFERENCES contests(id) ON DELETE CASCADE,
        submitted_by  BLOB NOT NULL REFERENCES profiles(id),
        video_url     TEXT NOT NULL,
        platform      TEXT NOT NULL,
        video_id      TEXT NOT NULL,
        title         TEXT NOT NULL,
        thumbnail_url TEXT,
        status        TEXT NOT NULL DEFAULT 'pending',
        reviewed_by   BLOB REFERENCES profiles(id),
        created_at    TEXT NOT NULL,
        updated_at    TEXT NOT NULL,
        UNIQUE (contest_id, platform, video_id)
    )",
    "CREATE INDEX IF NOT EXISTS submissions_by_contest_status
        ON submissions (contest_id, status)",
];

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating if needed) the database at `url` and applies the schema.
    pub async fn connect(url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        Self::from_pool(pool).await
    }

    /// A private in-memory database. Pinned to a single connection, since
    /// every SQLite memory connection is its own database.
    pub async fn in_memory() -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> anyhow::Result<Self> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }
        debug!("sqlite schema ready");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

const TAG_EXISTS: &str = "this tag already exists on the contest";
const VIDEO_ALREADY_SUBMITTED: &str = "this video has already been submitted to the contest";

/// Unique-constraint failures become `AppError::Conflict`; anything else stays a
/// plain database error.
fn conflict_on_unique(err: sqlx::Error, message: &str) -> anyhow::Error {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            debug!(error = %db, "unique constraint rejected insert");
            AppError::Conflict(message.to_string()).into()
        }
        _ => err.into(),
    }
}

fn profile_from_row(row: &SqliteRow) -> anyhow::Result<Profile> {
    Ok(Profile {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        avatar_url: row.try_get("avatar_url")?,
        role: Role::from_str(row.try_get("role")?)?,
        is_banned: row.try_get("is_banned")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn contest_from_row(row: &SqliteRow) -> anyhow::Result<Contest> {
    Ok(Contest {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        created_by: row.try_get("created_by")?,
        status: ContestStatus::from_str(row.try_get("status")?)?,
        submission_deadline: row.try_get("submission_deadline")?,
        created_at: row.try_get("created_at")?,
    })
}

fn submission_from_row(row: &SqliteRow) -> anyhow::Result<Submission> {
    Ok(Submission {
        id: row.try_get("id")?,
        contest_id: row.try_get("contest_id")?,
        submitted_by: row.try_get("submitted_by")?,
        video_url: row.try_get("video_url")?,
        platform: Platform::from_str(row.try_get("platform")?)?,
        video_id: row.try_get("video_id")?,
        title: row.try_get("title")?,
        thumbnail_url: row.try_get("thumbnail_url")?,
        status: SubmissionStatus::from_str(row.try_get("status")?)?,
        reviewed_by: row.try_get("reviewed_by")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl ProfileStore for SqliteStore {
    async fn get_profile(&self, id: Uuid) -> anyhow::Result<Option<Profile>> {
        sqlx::query("SELECT * FROM profiles WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(profile_from_row)
            .transpose()
    }

    async fn create_profile(&self, profile: Profile) -> anyhow::Result<Profile> {
        sqlx::query(
            "INSERT INTO profiles (id, username, avatar_url, role, is_banned, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(profile.id)
        .bind(&profile.username)
        .bind(&profile.avatar_url)
        .bind(profile.role.as_str())
        .bind(profile.is_banned)
        .bind(profile.created_at)
        .bind(profile.updated_at)
        .execute(&self.pool)
        .await?;

        self.get_profile(profile.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("profile {} vanished after insert", profile.id))
    }

    async fn list_profiles(&self) -> anyhow::Result<Vec<Profile>> {
        sqlx::query("SELECT * FROM profiles ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(profile_from_row)
            .collect()
    }

    async fn set_role(&self, id: Uuid, role: Role) -> anyhow::Result<Option<Profile>> {
        let result = sqlx::query("UPDATE profiles SET role = ?, updated_at = ? WHERE id = ?")
            .bind(role.as_str())
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_profile(id).await
    }

    async fn set_banned(&self, id: Uuid, banned: bool) -> anyhow::Result<Option<Profile>> {
        let result = sqlx::query("UPDATE profiles SET is_banned = ?, updated_at = ? WHERE id = ?")
            .bind(banned)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_profile(id).await
    }
}

#[async_trait]
impl ContestRepo for SqliteStore {
    async fn create_contest(&self, contest: Contest, tags: Vec<ContestTag>) -> anyhow::Result<()> {
        // One transaction, so a failing tag never leaves a half-tagged contest behind.
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO contests (id, title, description, created_by, status, submission_deadline, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(contest.id)
        .bind(contest.title)
        .bind(contest.description)
        .bind(contest.created_by)
        .bind(contest.status.as_str())
        .bind(contest.submission_deadline)
        .bind(contest.created_at)
        .execute(&mut *tx)
        .await?;

        for tag in tags {
            sqlx::query("INSERT INTO contest_tags (id, contest_id, name) VALUES (?, ?, ?)")
                .bind(tag.id)
                .bind(tag.contest_id)
                .bind(tag.name)
                .execute(&mut *tx)
                .await
                .map_err(|e| conflict_on_unique(e, TAG_EXISTS))?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_contest(&self, id: Uuid) -> anyhow::Result<Option<Contest>> {
        sqlx::query("SELECT * FROM contests WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(contest_from_row)
            .transpose()
    }

    async fn list_active_contests(&self) -> anyhow::Result<Vec<Contest>> {
        sqlx::query("SELECT * FROM contests WHERE status = 'active' ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(contest_from_row)
            .collect()
    }

    async fn set_contest_status(&self, id: Uuid, status: ContestStatus) -> anyhow::Result<Option<Contest>> {
        let result = sqlx::query("UPDATE contests SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_contest(id).await
    }

    async fn add_tag(&self, tag: ContestTag) -> anyhow::Result<()> {
        sqlx::query("INSERT INTO contest_tags (id, contest_id, name) VALUES (?, ?, ?)")
            .bind(tag.id)
            .bind(tag.contest_id)
            .bind(tag.name)
            .execute(&self.pool)
            .await
            .map_err(|e| conflict_on_unique(e, TAG_EXISTS))?;
        Ok(())
    }

    async fn list_tags(&self, contest_id: Uuid) -> anyhow::Result<Vec<ContestTag>> {
        let rows = sqlx::query("SELECT id, contest_id, name FROM contest_tags WHERE contest_id = ? ORDER BY name ASC")
            .bind(contest_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| -> anyhow::Result<ContestTag> {
                Ok(ContestTag {
                    id: row.try_get("id")?,
                    contest_id: row.try_get("contest_id")?,
                    name: row.try_get("name")?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl SubmissionRepo for SqliteStore {
    async fn create_submission(&self, submission: Submission) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO submissions (id, contest_id, submitted_by, video_url, platform, video_id, title,
                                      thumbnail_url, status, reviewed_by, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(submission.id)
        .bind(submission.contest_id)
        .bind(submission.submitted_by)
        .bind(submission.video_url)
        .bind(submission.platform.as_str())
        .bind(submission.video_id)
        .bind(submission.title)
        .bind(submission.thumbnail_url)
        .bind(submission.status.as_str())
        .bind(submission.reviewed_by)
        .bind(submission.created_at)
        .bind(submission.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, VIDEO_ALREADY_SUBMITTED))?;
        Ok(())
    }

    async fn get_submission(&self, id: Uuid) -> anyhow::Result<Option<Submission>> {
        sqlx::query("SELECT * FROM submissions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(submission_from_row)
            .transpose()
    }

    async fn find_by_video(
        &self,
        contest_id: Uuid,
        platform: Platform,
        video_id: &str,
    ) -> anyhow::Result<Option<Submission>> {
        sqlx::query("SELECT * FROM submissions WHERE contest_id = ? AND platform = ? AND video_id = ?")
            .bind(contest_id)
            .bind(platform.as_str())
            .bind(video_id)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(submission_from_row)
            .transpose()
    }

    async fn list_submissions(
        &self,
        contest_id: Uuid,
        status: Option<SubmissionStatus>,
    ) -> anyhow::Result<Vec<Submission>> {
        let rows = match status {
            Some(status) => {
                sqlx::query(
                    "SELECT * FROM submissions WHERE contest_id = ? AND status = ?
                     ORDER BY created_at DESC, rowid DESC",
                )
                .bind(contest_id)
                .bind(status.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query("SELECT * FROM submissions WHERE contest_id = ? ORDER BY created_at DESC, rowid DESC")
                    .bind(contest_id)
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.iter().map(submission_from_row).collect()
    }

    async fn set_status(
        &self,
        id: Uuid,
        status: SubmissionStatus,
        reviewed_by: Uuid,
    ) -> anyhow::Result<Option<Submission>> {
        let result = sqlx::query("UPDATE submissions SET status = ?, reviewed_by = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(reviewed_by)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_submission(id).await
    }
}
