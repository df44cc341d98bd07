//! # AppError
//!
//! Centralized error handling for the clip-contest crates.
//! Maps domain-specific failures to actionable error types.

use thiserror::Error;

/// The primary error type for all cc-core operations.
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found (e.g., Contest, Submission, Profile)
    #[error("{0} not found with ID {1}")]
    NotFound(String, String),

    /// Validation failure (e.g., empty title, unknown role)
    #[error("validation error: {0}")]
    ValidationError(String),

    /// A submitted link did not classify. Carries no reason on purpose.
    #[error("please enter a valid YouTube, TikTok or Twitch Clip link")]
    InvalidVideoUrl,

    /// Missing or unverifiable credentials
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Identity known (or unresolved) but the access gate denied it
    #[error("access denied")]
    Forbidden,

    /// Resource already exists (e.g., same video twice in one contest)
    #[error("conflict: {0}")]
    Conflict(String),

    /// Infrastructure failure (e.g., DB down, oEmbed timeout)
    #[error("internal service error: {0}")]
    Internal(String),
}

/// A specialized Result type for clip-contest logic.
pub type Result<T> = std::result::Result<T, AppError>;
