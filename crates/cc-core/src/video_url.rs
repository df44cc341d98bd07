//! # Video URL classification
//!
//! Maps a user-supplied link to a [`VideoReference`]. Hostnames are checked
//! against a fixed allowlist before any path or query structure is trusted,
//! so `https://evil.com/video/123` or `https://youtube.com.evil.net/watch?v=x`
//! never classify.

use tracing::debug;
use url::Url;

use crate::models::{Platform, VideoReference};

const YOUTUBE_HOSTS: &[&str] = &["youtube.com", "www.youtube.com", "m.youtube.com", "youtu.be"];
const YOUTUBE_SHORT_HOST: &str = "youtu.be";
const TIKTOK_HOSTS: &[&str] = &["tiktok.com", "www.tiktok.com", "vm.tiktok.com"];
const TWITCH_CLIP_HOST: &str = "clips.twitch.tv";
const TWITCH_HOSTS: &[&str] = &["twitch.tv", "www.twitch.tv", "m.twitch.tv"];

/// Why a link did not classify. Only ever logged; callers see `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlRejection {
    /// Not parseable, or not http(s).
    Malformed,
    /// Host on no allowlist.
    UnrecognizedSource,
    /// Allowlisted host but no usable id.
    IncompleteMatch,
}

/// Classifies `raw`, or `None` if it is not a supported video link.
pub fn classify_video_url(raw: &str) -> Option<VideoReference> {
    match classify(raw) {
        Ok(video) => Some(video),
        Err(reason) => {
            debug!(?reason, "rejected video url");
            None
        }
    }
}

/// `true` exactly when [`classify_video_url`] returns a reference.
pub fn is_url_valid(raw: &str) -> bool {
    classify_video_url(raw).is_some()
}

/// Same as [`classify_video_url`] but keeps the rejection reason.
pub fn classify(raw: &str) -> Result<VideoReference, UrlRejection> {
    let url = Url::parse(raw.trim()).map_err(|_| UrlRejection::Malformed)?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(UrlRejection::Malformed);
    }
    let host = url
        .host_str()
        .ok_or(UrlRejection::Malformed)?
        .to_ascii_lowercase();

    let found = if host_matches(&host, YOUTUBE_HOSTS) {
        youtube_id(&url, &host).and_then(|id| VideoReference::new(Platform::YouTube, id))
    } else if host_matches(&host, TIKTOK_HOSTS) {
        tiktok_id(&url).and_then(|id| VideoReference::new(Platform::TikTok, id))
    } else if host_matches(&host, &[TWITCH_CLIP_HOST]) || host_matches(&host, TWITCH_HOSTS) {
        twitch_clip_slug(&url, &host).and_then(|slug| VideoReference::new(Platform::Twitch, slug))
    } else {
        return Err(UrlRejection::UnrecognizedSource);
    };

    found.ok_or(UrlRejection::IncompleteMatch)
}

/// Exact match or a subdomain on a dot boundary.
fn host_matches(host: &str, allowed: &[&str]) -> bool {
    allowed.iter().any(|domain| {
        host == *domain
            || host
                .strip_suffix(domain)
                .is_some_and(|prefix| prefix.ends_with('.'))
    })
}

fn path_segments(url: &Url) -> Vec<&str> {
    url.path_segments()
        .map(|segments| segments.filter(|s| !s.is_empty()).collect())
        .unwrap_or_default()
}

/// Query values arrive percent-decoded, path segments do not. Either way the
/// id must be in the slug alphabet, so an escaped short link never yields an
/// id that differs from its `watch?v=` form.
fn youtube_id(url: &Url, host: &str) -> Option<String> {
    let id = if host_matches(host, &[YOUTUBE_SHORT_HOST]) {
        path_segments(url).first().map(|s| s.to_string())
    } else {
        url.query_pairs()
            .find(|(key, _)| key == "v")
            .map(|(_, value)| value.into_owned())
    }?;
    is_slug(&id).then_some(id)
}

fn tiktok_id(url: &Url) -> Option<String> {
    let segments = path_segments(url);
    segments
        .windows(2)
        .find(|pair| pair[0] == "video" && is_digits(pair[1]))
        .map(|pair| pair[1].to_string())
}

fn twitch_clip_slug(url: &Url, host: &str) -> Option<String> {
    let segments = path_segments(url);
    let slug = if host_matches(host, &[TWITCH_CLIP_HOST]) {
        // clips.twitch.tv/<slug>
        segments.first().copied()
    } else {
        // twitch.tv/<channel>/clip/<slug>
        match segments.as_slice() {
            [_channel, "clip", slug, ..] => Some(*slug),
            _ => None,
        }
    }?;
    is_slug(slug).then(|| slug.to_string())
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn is_slug(s: &str) -> bool {
    !s.is_empty()
        && s.bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}
