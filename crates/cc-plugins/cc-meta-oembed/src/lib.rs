//! # cc-meta-oembed
//!
//! oEmbed implementation of `MetadataFetcher`.
//! Every failure (network, status, body) is logged and turned into `None`;
//! the caller then uses `VideoMetadata::fallback`.

use std::time::Duration;

use async_trait::async_trait;
use cc_core::models::{Platform, VideoMetadata, VideoReference};
use cc_core::traits::MetadataFetcher;
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

const YOUTUBE_OEMBED: &str = "https://www.youtube.com/oembed";
const TIKTOK_OEMBED: &str = "https://www.tiktok.com/oembed";

#[derive(Debug, Deserialize)]
struct OEmbedResponse {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    thumbnail_url: Option<String>,
}

pub struct OEmbedFetcher {
    client: reqwest::Client,
}

impl OEmbedFetcher {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("clip-contest/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    async fn request(&self, endpoint: Url) -> anyhow::Result<OEmbedResponse> {
        let response = self
            .client
            .get(endpoint)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json::<OEmbedResponse>().await?)
    }
}

/// oEmbed request URL for a reference, or `None` where the platform has no
/// credential-free endpoint (Twitch).
pub fn endpoint_for(video: &VideoReference) -> Option<Url> {
    let (base, target) = match video.platform() {
        Platform::YouTube => (
            YOUTUBE_OEMBED,
            format!("https://www.youtube.com/watch?v={}", video.video_id()),
        ),
        Platform::TikTok => (
            TIKTOK_OEMBED,
            format!("https://www.tiktok.com/video/{}", video.video_id()),
        ),
        Platform::Twitch => return None,
    };
    Url::parse_with_params(base, &[("url", target.as_str()), ("format", "json")]).ok()
}

/// Fills missing fields from the fallback; blank titles count as missing.
fn merge(response: OEmbedResponse, video: &VideoReference) -> VideoMetadata {
    let fallback = VideoMetadata::fallback(video);
    VideoMetadata {
        title: response
            .title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or(fallback.title),
        thumbnail_url: response
            .thumbnail_url
            .filter(|u| !u.is_empty())
            .or(fallback.thumbnail_url),
    }
}

#[async_trait]
impl MetadataFetcher for OEmbedFetcher {
    async fn fetch(&self, video: &VideoReference) -> Option<VideoMetadata> {
        let endpoint = endpoint_for(video)?;
        match self.request(endpoint).await {
            Ok(response) => Some(merge(response, video)),
            Err(e) => {
                warn!(platform = %video.platform(), video_id = video.video_id(), error = %e, "oEmbed lookup failed");
                None
            }
        }
    }
}

/// Used when metadata lookups are switched off.
pub struct NoopFetcher;

#[async_trait]
impl MetadataFetcher for NoopFetcher {
    async fn fetch(&self, video: &VideoReference) -> Option<VideoMetadata> {
        debug!(platform = %video.platform(), "metadata lookup disabled");
        None
    }
}
