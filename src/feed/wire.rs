//! JSON payloads returned by the REST API and their conversion into domain types

use crate::error::{Error, Result};
use crate::types::{Author, FeedItem, MediaAttachment, MediaKind, Post, PostId, VideoVariant};
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Timestamp format used by `created_at` fields (`Wed Oct 10 20:19:24 +0000 2018`)
const CREATED_AT_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

/// A status as returned by timeline, likes and lookup endpoints
#[derive(Debug, Deserialize)]
pub struct WireStatus {
    /// Numeric id
    pub id: u64,
    /// Creation time in [`CREATED_AT_FORMAT`]
    pub created_at: String,
    /// Author
    pub user: WireUser,
    /// Media attachments; only populated reliably by the lookup endpoint
    #[serde(default)]
    pub extended_entities: Option<WireEntities>,
    /// Present when this status is a repost
    #[serde(default)]
    pub retweeted_status: Option<Box<WireStatus>>,
}

/// The author part of a status
#[derive(Debug, Deserialize)]
pub struct WireUser {
    /// Handle without `@`
    pub screen_name: String,
}

/// `extended_entities` block
#[derive(Debug, Deserialize)]
pub struct WireEntities {
    /// Attached media units
    #[serde(default)]
    pub media: Vec<WireMedia>,
}

/// One attached media unit
#[derive(Debug, Deserialize)]
pub struct WireMedia {
    /// `photo`, `video` or `animated_gif`
    #[serde(rename = "type")]
    pub kind: String,
    /// Still image URL
    #[serde(default)]
    pub media_url_https: String,
    /// Encodings for videos and animated images
    #[serde(default)]
    pub video_info: Option<WireVideoInfo>,
}

/// `video_info` block
#[derive(Debug, Deserialize)]
pub struct WireVideoInfo {
    /// Available encodings
    #[serde(default)]
    pub variants: Vec<WireVariant>,
}

/// One encoding of a video
#[derive(Debug, Deserialize)]
pub struct WireVariant {
    /// MIME type
    pub content_type: String,
    /// Bits per second (absent for playlists)
    #[serde(default)]
    pub bitrate: Option<u64>,
    /// Location
    pub url: String,
}

/// Account profile returned by `users/show` and `account/verify_credentials`
#[derive(Debug, Deserialize)]
pub struct WireProfile {
    /// Numeric id
    pub id: u64,
    /// Handle without `@`
    pub screen_name: String,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Number of posts
    #[serde(default)]
    pub statuses_count: u64,
    /// Number of likes
    #[serde(default)]
    pub favourites_count: u64,
    /// Whether the account's posts are private
    #[serde(default)]
    pub protected: bool,
}

/// Error body: `{"errors":[{"code":34,"message":"..."}]}`
#[derive(Debug, Default, Deserialize)]
pub struct WireErrors {
    /// Individual errors
    #[serde(default)]
    pub errors: Vec<WireError>,
}

/// One entry of an error body
#[derive(Debug, Deserialize)]
pub struct WireError {
    /// Service-specific error code
    #[serde(default)]
    pub code: i64,
    /// Human-readable message
    #[serde(default)]
    pub message: String,
}

impl WireErrors {
    /// Extract a readable message from an error body, falling back to the raw text
    pub fn message_from_body(body: &str) -> String {
        match serde_json::from_str::<WireErrors>(body) {
            Ok(parsed) if !parsed.errors.is_empty() => parsed
                .errors
                .iter()
                .map(|e| format!("{} (code {})", e.message, e.code))
                .collect::<Vec<_>>()
                .join("; "),
            _ => body.chars().take(200).collect(),
        }
    }
}

/// Parse a `created_at` timestamp
pub fn parse_created_at(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_str(value, CREATED_AT_FORMAT)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Other(format!("invalid created_at '{value}': {e}")))
}

impl From<WireMedia> for MediaAttachment {
    fn from(media: WireMedia) -> Self {
        let kind = match media.kind.as_str() {
            "photo" => MediaKind::Photo,
            "animated_gif" => MediaKind::AnimatedGif,
            _ => MediaKind::Video,
        };
        let variants = media
            .video_info
            .map(|info| {
                info.variants
                    .into_iter()
                    .map(|v| VideoVariant {
                        content_type: v.content_type,
                        bitrate: v.bitrate,
                        url: v.url,
                    })
                    .collect()
            })
            .unwrap_or_default();

        MediaAttachment {
            kind,
            url: media.media_url_https,
            variants,
        }
    }
}

impl TryFrom<WireStatus> for FeedItem {
    type Error = Error;

    fn try_from(status: WireStatus) -> Result<Self> {
        let created_at = parse_created_at(&status.created_at)?;
        let author = Author::new(status.user.screen_name);

        match status.retweeted_status {
            Some(original) => Ok(FeedItem::Repost {
                id: PostId(status.id),
                created_at,
                by: author,
                of: Box::new(FeedItem::try_from(*original)?),
            }),
            None => {
                let media = status
                    .extended_entities
                    .map(|entities| entities.media.into_iter().map(MediaAttachment::from).collect())
                    .unwrap_or_default();
                Ok(FeedItem::Original(Post {
                    id: PostId(status.id),
                    created_at,
                    author,
                    media,
                }))
            }
        }
    }
}

/// Convert a list of statuses, dropping (and logging) any that fail to parse
pub fn into_feed_items(statuses: Vec<WireStatus>) -> Vec<FeedItem> {
    statuses
        .into_iter()
        .filter_map(|status| {
            let id = status.id;
            match FeedItem::try_from(status) {
                Ok(item) => Some(item),
                Err(e) => {
                    tracing::warn!(post_id = id, error = %e, "Skipping malformed status");
                    None
                }
            }
        })
        .collect()
}
