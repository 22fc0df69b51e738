//! Core domain types and events

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// Unique, orderable identifier of a post
///
/// Identifiers grow over time, so a newest-first feed yields strictly
/// decreasing ids.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostId(pub u64);

impl From<u64> for PostId {
    fn from(id: u64) -> Self {
        PostId(id)
    }
}

impl From<PostId> for u64 {
    fn from(id: PostId) -> Self {
        id.0
    }
}

impl PartialEq<u64> for PostId {
    fn eq(&self, other: &u64) -> bool {
        self.0 == *other
    }
}

impl std::fmt::Display for PostId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PostId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u64>().map(PostId)
    }
}

/// Account that authored or reposted a post
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    /// Handle without the leading `@`
    pub handle: String,
}

impl Author {
    /// Create an author from a handle
    pub fn new(handle: impl Into<String>) -> Self {
        Self {
            handle: handle.into(),
        }
    }
}

/// Kind of an attached media unit
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    /// Still image, downloaded from its direct URL
    Photo,
    /// Video with several encoded variants
    Video,
    /// Looping animation, delivered as video variants
    AnimatedGif,
}

/// One encoding of a video or animated image
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoVariant {
    /// MIME type of the encoding (e.g. `video/mp4`)
    pub content_type: String,
    /// Bitrate in bits per second; streaming playlists carry none
    pub bitrate: Option<u64>,
    /// Location of the encoded file
    pub url: String,
}

/// Media attached to a post
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaAttachment {
    /// Photo, video or animated image
    pub kind: MediaKind,
    /// Direct still-image URL (for videos this is the poster frame)
    pub url: String,
    /// Available encodings (empty for photos)
    #[serde(default)]
    pub variants: Vec<VideoVariant>,
}

impl MediaAttachment {
    /// A photo attachment
    pub fn photo(url: impl Into<String>) -> Self {
        Self {
            kind: MediaKind::Photo,
            url: url.into(),
            variants: Vec::new(),
        }
    }

    /// A video attachment with the given variants
    pub fn video(variants: Vec<VideoVariant>) -> Self {
        Self {
            kind: MediaKind::Video,
            url: String::new(),
            variants,
        }
    }
}

/// Original content: a post written by its author
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    /// Post identifier
    pub id: PostId,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Author of the content
    pub author: Author,
    /// Extended media attachments (empty when none were returned)
    #[serde(default)]
    pub media: Vec<MediaAttachment>,
}

/// An item of a feed: either original content or a repost wrapping it
///
/// A repost only carries a back-reference to the reposted content; it never
/// contributes media of its own.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedItem {
    /// Content posted by its own author
    Original(Post),
    /// A verbatim re-share of another item
    Repost {
        /// Identifier of the repost itself (position in the feed)
        id: PostId,
        /// Time the repost was made
        created_at: DateTime<Utc>,
        /// Account that reposted
        by: Author,
        /// The reposted item
        of: Box<FeedItem>,
    },
}

impl FeedItem {
    /// Identifier of this feed entry (the repost's own id for reposts)
    pub fn id(&self) -> PostId {
        match self {
            FeedItem::Original(post) => post.id,
            FeedItem::Repost { id, .. } => *id,
        }
    }

    /// Time this feed entry was created
    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            FeedItem::Original(post) => post.created_at,
            FeedItem::Repost { created_at, .. } => *created_at,
        }
    }

    /// Account that put this entry into the feed
    pub fn author(&self) -> &Author {
        match self {
            FeedItem::Original(post) => &post.author,
            FeedItem::Repost { by, .. } => by,
        }
    }

    /// Whether this entry is a repost
    pub fn is_repost(&self) -> bool {
        matches!(self, FeedItem::Repost { .. })
    }

    /// The innermost original content, following repost chains
    pub fn original(&self) -> &Post {
        let mut current = self;
        loop {
            match current {
                FeedItem::Original(post) => return post,
                FeedItem::Repost { of, .. } => current = of,
            }
        }
    }
}

/// A downloadable media resource, attributed to the original content owner
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaDescriptor {
    /// Identifier of the original post owning the media
    pub id: PostId,
    /// Handle of the original post's author
    pub username: String,
    /// Source URL of the selected media resource
    pub url: String,
    /// Final path segment of the URL (extension included)
    pub filename: String,
    /// File extension without the dot (empty if none)
    pub extension: String,
}

/// Result of processing one media descriptor
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DownloadOutcome {
    /// The file was transferred and moved into place
    Written {
        /// Final destination path
        path: PathBuf,
        /// Number of bytes written
        bytes: u64,
        /// Attempts used, including the successful one
        attempts: u32,
    },
    /// The destination already existed and existing files are ignored
    SkippedExisting {
        /// Destination path that already existed
        path: PathBuf,
    },
    /// A permanent error (4xx, local failure) ended processing of this item
    SkippedPermanentError {
        /// Destination path that was not written
        path: PathBuf,
        /// Description of the failure
        reason: String,
    },
    /// Every attempt failed with a transient error
    FailedAfterRetries {
        /// Destination path that was not written
        path: PathBuf,
        /// Number of attempts made
        attempts: u32,
        /// Description of the last failure
        reason: String,
    },
}

impl DownloadOutcome {
    /// Destination path the outcome refers to
    pub fn path(&self) -> &PathBuf {
        match self {
            DownloadOutcome::Written { path, .. }
            | DownloadOutcome::SkippedExisting { path }
            | DownloadOutcome::SkippedPermanentError { path, .. }
            | DownloadOutcome::FailedAfterRetries { path, .. } => path,
        }
    }
}

/// Counts of download outcomes for a run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadSummary {
    /// Files written
    pub written: usize,
    /// Files skipped because they already existed
    pub skipped_existing: usize,
    /// Items skipped after a permanent error
    pub skipped_permanent: usize,
    /// Items that failed after exhausting retries
    pub failed: usize,
    /// Items never attempted because the run was cancelled
    pub not_attempted: usize,
}

impl DownloadSummary {
    /// Record one outcome
    pub fn record(&mut self, outcome: &DownloadOutcome) {
        match outcome {
            DownloadOutcome::Written { .. } => self.written += 1,
            DownloadOutcome::SkippedExisting { .. } => self.skipped_existing += 1,
            DownloadOutcome::SkippedPermanentError { .. } => self.skipped_permanent += 1,
            DownloadOutcome::FailedAfterRetries { .. } => self.failed += 1,
        }
    }

    /// Total number of media items accounted for
    pub fn total(&self) -> usize {
        self.written + self.skipped_existing + self.skipped_permanent + self.failed + self.not_attempted
    }
}

impl std::fmt::Display for DownloadSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} written, {} skipped (existing), {} skipped (error), {} failed",
            self.written, self.skipped_existing, self.skipped_permanent, self.failed
        )?;
        if self.not_attempted > 0 {
            write!(f, ", {} not attempted", self.not_attempted)?;
        }
        Ok(())
    }
}

/// Event emitted while a pipeline run progresses
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// One feed page was fetched and filtered
    PageFetched {
        /// Items on the page
        received: usize,
        /// Items emitted so far in this run
        emitted: usize,
    },

    /// Pagination finished
    ItemsCollected {
        /// Number of feed items inside the window
        count: usize,
    },

    /// Batch lookup finished and media were resolved
    MediaResolved {
        /// Number of media descriptors to download
        count: usize,
    },

    /// One media item finished processing
    MediaFinished {
        /// Owning post of the media
        id: PostId,
        /// What happened to it
        outcome: DownloadOutcome,
    },

    /// The run completed (possibly cancelled during downloads)
    Finished {
        /// Final counts
        summary: DownloadSummary,
    },
}
