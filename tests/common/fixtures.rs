//! In-memory feed and post builders

use chrono::{DateTime, TimeZone, Utc};
use std::sync::Mutex;
use tweetlikes_dl::{
    Author, Error, FeedItem, FeedKind, FeedSource, MediaAttachment, PageRequest, Post, PostId,
    Result, VideoVariant,
};

/// Noon UTC on the given day of March 2022
pub fn day(d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2022, 3, d, 12, 0, 0)
        .single()
        .unwrap_or_else(|| panic!("invalid day {d}"))
}

/// An original post by `handle` with one photo per URL
pub fn photo_post(id: u64, at: DateTime<Utc>, handle: &str, urls: &[String]) -> FeedItem {
    FeedItem::Original(Post {
        id: PostId(id),
        created_at: at,
        author: Author::new(handle),
        media: urls.iter().map(MediaAttachment::photo).collect(),
    })
}

/// An original post carrying one video with the given `(content_type, bitrate, url)` variants
pub fn video_post(
    id: u64,
    at: DateTime<Utc>,
    handle: &str,
    variants: &[(&str, Option<u64>, String)],
) -> FeedItem {
    let variants = variants
        .iter()
        .map(|(content_type, bitrate, url)| VideoVariant {
            content_type: content_type.to_string(),
            bitrate: *bitrate,
            url: url.clone(),
        })
        .collect();
    FeedItem::Original(Post {
        id: PostId(id),
        created_at: at,
        author: Author::new(handle),
        media: vec![MediaAttachment::video(variants)],
    })
}

/// A repost of `of` made by `by`
pub fn repost(id: u64, at: DateTime<Utc>, by: &str, of: FeedItem) -> FeedItem {
    FeedItem::Repost {
        id: PostId(id),
        created_at: at,
        by: Author::new(by),
        of: Box::new(of),
    }
}

fn without_media(item: &FeedItem) -> FeedItem {
    match item {
        FeedItem::Original(post) => FeedItem::Original(Post {
            media: Vec::new(),
            ..post.clone()
        }),
        FeedItem::Repost {
            id,
            created_at,
            by,
            of,
        } => FeedItem::Repost {
            id: *id,
            created_at: *created_at,
            by: by.clone(),
            of: Box::new(without_media(of)),
        },
    }
}

/// Feed served from memory
///
/// Listing honours the cursor parameters but strips media, like the real
/// listing endpoints often do; only [`FeedSource::lookup_bulk`] returns media.
#[derive(Default)]
pub struct FakeFeed {
    timeline: Vec<FeedItem>,
    likes: Vec<FeedItem>,
    unauthorized: bool,
    /// Every page request received
    pub page_requests: Mutex<Vec<PageRequest>>,
    /// Every id batch looked up
    pub lookups: Mutex<Vec<Vec<PostId>>>,
}

impl FakeFeed {
    /// Feed whose timeline holds `items`
    pub fn timeline(items: Vec<FeedItem>) -> Self {
        Self {
            timeline: newest_first(items),
            ..Default::default()
        }
    }

    /// Feed whose likes hold `items`
    pub fn likes(items: Vec<FeedItem>) -> Self {
        Self {
            likes: newest_first(items),
            ..Default::default()
        }
    }

    /// Feed rejecting every call as unauthorized
    pub fn unauthorized() -> Self {
        Self {
            unauthorized: true,
            ..Default::default()
        }
    }

    /// Number of page requests made so far
    pub fn page_calls(&self) -> usize {
        self.page_requests.lock().map(|r| r.len()).unwrap_or_default()
    }

    /// Id batches looked up so far
    pub fn lookup_calls(&self) -> Vec<Vec<PostId>> {
        self.lookups.lock().map(|l| l.clone()).unwrap_or_default()
    }

    fn all_items(&self) -> impl Iterator<Item = &FeedItem> {
        self.timeline.iter().chain(self.likes.iter())
    }
}

fn newest_first(mut items: Vec<FeedItem>) -> Vec<FeedItem> {
    items.sort_by_key(|item| std::cmp::Reverse(item.id()));
    items
}

#[async_trait::async_trait]
impl FeedSource for FakeFeed {
    async fn list_page(&self, request: &PageRequest) -> Result<Vec<FeedItem>> {
        if let Ok(mut requests) = self.page_requests.lock() {
            requests.push(request.clone());
        }
        if self.unauthorized {
            return Err(Error::Unauthorized("Invalid or expired token.".into()));
        }

        let source = match request.kind {
            FeedKind::Timeline => &self.timeline,
            FeedKind::Likes => &self.likes,
        };
        Ok(source
            .iter()
            .filter(|item| request.include_reposts || !item.is_repost())
            .filter(|item| request.since_id.is_none_or(|s| item.id() > s))
            .filter(|item| request.max_id.is_none_or(|m| item.id() <= m))
            .take(request.count)
            .map(without_media)
            .collect())
    }

    async fn lookup_bulk(&self, ids: &[PostId]) -> Result<Vec<FeedItem>> {
        if let Ok(mut lookups) = self.lookups.lock() {
            lookups.push(ids.to_vec());
        }
        if self.unauthorized {
            return Err(Error::Unauthorized("Invalid or expired token.".into()));
        }

        Ok(self
            .all_items()
            .filter(|item| ids.contains(&item.id()))
            .cloned()
            .collect())
    }
}
