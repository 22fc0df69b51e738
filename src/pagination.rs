//! Pagination and window filtering
//!
//! The feed is walked newest first, one page at a time. Each page is run
//! through [`filter_page`], a pure function of the window, the filter and the
//! current [`Cursor`], which decides per item whether to stop, skip or emit and
//! produces the cursor for the next page. [`paginate`] drives that function
//! lazily against a [`FeedSource`].

use crate::error::{Error, Result};
use crate::feed::{FeedSource, PageRequest};
use crate::types::{Event, FeedItem, PostId};
use chrono::{DateTime, Utc};
use futures::stream::{self, Stream, TryStreamExt};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Identifier, timestamp and count bounds of a run
///
/// All bounds are inclusive. Items newer than the upper bounds are skipped;
/// the first item older than a lower bound ends iteration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Window {
    /// Oldest id that may be emitted
    pub since_id: Option<PostId>,
    /// Newest id that may be emitted
    pub max_id: Option<PostId>,
    /// Earliest creation time that may be emitted
    pub since: Option<DateTime<Utc>>,
    /// Latest creation time that may be emitted
    pub until: Option<DateTime<Utc>>,
    /// Maximum number of emitted items
    pub limit: usize,
}

/// What to do with one item
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// Past the lower bound; nothing older can match
    Stop,
    /// Newer than the upper bound
    Skip,
    /// Inside the window
    Keep,
}

impl Window {
    /// A window with no bounds besides the count limit
    pub fn with_limit(limit: usize) -> Self {
        Self {
            since_id: None,
            max_id: None,
            since: None,
            until: None,
            limit,
        }
    }

    /// Whether a lower bound lies after the matching upper bound
    pub fn is_contradictory(&self) -> bool {
        let ids = matches!((self.since_id, self.max_id), (Some(lo), Some(hi)) if lo > hi);
        let times = matches!((self.since, self.until), (Some(lo), Some(hi)) if lo > hi);
        ids || times
    }

    /// Whether no item can ever be emitted
    pub fn is_empty(&self) -> bool {
        self.limit == 0 || self.is_contradictory()
    }

    /// Classify an item against the identifier and timestamp bounds
    pub fn classify(&self, item: &FeedItem) -> Verdict {
        let id = item.id();
        let created_at = item.created_at();

        if self.since.is_some_and(|since| created_at < since)
            || self.since_id.is_some_and(|since_id| id < since_id)
        {
            return Verdict::Stop;
        }
        if self.until.is_some_and(|until| created_at > until)
            || self.max_id.is_some_and(|max_id| id > max_id)
        {
            return Verdict::Skip;
        }
        Verdict::Keep
    }
}

type Predicate = Arc<dyn Fn(&FeedItem) -> bool + Send + Sync>;

/// Per-item inclusion rules applied after the window bounds
#[derive(Clone)]
pub struct ItemFilter {
    /// Whether reposts may be emitted at all
    pub include_reposts: bool,
    predicate: Option<Predicate>,
}

impl std::fmt::Debug for ItemFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ItemFilter")
            .field("include_reposts", &self.include_reposts)
            .field("predicate", &self.predicate.is_some())
            .finish()
    }
}

impl ItemFilter {
    /// Filter without a predicate
    pub fn new(include_reposts: bool) -> Self {
        Self {
            include_reposts,
            predicate: None,
        }
    }

    /// Only reposts pass
    pub fn reposts_only() -> Self {
        Self::new(true).with_predicate(FeedItem::is_repost)
    }

    /// Add a predicate every emitted item must satisfy
    pub fn with_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&FeedItem) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    /// Whether an in-window item should be emitted
    pub fn accepts(&self, item: &FeedItem) -> bool {
        if !self.include_reposts && item.is_repost() {
            return false;
        }
        self.predicate.as_ref().is_none_or(|p| p(item))
    }
}

/// Explicit pagination state threaded between page calls
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cursor {
    /// Next page to request; `None` once iteration has finished
    pub request: Option<PageRequest>,
    /// Items emitted so far
    pub emitted: usize,
}

impl Cursor {
    /// Initial cursor for `window`
    ///
    /// The id bounds are pushed to the server: `since_id` becomes the
    /// exclusive server bound `since_id - 1`, `max_id` is passed as is.
    pub fn start(base: PageRequest, window: &Window) -> Self {
        if window.is_empty() {
            return Self::finished(0);
        }
        let request = PageRequest {
            since_id: window
                .since_id
                .and_then(|id| id.0.checked_sub(1))
                .map(PostId),
            max_id: window.max_id,
            ..base
        };
        Self {
            request: Some(request),
            emitted: 0,
        }
    }

    fn finished(emitted: usize) -> Self {
        Self {
            request: None,
            emitted,
        }
    }

    /// Whether no further page will be requested
    pub fn is_finished(&self) -> bool {
        self.request.is_none()
    }
}

/// Result of filtering one page
#[derive(Clone, Debug)]
pub struct PageOutcome {
    /// Items to emit, newest first
    pub items: Vec<FeedItem>,
    /// Cursor for the following page
    pub next: Cursor,
}

/// Filter one page of the feed
///
/// Termination is checked in priority order: count limit reached, lower
/// bound crossed, feed exhausted (empty page or no older id possible).
pub fn filter_page(
    window: &Window,
    filter: &ItemFilter,
    cursor: &Cursor,
    page: Vec<FeedItem>,
) -> PageOutcome {
    let Some(request) = &cursor.request else {
        return PageOutcome {
            items: Vec::new(),
            next: cursor.clone(),
        };
    };

    let oldest = page.iter().map(FeedItem::id).min();
    let mut emitted = cursor.emitted;
    let mut items = Vec::new();

    for item in page {
        if emitted >= window.limit {
            return PageOutcome {
                items,
                next: Cursor::finished(emitted),
            };
        }
        match window.classify(&item) {
            Verdict::Stop => {
                tracing::debug!(post_id = %item.id(), "Crossed lower bound");
                return PageOutcome {
                    items,
                    next: Cursor::finished(emitted),
                };
            }
            Verdict::Skip => continue,
            Verdict::Keep => {}
        }
        if !filter.accepts(&item) {
            continue;
        }
        items.push(item);
        emitted += 1;
    }

    let next_request = if emitted >= window.limit {
        None
    } else {
        oldest.and_then(|oldest| request.older_than(oldest))
    };

    PageOutcome {
        items,
        next: Cursor {
            request: next_request,
            emitted,
        },
    }
}

/// Walk the feed lazily and yield the items inside `window`, newest first
///
/// A page is only requested when the consumer needs the next item and the
/// previous page has been drained. Cancellation is checked before every page
/// request and surfaces as [`Error::Cancelled`]. When `events` is given, a
/// [`Event::PageFetched`] is sent per page.
pub fn paginate<'a>(
    source: &'a dyn FeedSource,
    base: PageRequest,
    window: Window,
    filter: ItemFilter,
    cancel: CancellationToken,
    events: Option<broadcast::Sender<Event>>,
) -> impl Stream<Item = Result<FeedItem>> + Send + 'a {
    let start = Cursor::start(base, &window);

    stream::try_unfold(start, move |cursor| {
        let filter = filter.clone();
        let cancel = cancel.clone();
        let events = events.clone();
        async move {
            let Some(request) = cursor.request.clone() else {
                return Ok(None);
            };
            if cancel.is_cancelled() {
                tracing::info!(emitted = cursor.emitted, "Pagination cancelled");
                return Err(Error::Cancelled);
            }

            let page = source.list_page(&request).await?;
            let received = page.len();
            let outcome = filter_page(&window, &filter, &cursor, page);

            tracing::debug!(
                max_id = ?request.max_id,
                received,
                emitted = outcome.next.emitted,
                finished = outcome.next.is_finished(),
                "Processed page"
            );
            if let Some(tx) = &events {
                tx.send(Event::PageFetched {
                    received,
                    emitted: outcome.next.emitted,
                })
                .ok();
            }

            let items = stream::iter(outcome.items.into_iter().map(Ok));
            Ok(Some((items, outcome.next)))
        }
    })
    .try_flatten()
}
