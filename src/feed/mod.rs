//! Feed service abstraction and its HTTP implementation.
//!
//! - [`FeedSource`] - the seam the pipeline talks to (paged listing, bulk lookup)
//! - [`twitter`] - REST client implementing [`FeedSource`]
//! - [`oauth`] - OAuth 1.0a request signing
//! - [`wire`] - JSON payloads and their conversion into domain types

pub mod oauth;
pub mod twitter;
pub mod wire;

pub use twitter::{Profile, TwitterClient};

use crate::error::Result;
use crate::types::{FeedItem, PostId};

/// Which collection of an account is paged through
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FeedKind {
    /// Posts and reposts by the account
    #[default]
    Timeline,
    /// Posts the account liked
    Likes,
}

/// One page request against a feed
///
/// The cursor is explicit: successive pages are obtained by lowering
/// `max_id`, never through hidden client state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageRequest {
    /// Account handle; `None` means the authenticated account
    pub subject: Option<String>,
    /// Timeline or likes
    pub kind: FeedKind,
    /// Only items with an id strictly greater than this (server semantics)
    pub since_id: Option<PostId>,
    /// Only items with an id less than or equal to this
    pub max_id: Option<PostId>,
    /// Items per page
    pub count: usize,
    /// Whether reposts should be included in the listing
    pub include_reposts: bool,
}

impl PageRequest {
    /// The request for the page following one whose oldest item is `oldest`
    ///
    /// Returns `None` when no older item can exist.
    pub fn older_than(&self, oldest: PostId) -> Option<PageRequest> {
        let max_id = oldest.0.checked_sub(1).filter(|id| *id > 0)?;
        if self.since_id.is_some_and(|since| max_id <= since.0) {
            return None;
        }
        Some(PageRequest {
            max_id: Some(PostId(max_id)),
            ..self.clone()
        })
    }
}

/// Remote feed collaborator
///
/// Implementations handle rate limiting transparently (by waiting) and map
/// rejected credentials to [`Error::Unauthorized`](crate::error::Error::Unauthorized)
/// and 5xx responses to [`Error::Server`](crate::error::Error::Server).
#[async_trait::async_trait]
pub trait FeedSource: Send + Sync {
    /// Fetch one page of the feed, newest first
    async fn list_page(&self, request: &PageRequest) -> Result<Vec<FeedItem>>;

    /// Look up items by id, with extended media populated
    ///
    /// At most 100 ids are passed per call. Unknown, deleted or private ids
    /// are simply absent from the result; order is not guaranteed.
    async fn lookup_bulk(&self, ids: &[PostId]) -> Result<Vec<FeedItem>>;
}
