//! Batch metadata fetching
//!
//! Listing calls may omit extended media, so collected ids are looked up
//! again in bulk before their media are resolved.

use crate::error::{Error, Result};
use crate::feed::FeedSource;
use crate::resolver;
use crate::types::{FeedItem, MediaDescriptor, PostId};
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

/// Look up `ids` in batches of `batch_size` and resolve their media
///
/// Batches are issued sequentially in input order. Within a batch, results
/// are put back into the requested order; ids the service did not return
/// produce no media. Cancellation is checked before every batch.
pub async fn fetch_media(
    source: &dyn FeedSource,
    ids: &[PostId],
    batch_size: usize,
    cancel: &CancellationToken,
) -> Result<Vec<MediaDescriptor>> {
    let batch_size = batch_size.max(1);
    let batch_count = ids.len().div_ceil(batch_size);
    let mut descriptors = Vec::new();

    for (index, batch) in ids.chunks(batch_size).enumerate() {
        if cancel.is_cancelled() {
            tracing::info!(batch = index, "Cancelled before metadata lookup");
            return Err(Error::Cancelled);
        }

        let returned = source.lookup_bulk(batch).await?;
        tracing::debug!(
            batch = index + 1,
            of = batch_count,
            requested = batch.len(),
            returned = returned.len(),
            "Looked up batch"
        );

        for item in in_request_order(batch, returned) {
            descriptors.extend(resolver::resolve(&item));
        }
    }

    Ok(descriptors)
}

/// Reorder `returned` to follow `requested`, dropping anything not asked for
fn in_request_order(requested: &[PostId], returned: Vec<FeedItem>) -> Vec<FeedItem> {
    let mut by_id: HashMap<PostId, FeedItem> =
        returned.into_iter().map(|item| (item.id(), item)).collect();

    let ordered: Vec<FeedItem> = requested.iter().filter_map(|id| by_id.remove(id)).collect();
    if ordered.len() < requested.len() {
        tracing::debug!(
            missing = requested.len() - ordered.len(),
            "Some ids were not returned by lookup"
        );
    }
    ordered
}
