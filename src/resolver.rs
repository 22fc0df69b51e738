//! Media resolution: turn a feed item into downloadable media descriptors

use crate::types::{FeedItem, MediaAttachment, MediaDescriptor, MediaKind, VideoVariant};
use crate::utils::split_media_filename;

/// Content type of the only playable video encoding
pub const PLAYABLE_CONTENT_TYPE: &str = "video/mp4";

/// Resolve every downloadable media unit attached to `item`
///
/// Reposts are followed to the innermost original, and every descriptor is
/// attributed to that original's id and author. Videos without a playable
/// variant are left out.
pub fn resolve(item: &FeedItem) -> Vec<MediaDescriptor> {
    let post = item.original();

    post.media
        .iter()
        .filter_map(|media| {
            let url = media_url(media)?;
            let (filename, extension) = split_media_filename(url);
            Some(MediaDescriptor {
                id: post.id,
                username: post.author.handle.clone(),
                url: url.to_string(),
                filename,
                extension,
            })
        })
        .collect()
}

fn media_url(media: &MediaAttachment) -> Option<&str> {
    match media.kind {
        MediaKind::Photo => (!media.url.is_empty()).then_some(media.url.as_str()),
        MediaKind::Video | MediaKind::AnimatedGif => {
            let variant = select_variant(&media.variants);
            if variant.is_none() {
                tracing::debug!(kind = ?media.kind, "No playable variant, skipping media");
            }
            variant.map(|v| v.url.as_str())
        }
    }
}

/// Pick the highest-bitrate playable variant
///
/// Variants without a bitrate rank lowest. On equal bitrates the first
/// variant wins.
pub fn select_variant(variants: &[VideoVariant]) -> Option<&VideoVariant> {
    variants
        .iter()
        .filter(|v| v.content_type == PLAYABLE_CONTENT_TYPE)
        .fold(None, |best: Option<&VideoVariant>, candidate| match best {
            Some(current) if current.bitrate >= candidate.bitrate => Some(current),
            _ => Some(candidate),
        })
}
