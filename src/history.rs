//! Lookups over the tag histories of an image stream

use crate::{
    errors::StatusError,
    image::ContentDigest,
    metadata::{ImageStream, TagEvent},
};
use std::collections::BTreeSet;

/// Does a tag event's image match an image id?
///
/// The id may be a prefix of the full image string, or of the hex portion
/// when the image string is a digest.
pub fn digest_or_image_match(image: &str, image_id: &str) -> bool {
    match ContentDigest::parse(image) {
        Ok(digest) => digest.hex().starts_with(image_id) || image.starts_with(image_id),
        Err(_) => image.starts_with(image_id),
    }
}

/// Find the tag event for an image id
///
/// Fails with a not-found status if no event matches, and with a conflict
/// status if events for more than one distinct image match. Several events
/// for the same image are not ambiguous; the last one seen wins.
pub fn resolve_image_id(stream: &ImageStream, image_id: &str) -> Result<TagEvent, StatusError> {
    let mut found: Option<&TagEvent> = None;
    let mut images = BTreeSet::new();
    for history in &stream.status.tags {
        for event in &history.items {
            if digest_or_image_match(&event.image, image_id) {
                found = Some(event);
                images.insert(event.image.as_str());
            }
        }
    }
    match (images.len(), found) {
        (1, Some(event)) => Ok(event.clone()),
        (0, _) | (_, None) => Err(StatusError::not_found("imagestreamimages", image_id)),
        _ => Err(StatusError::conflict(
            "imagestreamimages",
            image_id,
            &format!(
                "multiple images match the prefix {:?}: {}",
                image_id,
                images.into_iter().collect::<Vec<_>>().join(", ")
            ),
        )),
    }
}

/// The newest tag event for an image id across all tags, with its tag name
pub fn latest_image_tag_event<'a>(
    stream: &'a ImageStream,
    image_id: &str,
) -> Option<(&'a str, &'a TagEvent)> {
    let mut latest: Option<(&str, &TagEvent)> = None;
    for history in &stream.status.tags {
        for event in &history.items {
            if !digest_or_image_match(&event.image, image_id) {
                continue;
            }
            let newer = match latest {
                None => true,
                Some((_, current)) => event.created > current.created,
            };
            if newer {
                latest = Some((history.tag.as_str(), event));
            }
        }
    }
    latest
}
