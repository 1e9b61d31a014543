//! Pure reconciliation: which feed items are not yet in the channel.

use crate::history::AnnouncedTitles;
use crate::ingest::types::NormalizedItem;

/// Items absent from `announced`, oldest first.
///
/// `items` is in feed order (newest first). Duplicate titles within `items`
/// are all returned; the caller re-checks the set before each post so only
/// the first successful one goes out.
pub fn missing_chronological<'a>(
    items: &'a [NormalizedItem],
    announced: &AnnouncedTitles,
) -> Vec<&'a NormalizedItem> {
    items
        .iter()
        .rev()
        .filter(|it| !announced.contains(&it.dedup_key()))
        .collect()
}
