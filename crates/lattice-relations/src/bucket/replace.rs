//! Edit selection for `m.replace` buckets.

use lattice_core::{MatrixEvent, SharedEvent};

/// Pick the edit that should be displayed for `origin`.
///
/// Folds over `members` in insertion order. An edit qualifies only if it was
/// sent by the origin's sender and is not older than the server's bundled
/// replacement timestamp. Among qualifying edits the newest server timestamp
/// wins; on equal timestamps the first one encountered stays.
pub(crate) fn select_replacement(
    origin: &MatrixEvent,
    members: &[SharedEvent],
) -> Option<SharedEvent> {
    let min_ts = origin.bundled_replacement_ts();
    let mut best: Option<&SharedEvent> = None;

    for event in members {
        if event.sender() != origin.sender() {
            continue;
        }
        if min_ts.is_some_and(|min| event.origin_server_ts() < min) {
            continue;
        }
        if best.is_some_and(|b| b.origin_server_ts() >= event.origin_server_ts()) {
            continue;
        }
        best = Some(event);
    }

    best.cloned()
}
