use chrono::prelude::*;
use chrono_tz::Tz;

use crate::domain::Occurrence;

/// The occurrence in progress and the next upcoming one, relative to a
/// single instant. Recomputed on every query, never cached.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    pub current: Option<Occurrence>,
    pub next: Option<Occurrence>,
}

/// Picks `current` and `next` from occurrences sorted by (start, end)
/// ascending, in one forward scan.
///
/// `current` is the first occurrence whose interval contains `now`; with
/// overlapping data that is the earliest start, ties broken by earliest end,
/// and at most one is reported. `next` is the first occurrence with
/// `start > now`. Stateless and idempotent.
pub fn select(occurrences: &[Occurrence], now: DateTime<Tz>) -> Selection {
    let mut selection = Selection::default();
    for occurrence in occurrences {
        if selection.current.is_none() && occurrence.start <= now && now < occurrence.end {
            selection.current = Some(occurrence.clone());
        }
        if occurrence.start > now {
            selection.next = Some(occurrence.clone());
            break;
        }
    }
    selection
}
