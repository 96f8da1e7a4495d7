use std::collections::HashMap;

use chrono::prelude::*;
use chrono_tz::Tz;
use thiserror::Error;

/// Errors surfaced by the watcher engine.
///
/// `Fetch` and `Parse` can be absorbed by the refresh cache when a prior
/// snapshot exists; `Config` is terminal for the tile that caused it.
#[derive(Error, Debug, Clone)]
pub enum CalendarError {
    #[error("calendar fetch error: {0}")]
    Fetch(String),
    #[error("calendar parse error: {0}")]
    Parse(String),
    #[error("configuration error: {0}")]
    Config(String),
}

/// Attendee participation status as carried by the PARTSTAT parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    Accepted,
    Declined,
    Tentative,
    NeedsAction,
    Unspecified,
}

impl ResponseStatus {
    pub fn from_partstat(value: &str) -> ResponseStatus {
        if value.eq_ignore_ascii_case("ACCEPTED") {
            ResponseStatus::Accepted
        } else if value.eq_ignore_ascii_case("DECLINED") {
            ResponseStatus::Declined
        } else if value.eq_ignore_ascii_case("TENTATIVE") {
            ResponseStatus::Tentative
        } else if value.eq_ignore_ascii_case("NEEDS-ACTION") {
            ResponseStatus::NeedsAction
        } else {
            ResponseStatus::Unspecified
        }
    }
}

/// Attendee identity mapped to that attendee's response.
pub type AttendeeResponses = HashMap<String, ResponseStatus>;

/// Normalizes an attendee or viewer identity so that feed and configuration
/// spellings compare equal: the `mailto:` scheme is stripped and the rest is
/// lowercased.
pub fn normalize_identity(raw: &str) -> String {
    let trimmed = raw.trim();
    let stripped = match trimmed.get(..7) {
        Some(scheme) if scheme.eq_ignore_ascii_case("mailto:") => &trimmed[7..],
        _ => trimmed,
    };
    stripped.to_lowercase()
}

/// A recurrence exception: replaces one instance of a repeating event with
/// different timing/content on a specific date. `attendees` is `None` when
/// the exception does not restate the attendee list and the primary's list
/// applies.
#[derive(Debug, Clone, PartialEq)]
pub struct EventOverride {
    pub summary: String,
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
    pub attendees: Option<AttendeeResponses>,
}

/// One calendar entry as parsed from the feed, immutable once parsed.
/// Timestamps are already converted to the configured local timezone.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub uid: String,
    pub summary: String,
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
    /// Recurrence exceptions keyed by the original occurrence date they
    /// replace.
    pub overrides: HashMap<NaiveDate, EventOverride>,
    pub attendees: AttendeeResponses,
}

/// One concrete event instance pinned to a specific calendar day.
#[derive(Debug, Clone, PartialEq)]
pub struct Occurrence {
    pub title: String,
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
    pub attendees: AttendeeResponses,
}

impl Occurrence {
    /// Resolves the viewer's own response.
    ///
    /// A single-entry attendee list is used directly no matter whose
    /// identity it names: such events carry exactly one other-party entry
    /// that effectively marks the event itself. With multiple entries only
    /// an explicit entry for the viewer counts, and a missing entry is
    /// treated as not declined.
    pub fn viewer_response(&self, viewer: &str) -> ResponseStatus {
        if self.attendees.len() == 1 {
            *self.attendees.values().next().unwrap()
        } else {
            self.attendees
                .get(viewer)
                .copied()
                .unwrap_or(ResponseStatus::Unspecified)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::hashmap;

    fn occurrence_with(attendees: AttendeeResponses) -> Occurrence {
        let start = chrono_tz::UTC.with_ymd_and_hms(2024, 6, 3, 14, 0, 0).unwrap();
        Occurrence {
            title: "Team Sync".to_string(),
            start,
            end: start + chrono::Duration::minutes(30),
            attendees,
        }
    }

    #[test]
    fn normalize_strips_mailto_and_lowercases() {
        assert_eq!("bob@example.com", normalize_identity("mailto:Bob@Example.com"));
        assert_eq!("bob@example.com", normalize_identity("MAILTO:bob@example.com"));
        assert_eq!("bob@example.com", normalize_identity(" bob@example.com "));
    }

    #[test]
    fn partstat_parsing_is_case_insensitive() {
        assert_eq!(ResponseStatus::Declined, ResponseStatus::from_partstat("declined"));
        assert_eq!(ResponseStatus::Accepted, ResponseStatus::from_partstat("ACCEPTED"));
        assert_eq!(
            ResponseStatus::NeedsAction,
            ResponseStatus::from_partstat("NEEDS-ACTION")
        );
        assert_eq!(
            ResponseStatus::Unspecified,
            ResponseStatus::from_partstat("DELEGATED")
        );
    }

    #[test]
    fn solo_attendee_status_counts_for_the_viewer_regardless_of_identity() {
        let occurrence = occurrence_with(hashmap! {
            "someone.else@example.com".to_string() => ResponseStatus::Declined,
        });
        assert_eq!(
            ResponseStatus::Declined,
            occurrence.viewer_response("viewer@example.com")
        );
    }

    #[test]
    fn multi_attendee_resolution_looks_up_the_viewer() {
        let occurrence = occurrence_with(hashmap! {
            "viewer@example.com".to_string() => ResponseStatus::Tentative,
            "someone.else@example.com".to_string() => ResponseStatus::Declined,
        });
        assert_eq!(
            ResponseStatus::Tentative,
            occurrence.viewer_response("viewer@example.com")
        );
    }

    #[test]
    fn missing_viewer_entry_defaults_to_unspecified() {
        let occurrence = occurrence_with(hashmap! {
            "a@example.com".to_string() => ResponseStatus::Declined,
            "b@example.com".to_string() => ResponseStatus::Declined,
        });
        assert_eq!(
            ResponseStatus::Unspecified,
            occurrence.viewer_response("viewer@example.com")
        );
    }
}
