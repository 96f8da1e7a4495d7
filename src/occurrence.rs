use chrono::prelude::*;

use crate::domain::{Event, Occurrence, ResponseStatus};

/// Expands events into their concrete occurrences for `today`.
///
/// Per event the candidates are every recurrence exception whose overriding
/// start lands on `today`, plus the primary instance when its start lands on
/// `today` and no exception replaces that date. An exception fully replaces
/// the primary instance on its original date, it never supplements it. The
/// result is unsorted and may contain overlapping occurrences.
pub fn expand_today(events: &[Event], today: NaiveDate) -> Vec<Occurrence> {
    events
        .iter()
        .filter_map(|event| occurrence_for_day(event, today))
        .collect()
}

/// At most one occurrence per event per day. When several candidates land
/// on the same day (an exception moved into today next to an untouched
/// primary, or two exceptions moved into today) the earliest start wins,
/// ties broken by earliest end.
fn occurrence_for_day(event: &Event, today: NaiveDate) -> Option<Occurrence> {
    let mut candidates: Vec<Occurrence> = event
        .overrides
        .values()
        .filter(|o| o.start.date_naive() == today)
        .map(|o| Occurrence {
            title: o.summary.clone(),
            start: o.start,
            end: o.end,
            attendees: o
                .attendees
                .clone()
                .unwrap_or_else(|| event.attendees.clone()),
        })
        .collect();
    if event.start.date_naive() == today && !event.overrides.contains_key(&today) {
        candidates.push(Occurrence {
            title: event.summary.clone(),
            start: event.start,
            end: event.end,
            attendees: event.attendees.clone(),
        });
    }
    candidates.into_iter().min_by_key(|c| (c.start, c.end))
}

/// Drops occurrences the viewer has declined. Pure and order-preserving.
pub fn retain_relevant(occurrences: Vec<Occurrence>, viewer: &str) -> Vec<Occurrence> {
    occurrences
        .into_iter()
        .filter(|o| o.viewer_response(viewer) != ResponseStatus::Declined)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AttendeeResponses, EventOverride};
    use chrono::Duration;
    use chrono_tz::Tz;
    use chrono_tz::UTC;
    use maplit::hashmap;
    use std::collections::HashMap;

    const VIEWER: &str = "viewer@example.com";

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 3).unwrap()
    }

    fn at(day: u32, hour: u32, minute: u32) -> DateTime<Tz> {
        UTC.with_ymd_and_hms(2024, 6, day, hour, minute, 0).unwrap()
    }

    fn event(uid: &str, summary: &str, start: DateTime<Tz>, end: DateTime<Tz>) -> Event {
        Event {
            uid: uid.to_string(),
            summary: summary.to_string(),
            start,
            end,
            overrides: HashMap::new(),
            attendees: AttendeeResponses::new(),
        }
    }

    fn moved(summary: &str, start: DateTime<Tz>, end: DateTime<Tz>) -> EventOverride {
        EventOverride {
            summary: summary.to_string(),
            start,
            end,
            attendees: None,
        }
    }

    #[test]
    fn primary_instance_on_today_is_included() {
        let events = vec![event("a", "Team Sync", at(3, 14, 0), at(3, 14, 30))];
        let occurrences = expand_today(&events, today());
        assert_eq!(1, occurrences.len());
        assert_eq!("Team Sync", occurrences[0].title);
    }

    #[test]
    fn events_on_other_days_contribute_nothing() {
        let events = vec![event("a", "Tomorrow", at(4, 14, 0), at(4, 14, 30))];
        assert!(expand_today(&events, today()).is_empty());
    }

    #[test]
    fn exception_replaces_the_primary_instance_on_its_date() {
        let mut series = event("rec", "Design/Review", at(3, 9, 0), at(3, 9, 30));
        series.overrides.insert(
            today(),
            moved("Design/Review (moved)", at(3, 10, 0), at(3, 10, 30)),
        );
        let occurrences = expand_today(&[series], today());
        assert_eq!(1, occurrences.len());
        assert_eq!("Design/Review (moved)", occurrences[0].title);
        assert_eq!(at(3, 10, 0), occurrences[0].start);
    }

    #[test]
    fn exception_can_move_an_instance_out_of_today() {
        let mut series = event("rec", "Standup", at(3, 9, 0), at(3, 9, 15));
        series
            .overrides
            .insert(today(), moved("Standup", at(4, 9, 0), at(4, 9, 15)));
        assert!(expand_today(&[series], today()).is_empty());
    }

    #[test]
    fn exception_can_move_an_instance_into_today() {
        let mut series = event("rec", "Standup", at(1, 9, 0), at(1, 9, 15));
        series
            .overrides
            .insert(today(), moved("Standup (late)", at(3, 16, 0), at(3, 16, 15)));
        let occurrences = expand_today(&[series], today());
        assert_eq!(1, occurrences.len());
        assert_eq!("Standup (late)", occurrences[0].title);
    }

    #[test]
    fn at_most_one_occurrence_per_event_per_day() {
        // the primary lands today and an exception for another date moved in
        let mut series = event("rec", "Standup", at(3, 11, 0), at(3, 11, 15));
        series.overrides.insert(
            NaiveDate::from_ymd_opt(2024, 6, 2).unwrap(),
            moved("Standup (shifted)", at(3, 9, 0), at(3, 9, 15)),
        );
        let occurrences = expand_today(&[series], today());
        assert_eq!(1, occurrences.len());
        // the earliest start wins
        assert_eq!("Standup (shifted)", occurrences[0].title);
    }

    #[test]
    fn exception_inherits_the_primary_attendees_unless_it_restates_them() {
        let mut series = event("rec", "Standup", at(1, 9, 0), at(1, 9, 15));
        series.attendees = hashmap! {
            VIEWER.to_string() => ResponseStatus::Accepted,
            "other@example.com".to_string() => ResponseStatus::Declined,
        };
        series
            .overrides
            .insert(today(), moved("Standup", at(3, 9, 0), at(3, 9, 15)));
        let inherited = expand_today(&[series.clone()], today());
        assert_eq!(series.attendees, inherited[0].attendees);

        let restated = hashmap! { VIEWER.to_string() => ResponseStatus::Declined };
        series.overrides.get_mut(&today()).unwrap().attendees = Some(restated.clone());
        let own = expand_today(&[series], today());
        assert_eq!(restated, own[0].attendees);
    }

    #[test]
    fn declined_occurrences_are_dropped() {
        let start = at(3, 14, 0);
        let make = |attendees: AttendeeResponses| Occurrence {
            title: "X".to_string(),
            start,
            end: start + Duration::minutes(30),
            attendees,
        };
        let occurrences = vec![
            // solo entry counts regardless of whose identity it names
            make(hashmap! { "anyone@example.com".to_string() => ResponseStatus::Declined }),
            make(hashmap! {
                VIEWER.to_string() => ResponseStatus::Declined,
                "other@example.com".to_string() => ResponseStatus::Accepted,
            }),
            make(hashmap! {
                "a@example.com".to_string() => ResponseStatus::Declined,
                "b@example.com".to_string() => ResponseStatus::Declined,
            }),
            make(hashmap! { VIEWER.to_string() => ResponseStatus::Tentative }),
            make(AttendeeResponses::new()),
        ];
        let kept = retain_relevant(occurrences, VIEWER);
        let titles_kept = kept.len();
        // the viewer-declined and the solo-declined entries are gone; the
        // multi-attendee event without a viewer entry stays
        assert_eq!(3, titles_kept);
    }

    #[test]
    fn filter_preserves_order() {
        let make = |hour: u32| Occurrence {
            title: format!("ev-{}", hour),
            start: at(3, hour, 0),
            end: at(3, hour, 30),
            attendees: AttendeeResponses::new(),
        };
        let kept = retain_relevant(vec![make(9), make(11), make(10)], VIEWER);
        let titles: Vec<&str> = kept.iter().map(|o| o.title.as_str()).collect();
        assert_eq!(vec!["ev-9", "ev-11", "ev-10"], titles);
    }
}
