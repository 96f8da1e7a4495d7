use std::collections::{HashMap, HashSet};
use std::time::Duration;

use chrono::prelude::*;
use chrono_tz::Tz;
use ical::parser::ical::component::{IcalCalendar, IcalEvent};
use ical::property::Property;
use log::{debug, warn};
use multimap::MultiMap;

use crate::domain::{
    normalize_identity, AttendeeResponses, CalendarError, Event, EventOverride, ResponseStatus,
};
use crate::ical_util::{
    find_properties, find_property, find_property_value, first_param_value, is_ical_date,
};

const FETCH_TIMEOUT_SECONDS: u64 = 10;

/// Where the raw feed text comes from. The refresh cache only talks to this
/// seam, so tests can substitute scripted or blocking sources.
pub trait FeedSource: Send + Sync {
    fn fetch(&self) -> Result<String, CalendarError>;
}

/// Fetches the feed over HTTP. No retry logic here, the refresh cache
/// decides when to try again.
pub struct HttpFeedSource {
    url: String,
    agent: ureq::Agent,
}

impl HttpFeedSource {
    pub fn new(url: &str) -> HttpFeedSource {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(FETCH_TIMEOUT_SECONDS)))
            .build()
            .into();
        HttpFeedSource {
            url: url.to_string(),
            agent,
        }
    }
}

impl FeedSource for HttpFeedSource {
    fn fetch(&self) -> Result<String, CalendarError> {
        debug!("fetching calendar from {}", self.url);
        let mut response = self
            .agent
            .get(self.url.as_str())
            .call()
            .map_err(|e| CalendarError::Fetch(format!("error getting ical from url: {}", e)))?;
        response
            .body_mut()
            .read_to_string()
            .map_err(|e| {
                CalendarError::Fetch(format!("error getting calendar response body as text: {}", e))
            })
    }
}

/// One VEVENT after property extraction, before primaries and recurrence
/// exceptions are stitched together.
#[derive(Debug, Clone)]
struct ParsedVevent {
    uid: String,
    summary: Option<String>,
    start: DateTime<Tz>,
    end: DateTime<Tz>,
    attendees: Option<AttendeeResponses>,
    recurrence_date: Option<NaiveDate>,
}

/// Parses feed text into events, with every timestamp converted to
/// `local_tz`.
///
/// A stream that is not parseable as a calendar is a `Parse` error; a single
/// malformed event is dropped with a warning so one broken entry cannot
/// blank the whole feed.
pub fn parse_feed(text: &str, local_tz: Tz) -> Result<Vec<Event>, CalendarError> {
    let calendar = parse_calendar(text)?;
    let mut primaries: Vec<ParsedVevent> = Vec::new();
    let mut exceptions: MultiMap<String, ParsedVevent> = MultiMap::new();
    for ical_event in &calendar.events {
        match parse_component(ical_event, local_tz) {
            Ok(Some(parsed)) => {
                // presence of RECURRENCE-ID marks a recurrence exception
                if parsed.recurrence_date.is_some() {
                    exceptions.insert(parsed.uid.clone(), parsed);
                } else {
                    primaries.push(parsed);
                }
            }
            Ok(None) => {}
            Err(e) => warn!("skipping malformed event: {}", e),
        }
    }
    // An exception whose primary never made it into the feed is a full event
    // on its own. This happens when someone is forwarded just one modified
    // occurrence of a series.
    let primary_uids: HashSet<String> = primaries.iter().map(|p| p.uid.clone()).collect();
    let mut promoted: Vec<ParsedVevent> = Vec::new();
    for (uid, group) in &exceptions {
        if !primary_uids.contains(uid) {
            promoted.extend(group.iter().cloned());
        }
    }
    exceptions.retain(|uid, _| primary_uids.contains(uid));
    primaries.extend(promoted);

    let events = primaries
        .into_iter()
        .map(|primary| {
            let summary = primary.summary.unwrap_or_default();
            let mut overrides = HashMap::new();
            if let Some(group) = exceptions.get_vec(&primary.uid) {
                for exception in group {
                    if let Some(date) = exception.recurrence_date {
                        overrides.insert(
                            date,
                            EventOverride {
                                summary: exception.summary.clone().unwrap_or_else(|| summary.clone()),
                                start: exception.start,
                                end: exception.end,
                                attendees: exception.attendees.clone(),
                            },
                        );
                    }
                }
            }
            Event {
                uid: primary.uid,
                summary,
                start: primary.start,
                end: primary.end,
                overrides,
                attendees: primary.attendees.unwrap_or_default(),
            }
        })
        .collect();
    Ok(events)
}

fn parse_calendar(text: &str) -> Result<IcalCalendar, CalendarError> {
    let mut reader = ical::IcalParser::new(text.as_bytes());
    match reader.next() {
        Some(Ok(calendar)) => Ok(calendar),
        Some(Err(e)) => Err(CalendarError::Parse(format!("error in ical parsing: {:?}", e))),
        None => Err(CalendarError::Parse("feed contains no calendar data".to_string())),
    }
}

// See https://tools.ietf.org/html/rfc5545#section-3.6.1
fn parse_component(
    ical_event: &IcalEvent,
    local_tz: Tz,
) -> Result<Option<ParsedVevent>, CalendarError> {
    let properties = &ical_event.properties;
    let start_prop = find_property(properties, "DTSTART")
        .ok_or_else(|| CalendarError::Parse("event without DTSTART".to_string()))?;
    // Only timed events are considered, an all-day entry never makes a tile.
    if is_ical_date(start_prop) {
        return Ok(None);
    }
    let uid = find_property_value(properties, "UID")
        .ok_or_else(|| CalendarError::Parse("event without UID".to_string()))?;
    let end_prop = find_property(properties, "DTEND")
        .ok_or_else(|| CalendarError::Parse(format!("event {} is missing an end time", uid)))?;
    let start = extract_datetime(start_prop, local_tz)?;
    let end = extract_datetime(end_prop, local_tz)?;
    let summary = find_property_value(properties, "SUMMARY").map(|s| unescape_text(&s));
    let attendees = parse_attendees(properties);
    let recurrence_date = match find_property(properties, "RECURRENCE-ID") {
        Some(prop) if is_ical_date(prop) => Some(parse_ical_date(prop)?),
        Some(prop) => Some(extract_datetime(prop, local_tz)?.date_naive()),
        None => None,
    };
    Ok(Some(ParsedVevent {
        uid,
        summary,
        start,
        end,
        attendees,
        recurrence_date,
    }))
}

/// Normalizes the attendee shapes a feed can carry (a bare value, one
/// value with parameters, or many ATTENDEE lines) into a single identity to
/// response map. `None` when the event lists no attendees at all.
fn parse_attendees(properties: &[Property]) -> Option<AttendeeResponses> {
    let mut attendees = AttendeeResponses::new();
    let mut saw_attendee = false;
    for prop in find_properties(properties, "ATTENDEE") {
        saw_attendee = true;
        let Some(value) = prop.value.as_ref() else {
            continue;
        };
        let status = first_param_value(prop, "PARTSTAT")
            .map(ResponseStatus::from_partstat)
            .unwrap_or(ResponseStatus::Unspecified);
        attendees.insert(normalize_identity(value), status);
    }
    saw_attendee.then_some(attendees)
}

/// A timestamp property can have 3 forms:
/// - zulu time: 20201102T235401Z
/// - an explicit TZID parameter next to a naive timestamp
/// - a naive timestamp, interpreted in the configured local timezone
///
/// See <https://tools.ietf.org/html/rfc5545#section-3.3.5>
fn extract_datetime(prop: &Property, local_tz: Tz) -> Result<DateTime<Tz>, CalendarError> {
    let value = prop
        .value
        .as_ref()
        .ok_or_else(|| CalendarError::Parse(format!("{} property without a value", prop.name)))?;
    if let Some(tzid) = first_param_value(prop, "TZID") {
        let source_tz = tzid.parse::<Tz>().unwrap_or_else(|_| {
            warn!("unknown timezone id '{}', interpreting as local time", tzid);
            local_tz
        });
        return parse_ical_datetime(value, source_tz, local_tz);
    }
    match value.strip_suffix('Z') {
        Some(stripped) => parse_ical_datetime(stripped, chrono_tz::UTC, local_tz),
        None => parse_ical_datetime(value, local_tz, local_tz),
    }
}

/// Parses datetimes of the format 'YYYYMMDDTHHMMSS' in `source_tz` and
/// converts them to `local_tz`.
fn parse_ical_datetime(
    value: &str,
    source_tz: Tz,
    local_tz: Tz,
) -> Result<DateTime<Tz>, CalendarError> {
    let naive = NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S")
        .map_err(|_| CalendarError::Parse(format!("can't parse datetime string '{}'", value)))?;
    source_tz
        .from_local_datetime(&naive)
        .earliest()
        .ok_or_else(|| CalendarError::Parse(format!("datetime '{}' does not exist in {}", value, source_tz)))
        .map(|dt| dt.with_timezone(&local_tz))
}

/// Parses an ical date of the form YYYYMMDD.
///
/// See <https://tools.ietf.org/html/rfc5545#section-3.3.4>
fn parse_ical_date(prop: &Property) -> Result<NaiveDate, CalendarError> {
    let value = prop
        .value
        .as_ref()
        .ok_or_else(|| CalendarError::Parse(format!("{} property without a value", prop.name)))?;
    NaiveDate::parse_from_str(value, "%Y%m%d")
        .map_err(|e| CalendarError::Parse(format!("can't parse date '{}' with cause: {}", value, e)))
}

fn unescape_text(input: &str) -> String {
    input
        .replace("\\n", "\n")
        .replace("\\r", "\r")
        .replace("\\t", "\t")
        .replace("\\,", ",")
        .replace("\\;", ";")
        .replace("\\'", "'")
}
