use std::sync::{Condvar, Mutex};

use chrono::prelude::*;
use chrono::Duration;
use chrono_tz::Tz;
use log::{debug, warn};

use crate::domain::{normalize_identity, CalendarError, Occurrence};
use crate::feed::{parse_feed, FeedSource};
use crate::occurrence::{expand_today, retain_relevant};

/// The cached day: today's relevant occurrences sorted by (start, end)
/// ascending. Replaced wholesale on each successful refresh, never mutated
/// in place.
#[derive(Debug, Clone)]
pub struct CacheState {
    pub occurrences: Vec<Occurrence>,
    pub fetched_at: DateTime<Tz>,
    pub source_url: String,
}

#[derive(Default)]
struct CacheInner {
    state: Option<CacheState>,
    refresh_in_flight: bool,
    last_error: Option<CalendarError>,
}

/// Process-wide occurrence cache shared by both tiles.
///
/// Owns the fetch -> expand -> filter cycle and the staleness policy. At
/// most one refresh is in flight at a time; callers arriving while one runs
/// wait for its outcome instead of issuing a second fetch.
pub struct CalendarCache {
    inner: Mutex<CacheInner>,
    refreshed: Condvar,
    source: Box<dyn FeedSource>,
    source_url: String,
    viewer: String,
    timezone: Tz,
    stale_after: Duration,
}

impl CalendarCache {
    pub fn new(
        source: Box<dyn FeedSource>,
        source_url: String,
        viewer_email: &str,
        timezone: Tz,
        stale_after: Duration,
    ) -> CalendarCache {
        CalendarCache {
            inner: Mutex::new(CacheInner::default()),
            refreshed: Condvar::new(),
            source,
            source_url,
            viewer: normalize_identity(viewer_email),
            timezone,
            stale_after,
        }
    }

    /// Returns the cached day, refreshing it first when it is empty or
    /// stale.
    ///
    /// A refresh failure with a prior snapshot is absorbed: the stale
    /// snapshot is served and a warning logged, so the display never
    /// blanks. The same failure with no prior snapshot propagates.
    pub fn get_fresh(&self, now: DateTime<Tz>) -> Result<CacheState, CalendarError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(state) = &inner.state {
            if now - state.fetched_at < self.stale_after {
                return Ok(state.clone());
            }
        }
        if inner.refresh_in_flight {
            while inner.refresh_in_flight {
                inner = self.refreshed.wait(inner).unwrap();
            }
            // the refresh we waited for has completed, serve its outcome
            return match &inner.state {
                Some(state) => Ok(state.clone()),
                None => Err(inner
                    .last_error
                    .clone()
                    .unwrap_or_else(|| CalendarError::Fetch("calendar refresh failed".to_string()))),
            };
        }
        inner.refresh_in_flight = true;
        drop(inner);

        let result = self.run_refresh(now);

        let mut inner = self.inner.lock().unwrap();
        inner.refresh_in_flight = false;
        let outcome = match result {
            Ok(state) => {
                inner.last_error = None;
                inner.state = Some(state.clone());
                Ok(state)
            }
            Err(e) => {
                inner.last_error = Some(e.clone());
                match &inner.state {
                    Some(stale) => {
                        warn!(
                            "calendar refresh failed, keeping {} stale occurrences: {}",
                            stale.occurrences.len(),
                            e
                        );
                        Ok(stale.clone())
                    }
                    None => Err(e),
                }
            }
        };
        self.refreshed.notify_all();
        outcome
    }

    /// Drops the cached day entirely so the next query refetches. Used when
    /// the configuration behind this cache changes.
    pub fn invalidate(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.state = None;
        inner.last_error = None;
    }

    fn run_refresh(&self, now: DateTime<Tz>) -> Result<CacheState, CalendarError> {
        let today = now.with_timezone(&self.timezone).date_naive();
        let text = self.source.fetch()?;
        let events = parse_feed(&text, self.timezone)?;
        let expanded = expand_today(&events, today);
        let mut occurrences = retain_relevant(expanded, &self.viewer);
        occurrences.sort_by_key(|o| (o.start, o.end));
        debug!(
            "refreshed calendar: {} events in feed, {} occurrences today",
            events.len(),
            occurrences.len()
        );
        Ok(CacheState {
            occurrences,
            fetched_at: now,
            source_url: self.source_url.clone(),
        })
    }
}
