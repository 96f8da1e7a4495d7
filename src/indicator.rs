use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration as StdDuration;

use chrono::prelude::*;
use chrono_tz::Tz;
use log::warn;

use crate::cache::CalendarCache;
use crate::domain::CalendarError;
use crate::feed::{FeedSource, HttpFeedSource};
use crate::present::{
    no_events_tile, nothing_now_tile, present, unavailable_tile, Intensity, ReferencePoint, Tile,
};
use crate::selection::select;

/// Time between two tile redraws.
const DEFAULT_POLL_INTERVAL: StdDuration = StdDuration::from_secs(60);
/// Cached feed data older than this is refetched on the next tick.
const DEFAULT_STALE_AFTER_MINUTES: i64 = 10;

/// Wall clock pinned to the configured timezone. Injected so tests control
/// "now".
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Tz>;
}

pub struct SystemClock {
    pub timezone: Tz,
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.timezone)
    }
}

/// The rendering side of a tile. Implemented by the panel collaborator;
/// `set_image` receives `Intensity::None` to clear the color cue.
pub trait TileSurface: Send {
    fn set_title(&mut self, title: &str);
    fn set_image(&mut self, intensity: Intensity);
}

/// Which of the two indicators a poll loop drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileKind {
    NextEvent,
    CurrentEvent,
}

/// Recognized panel options plus engine tunables.
#[derive(Debug, Clone)]
pub struct PanelConfig {
    pub calendar_url: String,
    pub viewer_email: String,
    pub timezone: Tz,
    pub poll_interval: StdDuration,
    pub stale_after: chrono::Duration,
}

impl PanelConfig {
    pub fn new(calendar_url: &str, viewer_email: &str) -> PanelConfig {
        PanelConfig {
            calendar_url: calendar_url.to_string(),
            viewer_email: viewer_email.to_string(),
            timezone: chrono_tz::UTC,
            poll_interval: DEFAULT_POLL_INTERVAL,
            stale_after: chrono::Duration::minutes(DEFAULT_STALE_AFTER_MINUTES),
        }
    }

    fn validate(&self) -> Result<(), CalendarError> {
        if !self.calendar_url.starts_with("http://") && !self.calendar_url.starts_with("https://") {
            return Err(CalendarError::Config(format!(
                "calendar url must be an http(s) url, got '{}'",
                self.calendar_url
            )));
        }
        if self.viewer_email.trim().is_empty() || self.viewer_email.contains(char::is_whitespace) {
            return Err(CalendarError::Config(
                "viewer email must be a non-empty identity without whitespace".to_string(),
            ));
        }
        Ok(())
    }
}

/// The engine behind both tiles: one shared occurrence cache, one poll loop
/// per visible tile.
pub struct Watcher {
    cache: Arc<CalendarCache>,
    clock: Arc<dyn Clock>,
    poll_interval: StdDuration,
}

impl Watcher {
    /// Validates the configuration and wires the engine against the real
    /// feed and clock. A configuration error here is terminal: no poll
    /// loop is started until the panel supplies corrected settings.
    pub fn new(config: PanelConfig) -> Result<Watcher, CalendarError> {
        config.validate()?;
        let source = Box::new(HttpFeedSource::new(&config.calendar_url));
        let clock: Arc<dyn Clock> = Arc::new(SystemClock {
            timezone: config.timezone,
        });
        Ok(Watcher::assemble(config, source, clock))
    }

    /// Same wiring with the feed source and clock substituted.
    pub fn with_parts(
        config: PanelConfig,
        source: Box<dyn FeedSource>,
        clock: Arc<dyn Clock>,
    ) -> Result<Watcher, CalendarError> {
        config.validate()?;
        Ok(Watcher::assemble(config, source, clock))
    }

    fn assemble(config: PanelConfig, source: Box<dyn FeedSource>, clock: Arc<dyn Clock>) -> Watcher {
        let cache = CalendarCache::new(
            source,
            config.calendar_url.clone(),
            &config.viewer_email,
            config.timezone,
            config.stale_after,
        );
        Watcher {
            cache: Arc::new(cache),
            clock,
            poll_interval: config.poll_interval,
        }
    }

    /// The tile became visible: render immediately, then keep polling until
    /// the returned handle is hidden.
    pub fn tile_visible(&self, kind: TileKind, mut surface: Box<dyn TileSurface>) -> TileHandle {
        let cache = Arc::clone(&self.cache);
        let clock = Arc::clone(&self.clock);
        let poll_interval = self.poll_interval;
        let (stop_tx, stop_rx) = mpsc::channel();
        let worker = thread::spawn(move || loop {
            let tile = render_tick(kind, &cache, clock.now());
            surface.set_title(&tile.title());
            surface.set_image(tile.intensity);
            match stop_rx.recv_timeout(poll_interval) {
                Err(mpsc::RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
        });
        TileHandle {
            stop: stop_tx,
            worker: Some(worker),
        }
    }
}

/// Cancellation handle for one tile's poll loop.
pub struct TileHandle {
    stop: mpsc::Sender<()>,
    worker: Option<thread::JoinHandle<()>>,
}

impl TileHandle {
    /// The tile became hidden: no tick fires after this returns. An
    /// in-flight fetch is not aborted, the loop just never reschedules.
    pub fn hide(mut self) {
        let _ = self.stop.send(());
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// One display tick: read the cache, pick current/next, format the tile.
/// Pure apart from the cache refresh it may trigger.
pub fn render_tick(kind: TileKind, cache: &CalendarCache, now: DateTime<Tz>) -> Tile {
    let state = match cache.get_fresh(now) {
        Ok(state) => state,
        Err(e) => {
            warn!("calendar unavailable, nothing to display yet: {}", e);
            return unavailable_tile();
        }
    };
    let selection = select(&state.occurrences, now);
    match kind {
        TileKind::NextEvent => match selection.next {
            Some(occurrence) => present(&occurrence, ReferencePoint::Start, now),
            None => no_events_tile(),
        },
        TileKind::CurrentEvent => match selection.current {
            Some(occurrence) => present(&occurrence, ReferencePoint::End, now),
            None => nothing_now_tile(),
        },
    }
}
