use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use chrono_tz::Tz;
use directories::ProjectDirs;
use log::info;

use crate::domain::CalendarError;
use crate::indicator::{PanelConfig, TileKind, TileSurface, Watcher};
use crate::present::Intensity;

mod cache;
mod domain;
mod feed;
mod ical_util;
mod indicator;
mod occurrence;
mod present;
mod selection;

/// Stands in for the physical surface when running from a terminal.
struct ConsoleTile {
    label: &'static str,
}

impl TileSurface for ConsoleTile {
    fn set_title(&mut self, title: &str) {
        println!("[{}] {}", self.label, title.replace('\n', " | "));
    }

    fn set_image(&mut self, intensity: Intensity) {
        println!("[{}] intensity {:?}", self.label, intensity);
    }
}

fn get_config_directory() -> Option<PathBuf> {
    ProjectDirs::from("com", "isaac", "cal-watcher").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Loads `cal_watcher_config.env` from the project config directory when it
/// exists; the process environment always applies on top.
fn load_config_file() {
    if let Some(config_file) = get_config_directory().map(|dir| dir.join("cal_watcher_config.env")) {
        if config_file.exists() {
            if let Err(e) = dotenvy::from_path(&config_file) {
                eprintln!(
                    "Can not load configuration file {}: {}",
                    config_file.display(),
                    e
                );
            }
        }
    }
}

fn config_from_env() -> Result<PanelConfig, CalendarError> {
    let url = dotenvy::var("CAL_WATCHER_ICAL_URL")
        .map_err(|_| CalendarError::Config("CAL_WATCHER_ICAL_URL must be set".to_string()))?;
    let viewer = dotenvy::var("CAL_WATCHER_VIEWER_EMAIL")
        .map_err(|_| CalendarError::Config("CAL_WATCHER_VIEWER_EMAIL must be set".to_string()))?;
    let mut config = PanelConfig::new(&url, &viewer);
    if let Ok(tz) = dotenvy::var("CAL_WATCHER_LOCAL_TIMEZONE") {
        config.timezone = tz
            .parse::<Tz>()
            .map_err(|_| CalendarError::Config(format!("'{}' is not a recognized IANA timezone", tz)))?;
    }
    if let Ok(seconds) = dotenvy::var("CAL_WATCHER_POLL_INTERVAL_SECONDS") {
        let seconds: u64 = seconds.parse().map_err(|_| {
            CalendarError::Config(
                "CAL_WATCHER_POLL_INTERVAL_SECONDS must be a positive integer".to_string(),
            )
        })?;
        config.poll_interval = Duration::from_secs(seconds);
    }
    if let Ok(seconds) = dotenvy::var("CAL_WATCHER_STALE_SECONDS") {
        let seconds: i64 = seconds.parse().map_err(|_| {
            CalendarError::Config("CAL_WATCHER_STALE_SECONDS must be a positive integer".to_string())
        })?;
        config.stale_after = chrono::Duration::seconds(seconds);
    }
    Ok(config)
}

fn main() -> Result<(), CalendarError> {
    env_logger::init();
    load_config_file();
    let config = config_from_env()?;
    info!(
        "watching calendar at {} for {}",
        config.calendar_url, config.viewer_email
    );
    let watcher = Watcher::new(config)?;
    let _next = watcher.tile_visible(TileKind::NextEvent, Box::new(ConsoleTile { label: "next" }));
    let _current = watcher.tile_visible(
        TileKind::CurrentEvent,
        Box::new(ConsoleTile { label: "current" }),
    );
    loop {
        thread::park();
    }
}
