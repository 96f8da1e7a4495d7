use chrono::prelude::*;
use chrono_tz::Tz;

use crate::domain::Occurrence;

/// Tile column width in characters.
const TILE_WIDTH: usize = 8;
/// Maximum title lines before the ellipsis kicks in.
const MAX_TITLE_LINES: usize = 4;
/// Inserted after every slash so compound words can break there instead of
/// overflowing the column.
const SLASH_BREAK: char = '\u{200D}';

/// Discrete urgency tier driving the tile's color cue. The surface maps
/// tiers to its pre-supplied image assets; `None` clears the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intensity {
    None,
    Low,
    Medium,
    High,
    Critical,
}

/// Whether the countdown runs toward the occurrence's start (the upcoming
/// tile) or its end (the in-progress tile).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferencePoint {
    Start,
    End,
}

/// What a tile should display: title lines top to bottom, and an intensity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tile {
    pub title_lines: Vec<String>,
    pub intensity: Intensity,
}

impl Tile {
    pub fn title(&self) -> String {
        self.title_lines.join("\n")
    }
}

/// Formats an occurrence and the remaining time into a tile.
pub fn present(occurrence: &Occurrence, reference: ReferencePoint, now: DateTime<Tz>) -> Tile {
    match reference {
        ReferencePoint::Start => {
            let minutes = occurrence.start.signed_duration_since(now).num_minutes();
            let mut title_lines = clamp_lines(wrap_title(&occurrence.title));
            title_lines.push(format!("in {}", format_minutes(minutes)));
            Tile {
                title_lines,
                intensity: Intensity::None,
            }
        }
        ReferencePoint::End => {
            let minutes = occurrence.end.signed_duration_since(now).num_minutes();
            Tile {
                title_lines: vec![format_minutes(minutes), "left".to_string()],
                intensity: intensity_for(minutes),
            }
        }
    }
}

/// Shown on the upcoming tile when nothing else is scheduled today.
pub fn no_events_tile() -> Tile {
    Tile {
        title_lines: vec!["No".to_string(), "events".to_string(), "left".to_string()],
        intensity: Intensity::None,
    }
}

/// Shown on the in-progress tile when no event contains the current instant.
pub fn nothing_now_tile() -> Tile {
    Tile {
        title_lines: vec!["Nothing".to_string(), "now".to_string()],
        intensity: Intensity::None,
    }
}

/// Shown while the very first refresh has not succeeded yet.
pub fn unavailable_tile() -> Tile {
    Tile {
        title_lines: vec!["Calendar".to_string(), "error".to_string()],
        intensity: Intensity::None,
    }
}

fn intensity_for(minutes_left: i64) -> Intensity {
    if minutes_left <= 1 {
        Intensity::Critical
    } else if minutes_left <= 5 {
        Intensity::High
    } else if minutes_left <= 10 {
        Intensity::Medium
    } else {
        Intensity::Low
    }
}

fn format_minutes(minutes: i64) -> String {
    if minutes < 60 {
        format!("{}m", minutes)
    } else {
        format!("{}h {}m", minutes / 60, minutes % 60)
    }
}

/// Greedy word-wrap to the tile width. Break opportunities are whitespace
/// and the zero-width joiner escape after slashes; the joiner is consumed
/// when a break happens at it and kept otherwise. Words longer than the
/// width overflow on their own line rather than being cut.
fn wrap_title(title: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    let mut line = String::new();
    let mut line_len = 0usize;
    for word in title.split_whitespace() {
        let escaped = word.replace('/', "/\u{200D}");
        for (i, fragment) in escaped.split(SLASH_BREAK).enumerate() {
            let fragment_len = fragment.chars().count();
            let (joiner, joiner_len) = if line_len == 0 {
                ("", 0)
            } else if i == 0 {
                (" ", 1)
            } else {
                // continuation of a slash-split word, invisible join
                ("\u{200D}", 0)
            };
            if line_len > 0 && line_len + joiner_len + fragment_len > TILE_WIDTH {
                lines.push(std::mem::take(&mut line));
                line.push_str(fragment);
                line_len = fragment_len;
            } else {
                line.push_str(joiner);
                line.push_str(fragment);
                line_len += joiner_len + fragment_len;
            }
        }
    }
    if !line.is_empty() || lines.is_empty() {
        lines.push(line);
    }
    lines
}

/// More than 4 lines collapse to 3 plus an ellipsis marker; fewer than 4
/// get one trailing blank line so the time line lands on a consistent row.
fn clamp_lines(mut lines: Vec<String>) -> Vec<String> {
    if lines.len() > MAX_TITLE_LINES {
        lines.truncate(MAX_TITLE_LINES - 1);
        lines.push("…".to_string());
    } else if lines.len() < MAX_TITLE_LINES {
        lines.push(String::new());
    }
    lines
}
