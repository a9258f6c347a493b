use std::fmt;
use std::str::FromStr;

use super::CatalogError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WatchStatus {
    Unwatched,
    PartiallyWatched,
    Watched,
}

impl WatchStatus {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Unwatched => "Unwatched",
            Self::PartiallyWatched => "PartiallyWatched",
            Self::Watched => "Watched",
        }
    }
}

impl fmt::Display for WatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WatchStatus {
    type Err = CatalogError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim() {
            "Unwatched" => Ok(Self::Unwatched),
            "PartiallyWatched" | "Partially Watched" => Ok(Self::PartiallyWatched),
            "Watched" => Ok(Self::Watched),
            other => Err(CatalogError::InvalidInput(format!(
                "unknown watched status '{other}'"
            ))),
        }
    }
}

/// Watch progress of one video.
///
/// `Partial` carries the resume offset in seconds. `Watched` carries nothing:
/// its watched time is always the video's current duration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum WatchState {
    Unwatched,
    Partial(f64),
    Watched,
}

impl WatchState {
    pub(crate) fn status(self) -> WatchStatus {
        match self {
            Self::Unwatched => WatchStatus::Unwatched,
            Self::Partial(_) => WatchStatus::PartiallyWatched,
            Self::Watched => WatchStatus::Watched,
        }
    }

    pub(crate) fn watched_seconds(self, duration: f64) -> f64 {
        match self {
            Self::Unwatched => 0.0,
            Self::Partial(seconds) => seconds.clamp(0.0, duration.max(0.0)),
            Self::Watched => duration,
        }
    }

    /// Rebuilds the state from its stored columns against the current
    /// duration. A partial offset that a re-probe left at or past the end
    /// reads back as `Watched`; one at or below zero as `Unwatched`.
    pub(crate) fn from_columns(status: WatchStatus, watched_seconds: f64, duration: f64) -> Self {
        match status {
            WatchStatus::Unwatched => Self::Unwatched,
            WatchStatus::PartiallyWatched if watched_seconds >= duration => Self::Watched,
            WatchStatus::PartiallyWatched if watched_seconds <= 0.0 => Self::Unwatched,
            WatchStatus::PartiallyWatched => Self::Partial(watched_seconds),
            WatchStatus::Watched => Self::Watched,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Course {
    pub(crate) id: i64,
    pub(crate) name: String,
    pub(crate) root_path: String,
    pub(crate) total_duration_seconds: f64,
    pub(crate) created_at: String,
    pub(crate) last_synced_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Chapter {
    pub(crate) id: i64,
    pub(crate) course_id: i64,
    pub(crate) parent_id: Option<i64>,
    pub(crate) name: String,
    pub(crate) path: String,
    pub(crate) order_in_course: i64,
    pub(crate) total_duration_seconds: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Video {
    pub(crate) id: i64,
    pub(crate) chapter_id: i64,
    pub(crate) name: String,
    pub(crate) file_path: String,
    pub(crate) duration_seconds: f64,
    pub(crate) order_in_chapter: i64,
    pub(crate) watch: WatchState,
    pub(crate) subtitle_path: Option<String>,
}

impl Video {
    pub(crate) fn watched_seconds(&self) -> f64 {
        self.watch.watched_seconds(self.duration_seconds)
    }

    pub(crate) fn remaining_seconds(&self) -> f64 {
        (self.duration_seconds - self.watched_seconds()).max(0.0)
    }
}

/// A chapter with its videos and nested chapters, ready for display.
#[derive(Debug, Clone)]
pub(crate) struct ChapterTree {
    pub(crate) chapter: Chapter,
    pub(crate) videos: Vec<Video>,
    pub(crate) children: Vec<ChapterTree>,
}

#[derive(Debug, Clone)]
pub(crate) struct CourseTree {
    pub(crate) course: Course,
    pub(crate) chapters: Vec<ChapterTree>,
}

pub(crate) fn durations_match(a: f64, b: f64) -> bool {
    (a - b).abs() < 0.000_001
}
