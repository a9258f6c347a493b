use chrono::{DateTime, Local};

use crate::catalog::model::{Video, WatchState};

pub(crate) fn truncate(s: &str, max: usize) -> String {
    let mut out = s.to_string();
    if out.chars().count() > max {
        out = out.chars().take(max.saturating_sub(3)).collect::<String>() + "...";
    }
    out
}

pub(crate) fn format_timestamp_display(raw: &str) -> String {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| {
            dt.with_timezone(&Local)
                .format("%Y-%m-%d %H:%M %:z")
                .to_string()
        })
        .unwrap_or_else(|_| raw.to_string())
}

/// Position inside a video: `4m05s`, or `1h02m03s` past the hour.
pub(crate) fn format_offset(seconds: f64) -> String {
    let total = whole_seconds(seconds);
    let (hours, minutes, secs) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{hours}h{minutes:02}m{secs:02}s")
    } else {
        format!("{minutes}m{secs:02}s")
    }
}

/// Length of time rounded to minutes: `45m`, `2h 05m`.
pub(crate) fn format_duration_hm(seconds: f64) -> String {
    let minutes = (whole_seconds(seconds) + 30) / 60;
    let (hours, minutes) = (minutes / 60, minutes % 60);
    if hours > 0 {
        format!("{hours}h {minutes:02}m")
    } else {
        format!("{minutes}m")
    }
}

pub(crate) fn format_watch(video: &Video) -> String {
    match video.watch {
        WatchState::Unwatched => "unwatched".to_string(),
        WatchState::Watched => "watched".to_string(),
        WatchState::Partial(_) => format!(
            "partial {}/{}",
            format_offset(video.watched_seconds()),
            format_offset(video.duration_seconds)
        ),
    }
}

pub(crate) fn format_percent(part: f64, whole: f64) -> String {
    if whole <= 0.0 {
        return "-".to_string();
    }
    format!("{:.0}%", (part / whole * 100.0).clamp(0.0, 100.0))
}

fn whole_seconds(seconds: f64) -> u64 {
    if seconds.is_finite() && seconds > 0.0 {
        seconds.round() as u64
    } else {
        0
    }
}
