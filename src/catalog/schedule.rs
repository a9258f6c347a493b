use std::fmt;

use super::CatalogError;
use super::model::{Video, WatchStatus};

/// Time below which a remainder is treated as fully consumed.
pub(crate) const NEGLIGIBLE_SECONDS: f64 = 0.1;

/// One video as seen by the planner, taken from a catalog snapshot.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ScheduleItem {
    pub(crate) video_id: i64,
    pub(crate) chapter_name: String,
    pub(crate) video_name: String,
    pub(crate) status: WatchStatus,
    pub(crate) duration_seconds: f64,
    pub(crate) watched_seconds: f64,
}

impl ScheduleItem {
    pub(crate) fn from_video(chapter_name: String, video: &Video) -> Self {
        Self {
            video_id: video.id,
            chapter_name,
            video_name: video.name.clone(),
            status: video.watch.status(),
            duration_seconds: video.duration_seconds,
            watched_seconds: video.watched_seconds(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SessionTask {
    pub(crate) video_id: Option<i64>,
    pub(crate) chapter_name: String,
    pub(crate) video_name: String,
    pub(crate) start_offset_seconds: f64,
    pub(crate) end_offset_seconds: f64,
    pub(crate) session_duration_seconds: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DayPlan {
    pub(crate) day: u32,
    pub(crate) tasks: Vec<SessionTask>,
    pub(crate) total_allocated_seconds: f64,
}

impl DayPlan {
    pub(crate) fn new(day: u32) -> Self {
        Self {
            day,
            tasks: Vec::new(),
            total_allocated_seconds: 0.0,
        }
    }

    pub(crate) fn push(&mut self, task: SessionTask) {
        self.total_allocated_seconds += task.session_duration_seconds;
        self.tasks.push(task);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AdvisoryLevel {
    Info,
    Warning,
}

/// Non-fatal notes attached to a generated plan.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Advisory {
    AllWatched,
    /// Videos are left but none has measurable unwatched time.
    NothingToSchedule,
    Infeasible {
        num_days: u32,
        max_daily_seconds: f64,
        required_daily_seconds: f64,
    },
    Unscheduled {
        videos: usize,
        seconds: f64,
    },
    Complete,
}

impl Advisory {
    pub(crate) fn level(&self) -> AdvisoryLevel {
        match self {
            Self::AllWatched | Self::NothingToSchedule | Self::Complete => AdvisoryLevel::Info,
            Self::Infeasible { .. } | Self::Unscheduled { .. } => AdvisoryLevel::Warning,
        }
    }
}

impl fmt::Display for Advisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllWatched => f.write_str("All videos in this course have been watched; nothing to schedule."),
            Self::NothingToSchedule => f.write_str(
                "Nothing left to schedule: the remaining videos have no measurable unwatched time.",
            ),
            Self::Infeasible {
                num_days,
                max_daily_seconds,
                required_daily_seconds,
            } => write!(
                f,
                "Completing the course in {num_days} day(s) with {:.0} seconds/day is not possible; \
                 at least {:.0} seconds/day are needed.",
                max_daily_seconds,
                required_daily_seconds.ceil()
            ),
            Self::Unscheduled { videos, seconds } => write!(
                f,
                "With this plan, {videos} video(s) (or parts) totalling {seconds:.0} seconds will remain."
            ),
            Self::Complete => f.write_str("Viewing schedule generated successfully."),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ViewingPlan {
    pub(crate) days: Vec<DayPlan>,
    pub(crate) advisories: Vec<Advisory>,
}

impl ViewingPlan {
    pub(crate) fn total_seconds(&self) -> f64 {
        self.days.iter().map(|day| day.total_allocated_seconds).sum()
    }
}

struct Pending<'a> {
    item: &'a ScheduleItem,
    remaining: f64,
    offset: f64,
}

/// Greedily packs the unwatched time of `items` into at most `num_days`
/// days of `max_daily_seconds` each. `items` must already be in viewing
/// order; watched videos are skipped.
///
/// A day may exceed `max_daily_seconds` by less than `NEGLIGIBLE_SECONDS`
/// when a video's last sliver is folded into that day's chunk.
pub(crate) fn generate(
    items: &[ScheduleItem],
    num_days: u32,
    max_daily_seconds: f64,
) -> Result<ViewingPlan, CatalogError> {
    if num_days == 0 {
        return Err(CatalogError::InvalidInput(
            "number of days must be positive".to_string(),
        ));
    }
    if !max_daily_seconds.is_finite() || max_daily_seconds <= 0.0 {
        return Err(CatalogError::InvalidInput(
            "daily time budget must be a positive number".to_string(),
        ));
    }

    let mut queue = items
        .iter()
        .filter(|item| item.status != WatchStatus::Watched)
        .map(|item| {
            let offset = item.watched_seconds.clamp(0.0, item.duration_seconds.max(0.0));
            Pending {
                item,
                remaining: (item.duration_seconds - offset).max(0.0),
                offset,
            }
        })
        .filter(|pending| pending.remaining >= NEGLIGIBLE_SECONDS)
        .collect::<Vec<_>>();

    let mut advisories = Vec::new();
    if queue.is_empty() {
        let all_watched = !items.is_empty()
            && items.iter().all(|item| item.status == WatchStatus::Watched);
        advisories.push(if all_watched {
            Advisory::AllWatched
        } else {
            Advisory::NothingToSchedule
        });
        return Ok(ViewingPlan {
            days: Vec::new(),
            advisories,
        });
    }

    let total_remaining: f64 = queue.iter().map(|pending| pending.remaining).sum();
    if total_remaining > f64::from(num_days) * max_daily_seconds {
        advisories.push(Advisory::Infeasible {
            num_days,
            max_daily_seconds,
            required_daily_seconds: total_remaining / f64::from(num_days),
        });
    }

    let mut days = Vec::new();
    let mut cursor = 0;
    for day_number in 1..=num_days {
        let mut day = DayPlan::new(day_number);

        while day.total_allocated_seconds < max_daily_seconds && cursor < queue.len() {
            let pending = &mut queue[cursor];
            if pending.remaining < NEGLIGIBLE_SECONDS {
                cursor += 1;
                continue;
            }

            let mut chunk = pending
                .remaining
                .min(max_daily_seconds - day.total_allocated_seconds);
            if chunk < NEGLIGIBLE_SECONDS {
                break;
            }
            // A sliver that would otherwise be dropped rides along with this chunk.
            if pending.remaining - chunk < NEGLIGIBLE_SECONDS {
                chunk = pending.remaining;
            }

            day.push(SessionTask {
                video_id: Some(pending.item.video_id),
                chapter_name: pending.item.chapter_name.clone(),
                video_name: pending.item.video_name.clone(),
                start_offset_seconds: pending.offset,
                end_offset_seconds: pending.offset + chunk,
                session_duration_seconds: chunk,
            });
            pending.remaining -= chunk;
            pending.offset += chunk;

            if pending.remaining < NEGLIGIBLE_SECONDS {
                pending.remaining = 0.0;
                cursor += 1;
            }
        }

        if !day.tasks.is_empty() {
            days.push(day);
        }
        if cursor >= queue.len() {
            break;
        }
    }

    let leftovers = queue[cursor.min(queue.len())..]
        .iter()
        .filter(|pending| pending.remaining >= NEGLIGIBLE_SECONDS)
        .collect::<Vec<_>>();
    if leftovers.is_empty() {
        advisories.push(Advisory::Complete);
    } else {
        advisories.push(Advisory::Unscheduled {
            videos: leftovers.len(),
            seconds: leftovers.iter().map(|pending| pending.remaining).sum(),
        });
    }

    Ok(ViewingPlan { days, advisories })
}
