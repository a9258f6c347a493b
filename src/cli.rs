use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(
    name = "coursetrack",
    version,
    about = "Catalog folders of course videos and plan day-by-day viewing"
)]
pub struct Cli {
    /// Settings file (defaults to <config dir>/coursetrack/config.toml)
    #[arg(long, global = true, env = "COURSETRACK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Catalog database file
    #[arg(long, global = true, env = "COURSETRACK_DB")]
    pub db: Option<PathBuf>,

    /// ffprobe binary used to read video durations
    #[arg(long, global = true)]
    pub ffprobe: Option<PathBuf>,

    /// Number of files probed in parallel
    #[arg(long, global = true)]
    pub workers: Option<usize>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Register a course folder (or rescan it if already known)
    Add { path: PathBuf },
    /// Re-sync a course with its folder
    Rescan { course_id: i64 },
    /// List courses
    List,
    /// Show chapters and videos of a course
    Show { course_id: i64 },
    /// Delete a course and everything under it
    Delete { course_id: i64 },
    /// Set the watched status of a video
    Progress {
        video_id: i64,
        #[arg(value_enum)]
        status: StatusArg,
        /// Watched seconds, required for `partial`
        seconds: Option<String>,
    },
    /// Generate a day-by-day viewing plan
    Plan(PlanArgs),
    /// List saved plans of a course, or show one
    Plans {
        course_id: i64,
        #[arg(long)]
        show: Option<i64>,
    },
}

#[derive(Debug, Args)]
pub struct PlanArgs {
    pub course_id: i64,

    /// Number of days to spread the remaining videos over
    #[arg(long)]
    pub days: u32,

    /// Daily budget in hours (a decimal comma is accepted)
    #[arg(long, value_parser = parse_decimal, conflicts_with = "daily_minutes", required_unless_present = "daily_minutes")]
    pub daily_hours: Option<f64>,

    /// Daily budget in minutes
    #[arg(long, value_parser = parse_decimal)]
    pub daily_minutes: Option<f64>,

    /// Store the generated plan
    #[arg(long)]
    pub save: bool,
}

impl PlanArgs {
    pub fn max_daily_seconds(&self) -> f64 {
        match (self.daily_hours, self.daily_minutes) {
            (Some(hours), _) => hours * 3600.0,
            (None, Some(minutes)) => minutes * 60.0,
            (None, None) => 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StatusArg {
    Unwatched,
    Partial,
    Watched,
}

pub fn parse_decimal(raw: &str) -> Result<f64, String> {
    let value = raw
        .trim()
        .replace(',', ".")
        .parse::<f64>()
        .map_err(|_| format!("'{raw}' is not a number (e.g. 1 or 1.5)"))?;
    if !value.is_finite() || value <= 0.0 {
        return Err(format!("'{raw}' must be a positive number"));
    }
    Ok(value)
}
