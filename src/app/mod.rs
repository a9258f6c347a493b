mod format;


use std::path::Path;

use anyhow::Result;
use tracing::debug;

use crate::catalog::{Catalog, SyncReport};
use crate::catalog::model::{ChapterTree, WatchStatus};
use crate::catalog::observer::ConsoleObserver;
use crate::catalog::probe::FfprobeProbe;
use crate::catalog::schedule::{AdvisoryLevel, DayPlan, ViewingPlan};
use crate::cli::{Cli, Command, PlanArgs, StatusArg};
use crate::config::Settings;
use crate::db::Database;

use self::format::{
    format_duration_hm, format_offset, format_percent, format_timestamp_display, format_watch,
    truncate,
};

pub fn run(cli: Cli) -> Result<()> {
    let settings = Settings::load(&cli)?;
    debug!(
        database = %settings.database.display(),
        ffprobe = %settings.ffprobe.display(),
        probe_workers = settings.probe_workers,
        "settings resolved"
    );
    let db = open_db(&settings.database)?;
    let probe = FfprobeProbe::new(settings.ffprobe.clone());
    let catalog = Catalog::new(&db, &probe, &ConsoleObserver, settings.probe_workers);

    match cli.command {
        Some(Command::Add { path }) => run_add(&catalog, &path)?,
        Some(Command::Rescan { course_id }) => run_rescan(&catalog, course_id)?,
        Some(Command::Show { course_id }) => run_show(&catalog, course_id)?,
        Some(Command::Delete { course_id }) => run_delete(&catalog, course_id)?,
        Some(Command::Progress {
            video_id,
            status,
            seconds,
        }) => run_progress(&catalog, video_id, status, seconds.as_deref())?,
        Some(Command::Plan(args)) => run_plan(&catalog, &args)?,
        Some(Command::Plans { course_id, show }) => run_plans(&catalog, course_id, show)?,
        Some(Command::List) | None => run_list(&catalog)?,
    }

    Ok(())
}

fn run_add(catalog: &Catalog<'_>, path: &Path) -> Result<()> {
    let (course, report) = catalog.select_and_sync(path)?;
    println!("Course #{}: {}", course.id, course.name);
    println!("  Folder: {}", course.root_path);
    print_sync_report(&report);
    Ok(())
}

fn run_rescan(catalog: &Catalog<'_>, course_id: i64) -> Result<()> {
    let (course, report) = catalog.rescan(course_id)?;
    println!("Rescanned {}", course.name);
    print_sync_report(&report);
    Ok(())
}

fn print_sync_report(report: &SyncReport) {
    println!(
        "  Chapters: {} new, {} updated, {} removed",
        report.chapters_created, report.chapters_updated, report.chapters_deleted
    );
    println!(
        "  Videos:   {} new, {} updated, {} removed",
        report.videos_created, report.videos_updated, report.videos_deleted
    );
    println!(
        "  Total duration: {}",
        format_duration_hm(report.total_duration_seconds)
    );
    if !report.warnings.is_empty() {
        println!("  {} warning(s) while scanning.", report.warnings.len());
    }
    if report.change_count() == 0 {
        println!("  Catalog already up to date.");
    }
}

fn run_list(catalog: &Catalog<'_>) -> Result<()> {
    let courses = catalog.list_courses()?;
    if courses.is_empty() {
        println!("No courses yet. Run `coursetrack add <DIR>` first.");
        return Ok(());
    }

    println!(
        "{:<6} {:<32} {:<10} {:<24} {:<24}",
        "ID", "NAME", "DURATION", "ADDED", "LAST SYNC"
    );
    for course in courses {
        let last_sync = course
            .last_synced_at
            .as_deref()
            .map(format_timestamp_display)
            .unwrap_or_else(|| "never".to_string());
        println!(
            "{:<6} {:<32} {:<10} {:<24} {:<24}",
            course.id,
            truncate(&course.name, 32),
            format_duration_hm(course.total_duration_seconds),
            format_timestamp_display(&course.created_at),
            last_sync
        );
    }
    Ok(())
}

fn run_show(catalog: &Catalog<'_>, course_id: i64) -> Result<()> {
    let tree = catalog.course_tree(course_id)?;
    let remaining: f64 = tree.chapters.iter().map(remaining_in_tree).sum();
    let total = tree.course.total_duration_seconds;
    println!("{} ({})", tree.course.name, tree.course.root_path);
    println!(
        "Total {} | watched {} | remaining {}",
        format_duration_hm(total),
        format_percent(total - remaining, total),
        format_duration_hm(remaining)
    );
    if tree.chapters.is_empty() {
        println!("No videos found in this course.");
        return Ok(());
    }

    println!(
        "{:<8} {:<48} {:<10} {:<24}",
        "VIDEO", "NAME", "LENGTH", "STATUS"
    );
    for chapter in &tree.chapters {
        print_chapter(chapter, 0);
    }
    Ok(())
}

fn print_chapter(tree: &ChapterTree, depth: usize) {
    let indent = "  ".repeat(depth);
    println!(
        "{indent}[{}] {} ({})",
        tree.chapter.order_in_course,
        tree.chapter.name,
        format_duration_hm(tree.chapter.total_duration_seconds)
    );
    for video in &tree.videos {
        let name = format!("{indent}  {}. {}", video.order_in_chapter, video.name);
        println!(
            "{:<8} {:<48} {:<10} {:<24}",
            video.id,
            truncate(&name, 48),
            format_offset(video.duration_seconds),
            format_watch(video)
        );
    }
    for child in &tree.children {
        print_chapter(child, depth + 1);
    }
}

fn remaining_in_tree(tree: &ChapterTree) -> f64 {
    let own: f64 = tree.videos.iter().map(|video| video.remaining_seconds()).sum();
    own + tree.children.iter().map(remaining_in_tree).sum::<f64>()
}

fn run_delete(catalog: &Catalog<'_>, course_id: i64) -> Result<()> {
    let course = catalog.delete_course(course_id)?;
    println!("Deleted course {} (files on disk are untouched).", course.name);
    Ok(())
}

fn run_progress(
    catalog: &Catalog<'_>,
    video_id: i64,
    status: StatusArg,
    seconds: Option<&str>,
) -> Result<()> {
    let video = catalog.update_progress(video_id, watch_status(status), seconds)?;
    println!("{}: {}", video.name, format_watch(&video));
    Ok(())
}

fn watch_status(status: StatusArg) -> WatchStatus {
    match status {
        StatusArg::Unwatched => WatchStatus::Unwatched,
        StatusArg::Partial => WatchStatus::PartiallyWatched,
        StatusArg::Watched => WatchStatus::Watched,
    }
}

fn run_plan(catalog: &Catalog<'_>, args: &PlanArgs) -> Result<()> {
    let max_daily_seconds = args.max_daily_seconds();
    let plan = catalog.generate_schedule(args.course_id, args.days, max_daily_seconds)?;
    print_plan(&plan);

    if args.save && !plan.days.is_empty() {
        let plan_id = catalog.save_plan(args.course_id, args.days, max_daily_seconds, &plan)?;
        println!("Saved as plan #{plan_id}.");
    }
    Ok(())
}

fn print_plan(plan: &ViewingPlan) {
    for advisory in &plan.advisories {
        match advisory.level() {
            AdvisoryLevel::Info => println!("INFO: {advisory}"),
            AdvisoryLevel::Warning => println!("WARN: {advisory}"),
        }
    }
    if plan.days.is_empty() {
        return;
    }
    print_days(&plan.days);
    println!(
        "Planned {} over {} day(s).",
        format_duration_hm(plan.total_seconds()),
        plan.days.len()
    );
}

fn print_days(days: &[DayPlan]) {
    for day in days {
        println!();
        println!(
            "Day {} ({})",
            day.day,
            format_duration_hm(day.total_allocated_seconds)
        );
        for task in &day.tasks {
            let label = format!("{} / {}", task.chapter_name, task.video_name);
            println!(
                "  {:<56} {:>9} - {:<9} {:>8}",
                truncate(&label, 56),
                format_offset(task.start_offset_seconds),
                format_offset(task.end_offset_seconds),
                format_duration_hm(task.session_duration_seconds)
            );
        }
    }
}

fn run_plans(catalog: &Catalog<'_>, course_id: i64, show: Option<i64>) -> Result<()> {
    if let Some(plan_id) = show {
        let days = catalog.saved_plan(course_id, plan_id)?;
        println!("Plan #{plan_id}");
        print_days(&days);
        return Ok(());
    }

    let plans = catalog.saved_plans(course_id)?;
    if plans.is_empty() {
        println!("No saved plans. Run `coursetrack plan {course_id} --save` first.");
        return Ok(());
    }

    println!(
        "{:<6} {:<24} {:<8} {:<10} {:<10}",
        "PLAN", "CREATED", "DAYS", "PER DAY", "PLANNED"
    );
    for plan in plans {
        println!(
            "{:<6} {:<24} {:<8} {:<10} {:<10}",
            plan.id,
            format_timestamp_display(&plan.created_at),
            format!("{}/{}", plan.day_count, plan.num_days),
            format_duration_hm(plan.max_daily_seconds),
            format_duration_hm(plan.total_seconds)
        );
    }
    Ok(())
}

fn open_db(path: &Path) -> Result<Database> {
    let db = Database::open(path)?;
    db.migrate()?;
    Ok(db)
}
