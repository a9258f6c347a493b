mod error;
pub(crate) mod model;
pub(crate) mod observer;
pub(crate) mod probe;
mod progress;
pub(crate) mod scan;
pub(crate) mod schedule;
mod sync;

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::Result;
use tracing::{debug, info};

use crate::db::{Database, PlanSummary};

pub(crate) use self::error::CatalogError;
pub(crate) use self::sync::SyncReport;

use self::model::{Chapter, ChapterTree, Course, CourseTree, Video, WatchStatus};
use self::observer::CatalogObserver;
use self::probe::DurationProbe;
use self::scan::Scanner;
use self::schedule::{AdvisoryLevel, DayPlan, ViewingPlan};
use self::sync::path_string;

/// Entry points of the catalog: syncing folders, tracking progress and
/// planning. Every call runs to completion on the caller's thread.
pub(crate) struct Catalog<'a> {
    db: &'a Database,
    probe: &'a dyn DurationProbe,
    observer: &'a dyn CatalogObserver,
    probe_workers: usize,
}

impl<'a> Catalog<'a> {
    pub(crate) fn new(
        db: &'a Database,
        probe: &'a dyn DurationProbe,
        observer: &'a dyn CatalogObserver,
        probe_workers: usize,
    ) -> Self {
        Self {
            db,
            probe,
            observer,
            probe_workers,
        }
    }

    fn scanner(&self) -> Scanner<'a> {
        Scanner::new(self.probe, self.observer, self.probe_workers)
    }

    /// Registers the folder as a course (or rescans it when already known)
    /// and syncs its content.
    pub(crate) fn select_and_sync(&self, root: &Path) -> Result<(Course, SyncReport)> {
        let root = fs::canonicalize(root)
            .ok()
            .filter(|path| path.is_dir())
            .ok_or_else(|| CatalogError::MissingRoot(root.display().to_string()))?;
        let root_path = path_string(&root);

        if let Some(course) = self.db.course_by_root(&root_path)? {
            info!(course = %course.name, "folder already registered, rescanning");
            return self.rescan(course.id);
        }

        let name = root
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| root_path.clone());
        if let Some(existing) = self.db.course_by_name(&name)? {
            return Err(CatalogError::NameConflict {
                name,
                existing_root: existing.root_path,
            }
            .into());
        }

        let scan = self.scanner().scan(&root)?;
        let (course_id, report) = self.db.in_transaction(|db| {
            let course_id = db.insert_course(&name, &root_path)?;
            let course = db
                .course(course_id)?
                .ok_or(CatalogError::CourseNotFound(course_id))?;
            let report = sync::apply_scan(db, &course, &scan, self.observer)?;
            Ok((course_id, report))
        })?;

        self.finish_sync(course_id, report)
    }

    pub(crate) fn rescan(&self, course_id: i64) -> Result<(Course, SyncReport)> {
        let course = self.require_course(course_id)?;
        let scan = self.scanner().scan(Path::new(&course.root_path))?;
        let report = self
            .db
            .in_transaction(|db| sync::apply_scan(db, &course, &scan, self.observer))?;

        self.finish_sync(course_id, report)
    }

    fn finish_sync(&self, course_id: i64, report: SyncReport) -> Result<(Course, SyncReport)> {
        let course = self.require_course(course_id)?;
        info!(
            course = %course.name,
            chapters_created = report.chapters_created,
            chapters_updated = report.chapters_updated,
            chapters_deleted = report.chapters_deleted,
            videos_created = report.videos_created,
            videos_updated = report.videos_updated,
            videos_deleted = report.videos_deleted,
            total_seconds = report.total_duration_seconds,
            "sync applied"
        );
        if report.change_count() > 0 {
            self.observer.on_catalog_changed(course_id);
        }
        Ok((course, report))
    }

    pub(crate) fn generate_schedule(
        &self,
        course_id: i64,
        num_days: u32,
        max_daily_seconds: f64,
    ) -> Result<ViewingPlan> {
        self.require_course(course_id)?;
        let items = self.db.schedule_items(course_id)?;
        let plan = schedule::generate(&items, num_days, max_daily_seconds)?;

        for advisory in &plan.advisories {
            match advisory.level() {
                AdvisoryLevel::Info => debug!(course_id, "{advisory}"),
                AdvisoryLevel::Warning => info!(course_id, "{advisory}"),
            }
        }
        Ok(plan)
    }

    /// Applies a watched-status change. Invalid input leaves the row untouched.
    pub(crate) fn update_progress(
        &self,
        video_id: i64,
        status: WatchStatus,
        watched_input: Option<&str>,
    ) -> Result<Video> {
        let video = self
            .db
            .video(video_id)?
            .ok_or(CatalogError::VideoNotFound(video_id))?;
        let watch = progress::resolve_watch_state(video.duration_seconds, status, watched_input)?;

        if !self
            .db
            .set_watch_state(video.id, watch, video.duration_seconds)?
        {
            return Err(CatalogError::VideoNotFound(video_id).into());
        }
        info!(video = %video.name, status = %watch.status(), "progress updated");
        if let Some(course_id) = self.db.video_owner(&video.file_path)? {
            self.observer.on_catalog_changed(course_id);
        }
        Ok(Video { watch, ..video })
    }

    pub(crate) fn list_courses(&self) -> Result<Vec<Course>> {
        self.db.list_courses()
    }

    pub(crate) fn delete_course(&self, course_id: i64) -> Result<Course> {
        let course = self.require_course(course_id)?;
        if !self.db.delete_course(course_id)? {
            return Err(CatalogError::CourseNotFound(course_id).into());
        }
        info!(course = %course.name, "course deleted");
        self.observer.on_catalog_changed(course_id);
        Ok(course)
    }

    pub(crate) fn course_tree(&self, course_id: i64) -> Result<CourseTree> {
        let course = self.require_course(course_id)?;

        let mut videos_by_chapter: HashMap<i64, Vec<Video>> = HashMap::new();
        for video in self.db.videos_for_course(course_id)? {
            videos_by_chapter
                .entry(video.chapter_id)
                .or_default()
                .push(video);
        }
        let mut chapters_by_parent: HashMap<Option<i64>, Vec<Chapter>> = HashMap::new();
        for chapter in self.db.chapters_for_course(course_id)? {
            chapters_by_parent
                .entry(chapter.parent_id)
                .or_default()
                .push(chapter);
        }

        let roots = chapters_by_parent.remove(&None).unwrap_or_default();
        let chapters = roots
            .into_iter()
            .map(|chapter| build_tree(chapter, &mut chapters_by_parent, &mut videos_by_chapter))
            .collect();
        Ok(CourseTree { course, chapters })
    }

    pub(crate) fn save_plan(
        &self,
        course_id: i64,
        num_days: u32,
        max_daily_seconds: f64,
        plan: &ViewingPlan,
    ) -> Result<i64> {
        self.require_course(course_id)?;
        self.db
            .save_plan(course_id, num_days, max_daily_seconds, plan)
    }

    pub(crate) fn saved_plans(&self, course_id: i64) -> Result<Vec<PlanSummary>> {
        self.require_course(course_id)?;
        self.db.list_plans(course_id)
    }

    pub(crate) fn saved_plan(&self, course_id: i64, plan_id: i64) -> Result<Vec<DayPlan>> {
        self.require_course(course_id)?;
        self.db.plan_days(course_id, plan_id)?.ok_or_else(|| {
            CatalogError::InvalidInput(format!("plan {plan_id} does not belong to course {course_id}"))
                .into()
        })
    }

    fn require_course(&self, course_id: i64) -> Result<Course> {
        Ok(self
            .db
            .course(course_id)?
            .ok_or(CatalogError::CourseNotFound(course_id))?)
    }
}

fn build_tree(
    chapter: Chapter,
    chapters_by_parent: &mut HashMap<Option<i64>, Vec<Chapter>>,
    videos_by_chapter: &mut HashMap<i64, Vec<Video>>,
) -> ChapterTree {
    let videos = videos_by_chapter.remove(&chapter.id).unwrap_or_default();
    let children = chapters_by_parent
        .remove(&Some(chapter.id))
        .unwrap_or_default()
        .into_iter()
        .map(|child| build_tree(child, chapters_by_parent, videos_by_chapter))
        .collect();
    ChapterTree {
        chapter,
        videos,
        children,
    }
}
