use std::collections::HashMap;
use std::path::Path;

use anyhow::Result;
use tracing::debug;

use crate::db::{Database, VideoFields};

use super::model::{Chapter, Course, Video, durations_match};
use super::observer::CatalogObserver;
use super::scan::{ScanResult, ScannedChapter, ScannedVideo};

/// Diff applied by one sync of a course.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct SyncReport {
    pub(crate) chapters_created: usize,
    pub(crate) chapters_updated: usize,
    pub(crate) chapters_deleted: usize,
    pub(crate) videos_created: usize,
    pub(crate) videos_updated: usize,
    pub(crate) videos_deleted: usize,
    pub(crate) total_duration_seconds: f64,
    pub(crate) warnings: Vec<String>,
}

impl SyncReport {
    pub(crate) fn change_count(&self) -> usize {
        self.chapters_created
            + self.chapters_updated
            + self.chapters_deleted
            + self.videos_created
            + self.videos_updated
            + self.videos_deleted
    }
}

/// Merges `scan` into the persisted catalog of `course`.
///
/// Runs no transaction of its own: the caller wraps it so that course
/// creation and the first sync commit together.
pub(crate) fn apply_scan(
    db: &Database,
    course: &Course,
    scan: &ScanResult,
    observer: &dyn CatalogObserver,
) -> Result<SyncReport> {
    let mut state = SyncState {
        db,
        course_id: course.id,
        observer,
        existing_chapters: db
            .chapters_for_course(course.id)?
            .into_iter()
            .map(|chapter| (chapter.path.clone(), chapter))
            .collect(),
        existing_videos: db
            .videos_for_course(course.id)?
            .into_iter()
            .map(|video| (video.file_path.clone(), video))
            .collect(),
        next_order: 0,
        report: SyncReport {
            warnings: scan.warnings.clone(),
            ..SyncReport::default()
        },
    };

    let mut course_total = 0.0;
    for chapter in scan.top_level_chapters(&course.name) {
        if state.has_content(&chapter) {
            course_total += state.apply_chapter(&chapter, None)?;
        }
    }
    state.remove_unseen()?;

    if !durations_match(course.total_duration_seconds, course_total) {
        db.set_course_total(course.id, course_total)?;
    }
    db.mark_course_synced(course.id)?;

    let mut report = state.report;
    report.total_duration_seconds = course_total;
    Ok(report)
}

struct SyncState<'a> {
    db: &'a Database,
    course_id: i64,
    observer: &'a dyn CatalogObserver,
    // Rows not yet matched by this sync, keyed by path; leftovers are orphans.
    existing_chapters: HashMap<String, Chapter>,
    existing_videos: HashMap<String, Video>,
    next_order: i64,
    report: SyncReport,
}

impl SyncState<'_> {
    /// Whether `node` yields a chapter: it has videos, or it is an unreadable
    /// directory already in the catalog, or a descendant does.
    fn has_content(&self, node: &ScannedChapter) -> bool {
        if node.unreadable {
            return self
                .existing_chapters
                .contains_key(&path_string(&node.path));
        }
        !node.videos.is_empty() || node.children.iter().any(|child| self.has_content(child))
    }

    /// Upserts one chapter subtree and returns its aggregate duration.
    fn apply_chapter(&mut self, node: &ScannedChapter, parent_id: Option<i64>) -> Result<f64> {
        if node.unreadable {
            return self.keep_unreadable(node, parent_id);
        }
        self.next_order += 1;
        let order_in_course = self.next_order;
        let path = path_string(&node.path);

        let (mut chapter, created) = match self.existing_chapters.remove(&path) {
            Some(existing) => (existing, false),
            None => {
                let id = self.db.insert_chapter(
                    self.course_id,
                    parent_id,
                    &node.name,
                    &path,
                    order_in_course,
                )?;
                self.report.chapters_created += 1;
                debug!(chapter = %node.name, order_in_course, "created chapter");
                let chapter = Chapter {
                    id,
                    course_id: self.course_id,
                    parent_id,
                    name: node.name.clone(),
                    path,
                    order_in_course,
                    total_duration_seconds: 0.0,
                };
                (chapter, true)
            }
        };
        let before = chapter.clone();

        let mut total = 0.0;
        let mut order_in_chapter = 0;
        for video in &node.videos {
            if let Some(duration) = self.apply_video(chapter.id, video, order_in_chapter + 1)? {
                order_in_chapter += 1;
                total += duration;
            }
        }
        for child in &node.children {
            if self.has_content(child) {
                total += self.apply_chapter(child, Some(chapter.id))?;
            }
        }

        chapter.parent_id = parent_id;
        chapter.name = node.name.clone();
        chapter.order_in_course = order_in_course;
        chapter.total_duration_seconds = total;

        if created {
            if !durations_match(total, 0.0) {
                self.db.update_chapter(&chapter)?;
            }
        } else if chapter_changed(&before, &chapter) {
            self.db.update_chapter(&chapter)?;
            self.report.chapters_updated += 1;
            debug!(chapter = %chapter.name, order_in_course, "updated chapter");
        }
        Ok(total)
    }

    /// Upserts one video. Returns its duration, or `None` when the file is
    /// already cataloged elsewhere and was skipped.
    fn apply_video(
        &mut self,
        chapter_id: i64,
        scanned: &ScannedVideo,
        order_in_chapter: i64,
    ) -> Result<Option<f64>> {
        let path = path_string(&scanned.path);
        let subtitle = scanned.subtitle_path.as_deref().map(path_string);
        let fields = VideoFields {
            chapter_id,
            name: &scanned.name,
            file_path: &path,
            duration_seconds: scanned.duration_seconds,
            order_in_chapter,
            subtitle_path: subtitle.as_deref(),
        };

        match self.existing_videos.remove(&path) {
            Some(existing) => {
                if video_changed(&existing, &fields) {
                    self.db.update_video_metadata(existing.id, &fields)?;
                    self.report.videos_updated += 1;
                    debug!(video = %scanned.name, order_in_chapter, "updated video");
                }
            }
            None => {
                if let Some(owner) = self.db.video_owner(&path)? {
                    let message = if owner == self.course_id {
                        format!("{path} was discovered twice; keeping the first occurrence")
                    } else {
                        format!("{path} already belongs to course {owner}; skipped")
                    };
                    self.warn(message);
                    return Ok(None);
                }
                self.db.insert_video(&fields)?;
                self.report.videos_created += 1;
                debug!(video = %scanned.name, order_in_chapter, "created video");
            }
        }
        Ok(Some(scanned.duration_seconds))
    }

    /// Leaves the cataloged subtree of a directory that could not be listed
    /// in place: rows, ids and watch state survive, only the position in the
    /// course is renumbered. Returns the stored aggregate.
    fn keep_unreadable(&mut self, node: &ScannedChapter, parent_id: Option<i64>) -> Result<f64> {
        let path = path_string(&node.path);
        let Some(mut chapter) = self.existing_chapters.remove(&path) else {
            return Ok(0.0);
        };

        let nested = self
            .existing_chapters
            .keys()
            .filter(|other| Path::new(other).starts_with(&node.path))
            .cloned()
            .collect::<Vec<_>>();
        let mut kept = nested
            .iter()
            .filter_map(|other| self.existing_chapters.remove(other))
            .collect::<Vec<_>>();
        kept.sort_by_key(|descendant| descendant.order_in_course);

        let before = chapter.clone();
        self.next_order += 1;
        chapter.parent_id = parent_id;
        chapter.name = node.name.clone();
        chapter.order_in_course = self.next_order;
        self.save_if_changed(&before, &chapter)?;

        for mut descendant in kept {
            let before = descendant.clone();
            self.next_order += 1;
            descendant.order_in_course = self.next_order;
            self.save_if_changed(&before, &descendant)?;
        }

        self.existing_videos
            .retain(|file_path, _| !Path::new(file_path).starts_with(&node.path));
        debug!(chapter = %chapter.name, "kept unreadable chapter as cataloged");
        Ok(chapter.total_duration_seconds)
    }

    fn save_if_changed(&mut self, before: &Chapter, after: &Chapter) -> Result<()> {
        if chapter_changed(before, after) {
            self.db.update_chapter(after)?;
            self.report.chapters_updated += 1;
        }
        Ok(())
    }

    fn remove_unseen(&mut self) -> Result<()> {
        let mut orphan_videos = self.existing_videos.drain().map(|(_, video)| video).collect::<Vec<_>>();
        orphan_videos.sort_by_key(|video| video.id);
        for video in orphan_videos {
            self.db.delete_video(video.id)?;
            self.report.videos_deleted += 1;
            debug!(video = %video.name, "removed video missing from disk");
        }

        // Children cascade with their parent; deleting them again is a no-op.
        let mut orphan_chapters = self
            .existing_chapters
            .drain()
            .map(|(_, chapter)| chapter)
            .collect::<Vec<_>>();
        orphan_chapters.sort_by_key(|chapter| chapter.order_in_course);
        for chapter in orphan_chapters {
            self.db.delete_chapter(chapter.id)?;
            self.report.chapters_deleted += 1;
            debug!(chapter = %chapter.name, "removed chapter missing from disk");
        }
        Ok(())
    }

    fn warn(&mut self, message: String) {
        self.observer.on_warning(&message);
        self.report.warnings.push(message);
    }
}

fn chapter_changed(before: &Chapter, after: &Chapter) -> bool {
    before.parent_id != after.parent_id
        || before.name != after.name
        || before.order_in_course != after.order_in_course
        || !durations_match(before.total_duration_seconds, after.total_duration_seconds)
}

fn video_changed(existing: &Video, fields: &VideoFields<'_>) -> bool {
    existing.chapter_id != fields.chapter_id
        || existing.name != fields.name
        || existing.order_in_chapter != fields.order_in_chapter
        || existing.subtitle_path.as_deref() != fields.subtitle_path
        || !durations_match(existing.duration_seconds, fields.duration_seconds)
}

pub(crate) fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
