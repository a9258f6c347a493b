use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::db::Database;

use super::model::{ChapterTree, CourseTree, WatchState, WatchStatus};
use super::observer::recording::RecordingObserver;
use super::probe::DurationProbe;
use super::scan::{ScanResult, ScannedChapter, ScannedVideo};
use super::schedule::Advisory;
use super::{Catalog, CatalogError, sync};

/// Reads the duration straight from the file body so fixtures control it.
struct FileContentProbe;

impl DurationProbe for FileContentProbe {
    fn probe(&self, path: &Path) -> Option<f64> {
        fs::read_to_string(path).ok()?.trim().parse::<f64>().ok()
    }
}

fn write(root: &Path, relative: &str, content: &str) -> PathBuf {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create fixture directory");
    }
    fs::write(&path, content).expect("write fixture file");
    path
}

fn course_fixture() -> TempDir {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path();
    write(root, "02 Advanced/b.mp4", "200");
    write(root, "02 Advanced/a.MKV", "100");
    write(root, "01 basics/intro.mp4", "60");
    write(root, "01 basics/intro.srt", "1\n00:00:00,000 --> 00:00:01,000\nhi\n");
    write(root, "01 basics/notes.pdf", "not a video");
    write(root, "03 Empty/readme.txt", "nothing here");
    dir
}

fn assert_aggregates(tree: &CourseTree) {
    fn chapter_total(node: &ChapterTree) -> f64 {
        let own: f64 = node.videos.iter().map(|video| video.duration_seconds).sum();
        let nested: f64 = node.children.iter().map(chapter_total).sum();
        let expected = own + nested;
        assert!(
            (node.chapter.total_duration_seconds - expected).abs() < 1e-6,
            "chapter {} total {} != {}",
            node.chapter.name,
            node.chapter.total_duration_seconds,
            expected
        );
        expected
    }
    let sum: f64 = tree.chapters.iter().map(chapter_total).sum();
    assert!((tree.course.total_duration_seconds - sum).abs() < 1e-6);
}

fn flatten(tree: &CourseTree) -> Vec<(i64, String, i64, f64)> {
    fn walk(node: &ChapterTree, out: &mut Vec<(i64, String, i64, f64)>) {
        out.push((
            node.chapter.id,
            node.chapter.name.clone(),
            node.chapter.order_in_course,
            node.chapter.total_duration_seconds,
        ));
        for video in &node.videos {
            out.push((
                video.id,
                video.name.clone(),
                video.order_in_chapter,
                video.duration_seconds,
            ));
        }
        for child in &node.children {
            walk(child, out);
        }
    }
    let mut out = Vec::new();
    for chapter in &tree.chapters {
        walk(chapter, &mut out);
    }
    out
}

#[test]
fn first_sync_catalogs_chapters_in_name_order() {
    let dir = course_fixture();
    let db = Database::open_in_memory().expect("db");
    let observer = RecordingObserver::default();
    let catalog = Catalog::new(&db, &FileContentProbe, &observer, 2);

    let (course, report) = catalog.select_and_sync(dir.path()).expect("sync");
    assert_eq!(report.chapters_created, 2);
    assert_eq!(report.videos_created, 3);
    assert_eq!(report.change_count(), 5);
    assert_eq!(course.total_duration_seconds, 360.0);
    assert!(course.last_synced_at.is_some());

    let tree = catalog.course_tree(course.id).expect("tree");
    let names = tree
        .chapters
        .iter()
        .map(|chapter| (chapter.chapter.name.as_str(), chapter.chapter.order_in_course))
        .collect::<Vec<_>>();
    assert_eq!(names, vec![("01 basics", 1), ("02 Advanced", 2)]);

    let advanced = &tree.chapters[1];
    let videos = advanced
        .videos
        .iter()
        .map(|video| (video.name.as_str(), video.order_in_chapter))
        .collect::<Vec<_>>();
    assert_eq!(videos, vec![("a.MKV", 1), ("b.mp4", 2)]);
    assert_eq!(advanced.chapter.total_duration_seconds, 300.0);

    let intro = &tree.chapters[0].videos[0];
    assert!(
        intro
            .subtitle_path
            .as_deref()
            .is_some_and(|path| path.ends_with("intro.srt"))
    );
    assert_eq!(intro.watch, WatchState::Unwatched);
    assert_aggregates(&tree);
    assert_eq!(observer.changed.borrow().as_slice(), &[course.id]);
    assert_eq!(observer.progress.borrow().last().copied(), Some(1.0));
}

#[test]
fn second_sync_of_unchanged_folder_is_a_no_op() {
    let dir = course_fixture();
    let db = Database::open_in_memory().expect("db");
    let observer = RecordingObserver::default();
    let catalog = Catalog::new(&db, &FileContentProbe, &observer, 4);

    let (course, _) = catalog.select_and_sync(dir.path()).expect("first sync");
    let before = flatten(&catalog.course_tree(course.id).expect("tree"));

    let (again, report) = catalog.rescan(course.id).expect("second sync");
    assert_eq!(report.change_count(), 0);
    assert_eq!(again.total_duration_seconds, course.total_duration_seconds);
    assert_eq!(flatten(&catalog.course_tree(course.id).expect("tree")), before);

    let (_, via_select) = catalog
        .select_and_sync(dir.path())
        .expect("selecting a known folder rescans it");
    assert_eq!(via_select.change_count(), 0);
    assert_eq!(observer.changed.borrow().len(), 1);
}

#[test]
fn removed_files_and_chapters_are_cleaned_up() {
    let dir = course_fixture();
    let db = Database::open_in_memory().expect("db");
    let observer = RecordingObserver::default();
    let catalog = Catalog::new(&db, &FileContentProbe, &observer, 1);
    let (course, _) = catalog.select_and_sync(dir.path()).expect("sync");

    fs::remove_file(dir.path().join("02 Advanced/a.MKV")).expect("remove video");
    let (course_after, report) = catalog.rescan(course.id).expect("rescan");
    assert_eq!(report.videos_deleted, 1);
    assert_eq!(report.chapters_deleted, 0);
    // b.mp4 moves up to position 1 and the chapter total shrinks.
    assert_eq!(report.videos_updated, 1);
    assert_eq!(report.chapters_updated, 1);
    assert_eq!(course_after.total_duration_seconds, 260.0);

    let tree = catalog.course_tree(course.id).expect("tree");
    assert_eq!(tree.chapters[1].videos.len(), 1);
    assert_eq!(tree.chapters[1].videos[0].order_in_chapter, 1);
    assert_aggregates(&tree);

    fs::remove_dir_all(dir.path().join("01 basics")).expect("remove chapter");
    let (course_after, report) = catalog.rescan(course.id).expect("rescan");
    assert_eq!(report.chapters_deleted, 1);
    assert_eq!(report.videos_deleted, 1);
    assert_eq!(course_after.total_duration_seconds, 200.0);

    let tree = catalog.course_tree(course.id).expect("tree");
    assert_eq!(tree.chapters.len(), 1);
    assert_eq!(tree.chapters[0].chapter.order_in_course, 1);
    assert_eq!(db.videos_for_course(course.id).expect("videos").len(), 1);
    assert_aggregates(&tree);
}

#[test]
fn rescan_keeps_watch_progress_and_refreshes_metadata() {
    let dir = course_fixture();
    let db = Database::open_in_memory().expect("db");
    let observer = RecordingObserver::default();
    let catalog = Catalog::new(&db, &FileContentProbe, &observer, 2);
    let (course, _) = catalog.select_and_sync(dir.path()).expect("sync");

    let videos = db.videos_for_course(course.id).expect("videos");
    let b = videos
        .iter()
        .find(|video| video.name == "b.mp4")
        .expect("b.mp4 cataloged");
    catalog
        .update_progress(b.id, WatchStatus::PartiallyWatched, Some("50"))
        .expect("progress");

    write(dir.path(), "02 Advanced/b.mp4", "250");
    write(dir.path(), "02 Advanced/b.vtt", "WEBVTT");
    let (_, report) = catalog.rescan(course.id).expect("rescan");
    assert_eq!(report.videos_updated, 1);

    let refreshed = db.video(b.id).expect("lookup").expect("still cataloged");
    assert_eq!(refreshed.duration_seconds, 250.0);
    assert_eq!(refreshed.watch, WatchState::Partial(50.0));
    assert!(
        refreshed
            .subtitle_path
            .as_deref()
            .is_some_and(|path| path.ends_with("b.vtt"))
    );
}

#[test]
fn root_without_subdirectories_becomes_single_chapter() {
    let dir = tempfile::tempdir().expect("tempdir");
    write(dir.path(), "Lesson 2.mp4", "30");
    write(dir.path(), "lesson 1.avi", "20");
    let db = Database::open_in_memory().expect("db");
    let observer = RecordingObserver::default();
    let catalog = Catalog::new(&db, &FileContentProbe, &observer, 1);

    let (course, report) = catalog.select_and_sync(dir.path()).expect("sync");
    assert_eq!(report.chapters_created, 1);

    let tree = catalog.course_tree(course.id).expect("tree");
    assert_eq!(tree.chapters.len(), 1);
    assert_eq!(tree.chapters[0].chapter.name, course.name);
    let names = tree.chapters[0]
        .videos
        .iter()
        .map(|video| video.name.as_str())
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["lesson 1.avi", "Lesson 2.mp4"]);
    assert_eq!(course.total_duration_seconds, 50.0);
}

#[test]
fn nested_chapters_roll_up_bottom_up() {
    let dir = tempfile::tempdir().expect("tempdir");
    write(dir.path(), "Part 1/overview.mp4", "10");
    write(dir.path(), "Part 1/Section B/b.mp4", "40");
    write(dir.path(), "Part 1/Section A/a.mp4", "30");
    write(dir.path(), "Part 1/Section C/empty/readme.md", "x");
    write(dir.path(), "Part 2/Deep/Deeper/z.flv", "5");
    write(dir.path(), "intro.mov", "7");
    let db = Database::open_in_memory().expect("db");
    let observer = RecordingObserver::default();
    let catalog = Catalog::new(&db, &FileContentProbe, &observer, 3);

    let (course, _) = catalog.select_and_sync(dir.path()).expect("sync");
    let tree = catalog.course_tree(course.id).expect("tree");
    assert_aggregates(&tree);
    assert_eq!(course.total_duration_seconds, 92.0);

    let orders = db
        .chapters_for_course(course.id)
        .expect("chapters")
        .into_iter()
        .map(|chapter| (chapter.name, chapter.order_in_course))
        .collect::<Vec<_>>();
    let expected = [
        (course.name.as_str(), 1),
        ("Part 1", 2),
        ("Section A", 3),
        ("Section B", 4),
        ("Part 2", 5),
        ("Deep", 6),
        ("Deeper", 7),
    ];
    assert_eq!(
        orders
            .iter()
            .map(|(name, order)| (name.as_str(), *order))
            .collect::<Vec<_>>(),
        expected.to_vec()
    );

    let part_one = &tree.chapters[1];
    assert_eq!(part_one.chapter.total_duration_seconds, 80.0);
    assert_eq!(part_one.children.len(), 2);
    assert_eq!(part_one.children[0].chapter.parent_id, Some(part_one.chapter.id));
}

#[test]
fn missing_root_fails_before_any_mutation() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = Database::open_in_memory().expect("db");
    let observer = RecordingObserver::default();
    let catalog = Catalog::new(&db, &FileContentProbe, &observer, 1);

    let err = catalog
        .select_and_sync(&dir.path().join("nope"))
        .expect_err("missing folder must fail");
    assert!(matches!(
        err.downcast_ref::<CatalogError>(),
        Some(CatalogError::MissingRoot(_))
    ));
    assert!(catalog.list_courses().expect("list").is_empty());
}

#[test]
fn vanished_root_leaves_catalog_untouched() {
    let dir = course_fixture();
    let db = Database::open_in_memory().expect("db");
    let observer = RecordingObserver::default();
    let catalog = Catalog::new(&db, &FileContentProbe, &observer, 1);
    let (course, _) = catalog.select_and_sync(dir.path()).expect("sync");
    let before = flatten(&catalog.course_tree(course.id).expect("tree"));

    let root = PathBuf::from(&course.root_path);
    fs::remove_dir_all(&root).expect("remove course folder");
    let err = catalog.rescan(course.id).expect_err("rescan must fail");
    assert!(matches!(
        err.downcast_ref::<CatalogError>(),
        Some(CatalogError::MissingRoot(_))
    ));

    let tree = catalog.course_tree(course.id).expect("tree");
    assert_eq!(flatten(&tree), before);
    assert_eq!(tree.course.last_synced_at, course.last_synced_at);
}

#[test]
fn failed_apply_rolls_back_the_whole_sync() {
    let dir = course_fixture();
    let db = Database::open_in_memory().expect("db");
    let observer = RecordingObserver::default();
    let catalog = Catalog::new(&db, &FileContentProbe, &observer, 1);
    let (course, _) = catalog.select_and_sync(dir.path()).expect("sync");
    let before = flatten(&catalog.course_tree(course.id).expect("tree"));

    let clash = dir.path().join("04 New");
    let chapter = |name: &str, file: &str| ScannedChapter {
        name: name.to_string(),
        path: clash.clone(),
        videos: vec![ScannedVideo {
            name: file.to_string(),
            path: clash.join(file),
            duration_seconds: 10.0,
            subtitle_path: None,
        }],
        children: Vec::new(),
        unreadable: false,
    };
    let broken = ScanResult {
        root: dir.path().to_path_buf(),
        root_videos: Vec::new(),
        chapters: vec![chapter("04 New", "x.mp4"), chapter("04 New again", "y.mp4")],
        warnings: Vec::new(),
    };

    let result = db.in_transaction(|db| sync::apply_scan(db, &course, &broken, &observer));
    assert!(result.is_err(), "duplicate chapter path must abort the sync");
    assert_eq!(flatten(&catalog.course_tree(course.id).expect("tree")), before);
}

#[test]
fn unreadable_duration_is_cataloged_as_zero_with_warning() {
    let dir = tempfile::tempdir().expect("tempdir");
    write(dir.path(), "ch/good.mp4", "12.5");
    write(dir.path(), "ch/broken.mp4", "corrupt header");
    write(dir.path(), "ch/negative.mp4", "-3");
    let db = Database::open_in_memory().expect("db");
    let observer = RecordingObserver::default();
    let catalog = Catalog::new(&db, &FileContentProbe, &observer, 2);

    let (course, report) = catalog.select_and_sync(dir.path()).expect("sync");
    assert_eq!(report.videos_created, 3);
    assert_eq!(report.warnings.len(), 2);
    assert_eq!(observer.warnings.borrow().len(), 2);
    assert_eq!(course.total_duration_seconds, 12.5);

    let durations = db
        .videos_for_course(course.id)
        .expect("videos")
        .into_iter()
        .map(|video| (video.name, video.duration_seconds))
        .collect::<Vec<_>>();
    assert_eq!(
        durations,
        vec![
            ("broken.mp4".to_string(), 0.0),
            ("good.mp4".to_string(), 12.5),
            ("negative.mp4".to_string(), 0.0),
        ]
    );
}

#[test]
fn course_name_collision_is_rejected() {
    let first = tempfile::tempdir().expect("tempdir");
    let second = tempfile::tempdir().expect("tempdir");
    write(&first.path().join("Course"), "a.mp4", "10");
    write(&second.path().join("Course"), "b.mp4", "10");
    let db = Database::open_in_memory().expect("db");
    let observer = RecordingObserver::default();
    let catalog = Catalog::new(&db, &FileContentProbe, &observer, 1);

    catalog
        .select_and_sync(&first.path().join("Course"))
        .expect("first course");
    let err = catalog
        .select_and_sync(&second.path().join("Course"))
        .expect_err("same name, different folder");
    assert!(matches!(
        err.downcast_ref::<CatalogError>(),
        Some(CatalogError::NameConflict { .. })
    ));
    assert_eq!(catalog.list_courses().expect("list").len(), 1);
}

#[test]
fn nested_course_does_not_steal_videos() {
    let dir = tempfile::tempdir().expect("tempdir");
    write(dir.path(), "Outer/Inner/a.mp4", "10");
    let db = Database::open_in_memory().expect("db");
    let observer = RecordingObserver::default();
    let catalog = Catalog::new(&db, &FileContentProbe, &observer, 1);

    let (outer, _) = catalog
        .select_and_sync(&dir.path().join("Outer"))
        .expect("outer");
    let (inner, report) = catalog
        .select_and_sync(&dir.path().join("Outer/Inner"))
        .expect("inner");
    assert_eq!(report.videos_created, 0);
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(inner.total_duration_seconds, 0.0);
    assert_eq!(db.videos_for_course(outer.id).expect("videos").len(), 1);
}

#[test]
fn progress_updates_follow_the_state_machine() {
    let dir = tempfile::tempdir().expect("tempdir");
    write(dir.path(), "ch/v.mp4", "600");
    let db = Database::open_in_memory().expect("db");
    let observer = RecordingObserver::default();
    let catalog = Catalog::new(&db, &FileContentProbe, &observer, 1);
    let (course, _) = catalog.select_and_sync(dir.path()).expect("sync");
    let id = db.videos_for_course(course.id).expect("videos")[0].id;

    let video = catalog
        .update_progress(id, WatchStatus::PartiallyWatched, Some("700"))
        .expect("update");
    assert_eq!(video.watch.status(), WatchStatus::Watched);
    assert_eq!(video.watched_seconds(), 600.0);

    let video = catalog
        .update_progress(id, WatchStatus::PartiallyWatched, Some("300"))
        .expect("update");
    assert_eq!(video.watch, WatchState::Partial(300.0));

    let err = catalog
        .update_progress(id, WatchStatus::PartiallyWatched, Some("soon"))
        .expect_err("unparsable input");
    assert!(matches!(
        err.downcast_ref::<CatalogError>(),
        Some(CatalogError::InvalidInput(_))
    ));
    let stored = db.video(id).expect("lookup").expect("video");
    assert_eq!(stored.watch, WatchState::Partial(300.0));

    let video = catalog
        .update_progress(id, WatchStatus::PartiallyWatched, Some("-5"))
        .expect("update");
    assert_eq!(video.watch, WatchState::Unwatched);
    assert_eq!(video.watched_seconds(), 0.0);

    let missing = catalog
        .update_progress(9_999, WatchStatus::Watched, None)
        .expect_err("unknown video");
    assert!(matches!(
        missing.downcast_ref::<CatalogError>(),
        Some(CatalogError::VideoNotFound(9_999))
    ));
}

#[test]
fn schedule_uses_catalog_order_and_resume_offsets() {
    let dir = course_fixture();
    let db = Database::open_in_memory().expect("db");
    let observer = RecordingObserver::default();
    let catalog = Catalog::new(&db, &FileContentProbe, &observer, 2);
    let (course, _) = catalog.select_and_sync(dir.path()).expect("sync");

    let videos = db.videos_for_course(course.id).expect("videos");
    catalog
        .update_progress(videos[0].id, WatchStatus::Watched, None)
        .expect("intro watched");
    catalog
        .update_progress(videos[1].id, WatchStatus::PartiallyWatched, Some("40"))
        .expect("a.MKV partial");

    let plan = catalog
        .generate_schedule(course.id, 3, 100.0)
        .expect("plan");
    let tasks = plan
        .days
        .iter()
        .flat_map(|day| {
            day.tasks.iter().map(move |task| {
                (
                    day.day,
                    task.video_name.as_str(),
                    task.start_offset_seconds,
                    task.end_offset_seconds,
                )
            })
        })
        .collect::<Vec<_>>();
    assert_eq!(
        tasks,
        vec![
            (1, "a.MKV", 40.0, 100.0),
            (1, "b.mp4", 0.0, 40.0),
            (2, "b.mp4", 40.0, 140.0),
            (3, "b.mp4", 140.0, 200.0),
        ]
    );
    assert_eq!(plan.advisories, vec![Advisory::Complete]);

    for video in &videos {
        catalog
            .update_progress(video.id, WatchStatus::Watched, None)
            .expect("watched");
    }
    let plan = catalog
        .generate_schedule(course.id, 3, 100.0)
        .expect("plan");
    assert!(plan.days.is_empty());
    assert_eq!(plan.advisories, vec![Advisory::AllWatched]);

    let err = catalog
        .generate_schedule(course.id, 0, 100.0)
        .expect_err("zero days");
    assert!(matches!(
        err.downcast_ref::<CatalogError>(),
        Some(CatalogError::InvalidInput(_))
    ));
}

#[test]
fn saved_plan_round_trips_and_is_listed() {
    let dir = course_fixture();
    let db = Database::open_in_memory().expect("db");
    let observer = RecordingObserver::default();
    let catalog = Catalog::new(&db, &FileContentProbe, &observer, 2);
    let (course, _) = catalog.select_and_sync(dir.path()).expect("sync");

    let plan = catalog
        .generate_schedule(course.id, 2, 200.0)
        .expect("plan");
    let plan_id = catalog
        .save_plan(course.id, 2, 200.0, &plan)
        .expect("save");

    let summaries = catalog.saved_plans(course.id).expect("list");
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].id, plan_id);
    assert_eq!(summaries[0].day_count, 2);
    assert_eq!(summaries[0].total_seconds, 360.0);

    let days = catalog.saved_plan(course.id, plan_id).expect("reload");
    assert_eq!(days, plan.days);
    assert!(catalog.saved_plan(course.id, plan_id + 1).is_err());
}

#[test]
fn delete_course_cascades_everything() {
    let dir = course_fixture();
    let db = Database::open_in_memory().expect("db");
    let observer = RecordingObserver::default();
    let catalog = Catalog::new(&db, &FileContentProbe, &observer, 2);
    let (course, _) = catalog.select_and_sync(dir.path()).expect("sync");
    let plan = catalog
        .generate_schedule(course.id, 1, 1000.0)
        .expect("plan");
    catalog
        .save_plan(course.id, 1, 1000.0, &plan)
        .expect("save");

    let deleted = catalog.delete_course(course.id).expect("delete");
    assert_eq!(deleted.name, course.name);
    assert!(catalog.list_courses().expect("list").is_empty());
    assert!(db.chapters_for_course(course.id).expect("chapters").is_empty());
    assert!(db.videos_for_course(course.id).expect("videos").is_empty());
    assert!(db.list_plans(course.id).expect("plans").is_empty());

    let err = catalog.delete_course(course.id).expect_err("already gone");
    assert!(matches!(
        err.downcast_ref::<CatalogError>(),
        Some(CatalogError::CourseNotFound(_))
    ));
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode)).expect("chmod fixture");
}

#[cfg(unix)]
#[test]
fn unreadable_subdirectory_keeps_its_catalog_rows() {
    let dir = course_fixture();
    let db = Database::open_in_memory().expect("db");
    let observer = RecordingObserver::default();
    let catalog = Catalog::new(&db, &FileContentProbe, &observer, 2);
    let (course, _) = catalog.select_and_sync(dir.path()).expect("sync");

    let b = db
        .videos_for_course(course.id)
        .expect("videos")
        .into_iter()
        .find(|video| video.name == "b.mp4")
        .expect("b.mp4 cataloged");
    catalog
        .update_progress(b.id, WatchStatus::PartiallyWatched, Some("50"))
        .expect("progress");
    let advanced_id = catalog.course_tree(course.id).expect("tree").chapters[1]
        .chapter
        .id;

    let locked = dir.path().join("02 Advanced");
    set_mode(&locked, 0o000);
    if fs::read_dir(&locked).is_ok() {
        // Permission bits are not enforced for this user (root).
        set_mode(&locked, 0o755);
        return;
    }
    write(dir.path(), "01 basics/outro.mp4", "15");
    let outcome = catalog.rescan(course.id);
    set_mode(&locked, 0o755);

    let (after, report) = outcome.expect("rescan continues past the unreadable folder");
    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].contains("02 Advanced"));
    assert_eq!(report.chapters_deleted, 0);
    assert_eq!(report.videos_deleted, 0);
    assert_eq!(report.videos_created, 1);
    assert_eq!(after.total_duration_seconds, 375.0);

    let kept = db.video(b.id).expect("lookup").expect("b.mp4 survives");
    assert_eq!(kept.watch, WatchState::Partial(50.0));
    let tree = catalog.course_tree(course.id).expect("tree");
    assert_eq!(tree.chapters[1].chapter.id, advanced_id);
    assert_eq!(tree.chapters[1].videos.len(), 2);
    assert_aggregates(&tree);

    let (_, report) = catalog.rescan(course.id).expect("rescan after restore");
    assert_eq!(report.change_count(), 0);
    let restored = db.video(b.id).expect("lookup").expect("same row");
    assert_eq!(restored.watch, WatchState::Partial(50.0));
}

#[cfg(unix)]
#[test]
fn unreadable_new_subdirectory_is_not_cataloged() {
    let dir = course_fixture();
    let locked = dir.path().join("05 Locked");
    write(dir.path(), "05 Locked/x.mp4", "10");
    set_mode(&locked, 0o000);
    if fs::read_dir(&locked).is_ok() {
        set_mode(&locked, 0o755);
        return;
    }

    let db = Database::open_in_memory().expect("db");
    let observer = RecordingObserver::default();
    let catalog = Catalog::new(&db, &FileContentProbe, &observer, 1);
    let outcome = catalog.select_and_sync(dir.path());
    set_mode(&locked, 0o755);

    let (course, report) = outcome.expect("sync");
    assert_eq!(report.chapters_created, 2);
    assert_eq!(observer.warnings.borrow().len(), 1);
    assert_eq!(course.total_duration_seconds, 360.0);
}

#[test]
fn hidden_entries_are_ignored() {
    let dir = tempfile::tempdir().expect("tempdir");
    write(dir.path(), ".cache/x.mp4", "10");
    write(dir.path(), ".trailer.mp4", "10");
    write(dir.path(), "ch/.draft.mp4", "10");
    write(dir.path(), "ch/v.mp4", "20");
    let db = Database::open_in_memory().expect("db");
    let observer = RecordingObserver::default();
    let catalog = Catalog::new(&db, &FileContentProbe, &observer, 1);

    let (course, report) = catalog.select_and_sync(dir.path()).expect("sync");
    assert_eq!(report.chapters_created, 1);
    assert_eq!(course.total_duration_seconds, 20.0);
    let names = db
        .videos_for_course(course.id)
        .expect("videos")
        .into_iter()
        .map(|video| video.name)
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["v.mp4".to_string()]);
}

#[cfg(unix)]
#[test]
fn linked_files_are_cataloged_but_linked_directories_are_not_descended() {
    use std::os::unix::fs::symlink;

    let outside = tempfile::tempdir().expect("tempdir");
    write(outside.path(), "shared/extra.mp4", "30");
    let lone = write(outside.path(), "lone.mp4", "12");

    let dir = tempfile::tempdir().expect("tempdir");
    write(dir.path(), "ch/v.mp4", "20");
    symlink(&lone, dir.path().join("ch/linked.mp4")).expect("file link");
    symlink(outside.path().join("shared"), dir.path().join("Shared")).expect("dir link");
    symlink(dir.path(), dir.path().join("ch/loop")).expect("cycle link");

    let db = Database::open_in_memory().expect("db");
    let observer = RecordingObserver::default();
    let catalog = Catalog::new(&db, &FileContentProbe, &observer, 2);

    let (course, report) = catalog.select_and_sync(dir.path()).expect("sync");
    assert_eq!(report.chapters_created, 1);
    assert!(report.warnings.is_empty());
    assert_eq!(course.total_duration_seconds, 32.0);
    let names = db
        .videos_for_course(course.id)
        .expect("videos")
        .into_iter()
        .map(|video| video.name)
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["linked.mp4".to_string(), "v.mp4".to_string()]);
}

#[test]
fn shortened_video_reads_back_as_watched() {
    let dir = course_fixture();
    let db = Database::open_in_memory().expect("db");
    let observer = RecordingObserver::default();
    let catalog = Catalog::new(&db, &FileContentProbe, &observer, 1);
    let (course, _) = catalog.select_and_sync(dir.path()).expect("sync");

    let b = db
        .videos_for_course(course.id)
        .expect("videos")
        .into_iter()
        .find(|video| video.name == "b.mp4")
        .expect("b.mp4 cataloged");
    catalog
        .update_progress(b.id, WatchStatus::PartiallyWatched, Some("50"))
        .expect("progress");

    write(dir.path(), "02 Advanced/b.mp4", "40");
    catalog.rescan(course.id).expect("rescan");
    let shortened = db.video(b.id).expect("lookup").expect("video");
    assert_eq!(shortened.watch, WatchState::Watched);
    assert_eq!(shortened.watched_seconds(), 40.0);
    assert_eq!(shortened.remaining_seconds(), 0.0);

    write(dir.path(), "02 Advanced/b.mp4", "200");
    catalog.rescan(course.id).expect("rescan");
    let restored = db.video(b.id).expect("lookup").expect("video");
    assert_eq!(restored.watch, WatchState::Partial(50.0));
}

#[cfg(unix)]
#[test]
fn unreadable_parent_keeps_nested_chapters_in_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    write(dir.path(), "Part 1/overview.mp4", "10");
    write(dir.path(), "Part 1/Section A/a.mp4", "30");
    write(dir.path(), "Part 1/Section B/b.mp4", "40");
    write(dir.path(), "Part 2/z.mp4", "5");
    let db = Database::open_in_memory().expect("db");
    let observer = RecordingObserver::default();
    let catalog = Catalog::new(&db, &FileContentProbe, &observer, 2);
    let (course, _) = catalog.select_and_sync(dir.path()).expect("sync");
    let before = db.chapters_for_course(course.id).expect("chapters");

    let locked = dir.path().join("Part 1");
    set_mode(&locked, 0o000);
    if fs::read_dir(&locked).is_ok() {
        set_mode(&locked, 0o755);
        return;
    }
    let outcome = catalog.rescan(course.id);
    set_mode(&locked, 0o755);

    let (after, report) = outcome.expect("rescan");
    assert_eq!(report.change_count(), 0);
    assert_eq!(after.total_duration_seconds, 85.0);
    assert_eq!(db.chapters_for_course(course.id).expect("chapters"), before);
    assert_eq!(db.videos_for_course(course.id).expect("videos").len(), 4);
}
