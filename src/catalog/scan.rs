use std::cmp::Ordering;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::mpsc;
use std::thread;

use anyhow::{Context, Result};
use tracing::{debug, info};

use super::CatalogError;
use super::observer::CatalogObserver;
use super::probe::DurationProbe;

pub(crate) const VIDEO_EXTENSIONS: [&str; 6] = ["mp4", "mkv", "avi", "mov", "flv", "wmv"];
pub(crate) const SUBTITLE_EXTENSIONS: [&str; 3] = ["srt", "vtt", "ass"];

// Share of the progress bar spent listing directories before probing starts.
const WALK_PROGRESS_SHARE: f64 = 0.05;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ScannedVideo {
    pub(crate) name: String,
    pub(crate) path: PathBuf,
    pub(crate) duration_seconds: f64,
    pub(crate) subtitle_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ScannedChapter {
    pub(crate) name: String,
    pub(crate) path: PathBuf,
    pub(crate) videos: Vec<ScannedVideo>,
    pub(crate) children: Vec<ScannedChapter>,
    /// Directory exists but could not be listed; its contents are unknown.
    pub(crate) unreadable: bool,
}

impl ScannedChapter {
    fn unlisted(name: &str, path: &Path) -> Self {
        Self {
            name: name.to_string(),
            path: path.to_path_buf(),
            videos: Vec::new(),
            children: Vec::new(),
            unreadable: true,
        }
    }

    fn visit_videos<'s>(&'s self, out: &mut Vec<&'s ScannedVideo>) {
        out.extend(self.videos.iter());
        for child in &self.children {
            child.visit_videos(out);
        }
    }

    fn visit_videos_mut(&mut self, f: &mut impl FnMut(&mut ScannedVideo)) {
        self.videos.iter_mut().for_each(&mut *f);
        for child in &mut self.children {
            child.visit_videos_mut(f);
        }
    }
}

/// In-memory picture of a course directory, not yet persisted.
#[derive(Debug, Clone)]
pub(crate) struct ScanResult {
    pub(crate) root: PathBuf,
    pub(crate) root_videos: Vec<ScannedVideo>,
    pub(crate) chapters: Vec<ScannedChapter>,
    pub(crate) warnings: Vec<String>,
}

impl ScanResult {
    /// Top-level chapters in persistence order. Videos sitting directly in
    /// the root become an implicit chapter named after the course, placed
    /// first.
    pub(crate) fn top_level_chapters(&self, course_name: &str) -> Vec<ScannedChapter> {
        let mut chapters = Vec::with_capacity(self.chapters.len() + 1);
        if !self.root_videos.is_empty() {
            chapters.push(ScannedChapter {
                name: course_name.to_string(),
                path: self.root.clone(),
                videos: self.root_videos.clone(),
                children: Vec::new(),
                unreadable: false,
            });
        }
        chapters.extend(self.chapters.iter().cloned());
        chapters
    }

    pub(crate) fn videos(&self) -> Vec<&ScannedVideo> {
        let mut out: Vec<&ScannedVideo> = self.root_videos.iter().collect();
        for chapter in &self.chapters {
            chapter.visit_videos(&mut out);
        }
        out
    }

    fn visit_videos_mut(&mut self, mut f: impl FnMut(&mut ScannedVideo)) {
        self.root_videos.iter_mut().for_each(&mut f);
        for chapter in &mut self.chapters {
            chapter.visit_videos_mut(&mut f);
        }
    }
}

pub(crate) struct Scanner<'a> {
    probe: &'a dyn DurationProbe,
    observer: &'a dyn CatalogObserver,
    workers: usize,
}

impl<'a> Scanner<'a> {
    pub(crate) fn new(
        probe: &'a dyn DurationProbe,
        observer: &'a dyn CatalogObserver,
        workers: usize,
    ) -> Self {
        Self {
            probe,
            observer,
            workers: workers.max(1),
        }
    }

    /// Walks `root` and probes every discovered video. Nothing is written
    /// anywhere; the result is handed to the synchronizer.
    pub(crate) fn scan(&self, root: &Path) -> Result<ScanResult> {
        if !root.is_dir() {
            return Err(CatalogError::MissingRoot(root.display().to_string()).into());
        }

        self.observer.on_progress(0.0, "Scanning directories...");
        let mut warnings = Vec::new();
        let listing = list_dir(root)
            .with_context(|| format!("failed to read course directory {}", root.display()))?;

        let root_videos = collect_videos(&listing.files);
        let chapters = listing
            .dirs
            .iter()
            .filter_map(|(name, path)| self.walk_dir(name, path, &mut warnings))
            .collect::<Vec<_>>();

        let mut result = ScanResult {
            root: root.to_path_buf(),
            root_videos,
            chapters,
            warnings: Vec::new(),
        };

        let paths = result
            .videos()
            .into_iter()
            .map(|video| video.path.clone())
            .collect::<Vec<_>>();
        self.observer.on_progress(
            WALK_PROGRESS_SHARE,
            &format!("Found {} video(s), reading durations...", paths.len()),
        );

        let durations = self.probe_all(&paths, &mut warnings);
        let mut next = durations.into_iter();
        result.visit_videos_mut(|video| video.duration_seconds = next.next().unwrap_or(0.0));
        result.warnings = warnings;

        info!(
            root = %root.display(),
            chapters = result.chapters.len(),
            videos = paths.len(),
            warnings = result.warnings.len(),
            "scan finished"
        );
        self.observer.on_progress(1.0, "Scan completed.");
        Ok(result)
    }

    fn walk_dir(&self, name: &str, dir: &Path, warnings: &mut Vec<String>) -> Option<ScannedChapter> {
        let listing = match list_dir(dir) {
            Ok(listing) => listing,
            Err(err) => {
                self.warn(
                    warnings,
                    format!("skipped directory {}: {err}", dir.display()),
                );
                // Contents unknown; the synchronizer keeps whatever it already cataloged here.
                return Some(ScannedChapter::unlisted(name, dir));
            }
        };

        let videos = collect_videos(&listing.files);
        let children = listing
            .dirs
            .iter()
            .filter_map(|(child_name, child_path)| self.walk_dir(child_name, child_path, warnings))
            .collect::<Vec<_>>();

        if videos.is_empty() && children.is_empty() {
            debug!(path = %dir.display(), "pruned directory without videos");
            return None;
        }

        Some(ScannedChapter {
            name: name.to_string(),
            path: dir.to_path_buf(),
            videos,
            children,
            unreadable: false,
        })
    }

    fn probe_all(&self, paths: &[PathBuf], warnings: &mut Vec<String>) -> Vec<f64> {
        let total = paths.len();
        let mut results: Vec<Option<f64>> = vec![None; total];
        if total == 0 {
            return Vec::new();
        }

        let workers = self.workers.min(total);
        let cursor = AtomicUsize::new(0);
        let (tx, rx) = mpsc::channel::<(usize, Option<f64>)>();
        let probe = self.probe;

        thread::scope(|scope| {
            for _ in 0..workers {
                let tx = tx.clone();
                let cursor = &cursor;
                scope.spawn(move || {
                    loop {
                        let idx = cursor.fetch_add(1, AtomicOrdering::Relaxed);
                        let Some(path) = paths.get(idx) else {
                            break;
                        };
                        if tx.send((idx, probe.probe(path))).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(tx);

            for (done, (idx, outcome)) in rx.iter().enumerate() {
                results[idx] = outcome;
                let fraction =
                    WALK_PROGRESS_SHARE + (1.0 - WALK_PROGRESS_SHARE) * (done + 1) as f64 / total as f64;
                self.observer.on_progress(
                    fraction.min(1.0),
                    &format!("Read duration {} of {total}", done + 1),
                );
            }
        });

        results
            .into_iter()
            .zip(paths)
            .map(|(outcome, path)| match outcome {
                Some(seconds) if seconds > 0.0 => seconds,
                Some(seconds) => {
                    self.warn(
                        warnings,
                        format!(
                            "non-positive duration {seconds} for {}; recorded as 0",
                            path.display()
                        ),
                    );
                    0.0
                }
                None => {
                    self.warn(
                        warnings,
                        format!("could not read duration of {}; recorded as 0", path.display()),
                    );
                    0.0
                }
            })
            .collect()
    }

    fn warn(&self, warnings: &mut Vec<String>, message: String) {
        self.observer.on_warning(&message);
        warnings.push(message);
    }
}

#[derive(Default)]
struct DirListing {
    dirs: Vec<(String, PathBuf)>,
    files: Vec<(String, PathBuf)>,
}

fn list_dir(dir: &Path) -> io::Result<DirListing> {
    let mut listing = DirListing::default();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }

        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            listing.dirs.push((name, path));
        } else if file_type.is_file() {
            listing.files.push((name, path));
        } else if file_type.is_symlink() {
            // Linked files are cataloged; linked directories are never descended.
            if fs::metadata(&path).map(|meta| meta.is_file()).unwrap_or(false) {
                listing.files.push((name, path));
            }
        }
    }

    listing.dirs.sort_by(|a, b| compare_names(&a.0, &b.0));
    listing.files.sort_by(|a, b| compare_names(&a.0, &b.0));
    Ok(listing)
}

pub(crate) fn compare_names(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

pub(crate) fn is_video_file(name: &str) -> bool {
    has_extension_in(name, &VIDEO_EXTENSIONS)
}

fn has_extension_in(name: &str, extensions: &[&str]) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn collect_videos(files: &[(String, PathBuf)]) -> Vec<ScannedVideo> {
    files
        .iter()
        .filter(|(name, _)| is_video_file(name))
        .map(|(name, path)| ScannedVideo {
            name: name.clone(),
            path: path.clone(),
            duration_seconds: 0.0,
            subtitle_path: find_subtitle(name, files),
        })
        .collect()
}

/// First sibling sharing the video's base name, checked in
/// `SUBTITLE_EXTENSIONS` order.
pub(crate) fn find_subtitle(video_name: &str, siblings: &[(String, PathBuf)]) -> Option<PathBuf> {
    let stem = Path::new(video_name).file_stem()?;
    SUBTITLE_EXTENSIONS.iter().find_map(|wanted| {
        siblings
            .iter()
            .find(|(name, _)| {
                let candidate = Path::new(name);
                candidate.file_stem() == Some(stem)
                    && candidate
                        .extension()
                        .and_then(|ext| ext.to_str())
                        .map(|ext| ext.eq_ignore_ascii_case(wanted))
                        .unwrap_or(false)
            })
            .map(|(_, path)| path.clone())
    })
}
