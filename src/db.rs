use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::catalog::model::{Chapter, Course, Video, WatchState, WatchStatus};
use crate::catalog::schedule::{DayPlan, ScheduleItem, SessionTask, ViewingPlan};

pub struct Database {
    conn: Connection,
}

/// Column values the synchronizer writes for a video. Watch state is
/// deliberately absent.
#[derive(Debug, Clone)]
pub struct VideoFields<'a> {
    pub chapter_id: i64,
    pub name: &'a str,
    pub file_path: &'a str,
    pub duration_seconds: f64,
    pub order_in_chapter: i64,
    pub subtitle_path: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub struct PlanSummary {
    pub id: i64,
    pub num_days: u32,
    pub max_daily_seconds: f64,
    pub created_at: String,
    pub day_count: u32,
    pub total_seconds: f64,
}

const COURSE_COLUMNS: &str =
    "id, name, root_path, total_duration_seconds, created_at, last_synced_at";
const CHAPTER_COLUMNS: &str =
    "c.id, c.course_id, c.parent_id, c.name, c.path, c.order_in_course, c.total_duration_seconds";
const VIDEO_COLUMNS: &str = "v.id, v.chapter_id, v.name, v.file_path, v.duration_seconds, \
     v.order_in_chapter, v.watched_status, v.watched_seconds, v.subtitle_path";

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {}", path.display()))?;
        Self::from_connection(conn)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let db = Self::from_connection(Connection::open_in_memory()?)?;
        db.migrate()?;
        Ok(db)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .context("failed to enable foreign keys")?;
        Ok(Self { conn })
    }

    pub fn migrate(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS courses (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                root_path TEXT NOT NULL UNIQUE,
                total_duration_seconds REAL NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                last_synced_at TEXT
            );
            CREATE TABLE IF NOT EXISTS chapters (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                course_id INTEGER NOT NULL REFERENCES courses(id) ON DELETE CASCADE,
                parent_id INTEGER REFERENCES chapters(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                path TEXT NOT NULL,
                order_in_course INTEGER NOT NULL,
                total_duration_seconds REAL NOT NULL DEFAULT 0,
                UNIQUE (course_id, path)
            );
            CREATE INDEX IF NOT EXISTS idx_chapters_course_order ON chapters(course_id, order_in_course);
            CREATE TABLE IF NOT EXISTS videos (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                chapter_id INTEGER NOT NULL REFERENCES chapters(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                file_path TEXT NOT NULL UNIQUE,
                duration_seconds REAL NOT NULL DEFAULT 0,
                order_in_chapter INTEGER NOT NULL,
                watched_status TEXT NOT NULL DEFAULT 'Unwatched'
                    CHECK (watched_status IN ('Unwatched', 'PartiallyWatched', 'Watched')),
                watched_seconds REAL NOT NULL DEFAULT 0,
                subtitle_path TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_videos_chapter_order ON videos(chapter_id, order_in_chapter);
            CREATE TABLE IF NOT EXISTS plans (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                course_id INTEGER NOT NULL REFERENCES courses(id) ON DELETE CASCADE,
                num_days INTEGER NOT NULL,
                max_daily_seconds REAL NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS plan_tasks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                plan_id INTEGER NOT NULL REFERENCES plans(id) ON DELETE CASCADE,
                day INTEGER NOT NULL,
                position INTEGER NOT NULL,
                video_id INTEGER REFERENCES videos(id) ON DELETE SET NULL,
                chapter_name TEXT NOT NULL,
                video_name TEXT NOT NULL,
                start_offset_seconds REAL NOT NULL,
                end_offset_seconds REAL NOT NULL,
                session_duration_seconds REAL NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_plan_tasks_plan ON plan_tasks(plan_id, day, position);
            "#,
        )?;
        Ok(())
    }

    /// Runs `f` inside one transaction. Any error drops the transaction,
    /// which rolls every statement back.
    pub fn in_transaction<T>(&self, f: impl FnOnce(&Self) -> Result<T>) -> Result<T> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("failed to begin transaction")?;
        let out = f(self)?;
        tx.commit().context("failed to commit transaction")?;
        Ok(out)
    }

    pub fn insert_course(&self, name: &str, root_path: &str) -> Result<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO courses (name, root_path, total_duration_seconds, created_at) VALUES (?1, ?2, 0, ?3)",
            params![name, root_path, now],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn course(&self, id: i64) -> Result<Option<Course>> {
        let sql = format!("SELECT {COURSE_COLUMNS} FROM courses WHERE id = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![id], course_from_row)
            .optional()?)
    }

    pub fn course_by_root(&self, root_path: &str) -> Result<Option<Course>> {
        let sql = format!("SELECT {COURSE_COLUMNS} FROM courses WHERE root_path = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![root_path], course_from_row)
            .optional()?)
    }

    pub fn course_by_name(&self, name: &str) -> Result<Option<Course>> {
        let sql = format!("SELECT {COURSE_COLUMNS} FROM courses WHERE name = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![name], course_from_row)
            .optional()?)
    }

    pub fn list_courses(&self) -> Result<Vec<Course>> {
        let sql = format!("SELECT {COURSE_COLUMNS} FROM courses ORDER BY name");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], course_from_row)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn delete_course(&self, id: i64) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM courses WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    pub fn set_course_total(&self, id: i64, total_duration_seconds: f64) -> Result<()> {
        self.conn.execute(
            "UPDATE courses SET total_duration_seconds = ?2 WHERE id = ?1",
            params![id, total_duration_seconds],
        )?;
        Ok(())
    }

    pub fn mark_course_synced(&self, id: i64) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "UPDATE courses SET last_synced_at = ?2 WHERE id = ?1",
            params![id, now],
        )?;
        Ok(())
    }

    pub fn chapters_for_course(&self, course_id: i64) -> Result<Vec<Chapter>> {
        let sql = format!(
            "SELECT {CHAPTER_COLUMNS} FROM chapters c WHERE c.course_id = ?1 ORDER BY c.order_in_course, c.id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![course_id], chapter_from_row)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn insert_chapter(
        &self,
        course_id: i64,
        parent_id: Option<i64>,
        name: &str,
        path: &str,
        order_in_course: i64,
    ) -> Result<i64> {
        self.conn.execute(
            r#"
            INSERT INTO chapters (course_id, parent_id, name, path, order_in_course, total_duration_seconds)
            VALUES (?1, ?2, ?3, ?4, ?5, 0)
            "#,
            params![course_id, parent_id, name, path, order_in_course],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn update_chapter(&self, chapter: &Chapter) -> Result<()> {
        self.conn.execute(
            r#"
            UPDATE chapters
            SET parent_id = ?2, name = ?3, order_in_course = ?4, total_duration_seconds = ?5
            WHERE id = ?1
            "#,
            params![
                chapter.id,
                chapter.parent_id,
                chapter.name,
                chapter.order_in_course,
                chapter.total_duration_seconds
            ],
        )?;
        Ok(())
    }

    pub fn delete_chapter(&self, id: i64) -> Result<()> {
        self.conn
            .execute("DELETE FROM chapters WHERE id = ?1", params![id])?;
        Ok(())
    }

    /// Every video of a course, in chapter order then video order.
    pub fn videos_for_course(&self, course_id: i64) -> Result<Vec<Video>> {
        let sql = format!(
            r#"
            SELECT {VIDEO_COLUMNS}
            FROM videos v
            JOIN chapters c ON c.id = v.chapter_id
            WHERE c.course_id = ?1
            ORDER BY c.order_in_course, v.order_in_chapter, v.id
            "#
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![course_id], video_from_row)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn video(&self, id: i64) -> Result<Option<Video>> {
        let sql = format!("SELECT {VIDEO_COLUMNS} FROM videos v WHERE v.id = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![id], video_from_row)
            .optional()?)
    }

    /// Course that currently owns the video at `file_path`, if any.
    pub fn video_owner(&self, file_path: &str) -> Result<Option<i64>> {
        Ok(self
            .conn
            .query_row(
                r#"
                SELECT c.course_id
                FROM videos v
                JOIN chapters c ON c.id = v.chapter_id
                WHERE v.file_path = ?1
                "#,
                params![file_path],
                |row| row.get(0),
            )
            .optional()?)
    }

    pub fn insert_video(&self, fields: &VideoFields<'_>) -> Result<i64> {
        self.conn.execute(
            r#"
            INSERT INTO videos (chapter_id, name, file_path, duration_seconds, order_in_chapter,
                                watched_status, watched_seconds, subtitle_path)
            VALUES (?1, ?2, ?3, ?4, ?5, 'Unwatched', 0, ?6)
            "#,
            params![
                fields.chapter_id,
                fields.name,
                fields.file_path,
                fields.duration_seconds,
                fields.order_in_chapter,
                fields.subtitle_path
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn update_video_metadata(&self, id: i64, fields: &VideoFields<'_>) -> Result<()> {
        self.conn.execute(
            r#"
            UPDATE videos
            SET chapter_id = ?2, name = ?3, duration_seconds = ?4, order_in_chapter = ?5, subtitle_path = ?6
            WHERE id = ?1
            "#,
            params![
                id,
                fields.chapter_id,
                fields.name,
                fields.duration_seconds,
                fields.order_in_chapter,
                fields.subtitle_path
            ],
        )?;
        Ok(())
    }

    pub fn delete_video(&self, id: i64) -> Result<()> {
        self.conn
            .execute("DELETE FROM videos WHERE id = ?1", params![id])?;
        Ok(())
    }

    pub fn set_watch_state(&self, id: i64, state: WatchState, duration_seconds: f64) -> Result<bool> {
        let updated = self.conn.execute(
            "UPDATE videos SET watched_status = ?2, watched_seconds = ?3 WHERE id = ?1",
            params![
                id,
                state.status().as_str(),
                state.watched_seconds(duration_seconds)
            ],
        )?;
        Ok(updated > 0)
    }

    /// Scheduling snapshot: every video of the course with its chapter name.
    pub fn schedule_items(&self, course_id: i64) -> Result<Vec<ScheduleItem>> {
        let sql = format!(
            r#"
            SELECT {VIDEO_COLUMNS}, c.name
            FROM videos v
            JOIN chapters c ON c.id = v.chapter_id
            WHERE c.course_id = ?1
            ORDER BY c.order_in_course, v.order_in_chapter, v.id
            "#
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![course_id], |row| {
            let video = video_from_row(row)?;
            let chapter_name: String = row.get(9)?;
            Ok(ScheduleItem::from_video(chapter_name, &video))
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn save_plan(
        &self,
        course_id: i64,
        num_days: u32,
        max_daily_seconds: f64,
        plan: &ViewingPlan,
    ) -> Result<i64> {
        self.in_transaction(|db| {
            let now = Utc::now().to_rfc3339();
            db.conn.execute(
                "INSERT INTO plans (course_id, num_days, max_daily_seconds, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![course_id, num_days, max_daily_seconds, now],
            )?;
            let plan_id = db.conn.last_insert_rowid();

            let mut stmt = db.conn.prepare(
                r#"
                INSERT INTO plan_tasks (plan_id, day, position, video_id, chapter_name, video_name,
                                        start_offset_seconds, end_offset_seconds, session_duration_seconds)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
            )?;
            for day in &plan.days {
                for (position, task) in day.tasks.iter().enumerate() {
                    stmt.execute(params![
                        plan_id,
                        day.day,
                        position as i64,
                        task.video_id,
                        task.chapter_name,
                        task.video_name,
                        task.start_offset_seconds,
                        task.end_offset_seconds,
                        task.session_duration_seconds
                    ])?;
                }
            }
            Ok(plan_id)
        })
    }

    pub fn list_plans(&self, course_id: i64) -> Result<Vec<PlanSummary>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT p.id, p.num_days, p.max_daily_seconds, p.created_at,
                   COUNT(DISTINCT t.day), COALESCE(SUM(t.session_duration_seconds), 0)
            FROM plans p
            LEFT JOIN plan_tasks t ON t.plan_id = p.id
            WHERE p.course_id = ?1
            GROUP BY p.id
            ORDER BY p.created_at DESC, p.id DESC
            "#,
        )?;
        let rows = stmt.query_map(params![course_id], |row| {
            Ok(PlanSummary {
                id: row.get(0)?,
                num_days: row.get(1)?,
                max_daily_seconds: row.get(2)?,
                created_at: row.get(3)?,
                day_count: row.get(4)?,
                total_seconds: row.get(5)?,
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Days of a saved plan, or `None` when the plan does not belong to the course.
    pub fn plan_days(&self, course_id: i64, plan_id: i64) -> Result<Option<Vec<DayPlan>>> {
        let exists = self
            .conn
            .query_row(
                "SELECT 1 FROM plans WHERE id = ?1 AND course_id = ?2",
                params![plan_id, course_id],
                |_| Ok(()),
            )
            .optional()?;
        if exists.is_none() {
            return Ok(None);
        }

        let mut stmt = self.conn.prepare(
            r#"
            SELECT day, video_id, chapter_name, video_name,
                   start_offset_seconds, end_offset_seconds, session_duration_seconds
            FROM plan_tasks
            WHERE plan_id = ?1
            ORDER BY day, position
            "#,
        )?;
        let rows = stmt.query_map(params![plan_id], |row| {
            let day: u32 = row.get(0)?;
            let task = SessionTask {
                video_id: row.get(1)?,
                chapter_name: row.get(2)?,
                video_name: row.get(3)?,
                start_offset_seconds: row.get(4)?,
                end_offset_seconds: row.get(5)?,
                session_duration_seconds: row.get(6)?,
            };
            Ok((day, task))
        })?;

        let mut days: Vec<DayPlan> = Vec::new();
        for row in rows {
            let (day, task) = row?;
            match days.last_mut() {
                Some(current) if current.day == day => current.push(task),
                _ => {
                    let mut fresh = DayPlan::new(day);
                    fresh.push(task);
                    days.push(fresh);
                }
            }
        }
        Ok(Some(days))
    }
}

fn course_from_row(row: &Row<'_>) -> rusqlite::Result<Course> {
    Ok(Course {
        id: row.get(0)?,
        name: row.get(1)?,
        root_path: row.get(2)?,
        total_duration_seconds: row.get(3)?,
        created_at: row.get(4)?,
        last_synced_at: row.get(5)?,
    })
}

fn chapter_from_row(row: &Row<'_>) -> rusqlite::Result<Chapter> {
    Ok(Chapter {
        id: row.get(0)?,
        course_id: row.get(1)?,
        parent_id: row.get(2)?,
        name: row.get(3)?,
        path: row.get(4)?,
        order_in_course: row.get(5)?,
        total_duration_seconds: row.get(6)?,
    })
}

fn video_from_row(row: &Row<'_>) -> rusqlite::Result<Video> {
    let raw_status: String = row.get(6)?;
    let status = raw_status
        .parse::<WatchStatus>()
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(err)))?;
    let watched_seconds: f64 = row.get(7)?;
    let duration_seconds: f64 = row.get(4)?;

    Ok(Video {
        id: row.get(0)?,
        chapter_id: row.get(1)?,
        name: row.get(2)?,
        file_path: row.get(3)?,
        duration_seconds,
        order_in_chapter: row.get(5)?,
        watch: WatchState::from_columns(status, watched_seconds, duration_seconds),
        subtitle_path: row.get(8)?,
    })
}
