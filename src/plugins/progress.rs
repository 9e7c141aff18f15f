//! Learner progress: per-topic completion records and the per-enrollment
//! course completion aggregate.
//!
//! `course_progress` caches `completed_topics_count`, `total_topics_count`,
//! `progress_percentage` and `completed_at`. The cache is recomputed from
//! `topic_progress` and the course's current topics whenever either changes.

use crate::core::aggregate::{self, Aggregate, RecomputeOutcome};
use crate::core::config::{CompletionPolicy, StoreConfig};
use crate::core::db;
use crate::core::error::LearnstateError;
use crate::core::schemas;
use crate::core::store::Store;
use crate::core::time;
use crate::plugins::{catalog, quiz};
use clap::{Parser, Subcommand};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub fn initialize_progress_db(root: &Path) -> Result<(), LearnstateError> {
    db::apply_schema(
        root,
        "progress.init",
        &[schemas::COURSE_PROGRESS_SCHEMA, schemas::TOPIC_PROGRESS_SCHEMA],
    )
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CourseProgress {
    pub id: String,
    pub enrollment_id: String,
    pub user_id: String,
    pub course_id: String,
    pub completed_topics_count: i64,
    pub total_topics_count: i64,
    pub progress_percentage: f64,
    pub completed_at: Option<i64>,
    pub last_accessed_topic_id: Option<String>,
}

const PROGRESS_COLUMNS: &str = "id, enrollment_id, user_id, course_id, completed_topics_count, \
     total_topics_count, progress_percentage, completed_at, last_accessed_topic_id";

impl CourseProgress {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(CourseProgress {
            id: row.get(0)?,
            enrollment_id: row.get(1)?,
            user_id: row.get(2)?,
            course_id: row.get(3)?,
            completed_topics_count: row.get(4)?,
            total_topics_count: row.get(5)?,
            progress_percentage: row.get(6)?,
            completed_at: row.get(7)?,
            last_accessed_topic_id: row.get(8)?,
        })
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TopicProgress {
    pub id: String,
    pub course_progress_id: String,
    pub user_id: String,
    pub topic_id: String,
    pub is_completed: bool,
    pub completed_at: Option<i64>,
}

/// Result of the completion computation for one enrollment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Completion {
    pub completed: i64,
    pub total: i64,
    pub percentage: f64,
    pub completed_at: Option<i64>,
}

/// Completion math for one enrollment.
///
/// A course without topics reports `empty_percentage`. `completed` is clamped to
/// `total`. `completed_at` keeps its earliest value while the course stays
/// complete; when it drops below 100% the policy decides whether it is cleared.
pub fn compute_completion(
    completed: i64,
    total: i64,
    previous_completed_at: Option<i64>,
    now: i64,
    policy: CompletionPolicy,
    empty_percentage: f64,
) -> Completion {
    let completed = completed.clamp(0, total.max(0));
    let (percentage, finished) = if total <= 0 {
        (empty_percentage, empty_percentage >= 100.0)
    } else if completed == total {
        (100.0, true)
    } else {
        // Rounding must not report 100% while a topic is still open.
        (round2(completed as f64 * 100.0 / total as f64).min(99.99), false)
    };

    let completed_at = if finished {
        previous_completed_at.or(Some(now))
    } else {
        match policy {
            CompletionPolicy::Reversible => None,
            CompletionPolicy::Monotonic => previous_completed_at,
        }
    };

    Completion {
        completed,
        total: total.max(0),
        percentage,
        completed_at,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Course completion aggregate over `topic_progress`, parented by `course_progress`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CourseCompletion {
    pub policy: CompletionPolicy,
    pub empty_percentage: f64,
}

impl CourseCompletion {
    pub fn from_config(config: &StoreConfig) -> Self {
        Self {
            policy: config.progress.completion_policy,
            empty_percentage: config.progress.empty_course_percentage,
        }
    }
}

impl Aggregate for CourseCompletion {
    fn name(&self) -> &'static str {
        "course_progress.completion"
    }

    fn parent_table(&self) -> &'static str {
        "course_progress"
    }

    fn columns(&self) -> Vec<&'static str> {
        vec![
            "completed_topics_count",
            "total_topics_count",
            "progress_percentage",
            "completed_at",
        ]
    }

    fn recompute(&self, conn: &Connection, parent_id: &str) -> Result<(), LearnstateError> {
        let (course_id, previous_completed_at): (String, Option<i64>) = conn
            .query_row(
                "SELECT course_id, completed_at FROM course_progress WHERE id = ?1",
                params![parent_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?
            .ok_or_else(|| LearnstateError::NotFound(format!("course_progress {}", parent_id)))?;

        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM topics t JOIN modules m ON m.id = t.module_id WHERE m.course_id = ?1",
            params![course_id],
            |row| row.get(0),
        )?;
        let completed: i64 = conn.query_row(
            "SELECT COUNT(*) FROM topic_progress tp
             JOIN topics t ON t.id = tp.topic_id
             JOIN modules m ON m.id = t.module_id
             WHERE tp.course_progress_id = ?1 AND tp.is_completed = 1 AND m.course_id = ?2",
            params![parent_id, course_id],
            |row| row.get(0),
        )?;

        let c = compute_completion(
            completed,
            total,
            previous_completed_at,
            time::now_millis(),
            self.policy,
            self.empty_percentage,
        );
        conn.execute(
            "UPDATE course_progress
             SET completed_topics_count = ?2, total_topics_count = ?3, progress_percentage = ?4, completed_at = ?5
             WHERE id = ?1",
            params![parent_id, c.completed, c.total, c.percentage, c.completed_at],
        )?;
        Ok(())
    }
}

/// Recompute every progress row of `course_id`; returns how many went stale.
pub(crate) fn propagate_course_progress(
    conn: &Connection,
    completion: &CourseCompletion,
    course_id: &str,
) -> usize {
    let ids = conn
        .prepare("SELECT id FROM course_progress WHERE course_id = ?1")
        .and_then(|mut stmt| {
            stmt.query_map(params![course_id], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()
        });
    match ids {
        Ok(ids) => aggregate::propagate_all(conn, completion, ids),
        Err(e) => {
            tracing::warn!(course_id, error = %e, "could not list progress rows; left stale");
            0
        }
    }
}

/// Create the empty progress row for a new enrollment; the caller propagates.
pub(crate) fn insert_progress_row(
    conn: &Connection,
    enrollment_id: &str,
    user_id: &str,
    course_id: &str,
) -> Result<String, LearnstateError> {
    let id = time::new_id();
    conn.execute(
        "INSERT INTO course_progress(id, enrollment_id, user_id, course_id) VALUES(?1, ?2, ?3, ?4)",
        params![id, enrollment_id, user_id, course_id],
    )?;
    Ok(id)
}

pub(crate) fn progress_for(
    conn: &Connection,
    user_id: &str,
    course_id: &str,
) -> Result<Option<CourseProgress>, LearnstateError> {
    let sql = format!(
        "SELECT {} FROM course_progress WHERE user_id = ?1 AND course_id = ?2",
        PROGRESS_COLUMNS
    );
    Ok(conn
        .query_row(&sql, params![user_id, course_id], CourseProgress::from_row)
        .optional()?)
}

/// Progress row of an enrolled user, or a validation error naming the course.
pub(crate) fn require_enrolled(
    conn: &Connection,
    user_id: &str,
    course_id: &str,
) -> Result<CourseProgress, LearnstateError> {
    progress_for(conn, user_id, course_id)?.ok_or_else(|| {
        LearnstateError::ValidationError(format!(
            "user {} is not enrolled in course {}",
            user_id, course_id
        ))
    })
}

fn load_progress(conn: &Connection, progress_id: &str) -> Result<CourseProgress, LearnstateError> {
    let sql = format!("SELECT {} FROM course_progress WHERE id = ?1", PROGRESS_COLUMNS);
    conn.query_row(&sql, params![progress_id], CourseProgress::from_row)
        .optional()?
        .ok_or_else(|| LearnstateError::NotFound(format!("course_progress {}", progress_id)))
}

/// Upsert the learner's topic record. `completed_at` keeps the first completion
/// time while the topic stays complete and is cleared when it is un-completed.
pub(crate) fn mark_topic(
    conn: &Connection,
    progress: &CourseProgress,
    topic_id: &str,
    completed: bool,
) -> Result<String, LearnstateError> {
    let now = time::now_millis();
    conn.execute(
        "INSERT INTO topic_progress(id, course_progress_id, user_id, topic_id, is_completed, completed_at)
         VALUES(?1, ?2, ?3, ?4, ?5, CASE WHEN ?5 THEN ?6 ELSE NULL END)
         ON CONFLICT(user_id, topic_id) DO UPDATE SET
             is_completed = excluded.is_completed,
             completed_at = CASE
                 WHEN excluded.is_completed = 0 THEN NULL
                 WHEN topic_progress.is_completed = 1 THEN topic_progress.completed_at
                 ELSE excluded.completed_at
             END",
        params![time::new_id(), progress.id, progress.user_id, topic_id, completed, now],
    )?;
    let id = conn.query_row(
        "SELECT id FROM topic_progress WHERE user_id = ?1 AND topic_id = ?2",
        params![progress.user_id, topic_id],
        |row| row.get(0),
    )?;
    Ok(id)
}

/// Mark a topic complete for an enrolled user and recompute course progress.
///
/// Topics that carry a quiz can only be completed by passing it.
pub fn complete_topic(
    store: &Store,
    user_id: &str,
    topic_id: &str,
) -> Result<CourseProgress, LearnstateError> {
    set_topic_completion(store, user_id, topic_id, true)
}

pub fn uncomplete_topic(
    store: &Store,
    user_id: &str,
    topic_id: &str,
) -> Result<CourseProgress, LearnstateError> {
    set_topic_completion(store, user_id, topic_id, false)
}

fn set_topic_completion(
    store: &Store,
    user_id: &str,
    topic_id: &str,
    completed: bool,
) -> Result<CourseProgress, LearnstateError> {
    let completion = CourseCompletion::from_config(&store.config);
    let op = if completed {
        "progress.topic_complete"
    } else {
        "progress.topic_uncomplete"
    };
    store.write(op, |conn| {
        let topic = catalog::load_topic(conn, topic_id)?;
        let course_id = catalog::course_of_topic(conn, &topic.id)?;
        let progress = require_enrolled(conn, user_id, &course_id)?;

        if completed && quiz::has_quiz(conn, &topic.id)? && !quiz::has_passed(conn, user_id, &topic.id)? {
            return Err(LearnstateError::ValidationError(format!(
                "must pass the quiz before completing topic {}",
                topic.slug
            )));
        }

        mark_topic(conn, &progress, &topic.id, completed)?;
        aggregate::propagate(conn, &completion, &progress.id);
        load_progress(conn, &progress.id)
    })
}

/// Remember the last topic a learner opened. Not an aggregate.
pub fn record_topic_access(
    store: &Store,
    user_id: &str,
    topic_id: &str,
) -> Result<CourseProgress, LearnstateError> {
    store.write("progress.topic_access", |conn| {
        let topic = catalog::load_topic(conn, topic_id)?;
        let course_id = catalog::course_of_topic(conn, &topic.id)?;
        let progress = require_enrolled(conn, user_id, &course_id)?;
        conn.execute(
            "UPDATE course_progress SET last_accessed_topic_id = ?2 WHERE id = ?1",
            params![progress.id, topic.id],
        )?;
        load_progress(conn, &progress.id)
    })
}

pub fn get_progress(
    store: &Store,
    user_id: &str,
    course_id: &str,
) -> Result<CourseProgress, LearnstateError> {
    store.read("progress.get", |conn| {
        let course = catalog::load_course(conn, course_id)?;
        require_enrolled(conn, user_id, &course.id)
    })
}

pub fn list_topic_progress(
    store: &Store,
    user_id: &str,
    course_id: &str,
) -> Result<Vec<TopicProgress>, LearnstateError> {
    store.read("progress.topic_list", |conn| {
        let course = catalog::load_course(conn, course_id)?;
        let progress = require_enrolled(conn, user_id, &course.id)?;
        let mut stmt = conn.prepare(
            "SELECT id, course_progress_id, user_id, topic_id, is_completed, completed_at
             FROM topic_progress WHERE course_progress_id = ?1 ORDER BY topic_id",
        )?;
        let rows = stmt
            .query_map(params![progress.id], |row| {
                Ok(TopicProgress {
                    id: row.get(0)?,
                    course_progress_id: row.get(1)?,
                    user_id: row.get(2)?,
                    topic_id: row.get(3)?,
                    is_completed: row.get(4)?,
                    completed_at: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Explicit recompute of one progress row.
pub fn recompute_progress(store: &Store, progress_id: &str) -> Result<RecomputeOutcome, LearnstateError> {
    let completion = CourseCompletion::from_config(&store.config);
    store.write("progress.recompute", |conn| {
        Ok(aggregate::propagate(conn, &completion, progress_id))
    })
}

// --- CLI ---

#[derive(Parser, Debug)]
#[clap(name = "progress", about = "Track learner progress")]
pub struct ProgressCli {
    #[clap(subcommand)]
    pub command: ProgressCommand,
}

#[derive(Subcommand, Debug)]
pub enum ProgressCommand {
    /// Mark a topic complete.
    Complete {
        #[clap(long)]
        user: String,
        #[clap(long)]
        topic: String,
    },
    /// Mark a topic not complete.
    Uncomplete {
        #[clap(long)]
        user: String,
        #[clap(long)]
        topic: String,
    },
    /// Record the last topic a learner opened.
    Access {
        #[clap(long)]
        user: String,
        #[clap(long)]
        topic: String,
    },
    /// Show course progress.
    Get {
        #[clap(long)]
        user: String,
        #[clap(long)]
        course: String,
    },
    /// List per-topic progress for one course.
    Topics {
        #[clap(long)]
        user: String,
        #[clap(long)]
        course: String,
    },
    /// Recompute one progress row.
    Recompute {
        #[clap(long)]
        id: String,
    },
}

pub fn run_progress_cli(store: &Store, cli: ProgressCli) -> Result<serde_json::Value, LearnstateError> {
    let value = match cli.command {
        ProgressCommand::Complete { user, topic } => {
            serde_json::to_value(complete_topic(store, &user, &topic)?)
        }
        ProgressCommand::Uncomplete { user, topic } => {
            serde_json::to_value(uncomplete_topic(store, &user, &topic)?)
        }
        ProgressCommand::Access { user, topic } => {
            serde_json::to_value(record_topic_access(store, &user, &topic)?)
        }
        ProgressCommand::Get { user, course } => {
            serde_json::to_value(get_progress(store, &user, &course)?)
        }
        ProgressCommand::Topics { user, course } => {
            serde_json::to_value(list_topic_progress(store, &user, &course)?)
        }
        ProgressCommand::Recompute { id } => {
            let outcome = recompute_progress(store, &id)?;
            Ok(match outcome {
                RecomputeOutcome::Fresh => serde_json::json!({ "id": id, "outcome": "fresh" }),
                RecomputeOutcome::Stale { reason } => {
                    serde_json::json!({ "id": id, "outcome": "stale", "reason": reason })
                }
            })
        }
    };
    Ok(value?)
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "progress",
        "version": "0.1.0",
        "description": "Per-topic completion and the derived course completion percentage",
        "commands": [
            { "name": "complete", "parameters": ["user", "topic"] },
            { "name": "uncomplete", "parameters": ["user", "topic"] },
            { "name": "access", "parameters": ["user", "topic"] },
            { "name": "get", "parameters": ["user", "course"] },
            { "name": "topics", "parameters": ["user", "course"] },
            { "name": "recompute", "parameters": ["id"] }
        ],
        "aggregates": ["course_progress.completion"],
        "storage": [schemas::STORE_DB_NAME]
    })
}
