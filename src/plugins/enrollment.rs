//! Enrollments. Each enrollment owns one `course_progress` row and counts
//! toward `courses.total_enrollments`.

use crate::core::aggregate::{self, AggregateRule, Assignment};
use crate::core::db;
use crate::core::error::{self, LearnstateError};
use crate::core::schemas;
use crate::core::store::Store;
use crate::core::time;
use crate::plugins::progress::{self, CourseCompletion, CourseProgress};
use crate::plugins::{catalog, users};
use clap::{Parser, Subcommand};
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub fn initialize_enrollment_db(root: &Path) -> Result<(), LearnstateError> {
    db::apply_schema(root, "enrollment.init", &[schemas::ENROLLMENTS_SCHEMA])
}

/// `courses.total_enrollments` = number of enrollment rows for the course.
pub const COURSE_ENROLLMENTS: AggregateRule = AggregateRule {
    name: "course.enrollments",
    parent_table: "courses",
    assignments: &[Assignment {
        column: "total_enrollments",
        expr: "SELECT COUNT(*) FROM enrollments WHERE course_id = ?1",
    }],
};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Enrollment {
    pub id: String,
    pub user_id: String,
    pub course_id: String,
    pub enrolled_at: i64,
    pub progress: CourseProgress,
}

#[derive(Parser, Debug)]
#[clap(name = "enroll", about = "Manage course enrollments")]
pub struct EnrollCli {
    #[clap(subcommand)]
    pub command: EnrollCommand,
}

#[derive(Subcommand, Debug)]
pub enum EnrollCommand {
    /// Enroll a user in a course.
    Add {
        #[clap(long)]
        user: String,
        #[clap(long)]
        course: String,
    },
    /// Remove an enrollment and its progress.
    Remove {
        #[clap(long)]
        user: String,
        #[clap(long)]
        course: String,
    },
    /// Check whether a user is enrolled.
    Check {
        #[clap(long)]
        user: String,
        #[clap(long)]
        course: String,
    },
}

pub fn run_enroll_cli(store: &Store, cli: EnrollCli) -> Result<serde_json::Value, LearnstateError> {
    let value = match cli.command {
        EnrollCommand::Add { user, course } => serde_json::to_value(enroll(store, &user, &course)?),
        EnrollCommand::Remove { user, course } => {
            unenroll(store, &user, &course)?;
            Ok(serde_json::json!({ "user": user, "course": course, "enrolled": false }))
        }
        EnrollCommand::Check { user, course } => {
            let enrolled = is_enrolled(store, &user, &course)?;
            Ok(serde_json::json!({ "user": user, "course": course, "enrolled": enrolled }))
        }
    };
    Ok(value?)
}

/// Enroll `user_id` in `course_id` (id or slug) and create its progress row.
///
/// The course's enrollment count and the new progress row are both computed
/// in the same transaction, so the returned progress already reflects the
/// course's current topics.
pub fn enroll(store: &Store, user_id: &str, course_id: &str) -> Result<Enrollment, LearnstateError> {
    let completion = CourseCompletion::from_config(&store.config);
    store.write("enrollment.enroll", |conn| {
        let user = users::load_user(conn, user_id)?;
        let course = catalog::load_course(conn, course_id)?;
        let id = time::new_id();
        let enrolled_at = time::now_millis();
        conn.execute(
            "INSERT INTO enrollments(id, user_id, course_id, enrolled_at) VALUES(?1, ?2, ?3, ?4)",
            params![id, user.id, course.id, enrolled_at],
        )
        .map_err(|e| {
            error::on_constraint(
                e,
                &format!("user {} is already enrolled in {}", user.id, course.slug),
            )
        })?;
        let progress_id = progress::insert_progress_row(conn, &id, &user.id, &course.id)?;

        aggregate::propagate(conn, &COURSE_ENROLLMENTS, &course.id);
        aggregate::propagate(conn, &completion, &progress_id);

        let progress = progress::require_enrolled(conn, &user.id, &course.id)?;
        Ok(Enrollment {
            id,
            user_id: user.id,
            course_id: course.id,
            enrolled_at,
            progress,
        })
    })
}

/// Delete an enrollment; its progress and topic records cascade.
pub fn unenroll(store: &Store, user_id: &str, course_id: &str) -> Result<(), LearnstateError> {
    store.write("enrollment.unenroll", |conn| {
        let course = catalog::load_course(conn, course_id)?;
        let changed = conn.execute(
            "DELETE FROM enrollments WHERE user_id = ?1 AND course_id = ?2",
            params![user_id, course.id],
        )?;
        if changed == 0 {
            return Err(LearnstateError::NotFound(format!(
                "enrollment of {} in {}",
                user_id, course.slug
            )));
        }
        aggregate::propagate(conn, &COURSE_ENROLLMENTS, &course.id);
        Ok(())
    })
}

pub fn is_enrolled(store: &Store, user_id: &str, course_id: &str) -> Result<bool, LearnstateError> {
    store.read("enrollment.check", |conn| {
        let course = catalog::load_course(conn, course_id)?;
        enrollment_id(conn, user_id, &course.id).map(|id| id.is_some())
    })
}

fn enrollment_id(
    conn: &Connection,
    user_id: &str,
    course_id: &str,
) -> Result<Option<String>, LearnstateError> {
    Ok(conn
        .query_row(
            "SELECT id FROM enrollments WHERE user_id = ?1 AND course_id = ?2",
            params![user_id, course_id],
            |row| row.get(0),
        )
        .optional()?)
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "enroll",
        "version": "0.1.0",
        "description": "Course enrollments; maintains the course enrollment count",
        "commands": [
            { "name": "add", "parameters": ["user", "course"] },
            { "name": "remove", "parameters": ["user", "course"] },
            { "name": "check", "parameters": ["user", "course"] }
        ],
        "aggregates": [COURSE_ENROLLMENTS.name],
        "storage": [schemas::STORE_DB_NAME]
    })
}
