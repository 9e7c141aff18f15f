//! Course reviews and the course rating aggregate.

use crate::core::aggregate::{self, AggregateRule, Assignment};
use crate::core::db;
use crate::core::error::{self, LearnstateError};
use crate::core::schemas;
use crate::core::store::Store;
use crate::core::time;
use crate::plugins::{catalog, users};
use clap::{Parser, Subcommand};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub fn initialize_reviews_db(root: &Path) -> Result<(), LearnstateError> {
    db::apply_schema(root, "reviews.init", &[schemas::COURSE_REVIEWS_SCHEMA])
}

/// `courses.average_rating` and `courses.total_reviews`; no reviews is `0.0` / `0`.
pub const COURSE_RATING: AggregateRule = AggregateRule {
    name: "course.rating",
    parent_table: "courses",
    assignments: &[
        Assignment {
            column: "average_rating",
            expr: "SELECT COALESCE(AVG(rating), 0.0) FROM course_reviews WHERE course_id = ?1",
        },
        Assignment {
            column: "total_reviews",
            expr: "SELECT COUNT(*) FROM course_reviews WHERE course_id = ?1",
        },
    ],
};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Review {
    pub id: String,
    pub user_id: String,
    pub course_id: String,
    pub rating: i64,
    pub comment: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

const REVIEW_COLUMNS: &str = "id, user_id, course_id, rating, comment, created_at, updated_at";

impl Review {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Review {
            id: row.get(0)?,
            user_id: row.get(1)?,
            course_id: row.get(2)?,
            rating: row.get(3)?,
            comment: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }
}

#[derive(Parser, Debug)]
#[clap(name = "review", about = "Rate and review courses")]
pub struct ReviewCli {
    #[clap(subcommand)]
    pub command: ReviewCommand,
}

#[derive(Subcommand, Debug)]
pub enum ReviewCommand {
    /// Review a course (one review per user and course).
    Add {
        #[clap(long)]
        user: String,
        #[clap(long)]
        course: String,
        #[clap(long)]
        rating: i64,
        #[clap(long)]
        comment: Option<String>,
    },
    /// Change a review's rating or comment.
    Update {
        #[clap(long)]
        id: String,
        #[clap(long)]
        rating: Option<i64>,
        #[clap(long)]
        comment: Option<String>,
    },
    /// Delete a review.
    Delete {
        #[clap(long)]
        id: String,
    },
    /// List reviews of a course.
    List {
        #[clap(long)]
        course: String,
    },
}

pub fn run_review_cli(store: &Store, cli: ReviewCli) -> Result<serde_json::Value, LearnstateError> {
    let value = match cli.command {
        ReviewCommand::Add {
            user,
            course,
            rating,
            comment,
        } => serde_json::to_value(add_review(store, &user, &course, rating, comment.as_deref())?),
        ReviewCommand::Update {
            id,
            rating,
            comment,
        } => serde_json::to_value(update_review(store, &id, rating, comment.as_deref())?),
        ReviewCommand::Delete { id } => {
            delete_review(store, &id)?;
            Ok(serde_json::json!({ "deleted": id }))
        }
        ReviewCommand::List { course } => serde_json::to_value(list_reviews(store, &course)?),
    };
    Ok(value?)
}

fn validate_rating(rating: i64) -> Result<(), LearnstateError> {
    if !(1..=5).contains(&rating) {
        return Err(LearnstateError::ValidationError(format!(
            "rating must be between 1 and 5, got {}",
            rating
        )));
    }
    Ok(())
}

pub fn add_review(
    store: &Store,
    user_id: &str,
    course_id: &str,
    rating: i64,
    comment: Option<&str>,
) -> Result<Review, LearnstateError> {
    validate_rating(rating)?;
    store.write("reviews.add", |conn| {
        let user = users::load_user(conn, user_id)?;
        let course = catalog::load_course(conn, course_id)?;
        let id = time::new_id();
        let now = time::now_millis();
        conn.execute(
            "INSERT INTO course_reviews(id, user_id, course_id, rating, comment, created_at, updated_at)
             VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![id, user.id, course.id, rating, comment, now],
        )
        .map_err(|e| {
            error::on_constraint(e, &format!("user {} already reviewed {}", user.id, course.slug))
        })?;
        aggregate::propagate(conn, &COURSE_RATING, &course.id);
        load_review(conn, &id)
    })
}

/// Update a review. The course rating is only recomputed when the rating changed.
pub fn update_review(
    store: &Store,
    review_id: &str,
    rating: Option<i64>,
    comment: Option<&str>,
) -> Result<Review, LearnstateError> {
    if let Some(r) = rating {
        validate_rating(r)?;
    }
    store.write("reviews.update", |conn| {
        let current = load_review(conn, review_id)?;
        let new_rating = rating.unwrap_or(current.rating);
        let new_comment = comment.map(str::to_string).or(current.comment.clone());
        conn.execute(
            "UPDATE course_reviews SET rating = ?2, comment = ?3, updated_at = ?4 WHERE id = ?1",
            params![review_id, new_rating, new_comment, time::now_millis()],
        )?;
        if new_rating != current.rating {
            aggregate::propagate(conn, &COURSE_RATING, &current.course_id);
        }
        load_review(conn, review_id)
    })
}

pub fn delete_review(store: &Store, review_id: &str) -> Result<(), LearnstateError> {
    store.write("reviews.delete", |conn| {
        let review = load_review(conn, review_id)?;
        conn.execute("DELETE FROM course_reviews WHERE id = ?1", params![review_id])?;
        aggregate::propagate(conn, &COURSE_RATING, &review.course_id);
        Ok(())
    })
}

pub fn list_reviews(store: &Store, course_id: &str) -> Result<Vec<Review>, LearnstateError> {
    store.read("reviews.list", |conn| {
        let course = catalog::load_course(conn, course_id)?;
        let sql = format!(
            "SELECT {} FROM course_reviews WHERE course_id = ?1 ORDER BY created_at DESC, id DESC",
            REVIEW_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let reviews = stmt
            .query_map(params![course.id], Review::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(reviews)
    })
}

fn load_review(conn: &Connection, id: &str) -> Result<Review, LearnstateError> {
    let sql = format!("SELECT {} FROM course_reviews WHERE id = ?1", REVIEW_COLUMNS);
    conn.query_row(&sql, params![id], Review::from_row)
        .optional()?
        .ok_or_else(|| LearnstateError::NotFound(format!("review {}", id)))
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "review",
        "version": "0.1.0",
        "description": "Course reviews; maintains the course average rating and review count",
        "commands": [
            { "name": "add", "parameters": ["user", "course", "rating", "comment"] },
            { "name": "update", "parameters": ["id", "rating", "comment"] },
            { "name": "delete", "parameters": ["id"] },
            { "name": "list", "parameters": ["course"] }
        ],
        "aggregates": [COURSE_RATING.name],
        "storage": [schemas::STORE_DB_NAME]
    })
}
