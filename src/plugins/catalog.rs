//! Course catalog: categories, courses, modules and topics.
//!
//! Topic mutations are child mutations for two aggregates: the course's
//! `total_duration_minutes` and every enrolled learner's progress row (the
//! topic count is the completion denominator).

use crate::core::aggregate::{self, AggregateRule, Assignment};
use crate::core::db;
use crate::core::error::{self, LearnstateError};
use crate::core::output;
use crate::core::schemas;
use crate::core::store::Store;
use crate::core::time;
use crate::plugins::progress::{self, CourseCompletion};
use clap::{Parser, Subcommand};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub fn initialize_catalog_db(root: &Path) -> Result<(), LearnstateError> {
    db::apply_schema(
        root,
        "catalog.init",
        &[
            schemas::CATEGORIES_SCHEMA,
            schemas::COURSES_SCHEMA,
            schemas::MODULES_SCHEMA,
            schemas::TOPICS_SCHEMA,
        ],
    )
}

/// `courses.total_duration_minutes` = sum of topic durations across all modules.
pub const COURSE_DURATION: AggregateRule = AggregateRule {
    name: "course.duration",
    parent_table: "courses",
    assignments: &[Assignment {
        column: "total_duration_minutes",
        expr: "SELECT COALESCE(SUM(t.estimated_duration_minutes), 0)
               FROM topics t JOIN modules m ON m.id = t.module_id
               WHERE m.course_id = ?1",
    }],
};

crate::text_enum! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
    #[serde(rename_all = "lowercase")]
    pub enum CourseLevel {
        #[default]
        Beginner => "beginner",
        Intermediate => "intermediate",
        Advanced => "advanced",
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Course {
    pub id: String,
    pub instructor_id: Option<String>,
    pub category_id: Option<String>,
    pub title: String,
    pub slug: String,
    pub short_description: String,
    pub level: CourseLevel,
    pub price_cents: i64,
    pub is_published: bool,
    pub published_at: Option<i64>,
    pub average_rating: f64,
    pub total_reviews: i64,
    pub total_enrollments: i64,
    pub total_duration_minutes: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

const COURSE_COLUMNS: &str = "id, instructor_id, category_id, title, slug, short_description, level, \
     price_cents, is_published, published_at, average_rating, total_reviews, total_enrollments, \
     total_duration_minutes, created_at, updated_at";

impl Course {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Course {
            id: row.get(0)?,
            instructor_id: row.get(1)?,
            category_id: row.get(2)?,
            title: row.get(3)?,
            slug: row.get(4)?,
            short_description: row.get(5)?,
            level: row.get(6)?,
            price_cents: row.get(7)?,
            is_published: row.get(8)?,
            published_at: row.get(9)?,
            average_rating: row.get(10)?,
            total_reviews: row.get(11)?,
            total_enrollments: row.get(12)?,
            total_duration_minutes: row.get(13)?,
            created_at: row.get(14)?,
            updated_at: row.get(15)?,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewCourse {
    pub title: String,
    pub instructor_id: Option<String>,
    pub category_id: Option<String>,
    pub short_description: String,
    pub level: CourseLevel,
    pub price_cents: i64,
}

impl NewCourse {
    pub fn titled(title: &str) -> Self {
        Self {
            title: title.to_string(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Module {
    pub id: String,
    pub course_id: String,
    pub title: String,
    pub ord: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Topic {
    pub id: String,
    pub module_id: String,
    pub title: String,
    pub slug: String,
    pub estimated_duration_minutes: i64,
    pub ord: i64,
    pub is_previewable: bool,
}

impl Topic {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Topic {
            id: row.get(0)?,
            module_id: row.get(1)?,
            title: row.get(2)?,
            slug: row.get(3)?,
            estimated_duration_minutes: row.get(4)?,
            ord: row.get(5)?,
            is_previewable: row.get(6)?,
        })
    }
}

const TOPIC_COLUMNS: &str =
    "id, module_id, title, slug, estimated_duration_minutes, ord, is_previewable";

#[derive(Debug, Clone)]
pub struct NewTopic {
    pub module_id: String,
    pub title: String,
    pub estimated_duration_minutes: i64,
    pub ord: i64,
    pub is_previewable: bool,
}

#[derive(Debug, Clone, Default)]
pub struct TopicUpdate {
    pub title: Option<String>,
    pub estimated_duration_minutes: Option<i64>,
    pub is_previewable: Option<bool>,
}

// --- CLI ---

#[derive(Parser, Debug)]
#[clap(name = "course", about = "Manage the course catalog")]
pub struct CourseCli {
    #[clap(subcommand)]
    pub command: CourseCommand,
}

#[derive(Subcommand, Debug)]
pub enum CourseCommand {
    /// Create a category.
    AddCategory {
        #[clap(long)]
        name: String,
        #[clap(long)]
        description: Option<String>,
    },
    /// Create a course (unpublished).
    Create {
        #[clap(long)]
        title: String,
        #[clap(long)]
        instructor: Option<String>,
        #[clap(long)]
        category: Option<String>,
        #[clap(long, default_value = "")]
        short_description: String,
        #[clap(long, default_value = "beginner")]
        level: CourseLevel,
        #[clap(long, default_value = "0")]
        price_cents: i64,
    },
    /// Publish a course.
    Publish {
        #[clap(long)]
        id: String,
    },
    /// Show a course by id or slug.
    Get {
        #[clap(long)]
        id: String,
    },
    /// List courses.
    List {
        #[clap(long)]
        published: bool,
    },
    /// Add a module to a course.
    AddModule {
        #[clap(long)]
        course: String,
        #[clap(long)]
        title: String,
        #[clap(long)]
        ord: i64,
    },
    /// Delete a module and its topics.
    DeleteModule {
        #[clap(long)]
        id: String,
    },
    /// Add a topic to a module.
    AddTopic {
        #[clap(long)]
        module: String,
        #[clap(long)]
        title: String,
        #[clap(long)]
        ord: i64,
        #[clap(long, default_value = "5")]
        duration: i64,
        #[clap(long)]
        previewable: bool,
    },
    /// Update a topic.
    UpdateTopic {
        #[clap(long)]
        id: String,
        #[clap(long)]
        title: Option<String>,
        #[clap(long)]
        duration: Option<i64>,
        #[clap(long)]
        previewable: Option<bool>,
    },
    /// Delete a topic.
    DeleteTopic {
        #[clap(long)]
        id: String,
    },
}

pub fn run_course_cli(store: &Store, cli: CourseCli) -> Result<serde_json::Value, LearnstateError> {
    let value = match cli.command {
        CourseCommand::AddCategory { name, description } => {
            serde_json::to_value(create_category(store, &name, description.as_deref())?)
        }
        CourseCommand::Create {
            title,
            instructor,
            category,
            short_description,
            level,
            price_cents,
        } => serde_json::to_value(create_course(
            store,
            NewCourse {
                title,
                instructor_id: instructor,
                category_id: category,
                short_description,
                level,
                price_cents,
            },
        )?),
        CourseCommand::Publish { id } => serde_json::to_value(publish_course(store, &id)?),
        CourseCommand::Get { id } => serde_json::to_value(get_course(store, &id)?),
        CourseCommand::List { published } => serde_json::to_value(list_courses(store, published)?),
        CourseCommand::AddModule { course, title, ord } => {
            serde_json::to_value(add_module(store, &course, &title, ord)?)
        }
        CourseCommand::DeleteModule { id } => {
            delete_module(store, &id)?;
            Ok(serde_json::json!({ "deleted": id }))
        }
        CourseCommand::AddTopic {
            module,
            title,
            ord,
            duration,
            previewable,
        } => serde_json::to_value(add_topic(
            store,
            NewTopic {
                module_id: module,
                title,
                estimated_duration_minutes: duration,
                ord,
                is_previewable: previewable,
            },
        )?),
        CourseCommand::UpdateTopic {
            id,
            title,
            duration,
            previewable,
        } => serde_json::to_value(update_topic(
            store,
            &id,
            TopicUpdate {
                title,
                estimated_duration_minutes: duration,
                is_previewable: previewable,
            },
        )?),
        CourseCommand::DeleteTopic { id } => {
            delete_topic(store, &id)?;
            Ok(serde_json::json!({ "deleted": id }))
        }
    };
    Ok(value?)
}

// --- Categories & courses ---

pub fn create_category(
    store: &Store,
    name: &str,
    description: Option<&str>,
) -> Result<Category, LearnstateError> {
    let name = name.trim();
    let base = output::slugify(name);
    if base.is_empty() {
        return Err(LearnstateError::ValidationError(
            "category name must contain letters or digits".to_string(),
        ));
    }
    store.write("catalog.category_create", |conn| {
        let category = Category {
            id: time::new_id(),
            name: name.to_string(),
            slug: db::unique_slug(conn, "categories", &base)?,
            description: description.map(str::to_string),
        };
        conn.execute(
            "INSERT INTO categories(id, name, slug, description, created_at) VALUES(?1, ?2, ?3, ?4, ?5)",
            params![category.id, category.name, category.slug, category.description, time::now_millis()],
        )
        .map_err(|e| error::on_constraint(e, &format!("category already exists: {}", name)))?;
        Ok(category)
    })
}

pub fn create_course(store: &Store, new: NewCourse) -> Result<Course, LearnstateError> {
    let title = new.title.trim();
    if title.is_empty() {
        return Err(LearnstateError::ValidationError(
            "course title must not be empty".to_string(),
        ));
    }
    if new.price_cents < 0 {
        return Err(LearnstateError::ValidationError(
            "course price must not be negative".to_string(),
        ));
    }
    let base = match output::slugify(title) {
        s if s.is_empty() => "course".to_string(),
        s => s,
    };

    store.write("catalog.course_create", |conn| {
        let id = time::new_id();
        let now = time::now_millis();
        let slug = db::unique_slug(conn, "courses", &base)?;
        conn.execute(
            "INSERT INTO courses(id, instructor_id, category_id, title, slug, short_description, level, price_cents, created_at, updated_at)
             VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
            params![
                id,
                new.instructor_id,
                new.category_id,
                title,
                slug,
                new.short_description,
                new.level,
                new.price_cents,
                now
            ],
        )
        .map_err(|e| error::on_constraint(e, "unknown instructor or category"))?;
        load_course(conn, &id)
    })
}

/// Publish a course; `published_at` is set on the first publish only.
pub fn publish_course(store: &Store, course_id: &str) -> Result<Course, LearnstateError> {
    store.write("catalog.course_publish", |conn| {
        let course = load_course(conn, course_id)?;
        conn.execute(
            "UPDATE courses SET is_published = 1, published_at = COALESCE(published_at, ?2), updated_at = ?2 WHERE id = ?1",
            params![course.id, time::now_millis()],
        )?;
        load_course(conn, &course.id)
    })
}

pub fn get_course(store: &Store, id_or_slug: &str) -> Result<Course, LearnstateError> {
    store.read("catalog.course_get", |conn| load_course(conn, id_or_slug))
}

pub fn list_courses(store: &Store, published_only: bool) -> Result<Vec<Course>, LearnstateError> {
    store.read("catalog.course_list", |conn| {
        let sql = format!(
            "SELECT {} FROM courses WHERE (?1 = 0 OR is_published = 1) ORDER BY created_at DESC, id DESC",
            COURSE_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let courses = stmt
            .query_map(params![published_only], Course::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(courses)
    })
}

pub(crate) fn load_course(conn: &Connection, id_or_slug: &str) -> Result<Course, LearnstateError> {
    let sql = format!(
        "SELECT {} FROM courses WHERE id = ?1 OR slug = ?1",
        COURSE_COLUMNS
    );
    conn.query_row(&sql, params![id_or_slug], Course::from_row)
        .optional()?
        .ok_or_else(|| LearnstateError::NotFound(format!("course {}", id_or_slug)))
}

// --- Modules ---

pub fn add_module(
    store: &Store,
    course_id: &str,
    title: &str,
    ord: i64,
) -> Result<Module, LearnstateError> {
    if ord < 0 {
        return Err(LearnstateError::ValidationError(
            "module order must not be negative".to_string(),
        ));
    }
    store.write("catalog.module_add", |conn| {
        let course = load_course(conn, course_id)?;
        let module = Module {
            id: time::new_id(),
            course_id: course.id,
            title: title.trim().to_string(),
            ord,
        };
        conn.execute(
            "INSERT INTO modules(id, course_id, title, ord) VALUES(?1, ?2, ?3, ?4)",
            params![module.id, module.course_id, module.title, module.ord],
        )
        .map_err(|e| {
            error::on_constraint(e, &format!("module order {} already used in course", ord))
        })?;
        Ok(module)
    })
}

/// Delete a module; its topics cascade, so the course's duration and every
/// progress row are recomputed afterwards.
pub fn delete_module(store: &Store, module_id: &str) -> Result<(), LearnstateError> {
    let completion = CourseCompletion::from_config(&store.config);
    store.write("catalog.module_delete", |conn| {
        let course_id: String = conn
            .query_row(
                "SELECT course_id FROM modules WHERE id = ?1",
                params![module_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| LearnstateError::NotFound(format!("module {}", module_id)))?;
        conn.execute("DELETE FROM modules WHERE id = ?1", params![module_id])?;
        propagate_topic_change(conn, &completion, &course_id);
        Ok(())
    })
}

pub fn list_modules(store: &Store, course_id: &str) -> Result<Vec<Module>, LearnstateError> {
    store.read("catalog.module_list", |conn| {
        let course = load_course(conn, course_id)?;
        let mut stmt = conn.prepare(
            "SELECT id, course_id, title, ord FROM modules WHERE course_id = ?1 ORDER BY ord",
        )?;
        let modules = stmt
            .query_map(params![course.id], |row| {
                Ok(Module {
                    id: row.get(0)?,
                    course_id: row.get(1)?,
                    title: row.get(2)?,
                    ord: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(modules)
    })
}

// --- Topics ---

pub fn add_topic(store: &Store, new: NewTopic) -> Result<Topic, LearnstateError> {
    validate_duration(new.estimated_duration_minutes)?;
    let title = new.title.trim();
    if title.is_empty() {
        return Err(LearnstateError::ValidationError(
            "topic title must not be empty".to_string(),
        ));
    }
    let base = match output::slugify(title) {
        s if s.is_empty() => "topic".to_string(),
        s => s,
    };
    let completion = CourseCompletion::from_config(&store.config);

    store.write("catalog.topic_add", |conn| {
        let course_id = course_of_module(conn, &new.module_id)?;
        let id = time::new_id();
        let slug = db::unique_slug(conn, "topics", &base)?;
        conn.execute(
            "INSERT INTO topics(id, module_id, title, slug, estimated_duration_minutes, ord, is_previewable)
             VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                id,
                new.module_id,
                title,
                slug,
                new.estimated_duration_minutes,
                new.ord,
                new.is_previewable
            ],
        )
        .map_err(|e| {
            error::on_constraint(e, &format!("topic order {} already used in module", new.ord))
        })?;
        propagate_topic_change(conn, &completion, &course_id);
        load_topic(conn, &id)
    })
}

/// Update a topic. Duration changes recompute the course total; the topic
/// count is unchanged so progress rows are left alone.
pub fn update_topic(
    store: &Store,
    topic_id: &str,
    update: TopicUpdate,
) -> Result<Topic, LearnstateError> {
    if let Some(minutes) = update.estimated_duration_minutes {
        validate_duration(minutes)?;
    }
    store.write("catalog.topic_update", |conn| {
        let current = load_topic(conn, topic_id)?;
        let title = update
            .title
            .as_deref()
            .map(str::trim)
            .unwrap_or(&current.title)
            .to_string();
        let minutes = update
            .estimated_duration_minutes
            .unwrap_or(current.estimated_duration_minutes);
        let previewable = update.is_previewable.unwrap_or(current.is_previewable);

        conn.execute(
            "UPDATE topics SET title = ?2, estimated_duration_minutes = ?3, is_previewable = ?4 WHERE id = ?1",
            params![current.id, title, minutes, previewable],
        )?;

        if minutes != current.estimated_duration_minutes {
            let course_id = course_of_module(conn, &current.module_id)?;
            aggregate::propagate(conn, &COURSE_DURATION, &course_id);
        }
        load_topic(conn, &current.id)
    })
}

pub fn delete_topic(store: &Store, topic_id: &str) -> Result<(), LearnstateError> {
    let completion = CourseCompletion::from_config(&store.config);
    store.write("catalog.topic_delete", |conn| {
        let topic = load_topic(conn, topic_id)?;
        let course_id = course_of_module(conn, &topic.module_id)?;
        conn.execute("DELETE FROM topics WHERE id = ?1", params![topic.id])?;
        propagate_topic_change(conn, &completion, &course_id);
        Ok(())
    })
}

pub fn get_topic(store: &Store, id_or_slug: &str) -> Result<Topic, LearnstateError> {
    store.read("catalog.topic_get", |conn| load_topic(conn, id_or_slug))
}

pub fn list_topics(store: &Store, course_id: &str) -> Result<Vec<Topic>, LearnstateError> {
    store.read("catalog.topic_list", |conn| {
        let course = load_course(conn, course_id)?;
        let sql = format!(
            "SELECT {} FROM topics WHERE module_id IN (SELECT id FROM modules WHERE course_id = ?1)
             ORDER BY (SELECT ord FROM modules WHERE modules.id = topics.module_id), ord",
            TOPIC_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let topics = stmt
            .query_map(params![course.id], Topic::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(topics)
    })
}

pub(crate) fn load_topic(conn: &Connection, id_or_slug: &str) -> Result<Topic, LearnstateError> {
    let sql = format!(
        "SELECT {} FROM topics WHERE id = ?1 OR slug = ?1",
        TOPIC_COLUMNS
    );
    conn.query_row(&sql, params![id_or_slug], Topic::from_row)
        .optional()?
        .ok_or_else(|| LearnstateError::NotFound(format!("topic {}", id_or_slug)))
}

pub(crate) fn course_of_module(conn: &Connection, module_id: &str) -> Result<String, LearnstateError> {
    conn.query_row(
        "SELECT course_id FROM modules WHERE id = ?1",
        params![module_id],
        |row| row.get(0),
    )
    .optional()?
    .ok_or_else(|| LearnstateError::NotFound(format!("module {}", module_id)))
}

pub(crate) fn course_of_topic(conn: &Connection, topic_id: &str) -> Result<String, LearnstateError> {
    conn.query_row(
        "SELECT m.course_id FROM topics t JOIN modules m ON m.id = t.module_id WHERE t.id = ?1",
        params![topic_id],
        |row| row.get(0),
    )
    .optional()?
    .ok_or_else(|| LearnstateError::NotFound(format!("topic {}", topic_id)))
}

/// Recompute everything a topic added to or removed from `course_id` affects.
fn propagate_topic_change(conn: &Connection, completion: &CourseCompletion, course_id: &str) {
    aggregate::propagate(conn, &COURSE_DURATION, course_id);
    progress::propagate_course_progress(conn, completion, course_id);
}

fn validate_duration(minutes: i64) -> Result<(), LearnstateError> {
    if minutes < 0 {
        return Err(LearnstateError::ValidationError(format!(
            "topic duration must not be negative, got {}",
            minutes
        )));
    }
    Ok(())
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "course",
        "version": "0.1.0",
        "description": "Course catalog; topic changes recompute course duration and learner progress",
        "commands": [
            { "name": "add-category", "parameters": ["name", "description"] },
            { "name": "create", "parameters": ["title", "instructor", "category", "short_description", "level", "price_cents"] },
            { "name": "publish", "parameters": ["id"] },
            { "name": "get", "parameters": ["id"] },
            { "name": "list", "parameters": ["published"] },
            { "name": "add-module", "parameters": ["course", "title", "ord"] },
            { "name": "delete-module", "parameters": ["id"] },
            { "name": "add-topic", "parameters": ["module", "title", "ord", "duration", "previewable"] },
            { "name": "update-topic", "parameters": ["id", "title", "duration", "previewable"] },
            { "name": "delete-topic", "parameters": ["id"] }
        ],
        "aggregates": [COURSE_DURATION.name],
        "storage": [schemas::STORE_DB_NAME]
    })
}
