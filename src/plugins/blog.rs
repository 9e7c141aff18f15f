//! Blog posts and comments.
//!
//! The blog keeps no cached aggregates: a post's comment count is computed on
//! read over approved comments.

use crate::core::db;
use crate::core::error::LearnstateError;
use crate::core::output;
use crate::core::schemas;
use crate::core::store::Store;
use crate::core::time;
use crate::plugins::users;
use clap::{Parser, Subcommand};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use std::path::Path;

const EXCERPT_MAX_CHARS: usize = 300;

pub fn initialize_blog_db(root: &Path) -> Result<(), LearnstateError> {
    db::apply_schema(
        root,
        "blog.init",
        &[schemas::BLOG_POSTS_SCHEMA, schemas::BLOG_COMMENTS_SCHEMA],
    )
}

crate::text_enum! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
    #[serde(rename_all = "lowercase")]
    pub enum BlogStatus {
        #[default]
        Draft => "draft",
        Published => "published",
        Archived => "archived",
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BlogPost {
    pub id: String,
    pub author_id: Option<String>,
    pub title: String,
    pub slug: String,
    pub content_html: String,
    pub excerpt: String,
    pub status: BlogStatus,
    pub publish_date: Option<i64>,
    pub view_count: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

const BLOG_POST_COLUMNS: &str = "id, author_id, title, slug, content_html, excerpt, status, \
     publish_date, view_count, created_at, updated_at";

impl BlogPost {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(BlogPost {
            id: row.get(0)?,
            author_id: row.get(1)?,
            title: row.get(2)?,
            slug: row.get(3)?,
            content_html: row.get(4)?,
            excerpt: row.get(5)?,
            status: row.get(6)?,
            publish_date: row.get(7)?,
            view_count: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewBlogPost {
    pub author_id: Option<String>,
    pub title: String,
    pub content_html: String,
    /// Generated from the content when empty.
    pub excerpt: String,
    pub status: BlogStatus,
}

/// A post together with its read-time comment count.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BlogPostView {
    #[serde(flatten)]
    pub post: BlogPost,
    pub comment_count: i64,
}

/// Who wrote a comment: a registered user or a named guest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlogCommenter {
    User(String),
    Guest(String),
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BlogComment {
    pub id: String,
    pub post_id: String,
    pub author_id: Option<String>,
    pub author_name: String,
    pub content: String,
    pub parent_comment_id: Option<String>,
    pub is_approved: bool,
    pub created_at: i64,
}

const BLOG_COMMENT_COLUMNS: &str =
    "id, post_id, author_id, author_name, content, parent_comment_id, is_approved, created_at";

impl BlogComment {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(BlogComment {
            id: row.get(0)?,
            post_id: row.get(1)?,
            author_id: row.get(2)?,
            author_name: row.get(3)?,
            content: row.get(4)?,
            parent_comment_id: row.get(5)?,
            is_approved: row.get(6)?,
            created_at: row.get(7)?,
        })
    }
}

/// Plain-text excerpt of HTML content, at most 300 characters.
pub fn make_excerpt(content_html: &str) -> String {
    output::compact_line(&output::strip_tags(content_html), EXCERPT_MAX_CHARS)
}

// --- CLI ---

#[derive(Parser, Debug)]
#[clap(name = "blog", about = "Blog posts and comments")]
pub struct BlogCli {
    #[clap(subcommand)]
    pub command: BlogCommand,
}

#[derive(Subcommand, Debug)]
pub enum BlogCommand {
    /// Write a post.
    Create {
        #[clap(long)]
        title: String,
        #[clap(long)]
        content: String,
        #[clap(long)]
        author: Option<String>,
        #[clap(long, default_value = "")]
        excerpt: String,
        #[clap(long, default_value = "draft")]
        status: BlogStatus,
    },
    /// Change a post's status.
    Status {
        #[clap(long)]
        id: String,
        #[clap(long)]
        status: BlogStatus,
    },
    /// Comment as a user (`--user`) or as a guest (`--guest-name`).
    Comment {
        #[clap(long)]
        post: String,
        #[clap(long, conflicts_with = "guest_name", required_unless_present = "guest_name")]
        user: Option<String>,
        #[clap(long)]
        guest_name: Option<String>,
        #[clap(long)]
        content: String,
        #[clap(long)]
        parent: Option<String>,
    },
    /// Approve or hide a comment.
    Approve {
        #[clap(long)]
        id: String,
        #[clap(long, action = clap::ArgAction::Set, default_value_t = true)]
        approved: bool,
    },
    /// Show a post by id or slug.
    Get {
        #[clap(long)]
        id: String,
    },
}

pub fn run_blog_cli(store: &Store, cli: BlogCli) -> Result<serde_json::Value, LearnstateError> {
    let value = match cli.command {
        BlogCommand::Create {
            title,
            content,
            author,
            excerpt,
            status,
        } => serde_json::to_value(create_blog_post(
            store,
            NewBlogPost {
                author_id: author,
                title,
                content_html: content,
                excerpt,
                status,
            },
        )?),
        BlogCommand::Status { id, status } => serde_json::to_value(set_blog_status(store, &id, status)?),
        BlogCommand::Comment {
            post,
            user,
            guest_name,
            content,
            parent,
        } => {
            let commenter = match (user, guest_name) {
                (Some(user), _) => BlogCommenter::User(user),
                (None, Some(name)) => BlogCommenter::Guest(name),
                (None, None) => {
                    return Err(LearnstateError::ValidationError(
                        "a comment needs --user or --guest-name".to_string(),
                    ));
                }
            };
            serde_json::to_value(add_blog_comment(store, &post, commenter, &content, parent.as_deref())?)
        }
        BlogCommand::Approve { id, approved } => {
            serde_json::to_value(set_comment_approval(store, &id, approved)?)
        }
        BlogCommand::Get { id } => serde_json::to_value(get_blog_post(store, &id)?),
    };
    Ok(value?)
}

// --- Posts ---

pub fn create_blog_post(store: &Store, new: NewBlogPost) -> Result<BlogPost, LearnstateError> {
    let title = new.title.trim();
    if title.is_empty() {
        return Err(LearnstateError::ValidationError(
            "blog post title must not be empty".to_string(),
        ));
    }
    let base = match output::slugify(title) {
        s if s.is_empty() => "post".to_string(),
        s => s,
    };
    let excerpt = match new.excerpt.trim() {
        "" => make_excerpt(&new.content_html),
        given => given.to_string(),
    };

    store.write("blog.post_create", |conn| {
        if let Some(author_id) = new.author_id.as_deref() {
            users::load_user(conn, author_id)?;
        }
        let id = time::new_id();
        let now = time::now_millis();
        let slug = db::unique_slug(conn, "blog_posts", &base)?;
        let publish_date = (new.status == BlogStatus::Published).then_some(now);
        conn.execute(
            "INSERT INTO blog_posts(id, author_id, title, slug, content_html, excerpt, status, publish_date, created_at, updated_at)
             VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
            params![
                id,
                new.author_id,
                title,
                slug,
                new.content_html,
                excerpt,
                new.status,
                publish_date,
                now
            ],
        )?;
        load_blog_post(conn, &id)
    })
}

/// Change status; `publish_date` is stamped the first time a post is published.
pub fn set_blog_status(
    store: &Store,
    post_id: &str,
    status: BlogStatus,
) -> Result<BlogPost, LearnstateError> {
    store.write("blog.post_status", |conn| {
        let post = load_blog_post(conn, post_id)?;
        let now = time::now_millis();
        conn.execute(
            "UPDATE blog_posts
             SET status = ?2,
                 publish_date = CASE WHEN ?2 = 'published' THEN COALESCE(publish_date, ?3) ELSE publish_date END,
                 updated_at = ?3
             WHERE id = ?1",
            params![post.id, status, now],
        )?;
        load_blog_post(conn, &post.id)
    })
}

pub fn get_blog_post(store: &Store, id_or_slug: &str) -> Result<BlogPostView, LearnstateError> {
    store.read("blog.post_get", |conn| {
        let post = load_blog_post(conn, id_or_slug)?;
        let comment_count = conn.query_row(
            "SELECT COUNT(*) FROM blog_comments WHERE post_id = ?1 AND is_approved = 1",
            params![post.id],
            |row| row.get(0),
        )?;
        Ok(BlogPostView {
            post,
            comment_count,
        })
    })
}

fn load_blog_post(conn: &Connection, id_or_slug: &str) -> Result<BlogPost, LearnstateError> {
    let sql = format!(
        "SELECT {} FROM blog_posts WHERE id = ?1 OR slug = ?1",
        BLOG_POST_COLUMNS
    );
    conn.query_row(&sql, params![id_or_slug], BlogPost::from_row)
        .optional()?
        .ok_or_else(|| LearnstateError::NotFound(format!("blog post {}", id_or_slug)))
}

// --- Comments ---

pub fn add_blog_comment(
    store: &Store,
    post_id: &str,
    commenter: BlogCommenter,
    content: &str,
    parent_comment_id: Option<&str>,
) -> Result<BlogComment, LearnstateError> {
    let content = content.trim();
    if content.is_empty() {
        return Err(LearnstateError::ValidationError(
            "comment must not be empty".to_string(),
        ));
    }
    store.write("blog.comment_add", |conn| {
        let post = load_blog_post(conn, post_id)?;
        let (author_id, author_name) = match &commenter {
            BlogCommenter::User(id) => {
                let user = users::load_user(conn, id)?;
                let name = if user.full_name.is_empty() {
                    user.email
                } else {
                    user.full_name
                };
                (Some(user.id), name)
            }
            BlogCommenter::Guest(name) => {
                let name = name.trim();
                if name.is_empty() {
                    return Err(LearnstateError::ValidationError(
                        "guest comments need a name".to_string(),
                    ));
                }
                (None, name.to_string())
            }
        };
        if let Some(parent_id) = parent_comment_id {
            let parent = load_blog_comment(conn, parent_id)?;
            if parent.post_id != post.id {
                return Err(LearnstateError::ValidationError(format!(
                    "comment {} belongs to a different post",
                    parent.id
                )));
            }
        }

        let id = time::new_id();
        conn.execute(
            "INSERT INTO blog_comments(id, post_id, author_id, author_name, content, parent_comment_id, created_at)
             VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![id, post.id, author_id, author_name, content, parent_comment_id, time::now_millis()],
        )?;
        load_blog_comment(conn, &id)
    })
}

pub fn set_comment_approval(
    store: &Store,
    comment_id: &str,
    approved: bool,
) -> Result<BlogComment, LearnstateError> {
    store.write("blog.comment_approval", |conn| {
        let changed = conn.execute(
            "UPDATE blog_comments SET is_approved = ?2 WHERE id = ?1",
            params![comment_id, approved],
        )?;
        if changed == 0 {
            return Err(LearnstateError::NotFound(format!("blog comment {}", comment_id)));
        }
        load_blog_comment(conn, comment_id)
    })
}

fn load_blog_comment(conn: &Connection, id: &str) -> Result<BlogComment, LearnstateError> {
    let sql = format!("SELECT {} FROM blog_comments WHERE id = ?1", BLOG_COMMENT_COLUMNS);
    conn.query_row(&sql, params![id], BlogComment::from_row)
        .optional()?
        .ok_or_else(|| LearnstateError::NotFound(format!("blog comment {}", id)))
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "blog",
        "version": "0.1.0",
        "description": "Blog posts; comment counts are computed on read",
        "commands": [
            { "name": "create", "parameters": ["title", "content", "author", "excerpt", "status"] },
            { "name": "status", "parameters": ["id", "status"] },
            { "name": "comment", "parameters": ["post", "user", "guest_name", "content", "parent"] },
            { "name": "approve", "parameters": ["id", "approved"] },
            { "name": "get", "parameters": ["id"] }
        ],
        "storage": [schemas::STORE_DB_NAME]
    })
}
