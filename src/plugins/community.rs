//! Community forum: posts, threaded comments and reactions.
//!
//! Posts cache `comment_count`, `reaction_count` and `last_activity_at`;
//! comments cache their own `reaction_count`.

use crate::core::aggregate::{self, AggregateRule, Assignment};
use crate::core::db;
use crate::core::error::{self, LearnstateError};
use crate::core::output;
use crate::core::schemas;
use crate::core::store::Store;
use crate::core::time;
use crate::plugins::users;
use clap::{Parser, Subcommand};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub fn initialize_community_db(root: &Path) -> Result<(), LearnstateError> {
    db::apply_schema(
        root,
        "community.init",
        &[
            schemas::COMMUNITY_POSTS_SCHEMA,
            schemas::POST_COMMENTS_SCHEMA,
            schemas::POST_REACTIONS_SCHEMA,
        ],
    )
}

/// Comment count and last activity. Activity is the later of the post's own
/// `updated_at` and its newest comment, so deleting that comment moves it back.
pub const POST_COMMENTS: AggregateRule = AggregateRule {
    name: "community_post.comments",
    parent_table: "community_posts",
    assignments: &[
        Assignment {
            column: "comment_count",
            expr: "SELECT COUNT(*) FROM post_comments WHERE post_id = ?1",
        },
        Assignment {
            column: "last_activity_at",
            expr: "SELECT MAX(community_posts.updated_at,
                              COALESCE((SELECT MAX(created_at) FROM post_comments WHERE post_id = ?1),
                                       community_posts.updated_at))",
        },
    ],
};

pub const POST_REACTIONS: AggregateRule = AggregateRule {
    name: "community_post.reactions",
    parent_table: "community_posts",
    assignments: &[Assignment {
        column: "reaction_count",
        expr: "SELECT COUNT(*) FROM post_reactions WHERE post_id = ?1",
    }],
};

pub const COMMENT_REACTIONS: AggregateRule = AggregateRule {
    name: "post_comment.reactions",
    parent_table: "post_comments",
    assignments: &[Assignment {
        column: "reaction_count",
        expr: "SELECT COUNT(*) FROM post_reactions WHERE comment_id = ?1",
    }],
};

crate::text_enum! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum ReactionType {
        Like => "like",
        Heart => "heart",
        ThumbsUp => "thumbs_up",
        Laugh => "laugh",
        Insightful => "insightful",
    }
}

/// What a reaction points at; exactly one of post or comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum ReactionTarget {
    Post(String),
    Comment(String),
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CommunityPost {
    pub id: String,
    pub author_id: String,
    pub title: String,
    pub slug: String,
    pub content_html: String,
    pub view_count: i64,
    pub reaction_count: i64,
    pub comment_count: i64,
    pub is_pinned: bool,
    pub is_closed: bool,
    pub last_activity_at: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

const POST_COLUMNS: &str = "id, author_id, title, slug, content_html, view_count, reaction_count, \
     comment_count, is_pinned, is_closed, last_activity_at, created_at, updated_at";

impl CommunityPost {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(CommunityPost {
            id: row.get(0)?,
            author_id: row.get(1)?,
            title: row.get(2)?,
            slug: row.get(3)?,
            content_html: row.get(4)?,
            view_count: row.get(5)?,
            reaction_count: row.get(6)?,
            comment_count: row.get(7)?,
            is_pinned: row.get(8)?,
            is_closed: row.get(9)?,
            last_activity_at: row.get(10)?,
            created_at: row.get(11)?,
            updated_at: row.get(12)?,
        })
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PostComment {
    pub id: String,
    pub post_id: String,
    pub author_id: String,
    pub content_html: String,
    pub parent_comment_id: Option<String>,
    pub reaction_count: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

const COMMENT_COLUMNS: &str =
    "id, post_id, author_id, content_html, parent_comment_id, reaction_count, created_at, updated_at";

impl PostComment {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(PostComment {
            id: row.get(0)?,
            post_id: row.get(1)?,
            author_id: row.get(2)?,
            content_html: row.get(3)?,
            parent_comment_id: row.get(4)?,
            reaction_count: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PostReaction {
    pub id: String,
    pub user_id: String,
    pub target: ReactionTarget,
    pub reaction_type: ReactionType,
    pub created_at: i64,
}

// --- CLI ---

#[derive(Parser, Debug)]
#[clap(name = "community", about = "Community posts, comments and reactions")]
pub struct CommunityCli {
    #[clap(subcommand)]
    pub command: CommunityCommand,
}

#[derive(Subcommand, Debug)]
pub enum CommunityCommand {
    /// Start a post.
    Create {
        #[clap(long)]
        author: String,
        #[clap(long)]
        title: String,
        #[clap(long)]
        content: String,
    },
    /// Comment on a post, optionally replying to a comment.
    Comment {
        #[clap(long)]
        post: String,
        #[clap(long)]
        author: String,
        #[clap(long)]
        content: String,
        #[clap(long)]
        parent: Option<String>,
    },
    /// Delete a comment and its replies.
    DeleteComment {
        #[clap(long)]
        id: String,
    },
    /// React to a post or a comment.
    React {
        #[clap(long)]
        user: String,
        #[clap(long, conflicts_with = "comment", required_unless_present = "comment")]
        post: Option<String>,
        #[clap(long)]
        comment: Option<String>,
        #[clap(long = "type", default_value = "like")]
        reaction_type: ReactionType,
    },
    /// Remove a reaction.
    Unreact {
        #[clap(long)]
        id: String,
    },
    /// Close a post to new comments.
    Close {
        #[clap(long)]
        id: String,
    },
    /// Count a view.
    View {
        #[clap(long)]
        id: String,
    },
    /// Show a post by id or slug.
    Get {
        #[clap(long)]
        id: String,
    },
    /// List a post's comments.
    Comments {
        #[clap(long)]
        post: String,
    },
}

pub fn run_community_cli(
    store: &Store,
    cli: CommunityCli,
) -> Result<serde_json::Value, LearnstateError> {
    let value = match cli.command {
        CommunityCommand::Create {
            author,
            title,
            content,
        } => serde_json::to_value(create_post(store, &author, &title, &content)?),
        CommunityCommand::Comment {
            post,
            author,
            content,
            parent,
        } => serde_json::to_value(add_comment(store, &post, &author, &content, parent.as_deref())?),
        CommunityCommand::DeleteComment { id } => {
            delete_comment(store, &id)?;
            Ok(serde_json::json!({ "deleted": id }))
        }
        CommunityCommand::React {
            user,
            post,
            comment,
            reaction_type,
        } => {
            let target = match (post, comment) {
                (Some(post), _) => ReactionTarget::Post(post),
                (None, Some(comment)) => ReactionTarget::Comment(comment),
                (None, None) => {
                    return Err(LearnstateError::ValidationError(
                        "a reaction needs --post or --comment".to_string(),
                    ));
                }
            };
            serde_json::to_value(add_reaction(store, &user, target, reaction_type)?)
        }
        CommunityCommand::Unreact { id } => {
            remove_reaction(store, &id)?;
            Ok(serde_json::json!({ "deleted": id }))
        }
        CommunityCommand::Close { id } => serde_json::to_value(close_post(store, &id)?),
        CommunityCommand::View { id } => serde_json::to_value(record_view(store, &id)?),
        CommunityCommand::Get { id } => serde_json::to_value(get_post(store, &id)?),
        CommunityCommand::Comments { post } => serde_json::to_value(list_comments(store, &post)?),
    };
    Ok(value?)
}

// --- Posts ---

/// Slug is `slugify(title)` plus a random 6-character suffix.
pub fn create_post(
    store: &Store,
    author_id: &str,
    title: &str,
    content_html: &str,
) -> Result<CommunityPost, LearnstateError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(LearnstateError::ValidationError(
            "post title must not be empty".to_string(),
        ));
    }
    let base = match output::slugify(title) {
        s if s.is_empty() => "post".to_string(),
        s => s,
    };

    store.write("community.post_create", |conn| {
        let author = users::load_user(conn, author_id)?;
        let id = time::new_id();
        let now = time::now_millis();
        let slug = format!("{}-{}", base, slug_suffix(&id));
        conn.execute(
            "INSERT INTO community_posts(id, author_id, title, slug, content_html, last_activity_at, created_at, updated_at)
             VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?6, ?6)",
            params![id, author.id, title, slug, content_html, now],
        )
        .map_err(|e| error::on_constraint(e, &format!("post slug already taken: {}", slug)))?;
        load_post(conn, &id)
    })
}

/// Six lowercase characters from the random half of a ULID.
fn slug_suffix(id: &str) -> String {
    let tail = &id[id.len().saturating_sub(6)..];
    tail.to_lowercase()
}

/// Close a post; existing comments stay, new ones are rejected.
pub fn close_post(store: &Store, post_id: &str) -> Result<CommunityPost, LearnstateError> {
    store.write("community.post_close", |conn| {
        let post = load_post(conn, post_id)?;
        conn.execute(
            "UPDATE community_posts SET is_closed = 1 WHERE id = ?1",
            params![post.id],
        )?;
        load_post(conn, &post.id)
    })
}

/// Views are a plain counter bumped in place.
pub fn record_view(store: &Store, post_id: &str) -> Result<CommunityPost, LearnstateError> {
    store.write("community.post_view", |conn| {
        let post = load_post(conn, post_id)?;
        conn.execute(
            "UPDATE community_posts SET view_count = view_count + 1 WHERE id = ?1",
            params![post.id],
        )?;
        load_post(conn, &post.id)
    })
}

pub fn get_post(store: &Store, id_or_slug: &str) -> Result<CommunityPost, LearnstateError> {
    store.read("community.post_get", |conn| load_post(conn, id_or_slug))
}

fn load_post(conn: &Connection, id_or_slug: &str) -> Result<CommunityPost, LearnstateError> {
    let sql = format!(
        "SELECT {} FROM community_posts WHERE id = ?1 OR slug = ?1",
        POST_COLUMNS
    );
    conn.query_row(&sql, params![id_or_slug], CommunityPost::from_row)
        .optional()?
        .ok_or_else(|| LearnstateError::NotFound(format!("post {}", id_or_slug)))
}

// --- Comments ---

pub fn add_comment(
    store: &Store,
    post_id: &str,
    author_id: &str,
    content_html: &str,
    parent_comment_id: Option<&str>,
) -> Result<PostComment, LearnstateError> {
    if content_html.trim().is_empty() {
        return Err(LearnstateError::ValidationError(
            "comment must not be empty".to_string(),
        ));
    }
    store.write("community.comment_add", |conn| {
        let post = load_post(conn, post_id)?;
        if post.is_closed {
            return Err(LearnstateError::ValidationError(format!(
                "post {} is closed to new comments",
                post.slug
            )));
        }
        let author = users::load_user(conn, author_id)?;
        if let Some(parent_id) = parent_comment_id {
            let parent = load_comment(conn, parent_id)?;
            if parent.post_id != post.id {
                return Err(LearnstateError::ValidationError(format!(
                    "comment {} belongs to a different post",
                    parent.id
                )));
            }
        }

        let id = time::new_id();
        let now = time::now_millis();
        conn.execute(
            "INSERT INTO post_comments(id, post_id, author_id, content_html, parent_comment_id, created_at, updated_at)
             VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![id, post.id, author.id, content_html, parent_comment_id, now],
        )?;
        aggregate::propagate(conn, &POST_COMMENTS, &post.id);
        load_comment(conn, &id)
    })
}

/// Delete a comment; replies and reactions on them cascade.
pub fn delete_comment(store: &Store, comment_id: &str) -> Result<(), LearnstateError> {
    store.write("community.comment_delete", |conn| {
        let comment = load_comment(conn, comment_id)?;
        conn.execute("DELETE FROM post_comments WHERE id = ?1", params![comment.id])?;
        aggregate::propagate(conn, &POST_COMMENTS, &comment.post_id);
        Ok(())
    })
}

pub fn get_comment(store: &Store, comment_id: &str) -> Result<PostComment, LearnstateError> {
    store.read("community.comment_get", |conn| load_comment(conn, comment_id))
}

pub fn list_comments(store: &Store, post_id: &str) -> Result<Vec<PostComment>, LearnstateError> {
    store.read("community.comment_list", |conn| {
        let post = load_post(conn, post_id)?;
        let sql = format!(
            "SELECT {} FROM post_comments WHERE post_id = ?1 ORDER BY created_at, id",
            COMMENT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let comments = stmt
            .query_map(params![post.id], PostComment::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(comments)
    })
}

fn load_comment(conn: &Connection, id: &str) -> Result<PostComment, LearnstateError> {
    let sql = format!("SELECT {} FROM post_comments WHERE id = ?1", COMMENT_COLUMNS);
    conn.query_row(&sql, params![id], PostComment::from_row)
        .optional()?
        .ok_or_else(|| LearnstateError::NotFound(format!("comment {}", id)))
}

// --- Reactions ---

/// One reaction per user, target and type.
pub fn add_reaction(
    store: &Store,
    user_id: &str,
    target: ReactionTarget,
    reaction_type: ReactionType,
) -> Result<PostReaction, LearnstateError> {
    store.write("community.reaction_add", |conn| {
        let user = users::load_user(conn, user_id)?;
        let target = match target {
            ReactionTarget::Post(id) => ReactionTarget::Post(load_post(conn, &id)?.id),
            ReactionTarget::Comment(id) => ReactionTarget::Comment(load_comment(conn, &id)?.id),
        };
        let reaction = PostReaction {
            id: time::new_id(),
            user_id: user.id,
            target,
            reaction_type,
            created_at: time::now_millis(),
        };
        let (post_id, comment_id) = target_columns(&reaction.target);
        conn.execute(
            "INSERT INTO post_reactions(id, user_id, post_id, comment_id, reaction_type, created_at)
             VALUES(?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                reaction.id,
                reaction.user_id,
                post_id,
                comment_id,
                reaction.reaction_type,
                reaction.created_at
            ],
        )
        .map_err(|e| {
            error::on_constraint(
                e,
                &format!("user {} already reacted with {}", reaction.user_id, reaction_type),
            )
        })?;
        propagate_reactions(conn, &reaction.target);
        Ok(reaction)
    })
}

pub fn remove_reaction(store: &Store, reaction_id: &str) -> Result<(), LearnstateError> {
    store.write("community.reaction_remove", |conn| {
        let (post_id, comment_id): (Option<String>, Option<String>) = conn
            .query_row(
                "SELECT post_id, comment_id FROM post_reactions WHERE id = ?1",
                params![reaction_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?
            .ok_or_else(|| LearnstateError::NotFound(format!("reaction {}", reaction_id)))?;
        let target = match (post_id, comment_id) {
            (Some(post), _) => ReactionTarget::Post(post),
            (None, Some(comment)) => ReactionTarget::Comment(comment),
            (None, None) => {
                return Err(LearnstateError::ValidationError(format!(
                    "reaction {} has no target",
                    reaction_id
                )));
            }
        };
        conn.execute("DELETE FROM post_reactions WHERE id = ?1", params![reaction_id])?;
        propagate_reactions(conn, &target);
        Ok(())
    })
}

fn target_columns(target: &ReactionTarget) -> (Option<&str>, Option<&str>) {
    match target {
        ReactionTarget::Post(id) => (Some(id.as_str()), None),
        ReactionTarget::Comment(id) => (None, Some(id.as_str())),
    }
}

fn propagate_reactions(conn: &Connection, target: &ReactionTarget) {
    match target {
        ReactionTarget::Post(id) => aggregate::propagate(conn, &POST_REACTIONS, id),
        ReactionTarget::Comment(id) => aggregate::propagate(conn, &COMMENT_REACTIONS, id),
    };
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "community",
        "version": "0.1.0",
        "description": "Forum posts; maintains comment, reaction and activity aggregates",
        "commands": [
            { "name": "create", "parameters": ["author", "title", "content"] },
            { "name": "comment", "parameters": ["post", "author", "content", "parent"] },
            { "name": "delete-comment", "parameters": ["id"] },
            { "name": "react", "parameters": ["user", "post", "comment", "type"] },
            { "name": "unreact", "parameters": ["id"] },
            { "name": "close", "parameters": ["id"] },
            { "name": "view", "parameters": ["id"] },
            { "name": "get", "parameters": ["id"] },
            { "name": "comments", "parameters": ["post"] }
        ],
        "aggregates": [POST_COMMENTS.name, POST_REACTIONS.name, COMMENT_REACTIONS.name],
        "storage": [schemas::STORE_DB_NAME]
    })
}
