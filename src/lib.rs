//! learnstate: local-first store for a learning platform.
//!
//! Courses, enrollments, reviews, learner progress, quizzes, a community forum
//! and a blog, kept in one SQLite database.
//!
//! # Derived state
//!
//! Parent rows cache aggregates over their children:
//!
//! - `courses`: average rating, review count, enrollment count, total duration
//! - `course_progress`: completed/total topics, percentage, completion time
//! - `quiz_attempts`: score, correct answers, points, pass/fail
//! - `community_posts` and `post_comments`: comment and reaction counts, last activity
//!
//! Every operation that writes a child row recomputes the affected parent's
//! aggregate from scratch in the same transaction (see [`core::aggregate`]).
//! A failing recompute never fails the child write: it is logged and the
//! value is repaired by the next write or by `learnstate reconcile`.
//!
//! # Examples
//!
//! ```bash
//! learnstate init
//! learnstate user add --email ada@example.com --full-name "Ada"
//! learnstate course create --title "Intro to Rust"
//! learnstate enroll add --user <USER_ID> --course intro-to-rust
//! learnstate progress complete --user <USER_ID> --topic ownership
//! learnstate reconcile
//! ```
//!
//! # Crate Structure
//!
//! - [`core`]: store, broker, schema, aggregate propagation, config, logging
//! - [`plugins`]: entity subsystems (catalog, enrollment, reviews, progress, quiz, community, blog)

pub mod core;
pub mod plugins;
pub mod subsystems;

use core::{config, error, logging, store::Store, time};
use plugins::{blog, catalog, community, enrollment, progress, quiz, reconcile, reviews, users};

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(
    name = "learnstate",
    version = env!("CARGO_PKG_VERSION"),
    about = "Learning platform store with explicit derived-state propagation"
)]
struct Cli {
    /// Store directory (database, audit log, learnstate.toml).
    #[clap(long, global = true, default_value = core::store::DEFAULT_STORE_DIR)]
    root: PathBuf,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the store and its schema
    #[clap(name = "init")]
    Init,

    /// Manage users
    #[clap(name = "user")]
    User(users::UserCli),

    /// Manage the course catalog
    #[clap(name = "course")]
    Course(catalog::CourseCli),

    /// Manage enrollments
    #[clap(name = "enroll")]
    Enroll(enrollment::EnrollCli),

    /// Rate and review courses
    #[clap(name = "review")]
    Review(reviews::ReviewCli),

    /// Track learner progress
    #[clap(name = "progress")]
    Progress(progress::ProgressCli),

    /// Author quizzes and submit attempts
    #[clap(name = "quiz")]
    Quiz(quiz::QuizCli),

    /// Community posts, comments and reactions
    #[clap(name = "community")]
    Community(community::CommunityCli),

    /// Blog posts and comments
    #[clap(name = "blog")]
    Blog(blog::BlogCli),

    /// Recompute every aggregate and report drift
    #[clap(name = "reconcile")]
    Reconcile(reconcile::ReconcileCli),

    /// Print the command schema of every subsystem
    #[clap(name = "schema")]
    Schema,
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Init => "init",
            Command::User(_) => "user",
            Command::Course(_) => "course",
            Command::Enroll(_) => "enroll",
            Command::Review(_) => "review",
            Command::Progress(_) => "progress",
            Command::Quiz(_) => "quiz",
            Command::Community(_) => "community",
            Command::Blog(_) => "blog",
            Command::Reconcile(_) => "reconcile",
            Command::Schema => "schema",
        }
    }
}

/// Parse arguments, run one command and print its JSON envelope to stdout.
pub fn run() -> Result<(), error::LearnstateError> {
    let cli = Cli::parse();
    let cmd = cli.command.name();

    if let Command::Schema = cli.command {
        println!("{}", serde_json::to_string_pretty(&schema())?);
        return Ok(());
    }

    let config = config::load_config(&cli.root)?;
    logging::init_tracing(&config.logging.filter);
    let store = Store::open_with_config(&cli.root, config)?;
    tracing::debug!(cmd, root = %store.root.display(), "dispatching");

    let payload = match cli.command {
        Command::Init => serde_json::json!({
            "root": store.root.display().to_string(),
            "subsystems": subsystems::subsystem_names(),
            "completion_policy": store.config.progress.completion_policy.to_string(),
        }),
        Command::User(c) => users::run_user_cli(&store, c)?,
        Command::Course(c) => catalog::run_course_cli(&store, c)?,
        Command::Enroll(c) => enrollment::run_enroll_cli(&store, c)?,
        Command::Review(c) => reviews::run_review_cli(&store, c)?,
        Command::Progress(c) => progress::run_progress_cli(&store, c)?,
        Command::Quiz(c) => quiz::run_quiz_cli(&store, c)?,
        Command::Community(c) => community::run_community_cli(&store, c)?,
        Command::Blog(c) => blog::run_blog_cli(&store, c)?,
        Command::Reconcile(c) => reconcile::run_reconcile_cli(&store, c)?,
        Command::Schema => serde_json::Value::Null,
    };

    let envelope = time::command_envelope(cmd, "ok", serde_json::json!({ "result": payload }));
    println!("{}", serde_json::to_string_pretty(&envelope)?);
    Ok(())
}

/// Command schemas of every subsystem, keyed by CLI name.
pub fn schema() -> serde_json::Value {
    let plugins = [
        users::schema(),
        catalog::schema(),
        enrollment::schema(),
        reviews::schema(),
        progress::schema(),
        quiz::schema(),
        community::schema(),
        blog::schema(),
    ];
    serde_json::json!({
        "name": "learnstate",
        "version": env!("CARGO_PKG_VERSION"),
        "subsystems": plugins,
        "commands": ["init", "reconcile", "schema"],
    })
}
