//! Centralized schema definitions for the learnstate store.
//!
//! Everything lives in one SQLite database so that parent rows and the child
//! rows they aggregate over share a transaction:
//! 1. Catalog: users, categories, courses, modules, topics, quizzes.
//! 2. Learning: enrollments, reviews, course/topic progress, quiz attempts.
//! 3. Community: posts, comments, reactions.
//! 4. Blog: posts and comments (comment counts are computed on read).
//!
//! Aggregate columns are declared with their zero state as the column default.

pub const STORE_DB_NAME: &str = "learnstate.db";
pub const AUDIT_LOG_NAME: &str = "broker.events.jsonl";
pub const CONFIG_FILE_NAME: &str = "learnstate.toml";

// --- 1. Catalog ---

pub const USERS_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY,
        email TEXT NOT NULL UNIQUE,
        full_name TEXT NOT NULL DEFAULT '',
        created_at INTEGER NOT NULL
    )
";

pub const CATEGORIES_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS categories (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        slug TEXT NOT NULL UNIQUE,
        description TEXT,
        created_at INTEGER NOT NULL
    )
";

pub const COURSES_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS courses (
        id TEXT PRIMARY KEY,
        instructor_id TEXT REFERENCES users(id) ON DELETE SET NULL,
        category_id TEXT REFERENCES categories(id) ON DELETE SET NULL,
        title TEXT NOT NULL,
        slug TEXT NOT NULL UNIQUE,
        short_description TEXT NOT NULL DEFAULT '',
        level TEXT NOT NULL DEFAULT 'beginner',
        price_cents INTEGER NOT NULL DEFAULT 0,
        is_published INTEGER NOT NULL DEFAULT 0,
        published_at INTEGER,
        average_rating REAL NOT NULL DEFAULT 0.0,
        total_reviews INTEGER NOT NULL DEFAULT 0,
        total_enrollments INTEGER NOT NULL DEFAULT 0,
        total_duration_minutes INTEGER NOT NULL DEFAULT 0,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )
";

pub const MODULES_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS modules (
        id TEXT PRIMARY KEY,
        course_id TEXT NOT NULL REFERENCES courses(id) ON DELETE CASCADE,
        title TEXT NOT NULL,
        ord INTEGER NOT NULL,
        UNIQUE(course_id, ord)
    )
";

pub const TOPICS_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS topics (
        id TEXT PRIMARY KEY,
        module_id TEXT NOT NULL REFERENCES modules(id) ON DELETE CASCADE,
        title TEXT NOT NULL,
        slug TEXT NOT NULL UNIQUE,
        estimated_duration_minutes INTEGER NOT NULL DEFAULT 5 CHECK (estimated_duration_minutes >= 0),
        ord INTEGER NOT NULL,
        is_previewable INTEGER NOT NULL DEFAULT 0,
        UNIQUE(module_id, ord)
    )
";

pub const QUIZZES_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS quizzes (
        topic_id TEXT PRIMARY KEY REFERENCES topics(id) ON DELETE CASCADE,
        pass_mark_percentage REAL NOT NULL
    )
";

pub const QUESTIONS_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS questions (
        id TEXT PRIMARY KEY,
        topic_id TEXT NOT NULL REFERENCES topics(id) ON DELETE CASCADE,
        text TEXT NOT NULL,
        question_type TEXT NOT NULL,
        ord INTEGER NOT NULL,
        points INTEGER NOT NULL DEFAULT 1 CHECK (points >= 0),
        UNIQUE(topic_id, ord)
    )
";

pub const CHOICES_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS choices (
        id TEXT PRIMARY KEY,
        question_id TEXT NOT NULL REFERENCES questions(id) ON DELETE CASCADE,
        text TEXT NOT NULL,
        is_correct INTEGER NOT NULL DEFAULT 0,
        ord INTEGER NOT NULL,
        UNIQUE(question_id, ord)
    )
";

// --- 2. Learning ---

pub const ENROLLMENTS_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS enrollments (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        course_id TEXT NOT NULL REFERENCES courses(id) ON DELETE CASCADE,
        enrolled_at INTEGER NOT NULL,
        UNIQUE(user_id, course_id)
    )
";

pub const COURSE_REVIEWS_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS course_reviews (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        course_id TEXT NOT NULL REFERENCES courses(id) ON DELETE CASCADE,
        rating INTEGER NOT NULL CHECK (rating BETWEEN 1 AND 5),
        comment TEXT,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL,
        UNIQUE(user_id, course_id)
    )
";

pub const COURSE_PROGRESS_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS course_progress (
        id TEXT PRIMARY KEY,
        enrollment_id TEXT NOT NULL UNIQUE REFERENCES enrollments(id) ON DELETE CASCADE,
        user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        course_id TEXT NOT NULL REFERENCES courses(id) ON DELETE CASCADE,
        completed_topics_count INTEGER NOT NULL DEFAULT 0,
        total_topics_count INTEGER NOT NULL DEFAULT 0,
        progress_percentage REAL NOT NULL DEFAULT 0.0,
        completed_at INTEGER,
        last_accessed_topic_id TEXT REFERENCES topics(id) ON DELETE SET NULL
    )
";

pub const TOPIC_PROGRESS_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS topic_progress (
        id TEXT PRIMARY KEY,
        course_progress_id TEXT NOT NULL REFERENCES course_progress(id) ON DELETE CASCADE,
        user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        topic_id TEXT NOT NULL REFERENCES topics(id) ON DELETE CASCADE,
        is_completed INTEGER NOT NULL DEFAULT 0,
        completed_at INTEGER,
        UNIQUE(user_id, topic_id)
    )
";

pub const QUIZ_ATTEMPTS_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS quiz_attempts (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        topic_id TEXT NOT NULL REFERENCES topics(id) ON DELETE CASCADE,
        topic_progress_id TEXT REFERENCES topic_progress(id) ON DELETE SET NULL,
        score REAL NOT NULL DEFAULT 0.0 CHECK(score >= 0.0 AND score <= 100.0),
        correct_answers INTEGER NOT NULL DEFAULT 0,
        total_questions_in_topic INTEGER NOT NULL DEFAULT 0,
        max_points INTEGER NOT NULL DEFAULT 0,
        pass_mark_percentage REAL NOT NULL DEFAULT 70.0,
        points_awarded INTEGER NOT NULL DEFAULT 0,
        passed INTEGER NOT NULL DEFAULT 0,
        submitted_at INTEGER NOT NULL
    )
";

pub const QUIZ_ANSWERS_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS quiz_answers (
        id TEXT PRIMARY KEY,
        attempt_id TEXT NOT NULL REFERENCES quiz_attempts(id) ON DELETE CASCADE,
        question_id TEXT NOT NULL REFERENCES questions(id) ON DELETE CASCADE,
        selected_choice_ids TEXT NOT NULL, -- JSON array of choice ids
        is_correct INTEGER NOT NULL DEFAULT 0,
        points_awarded INTEGER NOT NULL DEFAULT 0,
        UNIQUE(attempt_id, question_id)
    )
";

// --- 3. Community ---

pub const COMMUNITY_POSTS_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS community_posts (
        id TEXT PRIMARY KEY,
        author_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        title TEXT NOT NULL,
        slug TEXT NOT NULL UNIQUE,
        content_html TEXT NOT NULL,
        view_count INTEGER NOT NULL DEFAULT 0,
        reaction_count INTEGER NOT NULL DEFAULT 0,
        comment_count INTEGER NOT NULL DEFAULT 0,
        is_pinned INTEGER NOT NULL DEFAULT 0,
        is_closed INTEGER NOT NULL DEFAULT 0,
        last_activity_at INTEGER NOT NULL,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )
";

pub const POST_COMMENTS_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS post_comments (
        id TEXT PRIMARY KEY,
        post_id TEXT NOT NULL REFERENCES community_posts(id) ON DELETE CASCADE,
        author_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        content_html TEXT NOT NULL,
        parent_comment_id TEXT REFERENCES post_comments(id) ON DELETE CASCADE,
        reaction_count INTEGER NOT NULL DEFAULT 0,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )
";

pub const POST_REACTIONS_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS post_reactions (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        post_id TEXT REFERENCES community_posts(id) ON DELETE CASCADE,
        comment_id TEXT REFERENCES post_comments(id) ON DELETE CASCADE,
        reaction_type TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        CHECK ((post_id IS NOT NULL AND comment_id IS NULL) OR (post_id IS NULL AND comment_id IS NOT NULL)),
        UNIQUE(user_id, post_id, reaction_type),
        UNIQUE(user_id, comment_id, reaction_type)
    )
";

// --- 4. Blog ---

pub const BLOG_POSTS_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS blog_posts (
        id TEXT PRIMARY KEY,
        author_id TEXT REFERENCES users(id) ON DELETE SET NULL,
        title TEXT NOT NULL,
        slug TEXT NOT NULL UNIQUE,
        content_html TEXT NOT NULL,
        excerpt TEXT NOT NULL DEFAULT '',
        status TEXT NOT NULL DEFAULT 'draft',
        publish_date INTEGER,
        view_count INTEGER NOT NULL DEFAULT 0,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )
";

pub const BLOG_COMMENTS_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS blog_comments (
        id TEXT PRIMARY KEY,
        post_id TEXT NOT NULL REFERENCES blog_posts(id) ON DELETE CASCADE,
        author_id TEXT REFERENCES users(id) ON DELETE SET NULL,
        author_name TEXT NOT NULL DEFAULT '',
        content TEXT NOT NULL,
        parent_comment_id TEXT REFERENCES blog_comments(id) ON DELETE CASCADE,
        is_approved INTEGER NOT NULL DEFAULT 1,
        created_at INTEGER NOT NULL
    )
";

pub const STORE_INDEXES: &str = "
    CREATE INDEX IF NOT EXISTS idx_modules_course ON modules(course_id);
    CREATE INDEX IF NOT EXISTS idx_topics_module ON topics(module_id);
    CREATE INDEX IF NOT EXISTS idx_reviews_course ON course_reviews(course_id);
    CREATE INDEX IF NOT EXISTS idx_enrollments_course ON enrollments(course_id);
    CREATE INDEX IF NOT EXISTS idx_progress_course ON course_progress(course_id);
    CREATE INDEX IF NOT EXISTS idx_topic_progress_parent ON topic_progress(course_progress_id);
    CREATE INDEX IF NOT EXISTS idx_answers_attempt ON quiz_answers(attempt_id);
    CREATE INDEX IF NOT EXISTS idx_comments_post ON post_comments(post_id);
    CREATE INDEX IF NOT EXISTS idx_reactions_post ON post_reactions(post_id);
    CREATE INDEX IF NOT EXISTS idx_reactions_comment ON post_reactions(comment_id);
    CREATE INDEX IF NOT EXISTS idx_blog_comments_post ON blog_comments(post_id);
";
