//! Topic quizzes and scored attempts.
//!
//! An attempt is the parent of its answers: `score`, `correct_answers`,
//! `points_awarded` and `passed` are recomputed from `quiz_answers` alone.
//! The scoring basis (question count, maximum points, pass mark) is frozen on
//! the attempt at submit, so later quiz edits never rescore past attempts.
//! A passed attempt completes the topic for the learner.

use crate::core::aggregate::{self, Aggregate};
use crate::core::db;
use crate::core::error::{self, LearnstateError};
use crate::core::schemas;
use crate::core::store::Store;
use crate::core::time;
use crate::plugins::catalog;
use crate::plugins::progress::{self, CourseCompletion, CourseProgress};
use clap::{Parser, Subcommand};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

pub fn initialize_quiz_db(root: &Path) -> Result<(), LearnstateError> {
    db::apply_schema(
        root,
        "quiz.init",
        &[
            schemas::QUIZZES_SCHEMA,
            schemas::QUESTIONS_SCHEMA,
            schemas::CHOICES_SCHEMA,
        ],
    )
}

/// Attempts reference `topic_progress`, so they are created after progress.
pub fn initialize_attempts_db(root: &Path) -> Result<(), LearnstateError> {
    db::apply_schema(
        root,
        "quiz.attempts_init",
        &[schemas::QUIZ_ATTEMPTS_SCHEMA, schemas::QUIZ_ANSWERS_SCHEMA],
    )
}

crate::text_enum! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum QuestionType {
        SingleChoice => "single_choice",
        MultipleChoice => "multiple_choice",
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Quiz {
    pub topic_id: String,
    pub pass_mark_percentage: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Question {
    pub id: String,
    pub topic_id: String,
    pub text: String,
    pub question_type: QuestionType,
    pub ord: i64,
    pub points: i64,
}

impl Question {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Question {
            id: row.get(0)?,
            topic_id: row.get(1)?,
            text: row.get(2)?,
            question_type: row.get(3)?,
            ord: row.get(4)?,
            points: row.get(5)?,
        })
    }
}

const QUESTION_COLUMNS: &str = "id, topic_id, text, question_type, ord, points";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Choice {
    pub id: String,
    pub question_id: String,
    pub text: String,
    pub is_correct: bool,
    pub ord: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct QuestionDetail {
    #[serde(flatten)]
    pub question: Question,
    pub choices: Vec<Choice>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct QuizDetail {
    #[serde(flatten)]
    pub quiz: Quiz,
    pub questions: Vec<QuestionDetail>,
}

/// One submitted answer: the choices selected for a question.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AnswerInput {
    pub question_id: String,
    pub choice_ids: Vec<String>,
}

impl AnswerInput {
    pub fn new(question_id: &str, choice_ids: &[&str]) -> Self {
        Self {
            question_id: question_id.to_string(),
            choice_ids: choice_ids.iter().map(|c| c.to_string()).collect(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct QuizAttempt {
    pub id: String,
    pub user_id: String,
    pub topic_id: String,
    pub topic_progress_id: Option<String>,
    pub score: f64,
    pub correct_answers: i64,
    pub total_questions_in_topic: i64,
    pub max_points: i64,
    pub pass_mark_percentage: f64,
    pub points_awarded: i64,
    pub passed: bool,
    pub submitted_at: i64,
}

const ATTEMPT_COLUMNS: &str = "id, user_id, topic_id, topic_progress_id, score, correct_answers, \
     total_questions_in_topic, max_points, pass_mark_percentage, points_awarded, passed, submitted_at";

impl QuizAttempt {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(QuizAttempt {
            id: row.get(0)?,
            user_id: row.get(1)?,
            topic_id: row.get(2)?,
            topic_progress_id: row.get(3)?,
            score: row.get(4)?,
            correct_answers: row.get(5)?,
            total_questions_in_topic: row.get(6)?,
            max_points: row.get(7)?,
            pass_mark_percentage: row.get(8)?,
            points_awarded: row.get(9)?,
            passed: row.get(10)?,
            submitted_at: row.get(11)?,
        })
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct QuizAnswer {
    pub id: String,
    pub question_id: String,
    pub selected_choice_ids: Vec<String>,
    pub is_correct: bool,
    pub points_awarded: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AttemptResult {
    pub attempt: QuizAttempt,
    pub answers: Vec<QuizAnswer>,
    /// Course progress after the attempt; present when the attempt passed.
    pub progress: Option<CourseProgress>,
}

/// Attempt scoring over `quiz_answers`, parented by `quiz_attempts`.
#[derive(Debug, Clone, Copy)]
pub struct AttemptScore;

pub const ATTEMPT_SCORE: AttemptScore = AttemptScore;

impl Aggregate for AttemptScore {
    fn name(&self) -> &'static str {
        "quiz_attempt.score"
    }

    fn parent_table(&self) -> &'static str {
        "quiz_attempts"
    }

    fn columns(&self) -> Vec<&'static str> {
        vec!["score", "correct_answers", "points_awarded", "passed"]
    }

    fn recompute(&self, conn: &Connection, parent_id: &str) -> Result<(), LearnstateError> {
        let (max_points, pass_mark): (i64, f64) = conn
            .query_row(
                "SELECT max_points, pass_mark_percentage FROM quiz_attempts WHERE id = ?1",
                params![parent_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?
            .ok_or_else(|| LearnstateError::NotFound(format!("quiz_attempt {}", parent_id)))?;

        let (correct, points): (i64, i64) = conn.query_row(
            "SELECT COALESCE(SUM(is_correct), 0), COALESCE(SUM(points_awarded), 0)
             FROM quiz_answers WHERE attempt_id = ?1",
            params![parent_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let score = score_percentage(points, max_points);
        conn.execute(
            "UPDATE quiz_attempts
             SET score = ?2, correct_answers = ?3, points_awarded = ?4, passed = ?5
             WHERE id = ?1",
            params![parent_id, score, correct, points, score >= pass_mark],
        )?;
        Ok(())
    }
}

/// `100 * points / max_points`, two decimals; a topic without points scores zero.
pub fn score_percentage(points: i64, max_points: i64) -> f64 {
    if max_points <= 0 {
        return 0.0;
    }
    ((points as f64 * 100.0 / max_points as f64) * 100.0).round() / 100.0
}

// --- CLI ---

#[derive(Parser, Debug)]
#[clap(name = "quiz", about = "Author topic quizzes and submit attempts")]
pub struct QuizCli {
    #[clap(subcommand)]
    pub command: QuizCommand,
}

#[derive(Subcommand, Debug)]
pub enum QuizCommand {
    /// Attach a quiz to a topic, or change its pass mark.
    Set {
        #[clap(long)]
        topic: String,
        #[clap(long, default_value = "70")]
        pass_mark: f64,
    },
    /// Add a question to a topic's quiz.
    AddQuestion {
        #[clap(long)]
        topic: String,
        #[clap(long)]
        text: String,
        #[clap(long, default_value = "single_choice")]
        question_type: QuestionType,
        #[clap(long)]
        ord: i64,
        #[clap(long, default_value = "1")]
        points: i64,
    },
    /// Add a choice to a question.
    AddChoice {
        #[clap(long)]
        question: String,
        #[clap(long)]
        text: String,
        #[clap(long)]
        correct: bool,
        #[clap(long)]
        ord: i64,
    },
    /// Show a topic's quiz.
    Get {
        #[clap(long)]
        topic: String,
    },
    /// Submit an attempt. Each answer is `QUESTION_ID=CHOICE_ID[,CHOICE_ID...]`.
    Submit {
        #[clap(long)]
        user: String,
        #[clap(long)]
        topic: String,
        #[clap(long = "answer", value_parser = parse_answer)]
        answers: Vec<AnswerInput>,
    },
    /// List a user's attempts on a topic.
    Attempts {
        #[clap(long)]
        user: String,
        #[clap(long)]
        topic: String,
    },
}

fn parse_answer(raw: &str) -> Result<AnswerInput, String> {
    let (question, choices) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected QUESTION_ID=CHOICE_ID[,CHOICE_ID...], got {:?}", raw))?;
    Ok(AnswerInput {
        question_id: question.trim().to_string(),
        choice_ids: choices
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect(),
    })
}

pub fn run_quiz_cli(store: &Store, cli: QuizCli) -> Result<serde_json::Value, LearnstateError> {
    let value = match cli.command {
        QuizCommand::Set { topic, pass_mark } => serde_json::to_value(set_quiz(store, &topic, pass_mark)?),
        QuizCommand::AddQuestion {
            topic,
            text,
            question_type,
            ord,
            points,
        } => serde_json::to_value(add_question(store, &topic, &text, question_type, ord, points)?),
        QuizCommand::AddChoice {
            question,
            text,
            correct,
            ord,
        } => serde_json::to_value(add_choice(store, &question, &text, correct, ord)?),
        QuizCommand::Get { topic } => serde_json::to_value(get_quiz(store, &topic)?),
        QuizCommand::Submit {
            user,
            topic,
            answers,
        } => serde_json::to_value(submit_attempt(store, &user, &topic, &answers)?),
        QuizCommand::Attempts { user, topic } => {
            serde_json::to_value(list_attempts(store, &user, &topic)?)
        }
    };
    Ok(value?)
}

// --- Authoring ---

pub fn set_quiz(store: &Store, topic_id: &str, pass_mark_percentage: f64) -> Result<Quiz, LearnstateError> {
    if !(0.0..=100.0).contains(&pass_mark_percentage) {
        return Err(LearnstateError::ValidationError(format!(
            "pass mark must be between 0 and 100, got {}",
            pass_mark_percentage
        )));
    }
    store.write("quiz.set", |conn| {
        let topic = catalog::load_topic(conn, topic_id)?;
        conn.execute(
            "INSERT INTO quizzes(topic_id, pass_mark_percentage) VALUES(?1, ?2)
             ON CONFLICT(topic_id) DO UPDATE SET pass_mark_percentage = excluded.pass_mark_percentage",
            params![topic.id, pass_mark_percentage],
        )?;
        load_quiz(conn, &topic.id)
    })
}

pub fn add_question(
    store: &Store,
    topic_id: &str,
    text: &str,
    question_type: QuestionType,
    ord: i64,
    points: i64,
) -> Result<Question, LearnstateError> {
    if points < 0 {
        return Err(LearnstateError::ValidationError(format!(
            "question points must not be negative, got {}",
            points
        )));
    }
    store.write("quiz.question_add", |conn| {
        let topic = catalog::load_topic(conn, topic_id)?;
        let question = Question {
            id: time::new_id(),
            topic_id: topic.id,
            text: text.trim().to_string(),
            question_type,
            ord,
            points,
        };
        conn.execute(
            "INSERT INTO questions(id, topic_id, text, question_type, ord, points) VALUES(?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                question.id,
                question.topic_id,
                question.text,
                question.question_type,
                question.ord,
                question.points
            ],
        )
        .map_err(|e| error::on_constraint(e, &format!("question order {} already used in topic", ord)))?;
        Ok(question)
    })
}

pub fn add_choice(
    store: &Store,
    question_id: &str,
    text: &str,
    is_correct: bool,
    ord: i64,
) -> Result<Choice, LearnstateError> {
    store.write("quiz.choice_add", |conn| {
        let question = load_question(conn, question_id)?;
        let choice = Choice {
            id: time::new_id(),
            question_id: question.id,
            text: text.trim().to_string(),
            is_correct,
            ord,
        };
        conn.execute(
            "INSERT INTO choices(id, question_id, text, is_correct, ord) VALUES(?1, ?2, ?3, ?4, ?5)",
            params![choice.id, choice.question_id, choice.text, choice.is_correct, choice.ord],
        )
        .map_err(|e| error::on_constraint(e, &format!("choice order {} already used in question", ord)))?;
        Ok(choice)
    })
}

pub fn get_quiz(store: &Store, topic_id: &str) -> Result<QuizDetail, LearnstateError> {
    store.read("quiz.get", |conn| {
        let topic = catalog::load_topic(conn, topic_id)?;
        let quiz = load_quiz(conn, &topic.id)?;
        let questions = topic_questions(conn, &topic.id)?
            .into_iter()
            .map(|question| {
                let choices = question_choices(conn, &question.id)?;
                Ok(QuestionDetail { question, choices })
            })
            .collect::<Result<Vec<_>, LearnstateError>>()?;
        Ok(QuizDetail { quiz, questions })
    })
}

// --- Attempts ---

/// Grade and store an attempt; a passing attempt completes the topic.
pub fn submit_attempt(
    store: &Store,
    user_id: &str,
    topic_id: &str,
    answers: &[AnswerInput],
) -> Result<AttemptResult, LearnstateError> {
    if answers.is_empty() {
        return Err(LearnstateError::ValidationError(
            "an attempt needs at least one answer".to_string(),
        ));
    }
    let completion = CourseCompletion::from_config(&store.config);

    store.write("quiz.attempt_submit", |conn| {
        let topic = catalog::load_topic(conn, topic_id)?;
        let course_id = catalog::course_of_topic(conn, &topic.id)?;
        let progress = progress::require_enrolled(conn, user_id, &course_id)?;
        let quiz = load_quiz(conn, &topic.id)?;

        let graded = grade_answers(conn, &topic.id, answers)?;
        let (total_questions, max_points): (i64, i64) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(points), 0) FROM questions WHERE topic_id = ?1",
            params![topic.id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let attempt_id = time::new_id();
        conn.execute(
            "INSERT INTO quiz_attempts(id, user_id, topic_id, total_questions_in_topic, max_points, pass_mark_percentage, submitted_at)
             VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                attempt_id,
                progress.user_id,
                topic.id,
                total_questions,
                max_points,
                quiz.pass_mark_percentage,
                time::now_millis()
            ],
        )?;
        let mut stmt = conn.prepare_cached(
            "INSERT INTO quiz_answers(id, attempt_id, question_id, selected_choice_ids, is_correct, points_awarded)
             VALUES(?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        for answer in &graded {
            let selected = serde_json::to_string(&answer.selected_choice_ids)?;
            stmt.execute(params![
                answer.id,
                attempt_id,
                answer.question_id,
                selected,
                answer.is_correct,
                answer.points_awarded
            ])?;
        }

        aggregate::propagate(conn, &ATTEMPT_SCORE, &attempt_id);
        let mut attempt = load_attempt(conn, &attempt_id)?;

        let progress = if attempt.passed {
            let topic_progress_id = progress::mark_topic(conn, &progress, &topic.id, true)?;
            conn.execute(
                "UPDATE quiz_attempts SET topic_progress_id = ?2 WHERE id = ?1",
                params![attempt_id, topic_progress_id],
            )?;
            attempt.topic_progress_id = Some(topic_progress_id);
            aggregate::propagate(conn, &completion, &progress.id);
            progress::progress_for(conn, user_id, &course_id)?
        } else {
            None
        };

        tracing::info!(
            attempt_id = %attempt.id,
            score = attempt.score,
            passed = attempt.passed,
            "quiz attempt graded"
        );
        Ok(AttemptResult {
            attempt,
            answers: graded,
            progress,
        })
    })
}

/// Check every answer against the topic's questions and award all-or-nothing points.
fn grade_answers(
    conn: &Connection,
    topic_id: &str,
    answers: &[AnswerInput],
) -> Result<Vec<QuizAnswer>, LearnstateError> {
    let mut seen = BTreeSet::new();
    let mut graded = Vec::with_capacity(answers.len());

    for answer in answers {
        if !seen.insert(answer.question_id.as_str()) {
            return Err(LearnstateError::ValidationError(format!(
                "question {} answered more than once",
                answer.question_id
            )));
        }
        let question = load_question(conn, &answer.question_id)?;
        if question.topic_id != topic_id {
            return Err(LearnstateError::ValidationError(format!(
                "question {} does not belong to this quiz",
                question.id
            )));
        }

        let selected: BTreeSet<String> = answer.choice_ids.iter().cloned().collect();
        if selected.is_empty() {
            return Err(LearnstateError::ValidationError(format!(
                "no choice selected for question {}",
                question.id
            )));
        }
        if question.question_type == QuestionType::SingleChoice && selected.len() != 1 {
            return Err(LearnstateError::ValidationError(format!(
                "question {} takes exactly one choice",
                question.id
            )));
        }

        let choices = question_choices(conn, &question.id)?;
        if let Some(stray) = selected
            .iter()
            .find(|id| !choices.iter().any(|c| &c.id == *id))
        {
            return Err(LearnstateError::ValidationError(format!(
                "choice {} does not belong to question {}",
                stray, question.id
            )));
        }
        let correct: BTreeSet<String> = choices
            .into_iter()
            .filter(|c| c.is_correct)
            .map(|c| c.id)
            .collect();

        let is_correct = selected == correct;
        graded.push(QuizAnswer {
            id: time::new_id(),
            question_id: question.id,
            selected_choice_ids: selected.into_iter().collect(),
            is_correct,
            points_awarded: if is_correct { question.points } else { 0 },
        });
    }
    Ok(graded)
}

pub fn list_attempts(
    store: &Store,
    user_id: &str,
    topic_id: &str,
) -> Result<Vec<QuizAttempt>, LearnstateError> {
    store.read("quiz.attempt_list", |conn| {
        let topic = catalog::load_topic(conn, topic_id)?;
        let sql = format!(
            "SELECT {} FROM quiz_attempts WHERE user_id = ?1 AND topic_id = ?2 ORDER BY submitted_at DESC, id DESC",
            ATTEMPT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let attempts = stmt
            .query_map(params![user_id, topic.id], QuizAttempt::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(attempts)
    })
}

pub(crate) fn has_quiz(conn: &Connection, topic_id: &str) -> Result<bool, LearnstateError> {
    Ok(conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM quizzes WHERE topic_id = ?1)",
        params![topic_id],
        |row| row.get(0),
    )?)
}

pub(crate) fn has_passed(conn: &Connection, user_id: &str, topic_id: &str) -> Result<bool, LearnstateError> {
    Ok(conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM quiz_attempts WHERE user_id = ?1 AND topic_id = ?2 AND passed = 1)",
        params![user_id, topic_id],
        |row| row.get(0),
    )?)
}

fn load_quiz(conn: &Connection, topic_id: &str) -> Result<Quiz, LearnstateError> {
    conn.query_row(
        "SELECT topic_id, pass_mark_percentage FROM quizzes WHERE topic_id = ?1",
        params![topic_id],
        |row| {
            Ok(Quiz {
                topic_id: row.get(0)?,
                pass_mark_percentage: row.get(1)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| LearnstateError::NotFound(format!("quiz for topic {}", topic_id)))
}

fn load_question(conn: &Connection, id: &str) -> Result<Question, LearnstateError> {
    let sql = format!("SELECT {} FROM questions WHERE id = ?1", QUESTION_COLUMNS);
    conn.query_row(&sql, params![id], Question::from_row)
        .optional()?
        .ok_or_else(|| LearnstateError::NotFound(format!("question {}", id)))
}

fn topic_questions(conn: &Connection, topic_id: &str) -> Result<Vec<Question>, LearnstateError> {
    let sql = format!(
        "SELECT {} FROM questions WHERE topic_id = ?1 ORDER BY ord",
        QUESTION_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let questions = stmt
        .query_map(params![topic_id], Question::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(questions)
}

fn question_choices(conn: &Connection, question_id: &str) -> Result<Vec<Choice>, LearnstateError> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, question_id, text, is_correct, ord FROM choices WHERE question_id = ?1 ORDER BY ord",
    )?;
    let choices = stmt
        .query_map(params![question_id], |row| {
            Ok(Choice {
                id: row.get(0)?,
                question_id: row.get(1)?,
                text: row.get(2)?,
                is_correct: row.get(3)?,
                ord: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(choices)
}

fn load_attempt(conn: &Connection, id: &str) -> Result<QuizAttempt, LearnstateError> {
    let sql = format!("SELECT {} FROM quiz_attempts WHERE id = ?1", ATTEMPT_COLUMNS);
    conn.query_row(&sql, params![id], QuizAttempt::from_row)
        .optional()?
        .ok_or_else(|| LearnstateError::NotFound(format!("quiz_attempt {}", id)))
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "quiz",
        "version": "0.1.0",
        "description": "Topic quizzes; attempts are scored from their answers",
        "commands": [
            { "name": "set", "parameters": ["topic", "pass_mark"] },
            { "name": "add-question", "parameters": ["topic", "text", "question_type", "ord", "points"] },
            { "name": "add-choice", "parameters": ["question", "text", "correct", "ord"] },
            { "name": "get", "parameters": ["topic"] },
            { "name": "submit", "parameters": ["user", "topic", "answer"] },
            { "name": "attempts", "parameters": ["user", "topic"] }
        ],
        "aggregates": ["quiz_attempt.score"],
        "storage": [schemas::STORE_DB_NAME]
    })
}
