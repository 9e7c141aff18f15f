use crate::core::db;
use crate::core::error::{self, LearnstateError};
use crate::core::schemas;
use crate::core::store::Store;
use crate::core::time;
use clap::{Parser, Subcommand};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub fn initialize_users_db(root: &Path) -> Result<(), LearnstateError> {
    db::apply_schema(root, "users.init", &[schemas::USERS_SCHEMA])
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct User {
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub created_at: i64,
}

impl User {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(User {
            id: row.get(0)?,
            email: row.get(1)?,
            full_name: row.get(2)?,
            created_at: row.get(3)?,
        })
    }
}

#[derive(Parser, Debug)]
#[clap(name = "user", about = "Manage platform users")]
pub struct UserCli {
    #[clap(subcommand)]
    pub command: UserCommand,
}

#[derive(Subcommand, Debug)]
pub enum UserCommand {
    /// Register a user.
    Add {
        #[clap(long)]
        email: String,
        #[clap(long, default_value = "")]
        full_name: String,
    },
    /// Show a user by id.
    Get {
        #[clap(long)]
        id: String,
    },
}

pub fn run_user_cli(store: &Store, cli: UserCli) -> Result<serde_json::Value, LearnstateError> {
    let value = match cli.command {
        UserCommand::Add { email, full_name } => {
            serde_json::to_value(create_user(store, &email, &full_name)?)
        }
        UserCommand::Get { id } => serde_json::to_value(get_user(store, &id)?),
    };
    Ok(value?)
}

pub fn create_user(store: &Store, email: &str, full_name: &str) -> Result<User, LearnstateError> {
    let email = email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(LearnstateError::ValidationError(format!(
            "invalid email address: {:?}",
            email
        )));
    }
    let user = User {
        id: time::new_id(),
        email,
        full_name: full_name.trim().to_string(),
        created_at: time::now_millis(),
    };

    store.write("users.create", |conn| {
        conn.execute(
            "INSERT INTO users(id, email, full_name, created_at) VALUES(?1, ?2, ?3, ?4)",
            params![user.id, user.email, user.full_name, user.created_at],
        )
        .map_err(|e| error::on_constraint(e, &format!("email already registered: {}", user.email)))?;
        Ok(())
    })?;
    Ok(user)
}

pub fn get_user(store: &Store, id: &str) -> Result<User, LearnstateError> {
    store.read("users.get", |conn| load_user(conn, id))
}

pub(crate) fn load_user(conn: &Connection, id: &str) -> Result<User, LearnstateError> {
    conn.query_row(
        "SELECT id, email, full_name, created_at FROM users WHERE id = ?1",
        params![id],
        User::from_row,
    )
    .optional()?
    .ok_or_else(|| LearnstateError::NotFound(format!("user {}", id)))
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "user",
        "version": "0.1.0",
        "description": "Platform users referenced by every other subsystem",
        "commands": [
            { "name": "add", "parameters": ["email", "full_name"] },
            { "name": "get", "parameters": ["id"] }
        ],
        "storage": [schemas::STORE_DB_NAME]
    })
}
