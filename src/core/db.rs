use crate::core::broker::DbBroker;
use crate::core::error;
use crate::core::schemas;
use rusqlite::Connection;
use std::fs;
use std::path::{Path, PathBuf};

/// Busy timeout for every connection; covers cross-process writers.
const BUSY_TIMEOUT_SECS: u64 = 5;

pub fn db_connect(db_path: &str) -> Result<Connection, error::LearnstateError> {
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(std::time::Duration::from_secs(BUSY_TIMEOUT_SECS))
        .map_err(error::LearnstateError::RusqliteError)?;
    conn.query_row("PRAGMA journal_mode=WAL;", [], |_| Ok(()))
        .map_err(error::LearnstateError::RusqliteError)?;
    conn.execute("PRAGMA foreign_keys=ON;", [])
        .map_err(error::LearnstateError::RusqliteError)?;
    Ok(conn)
}

pub fn store_db_path(root: &Path) -> PathBuf {
    root.join(schemas::STORE_DB_NAME)
}

/// Apply a set of DDL statements to the store database.
pub fn apply_schema(
    root: &Path,
    op_name: &str,
    statements: &[&str],
) -> Result<(), error::LearnstateError> {
    fs::create_dir_all(root).map_err(error::LearnstateError::IoError)?;
    let broker = DbBroker::new(root);
    broker.with_conn(&store_db_path(root), op_name, |conn| {
        for ddl in statements {
            conn.execute_batch(ddl)?;
        }
        Ok(())
    })
}

/// First free slug in `table`: `base`, then `base-1`, `base-2`, ...
pub fn unique_slug(
    conn: &Connection,
    table: &str,
    base: &str,
) -> Result<String, error::LearnstateError> {
    let sql = format!("SELECT EXISTS(SELECT 1 FROM {} WHERE slug = ?1)", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut candidate = base.to_string();
    let mut counter = 1;
    while stmt.query_row([&candidate], |row| row.get::<_, bool>(0))? {
        candidate = format!("{}-{}", base, counter);
        counter += 1;
    }
    Ok(candidate)
}

/// Closed set of values stored as TEXT.
///
/// Generates the enum plus `as_str`, `Display`, `FromStr` (errors are
/// `ValidationError`) and rusqlite `ToSql`/`FromSql`.
#[macro_export]
macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $($(#[$vmeta:meta])* $variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::core::error::LearnstateError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err($crate::core::error::LearnstateError::ValidationError(format!(
                        "unknown {} {:?}",
                        stringify!($name),
                        other
                    ))),
                }
            }
        }

        impl rusqlite::types::ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
                Ok(rusqlite::types::ToSqlOutput::from(self.as_str()))
            }
        }

        impl rusqlite::types::FromSql for $name {
            fn column_result(
                value: rusqlite::types::ValueRef<'_>,
            ) -> rusqlite::types::FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e| rusqlite::types::FromSqlError::Other(Box::new(e)))
            }
        }
    };
}
