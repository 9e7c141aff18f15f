use crate::core::db;
use crate::core::error;
use crate::core::schemas;
use crate::core::time;
use rusqlite::{Connection, TransactionBehavior};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// The DB Broker is the single door to the store database.
///
/// Every call is serialized in-process, gets a fresh connection and leaves one
/// line in the audit log. Writes run inside an IMMEDIATE transaction so a child
/// mutation and the recomputes it triggers commit (or roll back) together.
pub struct DbBroker {
    audit_log_path: PathBuf,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BrokerEvent {
    pub ts: String,
    pub event_id: String,
    pub op: String,
    pub db_id: String,
    pub status: String,
}

static DB_LOCK: Mutex<()> = Mutex::new(());

impl DbBroker {
    pub fn new(root: &Path) -> Self {
        Self {
            audit_log_path: root.join(schemas::AUDIT_LOG_NAME),
        }
    }

    /// Execute a closure with a serialized connection (no transaction).
    pub fn with_conn<F, R>(
        &self,
        db_path: &Path,
        op_name: &str,
        f: F,
    ) -> Result<R, error::LearnstateError>
    where
        F: FnOnce(&Connection) -> Result<R, error::LearnstateError>,
    {
        let _lock = DB_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let conn = db::db_connect(&db_path.to_string_lossy())?;
        let result = f(&conn);

        self.record(db_path, op_name, result.is_ok());
        result
    }

    /// Execute a closure inside a write transaction.
    ///
    /// The transaction commits only when the closure returns `Ok`.
    pub fn with_tx<F, R>(&self, db_path: &Path, op_name: &str, f: F) -> Result<R, error::LearnstateError>
    where
        F: FnOnce(&Connection) -> Result<R, error::LearnstateError>,
    {
        let _lock = DB_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut conn = db::db_connect(&db_path.to_string_lossy())?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let result = match f(&tx) {
            Ok(value) => tx.commit().map(|_| value).map_err(error::LearnstateError::from),
            Err(e) => {
                // Dropping the transaction rolls it back.
                drop(tx);
                Err(e)
            }
        };

        self.record(db_path, op_name, result.is_ok());
        result
    }

    fn record(&self, db_path: &Path, op: &str, ok: bool) {
        let db_id = db_path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();
        let status = if ok { "success" } else { "error" };
        if let Err(e) = self.log_event(op, &db_id, status) {
            tracing::warn!(op, error = %e, "failed to append broker audit event");
        }
    }

    fn log_event(&self, op: &str, db_id: &str, status: &str) -> Result<(), error::LearnstateError> {
        use std::fs::OpenOptions;
        use std::io::Write;

        let ev = BrokerEvent {
            ts: time::now_epoch_z(),
            event_id: time::new_event_id(),
            op: op.to_string(),
            db_id: db_id.to_string(),
            status: status.to_string(),
        };

        let line = serde_json::to_string(&ev)?;
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.audit_log_path)
            .map_err(error::LearnstateError::IoError)?;
        writeln!(f, "{}", line).map_err(error::LearnstateError::IoError)?;
        Ok(())
    }
}

/// Read back the audit log, oldest first.
pub fn read_audit_log(root: &Path) -> Result<Vec<BrokerEvent>, error::LearnstateError> {
    let path = root.join(schemas::AUDIT_LOG_NAME);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(&path).map_err(error::LearnstateError::IoError)?;
    content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| {
            serde_json::from_str(l).map_err(|e| {
                error::LearnstateError::ValidationError(format!("corrupt audit line: {}", e))
            })
        })
        .collect()
}
