//! Store handle for learnstate's state.
//!
//! A store is a directory holding the SQLite database, the broker audit log and
//! an optional `learnstate.toml`. Every plugin operation takes a `&Store`.

use crate::core::broker::DbBroker;
use crate::core::config::{self, StoreConfig};
use crate::core::db;
use crate::core::error::LearnstateError;
use crate::subsystems;
use rusqlite::Connection;
use std::fs;
use std::path::{Path, PathBuf};

/// Default store directory name, relative to the working directory.
pub const DEFAULT_STORE_DIR: &str = ".learnstate";

#[derive(Debug, Clone)]
pub struct Store {
    /// Absolute or caller-relative path to the store root directory
    pub root: PathBuf,
    /// Configuration loaded from the store root
    pub config: StoreConfig,
}

impl Store {
    /// Open (creating if needed) the store at `root` and bring its schema up to date.
    pub fn open(root: &Path) -> Result<Self, LearnstateError> {
        fs::create_dir_all(root).map_err(LearnstateError::IoError)?;
        let config = config::load_config(root)?;
        subsystems::initialize_all_dbs(root)?;
        tracing::debug!(root = %root.display(), "store opened");
        Ok(Self {
            root: root.to_path_buf(),
            config,
        })
    }

    /// Same as [`Store::open`] with an explicit configuration (the file is ignored).
    pub fn open_with_config(root: &Path, config: StoreConfig) -> Result<Self, LearnstateError> {
        config.validate()?;
        fs::create_dir_all(root).map_err(LearnstateError::IoError)?;
        subsystems::initialize_all_dbs(root)?;
        Ok(Self {
            root: root.to_path_buf(),
            config,
        })
    }

    pub fn db_path(&self) -> PathBuf {
        db::store_db_path(&self.root)
    }

    /// Run `f` inside a write transaction on the store database.
    pub fn write<F, R>(&self, op_name: &str, f: F) -> Result<R, LearnstateError>
    where
        F: FnOnce(&Connection) -> Result<R, LearnstateError>,
    {
        DbBroker::new(&self.root).with_tx(&self.db_path(), op_name, f)
    }

    /// Run `f` with a plain connection (reads, no transaction).
    pub fn read<F, R>(&self, op_name: &str, f: F) -> Result<R, LearnstateError>
    where
        F: FnOnce(&Connection) -> Result<R, LearnstateError>,
    {
        DbBroker::new(&self.root).with_conn(&self.db_path(), op_name, f)
    }
}
