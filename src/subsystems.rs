//! Subsystem registration: centralizes schema initialization.
//!
//! Adding a new subsystem: append one entry to `SUBSYSTEMS`.

use crate::core::error;
use crate::plugins::{blog, catalog, community, enrollment, progress, quiz, reviews, users};
use std::path::Path;

pub(crate) struct SubsystemInit {
    pub name: &'static str,
    pub initialize_db: fn(&Path) -> Result<(), error::LearnstateError>,
}

/// All subsystems that own tables in the store database.
/// Order matters: referenced tables are created before the tables pointing at them.
pub(crate) const SUBSYSTEMS: &[SubsystemInit] = &[
    SubsystemInit { name: "users", initialize_db: users::initialize_users_db },
    SubsystemInit { name: "catalog", initialize_db: catalog::initialize_catalog_db },
    SubsystemInit { name: "quiz", initialize_db: quiz::initialize_quiz_db },
    SubsystemInit { name: "enrollment", initialize_db: enrollment::initialize_enrollment_db },
    SubsystemInit { name: "reviews", initialize_db: reviews::initialize_reviews_db },
    SubsystemInit { name: "progress", initialize_db: progress::initialize_progress_db },
    SubsystemInit { name: "quiz_attempts", initialize_db: quiz::initialize_attempts_db },
    SubsystemInit { name: "community", initialize_db: community::initialize_community_db },
    SubsystemInit { name: "blog", initialize_db: blog::initialize_blog_db },
];

/// Initialize all subsystem tables sequentially.
pub(crate) fn initialize_all_dbs(data_root: &Path) -> Result<(), error::LearnstateError> {
    for sub in SUBSYSTEMS {
        tracing::trace!(subsystem = sub.name, "initializing schema");
        (sub.initialize_db)(data_root)?;
    }
    crate::core::db::apply_schema(data_root, "store.indexes", &[crate::core::schemas::STORE_INDEXES])
}

/// Names of registered subsystems, in initialization order.
pub fn subsystem_names() -> Vec<&'static str> {
    SUBSYSTEMS.iter().map(|s| s.name).collect()
}
