//! Subsystems of the learning platform.
//!
//! Each plugin owns its tables, its CLI and the aggregate rules whose child
//! rows it writes.

pub mod blog;
pub mod catalog;
pub mod community;
pub mod enrollment;
pub mod progress;
pub mod quiz;
pub mod reconcile;
pub mod reviews;
pub mod users;
