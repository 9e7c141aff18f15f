//! Core modules for learnstate's store and derived-state propagation.
//!
//! Shared primitives live here; entity modules live under `plugins`.

pub mod aggregate;
pub mod broker;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod output;
pub mod schemas;
pub mod store;
pub mod time;
