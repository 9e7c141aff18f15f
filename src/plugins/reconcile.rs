//! Drift correction: recompute every aggregate for every parent.
//!
//! Propagation keeps aggregates fresh on every write, but a recompute that
//! failed (and was left stale) or an out-of-band edit leaves the cache wrong
//! until the next child write. A reconcile pass repairs all of them and
//! reports which parents had drifted.

use crate::core::aggregate::{self, Aggregate, RecomputeOutcome};
use crate::core::config::StoreConfig;
use crate::core::error::LearnstateError;
use crate::core::store::Store;
use crate::plugins::community::{COMMENT_REACTIONS, POST_COMMENTS, POST_REACTIONS};
use crate::plugins::progress::CourseCompletion;
use crate::plugins::quiz::ATTEMPT_SCORE;
use crate::plugins::{catalog, enrollment, reviews};
use clap::Parser;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

/// Every aggregate the store maintains.
pub fn registered_aggregates(config: &StoreConfig) -> Vec<Box<dyn Aggregate>> {
    vec![
        Box::new(reviews::COURSE_RATING),
        Box::new(enrollment::COURSE_ENROLLMENTS),
        Box::new(catalog::COURSE_DURATION),
        Box::new(CourseCompletion::from_config(config)),
        Box::new(ATTEMPT_SCORE),
        Box::new(POST_COMMENTS),
        Box::new(POST_REACTIONS),
        Box::new(COMMENT_REACTIONS),
    ]
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct AggregateReport {
    pub name: String,
    pub checked: usize,
    /// Parents whose stored values differed from the recomputed ones.
    pub drifted: usize,
    /// Parents whose recompute failed; still stale after this pass.
    pub stale: usize,
    pub drifted_ids: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct ReconcileReport {
    pub checked: usize,
    pub drifted: usize,
    pub stale: usize,
    pub aggregates: Vec<AggregateReport>,
}

#[derive(Parser, Debug)]
#[clap(name = "reconcile", about = "Recompute every aggregate and report drift")]
pub struct ReconcileCli {
    /// Only reconcile the named aggregate (e.g. `course.rating`).
    #[clap(long)]
    pub only: Option<String>,
}

pub fn run_reconcile_cli(store: &Store, cli: ReconcileCli) -> Result<serde_json::Value, LearnstateError> {
    let report = match cli.only {
        Some(name) => reconcile_only(store, &name)?,
        None => reconcile(store)?,
    };
    Ok(serde_json::to_value(report)?)
}

pub fn reconcile(store: &Store) -> Result<ReconcileReport, LearnstateError> {
    let aggregates = registered_aggregates(&store.config);
    run(store, &aggregates)
}

/// Reconcile a single aggregate by name; unknown names are a validation error.
pub fn reconcile_only(store: &Store, name: &str) -> Result<ReconcileReport, LearnstateError> {
    let aggregates: Vec<Box<dyn Aggregate>> = registered_aggregates(&store.config)
        .into_iter()
        .filter(|a| a.name() == name)
        .collect();
    if aggregates.is_empty() {
        return Err(LearnstateError::ValidationError(format!(
            "unknown aggregate {:?}",
            name
        )));
    }
    run(store, &aggregates)
}

fn run(store: &Store, aggregates: &[Box<dyn Aggregate>]) -> Result<ReconcileReport, LearnstateError> {
    let report = store.write("reconcile.run", |conn| {
        let mut report = ReconcileReport::default();
        for agg in aggregates {
            let part = reconcile_aggregate(conn, agg.as_ref())?;
            report.checked += part.checked;
            report.drifted += part.drifted;
            report.stale += part.stale;
            report.aggregates.push(part);
        }
        Ok(report)
    })?;

    if report.drifted > 0 || report.stale > 0 {
        tracing::warn!(
            checked = report.checked,
            drifted = report.drifted,
            stale = report.stale,
            "reconcile found drift"
        );
    } else {
        tracing::info!(checked = report.checked, "reconcile clean");
    }
    Ok(report)
}

fn reconcile_aggregate(conn: &Connection, agg: &dyn Aggregate) -> Result<AggregateReport, LearnstateError> {
    let mut part = AggregateReport {
        name: agg.name().to_string(),
        ..AggregateReport::default()
    };
    for parent_id in agg.parent_ids(conn)? {
        part.checked += 1;
        let before = agg.snapshot(conn, &parent_id)?;
        match aggregate::propagate(conn, agg, &parent_id) {
            RecomputeOutcome::Fresh => {
                if agg.snapshot(conn, &parent_id)? != before {
                    part.drifted += 1;
                    part.drifted_ids.push(parent_id);
                }
            }
            RecomputeOutcome::Stale { .. } => part.stale += 1,
        }
    }
    Ok(part)
}
