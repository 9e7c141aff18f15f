//! Derived-state propagation.
//!
//! Parent rows cache aggregates over their children: counts, averages, sums and
//! completion ratios. The cache is never authoritative. Every child mutation
//! calls [`propagate`] with the rule that owns the affected parent, inside the
//! same transaction as the child write, and the rule recomputes the aggregate
//! from scratch and overwrites the stored columns.
//!
//! A failed recompute must not undo the child write. [`propagate`] wraps the
//! recompute in a SAVEPOINT, rolls back only that savepoint on failure, logs
//! the error and reports [`RecomputeOutcome::Stale`]. The stale value is
//! corrected by the next successful recompute or by a reconcile pass.

use crate::core::error::LearnstateError;
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, params};

/// A recomputable aggregate owned by one parent table.
pub trait Aggregate {
    /// Stable name used in logs and reconcile reports.
    fn name(&self) -> &'static str;

    /// Table whose rows hold the aggregate columns. Its key column is `id`.
    fn parent_table(&self) -> &'static str;

    /// Aggregate columns written by [`Aggregate::recompute`].
    fn columns(&self) -> Vec<&'static str>;

    /// Re-run the aggregate query for one parent and persist only its columns.
    ///
    /// Must be idempotent. A missing parent is `NotFound`.
    fn recompute(&self, conn: &Connection, parent_id: &str) -> Result<(), LearnstateError>;

    /// Stored aggregate values for one parent, in [`Aggregate::columns`] order.
    fn snapshot(&self, conn: &Connection, parent_id: &str) -> Result<Vec<Value>, LearnstateError> {
        let columns = self.columns();
        let sql = format!(
            "SELECT {} FROM {} WHERE id = ?1",
            columns.join(", "),
            self.parent_table()
        );
        conn.query_row(&sql, params![parent_id], |row| {
            (0..columns.len())
                .map(|i| row.get::<_, Value>(i))
                .collect::<Result<Vec<_>, _>>()
        })
        .optional()?
        .ok_or_else(|| {
            LearnstateError::NotFound(format!("{} {}", self.parent_table(), parent_id))
        })
    }

    /// Every parent this aggregate covers.
    fn parent_ids(&self, conn: &Connection) -> Result<Vec<String>, LearnstateError> {
        let sql = format!("SELECT id FROM {} ORDER BY id", self.parent_table());
        let mut stmt = conn.prepare(&sql)?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(ids)
    }
}

/// One `column = (scalar expression)` pair. The expression sees `?1` as the parent id
/// and may reference the parent row's own columns.
#[derive(Debug, Clone, Copy)]
pub struct Assignment {
    pub column: &'static str,
    pub expr: &'static str,
}

/// Declarative aggregate: a single `UPDATE parent SET ... WHERE id = ?1`.
///
/// Each expression must yield the zero state when there are no children
/// (wrap AVG/SUM in `COALESCE`).
#[derive(Debug, Clone, Copy)]
pub struct AggregateRule {
    pub name: &'static str,
    pub parent_table: &'static str,
    pub assignments: &'static [Assignment],
}

impl AggregateRule {
    fn update_sql(&self) -> String {
        let sets = self
            .assignments
            .iter()
            .map(|a| format!("{} = ({})", a.column, a.expr))
            .collect::<Vec<_>>()
            .join(", ");
        format!("UPDATE {} SET {} WHERE id = ?1", self.parent_table, sets)
    }
}

impl Aggregate for AggregateRule {
    fn name(&self) -> &'static str {
        self.name
    }

    fn parent_table(&self) -> &'static str {
        self.parent_table
    }

    fn columns(&self) -> Vec<&'static str> {
        self.assignments.iter().map(|a| a.column).collect()
    }

    fn recompute(&self, conn: &Connection, parent_id: &str) -> Result<(), LearnstateError> {
        let changed = conn
            .prepare_cached(&self.update_sql())?
            .execute(params![parent_id])?;
        if changed == 0 {
            return Err(LearnstateError::NotFound(format!(
                "{} {}",
                self.parent_table, parent_id
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecomputeOutcome {
    /// Stored aggregate now matches the live children.
    Fresh,
    /// Recompute failed and was rolled back; the stored value may lag.
    Stale { reason: String },
}

impl RecomputeOutcome {
    pub fn is_fresh(&self) -> bool {
        matches!(self, RecomputeOutcome::Fresh)
    }
}

const SAVEPOINT: &str = "aggregate_recompute";

/// Recompute `aggregate` for `parent_id`, isolating failures from the caller's transaction.
///
/// Never returns an error: a failing recompute is rolled back to its savepoint,
/// logged, and reported as `Stale`.
pub fn propagate(conn: &Connection, aggregate: &dyn Aggregate, parent_id: &str) -> RecomputeOutcome {
    if let Err(e) = conn.execute_batch(&format!("SAVEPOINT {}", SAVEPOINT)) {
        return stale(aggregate, parent_id, e.into());
    }

    match aggregate.recompute(conn, parent_id) {
        Ok(()) => match conn.execute_batch(&format!("RELEASE {}", SAVEPOINT)) {
            Ok(()) => {
                tracing::debug!(aggregate = aggregate.name(), parent_id, "aggregate recomputed");
                RecomputeOutcome::Fresh
            }
            Err(e) => {
                rollback_savepoint(conn);
                stale(aggregate, parent_id, e.into())
            }
        },
        Err(e) => {
            rollback_savepoint(conn);
            stale(aggregate, parent_id, e)
        }
    }
}

/// Propagate to several parents; returns how many ended up stale.
pub fn propagate_all<I, S>(conn: &Connection, aggregate: &dyn Aggregate, parent_ids: I) -> usize
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    parent_ids
        .into_iter()
        .filter(|id| !propagate(conn, aggregate, id.as_ref()).is_fresh())
        .count()
}

fn rollback_savepoint(conn: &Connection) {
    let sql = format!("ROLLBACK TO {sp}; RELEASE {sp}", sp = SAVEPOINT);
    if let Err(e) = conn.execute_batch(&sql) {
        tracing::error!(error = %e, "failed to roll back recompute savepoint");
    }
}

fn stale(aggregate: &dyn Aggregate, parent_id: &str, err: LearnstateError) -> RecomputeOutcome {
    tracing::warn!(
        aggregate = aggregate.name(),
        parent_id,
        error = %err,
        "aggregate recompute failed; stored value left stale"
    );
    RecomputeOutcome::Stale {
        reason: err.to_string(),
    }
}
