// 🎯 Optimizer Boundary - hand-off of a reduced network and shape of what comes back
// The solver itself lives outside this crate

use crate::model::{Network, TimeSeries};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Why a solve produced no usable result
#[derive(Debug, Error)]
pub enum SolveFailure {
    #[error("optimization infeasible: {0}")]
    Infeasible(String),

    #[error("solver failed: {0}")]
    Solver(String),

    #[error("result for {table}.{attribute} does not match the hand-off: {reason}")]
    Misaligned {
        table: String,
        attribute: String,
        reason: String,
    },
}

/// Termination status reported by the solver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolveStatus {
    Optimal,
    Suboptimal,
}

/// Per-entity, per-step results keyed like the hand-off network
#[derive(Debug, Clone)]
pub struct Solution {
    pub status: SolveStatus,
    pub objective: f64,
    pub snapshots: Vec<NaiveDateTime>,

    /// table → attribute → series (e.g. generators → p)
    pub results: BTreeMap<String, BTreeMap<String, TimeSeries>>,
}

impl Solution {
    pub fn new(status: SolveStatus, objective: f64, snapshots: Vec<NaiveDateTime>) -> Self {
        Solution {
            status,
            objective,
            snapshots,
            results: BTreeMap::new(),
        }
    }

    pub fn with_result(mut self, table: &str, attribute: &str, series: TimeSeries) -> Self {
        self.results
            .entry(table.to_string())
            .or_default()
            .insert(attribute.to_string(), series);
        self
    }

    pub fn result(&self, table: &str, attribute: &str) -> Option<&TimeSeries> {
        self.results.get(table).and_then(|m| m.get(attribute))
    }

    /// Results must use the hand-off time index and entity identifiers
    pub fn verify_alignment(&self, network: &Network) -> Result<(), SolveFailure> {
        if self.snapshots != network.snapshots() {
            return Err(SolveFailure::Misaligned {
                table: "network".to_string(),
                attribute: "snapshots".to_string(),
                reason: format!(
                    "{} result snapshots vs {} handed off",
                    self.snapshots.len(),
                    network.snapshots().len()
                ),
            });
        }

        for (table, attributes) in &self.results {
            let parent = network.table(table);
            for (attribute, series) in attributes {
                let misaligned = |reason: String| SolveFailure::Misaligned {
                    table: table.clone(),
                    attribute: attribute.clone(),
                    reason,
                };
                if series.len() != self.snapshots.len() {
                    return Err(misaligned(format!(
                        "{} rows for {} snapshots",
                        series.len(),
                        self.snapshots.len()
                    )));
                }
                if let Some(unknown) = series
                    .entities()
                    .find(|e| !parent.map(|t| t.contains(e)).unwrap_or(false))
                {
                    return Err(misaligned(format!("unknown entity '{}'", unknown)));
                }
            }
        }
        Ok(())
    }
}

/// External optimization engine
pub trait Optimizer {
    fn solve(&self, network: &Network) -> Result<Solution, SolveFailure>;
}

/// Solve and check the result lines up with the hand-off
pub fn solve_checked<O: Optimizer>(optimizer: &O, network: &Network) -> Result<Solution, SolveFailure> {
    let solution = optimizer.solve(network)?;
    solution.verify_alignment(network)?;
    Ok(solution)
}
