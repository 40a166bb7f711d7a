// 📊 Time-Series Co-Aggregator - mirror an identity mapping onto time-indexed tables
// Member columns reduced step by step with their own `<table>_t` rules

use crate::diagnostics::Diagnostics;
use crate::error::{ReductionError, Result};
use crate::grouping::{Group, Grouping};
use crate::model::{Entity, Network};
use crate::reducer::{Extreme, ReductionRule};
use crate::rules::RuleSource;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Rule-table component name for the time-indexed tables of `table`
pub fn series_component(table: &str) -> String {
    format!("{}_t", table)
}

/// The class shared by every member, if they agree
pub fn common_class(rows: &[&Entity], class_attribute: Option<&str>) -> Option<String> {
    let attribute = class_attribute?;
    let mut keys = rows.iter().map(|r| r.get(attribute).to_key());
    let first = keys.next()??;
    if keys.all(|k| k.as_deref() == Some(first.as_str())) {
        Some(first)
    } else {
        None
    }
}

// ============================================================================
// CO-AGGREGATION
// ============================================================================

/// Replace member columns with one column per group in every time-indexed
/// table of `table`. Static attributes of the members must still be present
/// (weights, selectors and classes are read from them).
///
/// Groups whose members contribute no column are absent from the result.
pub fn co_aggregate<S: RuleSource<ReductionRule>>(
    network: &mut Network,
    table: &str,
    grouping: &Grouping,
    rules: &S,
    class_attribute: Option<&str>,
    _diagnostics: &mut Diagnostics,
) -> Result<usize> {
    let component = series_component(table);
    let statics = network.require_table(table)?;

    // Resolve member rows once; the old entities are still in the table
    let members: Vec<(&Group, Vec<&Entity>)> = grouping
        .groups
        .iter()
        .map(|g| {
            let rows = g.members.iter().filter_map(|m| statics.entity(m)).collect();
            (g, rows)
        })
        .collect();

    let mut rewritten = Vec::new();
    let mut produced = 0;

    for attribute in network.series_attributes(table) {
        let Some(series) = network.series(table, &attribute) else {
            continue;
        };

        let mut columns: BTreeMap<String, Vec<Option<f64>>> = series
            .columns()
            .map(|(entity, values)| (entity.to_string(), values.to_vec()))
            .collect();

        let mut merged = BTreeMap::new();
        for (group, rows) in &members {
            let present: Vec<(&Entity, &[Option<f64>])> = rows
                .iter()
                .filter_map(|row| series.column(&row.id).map(|c| (*row, c)))
                .collect();
            if present.is_empty() {
                continue;
            }

            let class = common_class(rows, class_attribute);
            let rule = rules.rule_for(&component, &attribute, class.as_deref())?;
            if let Some(values) = reduce_columns(&present, series.len(), &rule, &component, &attribute)? {
                merged.insert(group.new_id.clone(), values);
            }
        }

        for group in &grouping.groups {
            for member in &group.members {
                columns.remove(member);
            }
        }
        for dropped in &grouping.dropped {
            columns.remove(dropped);
        }

        debug!("{}.{}: {} merged column(s)", component, attribute, merged.len());
        produced += merged.len();
        columns.extend(merged);
        rewritten.push((attribute, series.len(), columns));
    }

    for (attribute, len, columns) in rewritten {
        if let Some(series) = network.series_mut(table, &attribute) {
            series.replace_all(len, columns);
        }
    }

    info!("Co-aggregated {} series column(s) for {}", produced, table);
    Ok(produced)
}

/// Remove the series columns of every grouped or dropped entity
pub fn drop_member_columns(network: &mut Network, table: &str, grouping: &Grouping) -> usize {
    let doomed: Vec<String> = grouping
        .groups
        .iter()
        .flat_map(|g| g.members.iter().cloned())
        .chain(grouping.dropped.iter().cloned())
        .collect();
    if network.series_attributes(table).is_empty() {
        return 0;
    }
    network.remove_series_columns(table, &doomed);
    debug!("Dropped series of {} member(s) of {}", doomed.len(), table);
    doomed.len()
}

// ============================================================================
// STEP-WISE REDUCTION
// ============================================================================

/// Reduce member columns into one. `Ok(None)` means the column is omitted.
fn reduce_columns(
    present: &[(&Entity, &[Option<f64>])],
    len: usize,
    rule: &ReductionRule,
    component: &str,
    attribute: &str,
) -> Result<Option<Vec<Option<f64>>>> {
    let values = match rule {
        ReductionRule::Drop => return Ok(None),
        ReductionRule::UseGroupKey => {
            return Err(ReductionError::InvalidRule {
                component: component.to_string(),
                attribute: attribute.to_string(),
                rule: "use_group_key".to_string(),
                reason: "not applicable to time series".to_string(),
            })
        }
        ReductionRule::Fixed(value) => match value.as_f64() {
            Some(v) => vec![Some(v); len],
            None => {
                return Err(ReductionError::InvalidRule {
                    component: component.to_string(),
                    attribute: attribute.to_string(),
                    rule: "fixed".to_string(),
                    reason: format!("'{}' is not numeric", value),
                })
            }
        },
        ReductionRule::PickBy { selector, extreme } => {
            let column = pick_column(present, selector, *extreme);
            column.to_vec()
        }
        ReductionRule::Sum => stepwise(present, len, |v| v.iter().map(|(x, _)| x).sum()),
        ReductionRule::Mean => stepwise(present, len, |v| {
            v.iter().map(|(x, _)| x).sum::<f64>() / v.len() as f64
        }),
        ReductionRule::Min => stepwise(present, len, |v| {
            v.iter().map(|(x, _)| *x).fold(f64::INFINITY, f64::min)
        }),
        ReductionRule::Max => stepwise(present, len, |v| {
            v.iter().map(|(x, _)| *x).fold(f64::NEG_INFINITY, f64::max)
        }),
        ReductionRule::WeightedMean(weight) => {
            let weighted: Vec<(&Entity, &[Option<f64>], f64)> = present
                .iter()
                .map(|(row, column)| (*row, *column, row.get(weight).as_f64().unwrap_or(0.0)))
                .collect();
            weighted_stepwise(&weighted, len)
        }
    };
    Ok(Some(values))
}

/// Apply `f` to the present (value, member-index) pairs of every step
fn stepwise(
    present: &[(&Entity, &[Option<f64>])],
    len: usize,
    f: impl Fn(&[(f64, usize)]) -> f64,
) -> Vec<Option<f64>> {
    (0..len)
        .map(|t| {
            let step: Vec<(f64, usize)> = present
                .iter()
                .enumerate()
                .filter_map(|(i, (_, column))| column[t].map(|v| (v, i)))
                .collect();
            if step.is_empty() {
                None
            } else {
                Some(f(&step))
            }
        })
        .collect()
}

fn weighted_stepwise(weighted: &[(&Entity, &[Option<f64>], f64)], len: usize) -> Vec<Option<f64>> {
    (0..len)
        .map(|t| {
            let step: Vec<(f64, f64)> = weighted
                .iter()
                .filter_map(|(_, column, w)| column[t].map(|v| (v, *w)))
                .collect();
            if step.is_empty() {
                return None;
            }
            let total: f64 = step.iter().map(|(_, w)| w).sum();
            if total == 0.0 {
                return Some(step.iter().map(|(v, _)| v).sum::<f64>() / step.len() as f64);
            }
            Some(step.iter().map(|(v, w)| v * w).sum::<f64>() / total)
        })
        .collect()
}

/// Column of the member with the extreme static selector; first member on ties
fn pick_column<'a>(
    present: &[(&Entity, &'a [Option<f64>])],
    selector: &str,
    extreme: Extreme,
) -> &'a [Option<f64>] {
    let mut best: Option<(f64, &'a [Option<f64>])> = None;
    for (row, column) in present {
        let Some(score) = row.get(selector).as_f64() else {
            continue;
        };
        let better = match (best, extreme) {
            (None, _) => true,
            (Some((current, _)), Extreme::Max) => score > current,
            (Some((current, _)), Extreme::Min) => score < current,
        };
        if better {
            best = Some((score, *column));
        }
    }
    match best {
        Some((_, column)) => column,
        None => present[0].1,
    }
}

// ============================================================================
// TESTS
// ============================================================================
