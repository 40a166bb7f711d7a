// 🔗 Reference Rewriter - propagate an identity mapping into foreign-key columns
// Runs before old entities are deleted; end-of-pass check catches anything dangling

use crate::diagnostics::{Diagnostics, WarningKind};
use crate::error::{ReductionError, Result};
use crate::grouping::IdentityMapping;
use crate::model::{ComponentTable, Network, Value};
use std::collections::HashSet;
use tracing::{debug, info};

// ============================================================================
// REWRITE
// ============================================================================

/// Rewrite one reference column of `table` in place: `v → mapping.get(v, v)`.
/// Returns the number of cells changed.
pub fn rewrite_column(table: &mut ComponentTable, attribute: &str, mapping: &IdentityMapping) -> usize {
    let mut changed = 0;
    for entity in table.entities_mut() {
        let Some(old) = entity.get(attribute).to_key() else {
            continue;
        };
        if let Some(new) = mapping.get(&old) {
            if new != old {
                entity.set(attribute, Value::text(new));
                changed += 1;
            }
        }
    }
    changed
}

/// Rewrite every reference column that points at `target`
pub fn rewrite_references(network: &mut Network, target: &str, mapping: &IdentityMapping) -> usize {
    if mapping.is_empty() {
        return 0;
    }

    let mut total = 0;
    for spec in network.references_to(target) {
        let Some(table) = network.table_mut(&spec.table) else {
            continue;
        };
        let changed = rewrite_column(table, &spec.attribute, mapping);
        if changed > 0 {
            debug!("Rewrote {} value(s) of {}.{} → {}", changed, spec.table, spec.attribute, target);
        }
        total += changed;
    }
    total
}

// ============================================================================
// CASCADE
// ============================================================================

/// Remove every entity whose reference points at one of `removed` in
/// `target`, together with its series columns, then repeat for the tables
/// referencing the entities removed that way. Returns the number removed.
pub fn drop_dependents(
    network: &mut Network,
    target: &str,
    removed: &[String],
    diagnostics: &mut Diagnostics,
) -> usize {
    let mut pending: Vec<(String, HashSet<String>)> =
        vec![(target.to_string(), removed.iter().cloned().collect())];
    let mut total = 0;

    while let Some((target, removed)) = pending.pop() {
        if removed.is_empty() {
            continue;
        }
        for spec in network.references_to(&target) {
            let Some(table) = network.table(&spec.table) else {
                continue;
            };
            let doomed: Vec<(String, String)> = table
                .entities()
                .iter()
                .filter_map(|e| {
                    let value = e.get(&spec.attribute).to_key()?;
                    removed.contains(&value).then(|| (e.id.clone(), value))
                })
                .collect();
            if doomed.is_empty() {
                continue;
            }

            let ids: Vec<String> = doomed.iter().map(|(id, _)| id.clone()).collect();
            if let Some(table) = network.table_mut(&spec.table) {
                table.remove_all(ids.iter().map(String::as_str));
            }
            network.remove_series_columns(&spec.table, &ids);

            for (id, value) in &doomed {
                diagnostics.warn(
                    WarningKind::DroppedDependent,
                    &spec.table,
                    Some(&spec.attribute),
                    format!("'{}' referenced removed {} entity '{}', dropped", id, target, value),
                );
            }
            info!("Dropped {} {} entities referencing removed {}", ids.len(), spec.table, target);
            total += ids.len();
            pending.push((spec.table.clone(), ids.into_iter().collect()));
        }
    }
    total
}

// ============================================================================
// CONSISTENCY CHECK
// ============================================================================

/// Every reference resolves and every series column has a parent entity.
///
/// Missing reference values are not references and are skipped. Optional
/// targets are only enforced when the target table exists.
pub fn check_consistency(network: &Network) -> Result<()> {
    for spec in network.references() {
        let Some(table) = network.table(&spec.table) else {
            continue;
        };
        let target = network.table(&spec.target);
        if target.is_none() && spec.optional_target {
            continue;
        }

        for entity in table.entities() {
            let Some(value) = entity.get(&spec.attribute).to_key() else {
                continue;
            };
            let resolves = target.map(|t| t.contains(&value)).unwrap_or(false);
            if !resolves {
                return Err(ReductionError::DanglingReference {
                    table: spec.table.clone(),
                    attribute: spec.attribute.clone(),
                    entity: entity.id.clone(),
                    target: spec.target.clone(),
                    value,
                });
            }
        }
    }

    for (table_name, attribute) in network.series_keys() {
        let Some(series) = network.series(&table_name, &attribute) else {
            continue;
        };
        let parent = network.table(&table_name);
        for entity in series.entities() {
            if !parent.map(|t| t.contains(entity)).unwrap_or(false) {
                return Err(ReductionError::OrphanSeriesColumn {
                    table: table_name.clone(),
                    attribute: attribute.clone(),
                    entity: entity.to_string(),
                });
            }
        }
    }

    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
