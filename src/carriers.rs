// 🏷️ Carrier Standardization - rename carriers everywhere and keep the carriers table in step

use crate::grouping::IdentityMapping;
use crate::model::{Entity, Network, CARRIERS};
use crate::references::rewrite_column;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

const CARRIER: &str = "carrier";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CarrierReport {
    /// table → number of renamed values
    pub updated: BTreeMap<String, usize>,
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

/// Rewrite `carrier` values in every table through `mapping`.
///
/// When a carriers table exists, carriers now in use are added and mapped-away
/// carriers no longer in use are removed.
pub fn standardize_carriers(network: &mut Network, mapping: &BTreeMap<String, String>) -> CarrierReport {
    let mut report = CarrierReport::default();
    if mapping.is_empty() {
        debug!("No carrier mapping, skipping standardization");
        return report;
    }

    let mut identity = IdentityMapping::new();
    for (old, new) in mapping {
        identity.insert(old, new);
    }

    let tables: Vec<String> = network
        .table_names()
        .filter(|t| *t != CARRIERS)
        .map(str::to_string)
        .collect();

    let mut in_use = BTreeSet::new();
    for name in &tables {
        let Some(table) = network.table_mut(name) else {
            continue;
        };
        if !table.has_column(CARRIER) {
            continue;
        }
        let changed = rewrite_column(table, CARRIER, &identity);
        if changed > 0 {
            report.updated.insert(name.clone(), changed);
        }
        in_use.extend(
            table
                .entities()
                .iter()
                .filter_map(|e| e.get(CARRIER).to_key()),
        );
    }

    if let Some(carriers) = network.table_mut(CARRIERS) {
        for carrier in &in_use {
            if !carriers.contains(carrier) {
                carriers.insert(Entity::new(carrier.clone()));
                report.added.push(carrier.clone());
            }
        }

        let unused: Vec<String> = carriers
            .ids()
            .filter(|c| mapping.contains_key(*c) && !in_use.contains(*c))
            .map(str::to_string)
            .collect();
        carriers.remove_all(unused.iter().map(String::as_str));
        report.removed = unused;
    }

    info!(
        "Standardized carriers: {} table(s) updated, {} added, {} removed",
        report.updated.len(),
        report.added.len(),
        report.removed.len()
    );
    report
}
