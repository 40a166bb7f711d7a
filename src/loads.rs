// 🔌 Load Distribution - regional loads from a demand side-input, plus load scaling
// Temporal pattern = per-step sum of the existing load series

use crate::config::LoadConfig;
use crate::diagnostics::{Diagnostics, WarningKind};
use crate::error::{ReductionError, Result};
use crate::grouping::NameStandardizer;
use crate::model::{ComponentTable, Entity, Network, TimeSeries, Value, BUSES, LOADS};
use anyhow::Context as AnyhowContext;
use std::path::Path;
use tracing::{debug, info};

/// Region labels that mark a summary row in demand files
const TOTAL_LABELS: [&str; 2] = ["total", "합계"];

// ============================================================================
// DEMAND WEIGHTS
// ============================================================================

/// Ordered region → demand weight table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DemandWeights {
    weights: Vec<(String, f64)>,
}

impl DemandWeights {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: add (or accumulate) a region weight
    pub fn with(mut self, region: &str, weight: f64) -> Self {
        self.add(region, weight);
        self
    }

    fn add(&mut self, region: &str, weight: f64) {
        match self.weights.iter_mut().find(|(r, _)| r == region) {
            Some((_, w)) => *w += weight,
            None => self.weights.push((region.to_string(), weight)),
        }
    }

    /// Load a demand CSV; region names go through `standardizer` when given
    pub fn from_csv<P: AsRef<Path>>(
        path: P,
        region_column: &str,
        demand_column: &str,
        standardizer: Option<&NameStandardizer>,
    ) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)
            .with_context(|| format!("Failed to open demand file: {:?}", path))?;

        let headers = reader.headers().context("Failed to read demand header")?.clone();
        let position = |name: &str| {
            headers
                .iter()
                .position(|h| h == name)
                .with_context(|| format!("Demand file {:?} has no column '{}'", path, name))
        };
        let region_idx = position(region_column)?;
        let demand_idx = position(demand_column)?;

        let mut weights = DemandWeights::new();
        for (line, record) in reader.records().enumerate() {
            let record = record.with_context(|| format!("Failed to read demand row {}", line + 2))?;
            let raw_region = record.get(region_idx).unwrap_or_default();
            if raw_region.is_empty()
                || TOTAL_LABELS.iter().any(|t| raw_region.eq_ignore_ascii_case(t))
            {
                continue;
            }
            let demand: f64 = record
                .get(demand_idx)
                .unwrap_or_default()
                .parse()
                .with_context(|| format!("Invalid demand for '{}' on row {}", raw_region, line + 2))?;

            let region = match standardizer {
                Some(s) => s.standardize(raw_region),
                None => raw_region.to_string(),
            };
            weights.add(&region, demand);
        }
        Ok(weights)
    }

    pub fn total(&self) -> f64 {
        self.weights.iter().map(|(_, w)| w).sum()
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.weights.iter().map(|(r, w)| (r.as_str(), *w))
    }
}

// ============================================================================
// REGIONAL DISTRIBUTION
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct LoadReport {
    pub removed: usize,
    pub created: usize,
    pub unmapped: usize,
    pub pattern_total: Option<f64>,
}

/// Identifier of the load generated for `region`
pub fn regional_load_name(region: &str) -> String {
    format!("load_{}", region)
}

/// Replace existing loads with one load per weighted region.
///
/// With a load pattern: static `p_set` = mean(pattern)·ratio and series =
/// pattern·ratio. Without one: `p_set` = demand·scale_factor.
/// Zero total weight splits equally (warning), or raises in strict mode.
pub fn distribute_loads(
    network: &mut Network,
    weights: &DemandWeights,
    config: &LoadConfig,
    strict: bool,
    diagnostics: &mut Diagnostics,
) -> Result<LoadReport> {
    if weights.is_empty() {
        diagnostics.warn(WarningKind::EmptyInput, LOADS, None, "demand table has no regions");
        return Ok(LoadReport {
            removed: 0,
            created: 0,
            unmapped: 0,
            pattern_total: None,
        });
    }

    let pattern: Option<Vec<f64>> = network
        .series(LOADS, "p_set")
        .filter(|s| !s.is_empty())
        .map(|s| s.row_sums());
    let pattern_total = pattern.as_ref().map(|p| p.iter().sum::<f64>());

    let total = weights.total();
    let ratio_of = |weight: f64| -> f64 {
        if total == 0.0 {
            1.0 / weights.len() as f64
        } else {
            weight / total
        }
    };
    if total == 0.0 {
        if strict {
            return Err(ReductionError::Degenerate {
                what: "demand weights".to_string(),
                detail: format!("{} region weights sum to zero", weights.len()),
            });
        }
        diagnostics.warn(
            WarningKind::DegenerateWeights,
            LOADS,
            Some("p_set"),
            format!("demand weights sum to zero, splitting equally over {} regions", weights.len()),
        );
    }

    // Existing loads are replaced
    let old_ids: Vec<String> = network
        .table(LOADS)
        .map(|t| t.ids().map(str::to_string).collect())
        .unwrap_or_default();
    if network.table(LOADS).is_none() {
        network.insert_table(ComponentTable::new(LOADS));
    }
    network.require_table_mut(LOADS)?.remove_all(old_ids.iter().map(String::as_str));
    network.remove_series_columns(LOADS, &old_ids);

    let len = network.snapshots().len();
    let mut p_set_series = network
        .remove_series(LOADS, "p_set")
        .unwrap_or_else(|| TimeSeries::new(len));
    let mut new_loads = Vec::new();
    let mut unmapped = 0;

    for (region, weight) in weights.iter() {
        let known = network.table(BUSES).map(|b| b.contains(region)).unwrap_or(false);
        if !known {
            unmapped += 1;
            diagnostics.warn(
                WarningKind::UnmappedGroupKey,
                LOADS,
                None,
                format!("demand region '{}' matches no node", region),
            );
            continue;
        }

        let ratio = ratio_of(weight);
        if ratio <= 0.0 {
            debug!("Region {} has no demand share, no load created", region);
            continue;
        }

        let name = regional_load_name(region);
        let p_set = match &pattern {
            Some(p) if !p.is_empty() => p.iter().sum::<f64>() / p.len() as f64 * ratio,
            _ => weight * config.scale_factor,
        };

        let mut load = Entity::new(name.clone())
            .with("bus", region)
            .with("p_set", p_set);
        if let Some(carrier) = &config.carrier {
            load.set("carrier", Value::text(carrier.clone()));
        }
        new_loads.push(load);

        if let Some(p) = &pattern {
            p_set_series.insert(name, p.iter().map(|v| Some(v * ratio)).collect())?;
        }
    }

    let created = new_loads.len();
    let table = network.require_table_mut(LOADS)?;
    for load in new_loads {
        table.insert(load);
    }
    if pattern.is_some() {
        network.set_series(LOADS, "p_set", p_set_series);
    }

    info!(
        "Distributed loads: {} removed, {} created over {} regions",
        old_ids.len(),
        created,
        weights.len()
    );

    Ok(LoadReport {
        removed: old_ids.len(),
        created,
        unmapped,
        pattern_total,
    })
}

// ============================================================================
// SCALING
// ============================================================================

/// Scale every load `p_set` series so their grand total equals `target`.
/// Returns the applied factor, or `None` when nothing could be scaled.
pub fn scale_to_target(network: &mut Network, target: f64, diagnostics: &mut Diagnostics) -> Option<f64> {
    if target <= 0.0 {
        debug!("Load target {} is not positive, skipping scaling", target);
        return None;
    }

    let current: f64 = match network.series(LOADS, "p_set") {
        Some(series) if !series.is_empty() => series.row_sums().iter().sum(),
        _ => {
            diagnostics.warn(WarningKind::EmptyInput, LOADS, Some("p_set"), "no load series to scale");
            return None;
        }
    };
    if current == 0.0 {
        diagnostics.warn(
            WarningKind::DegenerateWeights,
            LOADS,
            Some("p_set"),
            "current total load is zero, cannot scale",
        );
        return None;
    }

    let factor = target / current;
    if let Some(series) = network.series_mut(LOADS, "p_set") {
        series.map_values(|v| v * factor);
    }
    info!("Scaled loads from {:.0} to {:.0} (factor {:.4})", current, target, factor);
    Some(factor)
}

// ============================================================================
// TESTS
// ============================================================================
