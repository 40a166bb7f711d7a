// ⏱️ Temporal Resampler - downsample the shared time axis by an aggregation factor
//
// OriginalResolution → SeriesRewritten → AxisResampled → StaticRescaled
//
// Series are reduced bucket by bucket while the old axis is still in place;
// only then is the axis replaced and per-period rates rescaled.

use crate::config::ResampleConfig;
use crate::diagnostics::{Diagnostics, WarningKind};
use crate::error::{ReductionError, Result};
use crate::model::{Network, Value};
use crate::rules::{
    split_rule_call, ParseContext, RuleBook, RuleEntry, RuleKind, RuleSource, RuleTable, GLOBAL,
};
use crate::series::series_component;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::ops::Range;
use tracing::{debug, info};

// ============================================================================
// RULES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResampleRule {
    // Bucket reductions (time series)
    Mean,
    Sum,
    Max,
    Min,

    /// Series: first value of each bucket. Static: leave unchanged.
    Skip,

    // Static attributes
    /// Multiply by the aggregation factor
    Scale,
    Fixed(Value),
    /// Reset to the documented default
    Default,
}

fn is_static_component(component: &str) -> bool {
    component != GLOBAL && !component.ends_with("_t")
}

impl ResampleRule {
    /// Mean, sum, max or min over a bucket of periods
    pub fn is_bucket_reduction(&self) -> bool {
        matches!(
            self,
            ResampleRule::Mean | ResampleRule::Sum | ResampleRule::Max | ResampleRule::Min
        )
    }

    /// Parse a rule name; `None` when unrecognised
    pub fn from_name(name: &str) -> Option<Self> {
        let (name, _) = split_rule_call(name);
        let rule = match name.as_str() {
            "mean" | "average" => ResampleRule::Mean,
            "sum" => ResampleRule::Sum,
            "max" => ResampleRule::Max,
            "min" => ResampleRule::Min,
            "skip" | "first" => ResampleRule::Skip,
            "scale" => ResampleRule::Scale,
            "default" | "reset" => ResampleRule::Default,
            _ => return None,
        };
        Some(rule)
    }
}

impl RuleKind for ResampleRule {
    fn from_entry(
        entry: &RuleEntry,
        _context: &ParseContext,
        diagnostics: &mut Diagnostics,
    ) -> Result<Self> {
        let (name, _) = split_rule_call(&entry.rule);
        if name == "fixed" {
            let value = entry.fixed_value();
            if value.is_missing() {
                return Err(entry.invalid("rule 'fixed' requires a value"));
            }
            return Ok(ResampleRule::Fixed(value));
        }

        match ResampleRule::from_name(&name) {
            Some(rule) if rule.is_bucket_reduction() && is_static_component(&entry.component) => {
                diagnostics.warn(
                    WarningKind::IneffectiveRule,
                    &entry.component,
                    Some(&entry.attribute),
                    format!(
                        "'{}' only reduces time series buckets, static value left unchanged",
                        entry.rule
                    ),
                );
                Ok(ResampleRule::Skip)
            }
            Some(rule) => Ok(rule),
            None => {
                diagnostics.warn(
                    WarningKind::UnknownRule,
                    &entry.component,
                    Some(&entry.attribute),
                    format!("unknown resample rule '{}', skipping", entry.rule),
                );
                Ok(ResampleRule::Skip)
            }
        }
    }
}

/// Documented default of a static attribute. `Some(Missing)` means "unset".
pub fn documented_default(attribute: &str) -> Option<Value> {
    let value = match attribute {
        "ramp_limit_up" | "ramp_limit_down" => Value::Missing,
        "ramp_limit_start_up" | "ramp_limit_shut_down" => Value::Number(1.0),
        "standing_loss" | "min_up_time" | "min_down_time" | "down_time_before" => Value::Number(0.0),
        "up_time_before" => Value::Number(1.0),
        "p_min_pu" | "e_min_pu" => Value::Number(0.0),
        "p_max_pu" | "e_max_pu" | "s_max_pu" => Value::Number(1.0),
        "efficiency" | "efficiency_store" | "efficiency_dispatch" => Value::Number(1.0),
        "marginal_cost" | "capital_cost" | "start_up_cost" | "shut_down_cost" => Value::Number(0.0),
        "max_hours" => Value::Number(1.0),
        "committable" | "p_nom_extendable" | "s_nom_extendable" | "e_cyclic"
        | "cyclic_state_of_charge" => Value::Bool(false),
        _ => return None,
    };
    Some(value)
}

// ============================================================================
// STATES
// ============================================================================

#[derive(Debug)]
pub struct OriginalResolution;

#[derive(Debug)]
pub struct SeriesRewritten;

#[derive(Debug)]
pub struct AxisResampled;

#[derive(Debug)]
pub struct StaticRescaled;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResampleReport {
    pub factor: usize,
    pub original_periods: usize,
    pub resampled_periods: usize,
    pub series_rewritten: usize,
    pub static_changes: usize,
}

/// Contiguous buckets of `factor` periods; the last one may be shorter
pub fn buckets(len: usize, factor: usize) -> Vec<Range<usize>> {
    let factor = factor.max(1);
    (0..len)
        .step_by(factor)
        .map(|start| start..(start + factor).min(len))
        .collect()
}

pub struct Resampler<'n, State> {
    network: &'n mut Network,
    factor: usize,
    buckets: Vec<Range<usize>>,
    report: ResampleReport,
    _state: PhantomData<State>,
}

impl<'n, State> Resampler<'n, State> {
    fn into_state<Next>(self) -> Resampler<'n, Next> {
        Resampler {
            network: self.network,
            factor: self.factor,
            buckets: self.buckets,
            report: self.report,
            _state: PhantomData,
        }
    }

    pub fn factor(&self) -> usize {
        self.factor
    }
}

// ----------------------------------------------------------------------------
// original-resolution → time-series rewritten
// ----------------------------------------------------------------------------

impl<'n> Resampler<'n, OriginalResolution> {
    pub fn new(network: &'n mut Network, factor: usize) -> Self {
        let periods = network.snapshots().len();
        Resampler {
            buckets: buckets(periods, factor),
            factor,
            report: ResampleReport {
                factor,
                original_periods: periods,
                resampled_periods: periods,
                series_rewritten: 0,
                static_changes: 0,
            },
            network,
            _state: PhantomData,
        }
    }

    /// Reduce every time-indexed table within each bucket
    pub fn rewrite_series<S: RuleSource<ResampleRule>>(
        mut self,
        rules: &S,
        class_attribute: Option<&str>,
    ) -> Result<Resampler<'n, SeriesRewritten>> {
        let periods = self.report.original_periods;
        let mut rewritten = Vec::new();

        for (table, attribute) in self.network.series_keys() {
            let Some(series) = self.network.series(&table, &attribute) else {
                continue;
            };
            if series.len() != periods {
                return Err(ReductionError::SeriesLength {
                    entity: format!("{}.{}", series_component(&table), attribute),
                    expected: periods,
                    found: series.len(),
                });
            }

            let component = series_component(&table);
            let statics = self.network.table(&table);
            let mut columns = BTreeMap::new();
            for (entity, values) in series.columns() {
                let class = class_attribute.and_then(|c| {
                    statics
                        .and_then(|t| t.entity(entity))
                        .and_then(|e| e.get(c).to_key())
                });
                let rule = rules.rule_for(&component, &attribute, class.as_deref())?;
                let reduced = self
                    .buckets
                    .iter()
                    .map(|bucket| reduce_bucket(&values[bucket.clone()], &rule, &component, &attribute))
                    .collect::<Result<Vec<_>>>()?;
                columns.insert(entity.to_string(), reduced);
            }
            rewritten.push((table, attribute, columns));
        }

        let new_len = self.buckets.len();
        for (table, attribute, columns) in rewritten {
            if let Some(series) = self.network.series_mut(&table, &attribute) {
                series.replace_all(new_len, columns);
                self.report.series_rewritten += 1;
            }
        }
        debug!("Rewrote {} series into {} buckets", self.report.series_rewritten, new_len);
        Ok(self.into_state())
    }
}

fn reduce_bucket(
    values: &[Option<f64>],
    rule: &ResampleRule,
    component: &str,
    attribute: &str,
) -> Result<Option<f64>> {
    let present: Vec<f64> = values.iter().flatten().copied().collect();
    let reduced = match rule {
        ResampleRule::Fixed(value) => match value.as_f64() {
            Some(v) => return Ok(Some(v)),
            None => {
                return Err(ReductionError::InvalidRule {
                    component: component.to_string(),
                    attribute: attribute.to_string(),
                    rule: "fixed".to_string(),
                    reason: format!("'{}' is not numeric", value),
                })
            }
        },
        ResampleRule::Scale | ResampleRule::Default => {
            return Err(ReductionError::InvalidRule {
                component: component.to_string(),
                attribute: attribute.to_string(),
                rule: format!("{:?}", rule).to_lowercase(),
                reason: "not a bucket reduction".to_string(),
            })
        }
        _ if present.is_empty() => None,
        ResampleRule::Mean => Some(present.iter().sum::<f64>() / present.len() as f64),
        ResampleRule::Sum => Some(present.iter().sum()),
        ResampleRule::Max => present.iter().copied().reduce(f64::max),
        ResampleRule::Min => present.iter().copied().reduce(f64::min),
        ResampleRule::Skip => present.first().copied(),
    };
    Ok(reduced)
}

// ----------------------------------------------------------------------------
// time-series rewritten → axis resampled
// ----------------------------------------------------------------------------

impl<'n> Resampler<'n, SeriesRewritten> {
    /// One snapshot per bucket (its first period); weightings summed
    pub fn resample_axis(mut self) -> Result<Resampler<'n, AxisResampled>> {
        let snapshots = self.network.snapshots();
        let weightings = self.network.weightings();

        let new_snapshots: Vec<NaiveDateTime> =
            self.buckets.iter().map(|b| snapshots[b.start]).collect();
        let new_weightings: Vec<f64> = self
            .buckets
            .iter()
            .map(|b| weightings[b.clone()].iter().sum())
            .collect();

        self.report.resampled_periods = new_snapshots.len();
        self.network.set_snapshots(new_snapshots, new_weightings)?;
        Ok(self.into_state())
    }
}

// ----------------------------------------------------------------------------
// axis resampled → static attributes rescaled
// ----------------------------------------------------------------------------

impl<'n> Resampler<'n, AxisResampled> {
    /// Apply static rules; unruled rate attributes are scaled by the factor
    pub fn rescale_static(
        mut self,
        rules: &RuleBook<ResampleRule>,
        rate_attributes: &[String],
        class_attribute: Option<&str>,
    ) -> Result<Resampler<'n, StaticRescaled>> {
        let factor = self.factor as f64;
        let table_names: Vec<String> = self.network.table_names().map(str::to_string).collect();

        for name in table_names {
            let Some(table) = self.network.table_mut(&name) else {
                continue;
            };
            let columns = table.columns().to_vec();

            for attribute in &columns {
                let mut changed = 0;
                for entity in table.entities_mut() {
                    let class = class_attribute.and_then(|c| entity.get(c).to_key());
                    let rule = rules.specific(&name, attribute, class.as_deref());
                    let scale = match rule {
                        Some(ResampleRule::Scale) => true,
                        None => rate_attributes.iter().any(|a| a == attribute),
                        _ => false,
                    };

                    if scale {
                        if let Some(v) = entity.get(attribute).as_f64() {
                            entity.set(attribute.clone(), Value::Number(v * factor));
                            changed += 1;
                        }
                        continue;
                    }

                    match rule {
                        Some(ResampleRule::Fixed(value)) => {
                            entity.set(attribute.clone(), value.clone());
                            changed += 1;
                        }
                        Some(ResampleRule::Default) => {
                            let value = documented_default(attribute).ok_or_else(|| {
                                ReductionError::InvalidRule {
                                    component: name.clone(),
                                    attribute: attribute.clone(),
                                    rule: "default".to_string(),
                                    reason: "attribute has no documented default".to_string(),
                                }
                            })?;
                            if value.is_missing() {
                                entity.remove(attribute);
                            } else {
                                entity.set(attribute.clone(), value);
                            }
                            changed += 1;
                        }
                        _ => {}
                    }
                }
                if changed > 0 {
                    debug!("{}.{}: {} value(s) rescaled", name, attribute, changed);
                    self.report.static_changes += changed;
                }
            }
        }
        Ok(self.into_state())
    }
}

impl Resampler<'_, StaticRescaled> {
    pub fn finish(self) -> ResampleReport {
        info!(
            "Resampled by factor {}: {} → {} periods",
            self.report.factor, self.report.original_periods, self.report.resampled_periods
        );
        self.report
    }
}

// ============================================================================
// ONE-SHOT
// ============================================================================

/// Run every resampling stage.
///
/// Factor ≤ 1 is a no-op. Without a rule table the step is skipped with a
/// warning (an error in strict mode). Returns `None` when nothing ran.
pub fn resample(
    network: &mut Network,
    rules: Option<&RuleTable>,
    config: &ResampleConfig,
    class_attribute: Option<&str>,
    strict: bool,
    diagnostics: &mut Diagnostics,
) -> Result<Option<ResampleReport>> {
    if config.factor <= 1 {
        debug!("Resample factor {} ≤ 1, nothing to do", config.factor);
        return Ok(None);
    }

    let Some(rules) = rules.filter(|r| !r.is_empty()) else {
        if strict {
            return Err(ReductionError::MissingRule {
                component: "resample".to_string(),
                attribute: "rules".to_string(),
                class: None,
            });
        }
        diagnostics.warn(
            WarningKind::ResampleSkipped,
            "network",
            None,
            format!("no resample rules configured, factor {} ignored", config.factor),
        );
        return Ok(None);
    };

    let default_rule = ResampleRule::from_name(&config.default_series_rule).ok_or_else(|| {
        ReductionError::InvalidRule {
            component: "*".to_string(),
            attribute: "others".to_string(),
            rule: config.default_series_rule.clone(),
            reason: "unknown default series rule".to_string(),
        }
    })?;

    let book = RuleBook::<ResampleRule>::build(rules, &ParseContext::default(), diagnostics)?
        .with_global_default(default_rule);

    let report = Resampler::new(network, config.factor)
        .rewrite_series(&book, class_attribute)?
        .resample_axis()?
        .rescale_static(&book, &config.rate_attributes, class_attribute)?
        .finish();
    Ok(Some(report))
}

// ============================================================================
// SNAPSHOT WINDOW
// ============================================================================

/// Keep `count` snapshots starting at the first snapshot ≥ `start`.
/// Every time-indexed table and the weightings are sliced identically.
pub fn limit_snapshots(
    network: &mut Network,
    start: Option<NaiveDateTime>,
    count: Option<usize>,
) -> Result<Option<Range<usize>>> {
    if start.is_none() && count.is_none() {
        return Ok(None);
    }

    let snapshots = network.snapshots();
    let len = snapshots.len();
    let first = match start {
        Some(start) => snapshots.partition_point(|s| *s < start),
        None => 0,
    };
    let last = match count {
        Some(count) => (first + count).min(len),
        None => len,
    };
    if first >= last {
        return Err(ReductionError::Degenerate {
            what: "snapshot window".to_string(),
            detail: format!("no snapshots selected out of {}", len),
        });
    }

    let new_snapshots = snapshots[first..last].to_vec();
    let new_weightings = network.weightings()[first..last].to_vec();

    // Validate everything before slicing anything
    let keys = network.series_keys();
    for (table, attribute) in &keys {
        let Some(series) = network.series(table, attribute) else {
            continue;
        };
        if series.len() != len {
            return Err(ReductionError::SeriesLength {
                entity: format!("{}.{}", series_component(table), attribute),
                expected: len,
                found: series.len(),
            });
        }
    }
    for (table, attribute) in &keys {
        if let Some(series) = network.series_mut(table, attribute) {
            series.slice(first, last);
        }
    }
    network.set_snapshots(new_snapshots, new_weightings)?;

    info!("Limited snapshots to {}..{} ({} of {})", first, last, last - first, len);
    Ok(Some(first..last))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ComponentTable, Entity, TimeSeries, GENERATORS, STORAGE_UNITS};
    use crate::rules::{GLOBAL, OTHERS};
    use chrono::{Duration, NaiveDate};

    fn create_test_snapshots(n: usize) -> Vec<NaiveDateTime> {
        let start = NaiveDate::from_ymd_opt(2023, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        (0..n).map(|i| start + Duration::hours(i as i64)).collect()
    }

    fn create_test_network(n: usize) -> Network {
        let mut network = Network::new(create_test_snapshots(n));
        network.insert_table(ComponentTable::from_entities(
            GENERATORS,
            vec![
                Entity::new("solar1")
                    .with("carrier", "solar")
                    .with("ramp_limit_up", 0.1)
                    .with("efficiency", 0.4),
                Entity::new("gas1")
                    .with("carrier", "gas")
                    .with("ramp_limit_up", 0.2)
                    .with("efficiency", 0.5),
            ],
        ));
        let mut p_max_pu = TimeSeries::new(n);
        p_max_pu.insert("solar1", vec![Some(0.5); n]).unwrap();
        p_max_pu
            .insert("gas1", (0..n).map(|i| Some(i as f64)).collect())
            .unwrap();
        network.set_series(GENERATORS, "p_max_pu", p_max_pu);
        network
    }

    fn create_test_rules(entries: Vec<RuleEntry>) -> RuleTable {
        RuleTable::from_entries(entries)
    }

    fn config(factor: usize) -> ResampleConfig {
        ResampleConfig {
            factor,
            ..ResampleConfig::default()
        }
    }

    #[test]
    fn test_buckets_are_contiguous() {
        assert_eq!(buckets(7, 3), vec![0..3, 3..6, 6..7]);
        assert_eq!(buckets(4, 1), vec![0..1, 1..2, 2..3, 3..4]);
    }

    #[test]
    fn test_constant_series_survives_mean() {
        let mut network = create_test_network(6);
        let rules = create_test_rules(vec![RuleEntry::new("generators_t", "p_max_pu", "mean")]);
        resample(&mut network, Some(&rules), &config(3), None, false, &mut Diagnostics::new())
            .unwrap();

        let series = network.series(GENERATORS, "p_max_pu").unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.column("solar1").unwrap(), &[Some(0.5), Some(0.5)]);
        assert_eq!(series.column("gas1").unwrap(), &[Some(1.0), Some(4.0)]);
        assert_eq!(network.snapshots().len(), 2);
        assert_eq!(network.snapshots()[1], create_test_snapshots(6)[3]);
        assert_eq!(network.weightings(), &[3.0, 3.0]);
    }

    #[test]
    fn test_sum_divided_by_factor_is_constant() {
        let mut network = create_test_network(4);
        let rules = create_test_rules(vec![RuleEntry::new("generators_t", OTHERS, "sum")]);
        resample(&mut network, Some(&rules), &config(2), None, false, &mut Diagnostics::new())
            .unwrap();
        let solar = network.series(GENERATORS, "p_max_pu").unwrap().column("solar1").unwrap();
        assert!(solar.iter().all(|v| (v.unwrap() / 2.0 - 0.5).abs() < 1e-12));
    }

    #[test]
    fn test_class_specific_series_rule() {
        let mut network = create_test_network(4);
        let rules = create_test_rules(vec![
            RuleEntry::new("generators_t", "p_max_pu", "mean"),
            RuleEntry::new("generators_t", "p_max_pu", "max").for_class("gas"),
        ]);
        resample(
            &mut network,
            Some(&rules),
            &config(2),
            Some("carrier"),
            false,
            &mut Diagnostics::new(),
        )
        .unwrap();
        let gas = network.series(GENERATORS, "p_max_pu").unwrap().column("gas1").unwrap();
        assert_eq!(gas, &[Some(1.0), Some(3.0)]);
    }

    #[test]
    fn test_rate_attribute_scaled_by_factor() {
        let mut network = create_test_network(8);
        let rules = create_test_rules(vec![RuleEntry::new(GLOBAL, OTHERS, "mean")]);
        resample(&mut network, Some(&rules), &config(4), None, false, &mut Diagnostics::new())
            .unwrap();

        let generators = network.table(GENERATORS).unwrap();
        assert_eq!(generators.get("solar1", "ramp_limit_up"), &Value::Number(0.1 * 4.0));
        assert_eq!(generators.get("gas1", "ramp_limit_up"), &Value::Number(0.2 * 4.0));
        assert_eq!(generators.get("gas1", "efficiency"), &Value::Number(0.5));
    }

    #[test]
    fn test_static_rule_overrides() {
        let mut network = create_test_network(4);
        network.insert_table(ComponentTable::from_entities(
            STORAGE_UNITS,
            vec![Entity::new("bat").with("standing_loss", 0.01).with("max_hours", 4.0)],
        ));
        let rules = create_test_rules(vec![
            RuleEntry::new("generators", "ramp_limit_up", "skip").for_class("gas"),
            RuleEntry::new("generators", "efficiency", "fixed").with_value("0.9"),
            RuleEntry::new("storage_units", "standing_loss", "default"),
            RuleEntry::new("storage_units", "missing_column", "scale"),
        ]);
        resample(&mut network, Some(&rules), &config(2), Some("carrier"), false, &mut Diagnostics::new())
            .unwrap();

        let generators = network.table(GENERATORS).unwrap();
        assert_eq!(generators.get("gas1", "ramp_limit_up"), &Value::Number(0.2));
        assert_eq!(generators.get("solar1", "ramp_limit_up"), &Value::Number(0.2));
        assert_eq!(generators.get("solar1", "efficiency"), &Value::Number(0.9));
        let storage = network.table(STORAGE_UNITS).unwrap();
        assert_eq!(storage.get("bat", "standing_loss"), &Value::Number(0.0));
        assert_eq!(storage.get("bat", "max_hours"), &Value::Number(4.0));
    }

    #[test]
    fn test_factor_one_is_noop() {
        let mut network = create_test_network(4);
        let before = network.clone();
        let rules = create_test_rules(vec![RuleEntry::new(GLOBAL, OTHERS, "mean")]);
        let report =
            resample(&mut network, Some(&rules), &config(1), None, false, &mut Diagnostics::new())
                .unwrap();
        assert!(report.is_none());
        assert_eq!(network, before);
    }

    #[test]
    fn test_missing_rules_skip_with_warning() {
        let mut network = create_test_network(4);
        let before = network.clone();
        let mut diagnostics = Diagnostics::new();
        let report = resample(&mut network, None, &config(2), None, false, &mut diagnostics).unwrap();
        assert!(report.is_none());
        assert_eq!(network, before);
        assert_eq!(diagnostics.count(WarningKind::ResampleSkipped), 1);

        let err = resample(&mut network, None, &config(2), None, true, &mut Diagnostics::new())
            .unwrap_err();
        assert!(matches!(err, ReductionError::MissingRule { .. }));
    }

    #[test]
    fn test_skip_takes_first_present_value() {
        assert_eq!(
            reduce_bucket(&[None, Some(2.0), Some(3.0)], &ResampleRule::Skip, "x_t", "a").unwrap(),
            Some(2.0)
        );
        assert_eq!(
            reduce_bucket(&[None, None], &ResampleRule::Mean, "x_t", "a").unwrap(),
            None
        );
        assert!(reduce_bucket(&[Some(1.0)], &ResampleRule::Scale, "x_t", "a").is_err());
    }

    #[test]
    fn test_unknown_rule_warns_and_skips() {
        let mut diagnostics = Diagnostics::new();
        let entry = RuleEntry::new("generators", "p_nom", "interpolate");
        let rule =
            ResampleRule::from_entry(&entry, &ParseContext::default(), &mut diagnostics).unwrap();
        assert_eq!(rule, ResampleRule::Skip);
        assert_eq!(diagnostics.count(WarningKind::UnknownRule), 1);
    }

    #[test]
    fn test_limit_snapshots_window() {
        let mut network = create_test_network(10);
        let start = create_test_snapshots(10)[2] - Duration::minutes(30);
        let window = limit_snapshots(&mut network, Some(start), Some(3)).unwrap();

        assert_eq!(window, Some(2..5));
        assert_eq!(network.snapshots().len(), 3);
        assert_eq!(network.weightings().len(), 3);
        assert_eq!(
            network.series(GENERATORS, "p_max_pu").unwrap().column("gas1").unwrap(),
            &[Some(2.0), Some(3.0), Some(4.0)]
        );
    }

    #[test]
    fn test_limit_snapshots_rejects_short_series_untouched() {
        let mut network = create_test_network(6);
        let mut short = TimeSeries::new(4);
        short.insert("solar1", vec![Some(1.0); 4]).unwrap();
        network.set_series(GENERATORS, "p_min_pu", short);
        // "p_max_pu" sorts before "p_min_pu", so it would be sliced first
        let before = network.clone();

        let err = limit_snapshots(&mut network, None, Some(3)).unwrap_err();
        assert!(matches!(err, ReductionError::SeriesLength { found: 4, .. }));
        assert_eq!(network.snapshots(), before.snapshots());
        assert_eq!(
            network.series(GENERATORS, "p_max_pu"),
            before.series(GENERATORS, "p_max_pu")
        );
    }

    #[test]
    fn test_bucket_rule_on_static_attribute_warns() {
        let mut network = create_test_network(4);
        let mut diagnostics = Diagnostics::new();
        let rules = create_test_rules(vec![
            RuleEntry::new("generators", "efficiency", "mean"),
            RuleEntry::new("generators_t", "p_max_pu", "max"),
        ]);
        resample(&mut network, Some(&rules), &config(2), None, false, &mut diagnostics).unwrap();

        assert_eq!(diagnostics.count(WarningKind::IneffectiveRule), 1);
        assert_eq!(diagnostics.warnings()[0].attribute.as_deref(), Some("efficiency"));
        let generators = network.table(GENERATORS).unwrap();
        assert_eq!(generators.get("gas1", "efficiency"), &Value::Number(0.5));
        assert_eq!(
            network.series(GENERATORS, "p_max_pu").unwrap().column("gas1").unwrap(),
            &[Some(1.0), Some(3.0)]
        );
    }

    #[test]
    fn test_limit_snapshots_empty_window() {
        let mut network = create_test_network(3);
        let late = create_test_snapshots(10)[9];
        assert!(limit_snapshots(&mut network, Some(late), None).is_err());
        assert_eq!(limit_snapshots(&mut network, None, None).unwrap(), None);
    }
}
