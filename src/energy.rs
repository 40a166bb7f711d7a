// 🔋 Energy Limits - capacity-factor bounds per carrier as total energy bounds
// e_sum_max = capacity · max_cf · hours, e_sum_min = capacity · min_cf · hours

use crate::diagnostics::{Diagnostics, WarningKind};
use crate::error::{ReductionError, Result};
use crate::model::{Network, Value, GENERATORS};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

const CARRIER: &str = "carrier";
const ENERGY_MAX: &str = "e_sum_max";
const ENERGY_MIN: &str = "e_sum_min";

/// Carrier key that holds attribute defaults rather than a real carrier
const DEFAULT_CARRIER: &str = "default";

/// Capacity-factor bounds of one carrier; either may be absent
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CapacityFactorLimits {
    #[serde(default)]
    pub max_cf: Option<f64>,

    #[serde(default)]
    pub min_cf: Option<f64>,
}

impl CapacityFactorLimits {
    fn validate(&self, carrier: &str) -> Result<()> {
        for (name, value) in [("max_cf", self.max_cf), ("min_cf", self.min_cf)] {
            if let Some(v) = value {
                if !(0.0..=1.0).contains(&v) {
                    return Err(ReductionError::InvalidRule {
                        component: GENERATORS.to_string(),
                        attribute: name.to_string(),
                        rule: v.to_string(),
                        reason: format!("capacity factor of '{}' outside 0..1", carrier),
                    });
                }
            }
        }
        if let (Some(max), Some(min)) = (self.max_cf, self.min_cf) {
            if min > max {
                return Err(ReductionError::InvalidRule {
                    component: GENERATORS.to_string(),
                    attribute: "min_cf".to_string(),
                    rule: min.to_string(),
                    reason: format!("above max_cf {} for '{}'", max, carrier),
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnergyReport {
    pub hours: f64,
    /// carrier → generators constrained
    pub constrained: BTreeMap<String, usize>,
}

/// Set total energy bounds on generators of every configured carrier.
///
/// The horizon is the sum of snapshot weightings, so the bounds stay valid
/// after resampling. Generators of other carriers keep the unbounded
/// defaults. A missing capacity counts as zero.
pub fn apply_energy_limits(
    network: &mut Network,
    limits: &BTreeMap<String, CapacityFactorLimits>,
    capacity_attribute: &str,
    diagnostics: &mut Diagnostics,
) -> Result<EnergyReport> {
    let hours: f64 = network.weightings().iter().sum();
    let mut report = EnergyReport {
        hours,
        ..EnergyReport::default()
    };
    if limits.is_empty() {
        return Ok(report);
    }
    for (carrier, limit) in limits {
        limit.validate(carrier)?;
    }

    let Some(generators) = network.table_mut(GENERATORS) else {
        diagnostics.warn(
            WarningKind::EmptyInput,
            GENERATORS,
            None,
            "no generator table, energy limits skipped",
        );
        return Ok(report);
    };

    for (carrier, limit) in limits.iter().filter(|(c, _)| c.as_str() != DEFAULT_CARRIER) {
        if limit.max_cf.is_none() && limit.min_cf.is_none() {
            continue;
        }
        let mut count = 0;
        for generator in generators.entities_mut() {
            if generator.get(CARRIER).to_key().as_deref() != Some(carrier.as_str()) {
                continue;
            }
            let capacity = generator.get(capacity_attribute).as_f64().unwrap_or(0.0);
            if let Some(max_cf) = limit.max_cf {
                generator.set(ENERGY_MAX, Value::Number(capacity * max_cf * hours));
            }
            if let Some(min_cf) = limit.min_cf {
                generator.set(ENERGY_MIN, Value::Number(capacity * min_cf * hours));
            }
            count += 1;
        }
        if count == 0 {
            diagnostics.warn(
                WarningKind::UnmappedGroupKey,
                GENERATORS,
                Some(CARRIER),
                format!("energy limits for '{}' matched no generator", carrier),
            );
            continue;
        }
        debug!("{}: {} generator(s) energy-bounded", carrier, count);
        report.constrained.insert(carrier.clone(), count);
    }

    for column in [ENERGY_MAX, ENERGY_MIN] {
        if generators.entities().iter().any(|g| !g.get(column).is_missing()) {
            generators.add_column(column);
        }
    }

    info!(
        "Energy limits over {} h: {} carrier(s), {} generator(s)",
        hours,
        report.constrained.len(),
        report.constrained.values().sum::<usize>()
    );
    Ok(report)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ComponentTable, Entity};
    use chrono::NaiveDate;

    fn create_test_network(hours: i64) -> Network {
        let start = NaiveDate::from_ymd_opt(2023, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let snapshots = (0..hours).map(|h| start + chrono::Duration::hours(h)).collect();
        let mut network = Network::new(snapshots);
        network.insert_table(ComponentTable::from_entities(
            GENERATORS,
            vec![
                Entity::new("nuke1").with("carrier", "nuclear").with("p_nom", 1000.0),
                Entity::new("coal1").with("carrier", "coal").with("p_nom", 500.0),
                Entity::new("gas1").with("carrier", "gas").with("p_nom", 300.0),
            ],
        ));
        network
    }

    fn limits(entries: &[(&str, Option<f64>, Option<f64>)]) -> BTreeMap<String, CapacityFactorLimits> {
        entries
            .iter()
            .map(|(carrier, max_cf, min_cf)| {
                (
                    carrier.to_string(),
                    CapacityFactorLimits {
                        max_cf: *max_cf,
                        min_cf: *min_cf,
                    },
                )
            })
            .collect()
    }

    #[test]
    fn test_energy_bounds_from_capacity_factors() {
        let mut network = create_test_network(24);
        let limits = limits(&[
            ("nuclear", Some(0.9), Some(0.7)),
            ("coal", Some(0.8), None),
            ("default", Some(0.5), None),
        ]);
        let report = apply_energy_limits(&mut network, &limits, "p_nom", &mut Diagnostics::new()).unwrap();

        assert_eq!(report.hours, 24.0);
        let generators = network.table(GENERATORS).unwrap();
        assert_eq!(generators.get("nuke1", ENERGY_MAX), &Value::Number(1000.0 * 0.9 * 24.0));
        assert_eq!(generators.get("nuke1", ENERGY_MIN), &Value::Number(1000.0 * 0.7 * 24.0));
        assert_eq!(generators.get("coal1", ENERGY_MAX), &Value::Number(500.0 * 0.8 * 24.0));
        assert!(generators.get("coal1", ENERGY_MIN).is_missing());
        // The default entry is not a carrier
        assert!(generators.get("gas1", ENERGY_MAX).is_missing());
        assert!(generators.has_column(ENERGY_MAX));
    }

    #[test]
    fn test_horizon_follows_weightings() {
        let mut network = create_test_network(4);
        let snapshots = network.snapshots().to_vec();
        network.set_snapshots(snapshots, vec![3.0; 4]).unwrap();
        let limits = limits(&[("coal", Some(0.5), None)]);
        apply_energy_limits(&mut network, &limits, "p_nom", &mut Diagnostics::new()).unwrap();
        assert_eq!(
            network.table(GENERATORS).unwrap().get("coal1", ENERGY_MAX),
            &Value::Number(500.0 * 0.5 * 12.0)
        );
    }

    #[test]
    fn test_invalid_capacity_factor_rejected_untouched() {
        let mut network = create_test_network(4);
        let before = network.clone();
        let err = apply_energy_limits(
            &mut network,
            &limits(&[("coal", Some(0.4), Some(0.6))]),
            "p_nom",
            &mut Diagnostics::new(),
        )
        .unwrap_err();
        assert!(matches!(err, ReductionError::InvalidRule { .. }));
        assert_eq!(network, before);
    }

    #[test]
    fn test_unknown_carrier_warns() {
        let mut network = create_test_network(4);
        let mut diagnostics = Diagnostics::new();
        apply_energy_limits(&mut network, &limits(&[("hydro", Some(0.3), None)]), "p_nom", &mut diagnostics)
            .unwrap();
        assert_eq!(diagnostics.count(WarningKind::UnmappedGroupKey), 1);
    }
}
