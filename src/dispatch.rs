// 🎯 Fixed Dispatch - pin generators to their availability profile
// p_set(t) = capacity · p_max_pu(t); the availability columns are then removed

use crate::diagnostics::{Diagnostics, WarningKind};
use crate::error::Result;
use crate::model::{Network, TimeSeries, GENERATORS};
use tracing::{debug, info};

const AVAILABILITY: &str = "p_max_pu";
const SETPOINT: &str = "p_set";
const CARRIER: &str = "carrier";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchReport {
    /// Generators now following a fixed set-point
    pub fixed: Vec<String>,
}

/// Turn the availability profile of generators into a fixed set-point.
///
/// Only generators with a `p_max_pu` column are touched; `carriers` narrows
/// them further when not empty. A missing capacity counts as zero.
pub fn set_fixed_dispatch(
    network: &mut Network,
    carriers: &[String],
    capacity_attribute: &str,
    diagnostics: &mut Diagnostics,
) -> Result<DispatchReport> {
    let mut report = DispatchReport::default();
    let Some(availability) = network.series(GENERATORS, AVAILABILITY).filter(|s| !s.is_empty()) else {
        diagnostics.warn(
            WarningKind::EmptyInput,
            GENERATORS,
            Some(AVAILABILITY),
            "no availability profiles, fixed dispatch skipped",
        );
        return Ok(report);
    };
    let Some(generators) = network.table(GENERATORS) else {
        return Ok(report);
    };

    let mut setpoints = Vec::new();
    for (id, profile) in availability.columns() {
        let Some(generator) = generators.entity(id) else {
            continue;
        };
        if !carriers.is_empty() {
            let carrier = generator.get(CARRIER).to_key();
            if !carriers.iter().any(|c| Some(c) == carrier.as_ref()) {
                continue;
            }
        }
        let capacity = generator.get(capacity_attribute).as_f64().unwrap_or(0.0);
        let values: Vec<Option<f64>> = profile.iter().map(|v| v.map(|pu| pu * capacity)).collect();
        setpoints.push((id.to_string(), values));
    }

    if setpoints.is_empty() {
        debug!("No generator matched the fixed dispatch carriers");
        return Ok(report);
    }

    let len = network.snapshots().len();
    let mut series = network
        .series(GENERATORS, SETPOINT)
        .filter(|s| s.len() == len)
        .cloned()
        .unwrap_or_else(|| TimeSeries::new(len));
    for (id, values) in &setpoints {
        series.insert(id.clone(), values.clone())?;
    }
    network.set_series(GENERATORS, SETPOINT, series);

    report.fixed = setpoints.into_iter().map(|(id, _)| id).collect();
    if let Some(availability) = network.series_mut(GENERATORS, AVAILABILITY) {
        for id in &report.fixed {
            availability.remove(id);
        }
    }

    info!("Fixed dispatch for {} generator(s)", report.fixed.len());
    Ok(report)
}

/// Remove every generator set-point. Returns whether one existed.
pub fn clear_fixed_dispatch(network: &mut Network) -> bool {
    let removed = network.remove_series(GENERATORS, SETPOINT).is_some();
    if removed {
        info!("Cleared generator set-points");
    }
    removed
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ComponentTable, Entity};
    use chrono::NaiveDate;

    fn create_test_network() -> Network {
        let start = NaiveDate::from_ymd_opt(2023, 6, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let snapshots = (0..3).map(|h| start + chrono::Duration::hours(h)).collect();
        let mut network = Network::new(snapshots);
        network.insert_table(ComponentTable::from_entities(
            GENERATORS,
            vec![
                Entity::new("solar1").with("carrier", "solar").with("p_nom", 100.0),
                Entity::new("wind1").with("carrier", "wind").with("p_nom", 50.0),
                Entity::new("coal1").with("carrier", "coal").with("p_nom", 500.0),
            ],
        ));
        let mut p_max_pu = TimeSeries::new(3);
        p_max_pu.insert("solar1", vec![Some(0.0), Some(0.5), None]).unwrap();
        p_max_pu.insert("wind1", vec![Some(0.2), Some(0.4), Some(0.6)]).unwrap();
        p_max_pu.insert("coal1", vec![Some(1.0); 3]).unwrap();
        network.set_series(GENERATORS, AVAILABILITY, p_max_pu);
        network
    }

    #[test]
    fn test_fixed_dispatch_for_selected_carriers() {
        let mut network = create_test_network();
        let carriers = vec!["solar".to_string(), "wind".to_string()];
        let report = set_fixed_dispatch(&mut network, &carriers, "p_nom", &mut Diagnostics::new()).unwrap();

        assert_eq!(report.fixed, vec!["solar1", "wind1"]);
        let p_set = network.series(GENERATORS, SETPOINT).unwrap();
        assert_eq!(p_set.column("solar1").unwrap(), &[Some(0.0), Some(50.0), None]);
        assert_eq!(p_set.column("wind1").unwrap(), &[Some(10.0), Some(20.0), Some(30.0)]);
        assert!(!p_set.contains("coal1"));

        let availability = network.series(GENERATORS, AVAILABILITY).unwrap();
        assert_eq!(availability.entities().collect::<Vec<_>>(), vec!["coal1"]);
    }

    #[test]
    fn test_without_availability_warns() {
        let mut network = create_test_network();
        network.remove_series(GENERATORS, AVAILABILITY);
        let mut diagnostics = Diagnostics::new();
        let report = set_fixed_dispatch(&mut network, &[], "p_nom", &mut diagnostics).unwrap();
        assert!(report.fixed.is_empty());
        assert_eq!(diagnostics.count(WarningKind::EmptyInput), 1);
    }

    #[test]
    fn test_clear_fixed_dispatch() {
        let mut network = create_test_network();
        set_fixed_dispatch(&mut network, &[], "p_nom", &mut Diagnostics::new()).unwrap();
        assert_eq!(network.series(GENERATORS, SETPOINT).unwrap().width(), 3);
        assert!(clear_fixed_dispatch(&mut network));
        assert!(network.series(GENERATORS, SETPOINT).is_none());
        assert!(!clear_fixed_dispatch(&mut network));
    }
}
