// 🕸️ Network Model - component tables + time-indexed tables + shared time axis
// Single owner for one pipeline run; every mutation bumps the version

use super::series::TimeSeries;
use super::table::ComponentTable;
use crate::error::ReductionError;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// TABLE NAMES
// ============================================================================

pub const BUSES: &str = "buses";
pub const GENERATORS: &str = "generators";
pub const LINES: &str = "lines";
pub const LINKS: &str = "links";
pub const LOADS: &str = "loads";
pub const STORAGE_UNITS: &str = "storage_units";
pub const STORES: &str = "stores";
pub const CARRIERS: &str = "carriers";

// ============================================================================
// REFERENCE SCHEMA
// ============================================================================

/// A column whose values must be identifiers of `target`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceSpec {
    pub table: String,
    pub attribute: String,
    pub target: String,

    /// Only enforced when the target table exists
    #[serde(default)]
    pub optional_target: bool,
}

impl ReferenceSpec {
    pub fn new(table: &str, attribute: &str, target: &str) -> Self {
        ReferenceSpec {
            table: table.to_string(),
            attribute: attribute.to_string(),
            target: target.to_string(),
            optional_target: false,
        }
    }

    fn optional(table: &str, attribute: &str, target: &str) -> Self {
        ReferenceSpec {
            optional_target: true,
            ..ReferenceSpec::new(table, attribute, target)
        }
    }
}

/// Node references of every grid component, plus carrier references that
/// only apply when a carriers table is loaded
pub fn default_references() -> Vec<ReferenceSpec> {
    let mut specs = vec![
        ReferenceSpec::new(GENERATORS, "bus", BUSES),
        ReferenceSpec::new(LOADS, "bus", BUSES),
        ReferenceSpec::new(STORAGE_UNITS, "bus", BUSES),
        ReferenceSpec::new(STORES, "bus", BUSES),
        ReferenceSpec::new(LINES, "bus0", BUSES),
        ReferenceSpec::new(LINES, "bus1", BUSES),
        ReferenceSpec::new(LINKS, "bus0", BUSES),
        ReferenceSpec::new(LINKS, "bus1", BUSES),
    ];
    for table in [GENERATORS, STORAGE_UNITS, STORES, LOADS] {
        specs.push(ReferenceSpec::optional(table, "carrier", CARRIERS));
    }
    specs
}

// ============================================================================
// NETWORK
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Network {
    snapshots: Vec<NaiveDateTime>,
    weightings: Vec<f64>,
    tables: BTreeMap<String, ComponentTable>,
    series: BTreeMap<String, BTreeMap<String, TimeSeries>>,
    references: Vec<ReferenceSpec>,
    version: u64,
}

impl Network {
    /// Create an empty network on the given time axis (weightings 1.0)
    pub fn new(snapshots: Vec<NaiveDateTime>) -> Self {
        let weightings = vec![1.0; snapshots.len()];
        Network {
            snapshots,
            weightings,
            tables: BTreeMap::new(),
            series: BTreeMap::new(),
            references: default_references(),
            version: 0,
        }
    }

    /// Monotonic mutation counter
    pub fn version(&self) -> u64 {
        self.version
    }

    fn touch(&mut self) {
        self.version += 1;
    }

    // ------------------------------------------------------------------------
    // Time axis
    // ------------------------------------------------------------------------

    pub fn snapshots(&self) -> &[NaiveDateTime] {
        &self.snapshots
    }

    pub fn weightings(&self) -> &[f64] {
        &self.weightings
    }

    /// Replace the shared time axis. Series lengths are the caller's concern.
    pub fn set_snapshots(
        &mut self,
        snapshots: Vec<NaiveDateTime>,
        weightings: Vec<f64>,
    ) -> Result<(), ReductionError> {
        if snapshots.len() != weightings.len() {
            return Err(ReductionError::SeriesLength {
                entity: "snapshot weightings".to_string(),
                expected: snapshots.len(),
                found: weightings.len(),
            });
        }
        self.snapshots = snapshots;
        self.weightings = weightings;
        self.touch();
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Component tables
    // ------------------------------------------------------------------------

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(|k| k.as_str())
    }

    pub fn table(&self, name: &str) -> Option<&ComponentTable> {
        self.tables.get(name)
    }

    pub fn table_mut(&mut self, name: &str) -> Option<&mut ComponentTable> {
        if self.tables.contains_key(name) {
            self.touch();
        }
        self.tables.get_mut(name)
    }

    /// Table lookup that fails with a configuration error naming the table
    pub fn require_table(&self, name: &str) -> Result<&ComponentTable, ReductionError> {
        self.tables
            .get(name)
            .ok_or_else(|| ReductionError::UnknownTable(name.to_string()))
    }

    pub fn require_table_mut(&mut self, name: &str) -> Result<&mut ComponentTable, ReductionError> {
        self.touch();
        self.tables
            .get_mut(name)
            .ok_or_else(|| ReductionError::UnknownTable(name.to_string()))
    }

    pub fn insert_table(&mut self, table: ComponentTable) {
        self.touch();
        self.tables.insert(table.name().to_string(), table);
    }

    // ------------------------------------------------------------------------
    // Time-indexed tables
    // ------------------------------------------------------------------------

    /// Attribute names with a time-indexed table for `table`
    pub fn series_attributes(&self, table: &str) -> Vec<String> {
        self.series
            .get(table)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Every (table, attribute) pair that has a time-indexed table
    pub fn series_keys(&self) -> Vec<(String, String)> {
        self.series
            .iter()
            .flat_map(|(t, m)| m.keys().map(move |a| (t.clone(), a.clone())))
            .collect()
    }

    pub fn series(&self, table: &str, attribute: &str) -> Option<&TimeSeries> {
        self.series.get(table).and_then(|m| m.get(attribute))
    }

    pub fn series_mut(&mut self, table: &str, attribute: &str) -> Option<&mut TimeSeries> {
        self.touch();
        self.series.get_mut(table).and_then(|m| m.get_mut(attribute))
    }

    pub fn set_series(&mut self, table: &str, attribute: &str, series: TimeSeries) {
        self.touch();
        self.series
            .entry(table.to_string())
            .or_default()
            .insert(attribute.to_string(), series);
    }

    pub fn remove_series(&mut self, table: &str, attribute: &str) -> Option<TimeSeries> {
        self.touch();
        self.series.get_mut(table).and_then(|m| m.remove(attribute))
    }

    /// Drop the columns of `entities` from every time-indexed table of `table`
    pub fn remove_series_columns(&mut self, table: &str, entities: &[String]) {
        self.touch();
        if let Some(family) = self.series.get_mut(table) {
            for series in family.values_mut() {
                for entity in entities {
                    series.remove(entity);
                }
            }
        }
    }

    // ------------------------------------------------------------------------
    // References
    // ------------------------------------------------------------------------

    pub fn references(&self) -> &[ReferenceSpec] {
        &self.references
    }

    pub fn add_reference(&mut self, spec: ReferenceSpec) {
        if !self.references.contains(&spec) {
            self.references.push(spec);
        }
    }

    /// Reference columns on any table that point at `target`
    pub fn references_to(&self, target: &str) -> Vec<ReferenceSpec> {
        self.references
            .iter()
            .filter(|r| r.target == target)
            .cloned()
            .collect()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::table::Entity;
    use chrono::NaiveDate;

    fn hours(n: usize) -> Vec<NaiveDateTime> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        (0..n)
            .map(|i| start + chrono::Duration::hours(i as i64))
            .collect()
    }

    #[test]
    fn test_version_bumps_on_mutation() {
        let mut network = Network::new(hours(2));
        let v0 = network.version();
        network.insert_table(ComponentTable::from_entities(
            BUSES,
            vec![Entity::new("A")],
        ));
        assert!(network.version() > v0);

        let v1 = network.version();
        let _ = network.table(BUSES);
        assert_eq!(network.version(), v1);
    }

    #[test]
    fn test_require_unknown_table() {
        let network = Network::new(hours(1));
        let err = network.require_table("lines").unwrap_err();
        assert!(err.to_string().contains("lines"));
    }

    #[test]
    fn test_set_snapshots_checks_weightings() {
        let mut network = Network::new(hours(4));
        assert!(network.set_snapshots(hours(2), vec![1.0]).is_err());
        assert!(network.set_snapshots(hours(2), vec![2.0, 2.0]).is_ok());
        assert_eq!(network.weightings(), &[2.0, 2.0]);
    }

    #[test]
    fn test_references_to_buses() {
        let network = Network::new(hours(1));
        let refs = network.references_to(BUSES);
        assert!(refs.iter().any(|r| r.table == LINES && r.attribute == "bus1"));
        assert!(refs.iter().all(|r| !r.optional_target));
    }
}
