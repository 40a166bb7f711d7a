// 🗓️ Temporal Side Inputs - monthly and per-snapshot values written as time series
//
// One record = (timestamp or month, carrier, scope, table, attribute, value).
// Entities match by carrier first, then by the most specific scope available:
// the entity itself, its region, the national total.

use crate::calendar::year_shift_plan;
use crate::diagnostics::{Diagnostics, WarningKind};
use crate::error::Result;
use crate::io::parse_snapshot;
use crate::model::{Entity, Network, TimeSeries};
use anyhow::Context as AnyhowContext;
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{debug, info};

const CARRIER: &str = "carrier";

// ============================================================================
// RECORDS
// ============================================================================

/// How a record's value spreads over the time axis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Every snapshot of the month; months without a record repeat the last value
    Monthly,

    /// Exactly the matching snapshot
    Snapshot,
}

/// Which entities of a carrier a record is meant for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// Record region is the national region
    National,

    /// Record region equals the entity's region attribute
    #[serde(alias = "province")]
    Region,

    /// Record names the entity; falls back to region matching
    #[serde(alias = "generator")]
    Unit,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TemporalRecord {
    pub snapshot: NaiveDateTime,
    pub carrier: String,
    pub table: String,
    pub attribute: String,
    pub value: f64,
    pub scope: Scope,
    pub region: Option<String>,
    pub unit: Option<String>,
}

impl TemporalRecord {
    pub fn new(snapshot: NaiveDateTime, carrier: &str, table: &str, attribute: &str, value: f64) -> Self {
        TemporalRecord {
            snapshot,
            carrier: carrier.to_string(),
            table: table.to_string(),
            attribute: attribute.to_string(),
            value,
            scope: Scope::National,
            region: None,
            unit: None,
        }
    }

    pub fn national(mut self, region: &str) -> Self {
        self.scope = Scope::National;
        self.region = Some(region.to_string());
        self
    }

    pub fn for_region(mut self, region: &str) -> Self {
        self.scope = Scope::Region;
        self.region = Some(region.to_string());
        self
    }

    pub fn for_unit(mut self, unit: &str) -> Self {
        self.scope = Scope::Unit;
        self.unit = Some(unit.to_string());
        self
    }
}

#[derive(Debug, Deserialize)]
struct RecordRow {
    snapshot: String,
    carrier: String,
    #[serde(alias = "components")]
    table: String,
    attribute: String,
    value: f64,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    region: Option<String>,
    #[serde(alias = "aggregation")]
    scope: Scope,
    #[serde(default, alias = "name")]
    unit: Option<String>,
}

/// Timestamps, plain dates or `YYYY-MM` months
fn parse_record_time(raw: &str) -> anyhow::Result<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(snapshot) = parse_snapshot(raw) {
        return Ok(snapshot);
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(&format!("{}-01", raw), "%Y-%m-%d"))
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .with_context(|| format!("Unrecognised record time '{}'", raw))
}

fn is_active(status: Option<&str>) -> bool {
    match status.map(|s| s.trim().to_ascii_lowercase()) {
        None => true,
        Some(s) => matches!(s.as_str(), "" | "true" | "1" | "yes"),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Load a record CSV; rows whose `status` is not true are skipped
pub fn load_records<P: AsRef<Path>>(path: P) -> anyhow::Result<Vec<TemporalRecord>> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Failed to open temporal data: {:?}", path))?;

    let mut records = Vec::new();
    let mut inactive = 0;
    for (line, row) in reader.deserialize().enumerate() {
        let row: RecordRow = row.with_context(|| format!("Failed to parse {:?} row {}", path, line + 2))?;
        if !is_active(row.status.as_deref()) {
            inactive += 1;
            continue;
        }
        records.push(TemporalRecord {
            snapshot: parse_record_time(&row.snapshot)
                .with_context(|| format!("{:?} row {}", path, line + 2))?,
            carrier: row.carrier,
            table: row.table,
            attribute: row.attribute,
            value: row.value,
            scope: row.scope,
            region: non_empty(row.region),
            unit: non_empty(row.unit),
        });
    }
    debug!("Loaded {} record(s) from {:?}, {} inactive", records.len(), path, inactive);
    Ok(records)
}

/// Move record timestamps from `base_year` to `target_year` like the time axis
pub fn shift_records(
    records: &[TemporalRecord],
    base_year: i32,
    target_year: i32,
) -> Result<Vec<TemporalRecord>> {
    if base_year == target_year {
        return Ok(records.to_vec());
    }
    let dates: Vec<NaiveDateTime> = records.iter().map(|r| r.snapshot).collect();
    let plan = year_shift_plan(&dates, base_year, target_year)?;
    Ok(plan
        .into_iter()
        .map(|(row, date)| TemporalRecord {
            snapshot: date,
            ..records[row].clone()
        })
        .collect())
}

// ============================================================================
// MATCHING
// ============================================================================

/// How entities are located for region and national records
#[derive(Debug, Clone, PartialEq)]
pub struct MatchSettings {
    /// Region name national records carry
    pub national_region: String,

    /// Entity attribute holding its region
    pub region_attribute: String,
}

/// Records for `entity`: its own, else its region's, else the national ones
fn records_for<'r>(
    entity: &Entity,
    candidates: &[&'r TemporalRecord],
    settings: &MatchSettings,
) -> Vec<&'r TemporalRecord> {
    let own: Vec<&TemporalRecord> = candidates
        .iter()
        .copied()
        .filter(|r| r.scope == Scope::Unit && r.unit.as_deref() == Some(entity.id.as_str()))
        .collect();
    if !own.is_empty() {
        return own;
    }

    if let Some(region) = entity.get(&settings.region_attribute).to_key() {
        let regional: Vec<&TemporalRecord> = candidates
            .iter()
            .copied()
            .filter(|r| r.scope != Scope::National && r.region.as_deref() == Some(region.as_str()))
            .collect();
        if !regional.is_empty() {
            return regional;
        }
    }

    candidates
        .iter()
        .copied()
        .filter(|r| {
            r.scope == Scope::National && r.region.as_deref() == Some(settings.national_region.as_str())
        })
        .collect()
}

/// Spread matched records over the time axis
fn build_column(
    records: &[&TemporalRecord],
    snapshots: &[NaiveDateTime],
    resolution: Resolution,
) -> Vec<Option<f64>> {
    match resolution {
        Resolution::Snapshot => {
            // Later records for the same snapshot win
            let by_time: HashMap<NaiveDateTime, f64> =
                records.iter().map(|r| (r.snapshot, r.value)).collect();
            snapshots.iter().map(|s| by_time.get(s).copied()).collect()
        }
        Resolution::Monthly => {
            let by_month: HashMap<(i32, u32), f64> = records
                .iter()
                .map(|r| ((r.snapshot.year(), r.snapshot.month()), r.value))
                .collect();
            let mut last = None;
            snapshots
                .iter()
                .map(|s| {
                    if let Some(value) = by_month.get(&(s.year(), s.month())) {
                        last = Some(*value);
                    }
                    last
                })
                .collect()
        }
    }
}

// ============================================================================
// APPLY
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemporalReport {
    /// (table, attribute) → entity columns written
    pub columns: BTreeMap<(String, String), usize>,
    pub unmatched_records: usize,
}

impl TemporalReport {
    pub fn total_columns(&self) -> usize {
        self.columns.values().sum()
    }
}

/// Write the records as time series on the network axis.
///
/// Matched entity columns replace existing ones; other columns of the same
/// attribute are kept. Tables that do not exist and records no entity picked
/// up are reported as warnings.
pub fn apply_records(
    network: &mut Network,
    records: &[TemporalRecord],
    resolution: Resolution,
    settings: &MatchSettings,
    diagnostics: &mut Diagnostics,
) -> Result<TemporalReport> {
    let mut report = TemporalReport::default();
    if records.is_empty() {
        return Ok(report);
    }

    let mut by_target: BTreeMap<(String, String), Vec<&TemporalRecord>> = BTreeMap::new();
    for record in records {
        by_target
            .entry((record.table.clone(), record.attribute.clone()))
            .or_default()
            .push(record);
    }

    let snapshots = network.snapshots().to_vec();
    for ((table_name, attribute), group) in by_target {
        let Some(table) = network.table(&table_name) else {
            diagnostics.warn(
                WarningKind::UnmappedGroupKey,
                &table_name,
                Some(&attribute),
                format!("{} record(s) for a table not in the network", group.len()),
            );
            report.unmatched_records += group.len();
            continue;
        };

        let mut columns = Vec::new();
        let mut used = vec![false; group.len()];
        for entity in table.entities() {
            let Some(carrier) = entity.get(CARRIER).to_key() else {
                continue;
            };
            let candidates: Vec<&TemporalRecord> =
                group.iter().copied().filter(|r| r.carrier == carrier).collect();
            if candidates.is_empty() {
                continue;
            }
            let matched = records_for(entity, &candidates, settings);
            if matched.is_empty() {
                continue;
            }
            for (flag, record) in used.iter_mut().zip(&group) {
                if matched.iter().any(|m| std::ptr::eq(*m, *record)) {
                    *flag = true;
                }
            }
            columns.push((entity.id.clone(), build_column(&matched, &snapshots, resolution)));
        }

        let unused = used.iter().filter(|u| !**u).count();
        if unused > 0 {
            diagnostics.warn(
                WarningKind::UnmappedGroupKey,
                &table_name,
                Some(&attribute),
                format!("{} record(s) matched no entity", unused),
            );
            report.unmatched_records += unused;
        }
        if columns.is_empty() {
            continue;
        }

        let mut series = network
            .series(&table_name, &attribute)
            .filter(|s| s.len() == snapshots.len())
            .cloned()
            .unwrap_or_else(|| TimeSeries::new(snapshots.len()));
        let written = columns.len();
        for (entity, values) in columns {
            series.insert(entity, values)?;
        }
        network.set_series(&table_name, &attribute, series);
        debug!("{}.{}: {} column(s) from side input", table_name, attribute, written);
        report.columns.insert((table_name, attribute), written);
    }

    info!(
        "Applied {:?} data: {} column(s) over {} attribute(s)",
        resolution,
        report.total_columns(),
        report.columns.len()
    );
    Ok(report)
}

/// Copy a whole time-indexed table to another attribute of the same table
pub fn copy_series(network: &mut Network, table: &str, from: &str, to: &str) -> bool {
    match network.series(table, from).cloned() {
        Some(series) => {
            network.set_series(table, to, series);
            debug!("Copied {}.{} → {}.{}", table, from, table, to);
            true
        }
        None => false,
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ComponentTable, GENERATORS};
    use chrono::Duration;

    fn at(year: i32, month: u32, day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(year, month, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn create_test_settings() -> MatchSettings {
        MatchSettings {
            national_region: "KR".to_string(),
            region_attribute: "province".to_string(),
        }
    }

    /// Daily snapshots Jan 30 .. Mar 2
    fn create_test_network() -> Network {
        let start = at(2023, 1, 30, 0);
        let snapshots: Vec<NaiveDateTime> = (0..32).map(|d| start + Duration::days(d)).collect();
        let mut network = Network::new(snapshots);
        network.insert_table(ComponentTable::from_entities(
            GENERATORS,
            vec![
                Entity::new("coal_a").with("carrier", "coal").with("province", "Seoul"),
                Entity::new("coal_b").with("carrier", "coal").with("province", "Busan"),
                Entity::new("gas_a").with("carrier", "gas").with("province", "Seoul"),
                Entity::new("wind_a").with("carrier", "wind"),
            ],
        ));
        network
    }

    #[test]
    fn test_monthly_values_fill_their_month() {
        let mut network = create_test_network();
        let records = vec![
            TemporalRecord::new(at(2023, 1, 1, 0), "coal", GENERATORS, "fuel_cost", 50.0).national("KR"),
            TemporalRecord::new(at(2023, 2, 1, 0), "coal", GENERATORS, "fuel_cost", 60.0).national("KR"),
        ];
        let report = apply_records(
            &mut network,
            &records,
            Resolution::Monthly,
            &create_test_settings(),
            &mut Diagnostics::new(),
        )
        .unwrap();

        assert_eq!(report.total_columns(), 2);
        let series = network.series(GENERATORS, "fuel_cost").unwrap();
        let column = series.column("coal_a").unwrap();
        assert_eq!(column[0], Some(50.0));
        assert_eq!(column[2], Some(60.0));
        // March has no record: February carries forward
        assert_eq!(column[31], Some(60.0));
        assert!(!series.contains("gas_a"));
    }

    #[test]
    fn test_most_specific_records_win() {
        let mut network = create_test_network();
        let month = at(2023, 1, 1, 0);
        let records = vec![
            TemporalRecord::new(month, "coal", GENERATORS, "fuel_cost", 50.0).national("KR"),
            TemporalRecord::new(month, "coal", GENERATORS, "fuel_cost", 55.0).for_region("Busan"),
            TemporalRecord::new(month, "coal", GENERATORS, "fuel_cost", 70.0).for_unit("coal_a"),
        ];
        apply_records(
            &mut network,
            &records,
            Resolution::Monthly,
            &create_test_settings(),
            &mut Diagnostics::new(),
        )
        .unwrap();

        let series = network.series(GENERATORS, "fuel_cost").unwrap();
        assert_eq!(series.column("coal_a").unwrap()[0], Some(70.0));
        assert_eq!(series.column("coal_b").unwrap()[0], Some(55.0));
    }

    #[test]
    fn test_snapshot_values_match_exactly() {
        let mut network = create_test_network();
        let mut existing = TimeSeries::new(32);
        existing.insert("gas_a", vec![Some(1.0); 32]).unwrap();
        network.set_series(GENERATORS, "p_max_pu", existing);

        let records = vec![
            TemporalRecord::new(at(2023, 1, 31, 0), "wind", GENERATORS, "p_max_pu", 0.3).national("KR"),
            TemporalRecord::new(at(2023, 1, 31, 12), "wind", GENERATORS, "p_max_pu", 0.9).national("KR"),
        ];
        apply_records(
            &mut network,
            &records,
            Resolution::Snapshot,
            &create_test_settings(),
            &mut Diagnostics::new(),
        )
        .unwrap();

        let series = network.series(GENERATORS, "p_max_pu").unwrap();
        let wind = series.column("wind_a").unwrap();
        assert_eq!(wind[1], Some(0.3));
        assert_eq!(wind[0], None);
        assert_eq!(wind[2], None);
        // Columns the records do not cover are kept
        assert_eq!(series.column("gas_a").unwrap()[0], Some(1.0));
    }

    #[test]
    fn test_unmatched_records_warn() {
        let mut network = create_test_network();
        let month = at(2023, 1, 1, 0);
        let records = vec![
            TemporalRecord::new(month, "nuclear", GENERATORS, "fuel_cost", 5.0).national("KR"),
            TemporalRecord::new(month, "coal", "storage_units", "inflow", 1.0).national("KR"),
        ];
        let mut diagnostics = Diagnostics::new();
        let report = apply_records(
            &mut network,
            &records,
            Resolution::Monthly,
            &create_test_settings(),
            &mut diagnostics,
        )
        .unwrap();

        assert_eq!(report.unmatched_records, 2);
        assert_eq!(diagnostics.count(WarningKind::UnmappedGroupKey), 2);
        assert!(network.series(GENERATORS, "fuel_cost").is_none());
    }

    #[test]
    fn test_load_records_skips_inactive_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monthly.csv");
        std::fs::write(
            &path,
            "snapshot,carrier,components,components_t,attribute,value,status,region,aggregation,name\n\
             2023-01,coal,generators,generators_t,fuel_cost,50,TRUE,KR,national,\n\
             2023-02-01,coal,generators,generators_t,fuel_cost,60,FALSE,KR,national,\n\
             2023-03-01 00:00:00,coal,generators,generators_t,fuel_cost,65,true,Seoul,province,\n\
             2023-03-01,gas,generators,generators_t,fuel_cost,80,TRUE,,generator,gas_a\n",
        )
        .unwrap();

        let records = load_records(&path).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].snapshot, at(2023, 1, 1, 0));
        assert_eq!(records[1].scope, Scope::Region);
        assert_eq!(records[2].scope, Scope::Unit);
        assert_eq!(records[2].unit.as_deref(), Some("gas_a"));
        assert_eq!(records[2].region, None);
    }

    #[test]
    fn test_shift_records_into_leap_year() {
        let records = vec![
            TemporalRecord::new(at(2023, 2, 28, 5), "wind", GENERATORS, "p_max_pu", 0.4),
            TemporalRecord::new(at(2023, 3, 1, 5), "wind", GENERATORS, "p_max_pu", 0.6),
        ];
        let shifted = shift_records(&records, 2023, 2024).unwrap();
        let times: Vec<NaiveDateTime> = shifted.iter().map(|r| r.snapshot).collect();
        assert_eq!(times, vec![at(2024, 2, 28, 5), at(2024, 2, 29, 5), at(2024, 3, 1, 5)]);
        assert_eq!(shifted[1].value, 0.4);
    }

    #[test]
    fn test_copy_series() {
        let mut network = create_test_network();
        let mut fuel = TimeSeries::new(32);
        fuel.insert("coal_a", vec![Some(3.0); 32]).unwrap();
        network.set_series(GENERATORS, "fuel_cost", fuel);

        assert!(copy_series(&mut network, GENERATORS, "fuel_cost", "marginal_cost"));
        assert_eq!(
            network.series(GENERATORS, "marginal_cost"),
            network.series(GENERATORS, "fuel_cost")
        );
        assert!(!copy_series(&mut network, GENERATORS, "missing", "marginal_cost"));
    }
}
