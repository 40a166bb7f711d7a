// 📂 CSV Network Directory - load and write a network at the pipeline boundary
//
// snapshots.csv          snapshot[,weighting]
// <table>.csv            name,<attribute>...
// <table>-<attr>.csv     snapshot,<entity>...
//
// Reference columns are identifiers and always load as text, so "01" stays "01".

use crate::model::{ComponentTable, Entity, Network, ReferenceSpec, TimeSeries, Value};
use anyhow::{bail, Context, Result};
use chrono::NaiveDateTime;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

pub const SNAPSHOTS_FILE: &str = "snapshots.csv";

const SNAPSHOT_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

const WRITE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn parse_snapshot(raw: &str) -> Result<NaiveDateTime> {
    let raw = raw.trim();
    SNAPSHOT_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(raw, f).ok())
        .with_context(|| format!("Unrecognised snapshot timestamp '{}'", raw))
}

fn parse_number(raw: &str) -> Result<Option<f64>> {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("nan") {
        return Ok(None);
    }
    let value = raw
        .parse::<f64>()
        .with_context(|| format!("Invalid number '{}'", raw))?;
    Ok(Some(value))
}

// ============================================================================
// LOAD
// ============================================================================

/// Load every CSV of `dir` into a network
pub fn load_network(dir: &Path) -> Result<Network> {
    load_network_with_references(dir, &[])
}

/// Load `dir`, registering `extra` reference columns before any table is read
pub fn load_network_with_references(dir: &Path, extra: &[ReferenceSpec]) -> Result<Network> {
    let mut network = Network::new(Vec::new());
    for spec in extra {
        network.add_reference(spec.clone());
    }

    let snapshots_path = dir.join(SNAPSHOTS_FILE);
    if snapshots_path.exists() {
        let (snapshots, weightings) = load_snapshots(&snapshots_path)?;
        network.set_snapshots(snapshots, weightings)?;
    }

    let mut files: Vec<_> = fs::read_dir(dir)
        .with_context(|| format!("Failed to read network directory: {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().map(|e| e == "csv").unwrap_or(false))
        .collect();
    files.sort();

    // Static tables first so series can be checked against them later
    let mut series_files = Vec::new();
    for path in files {
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
            continue;
        };
        if path.file_name().and_then(|n| n.to_str()) == Some(SNAPSHOTS_FILE) {
            continue;
        }
        match stem.split_once('-') {
            Some((table, attribute)) => {
                series_files.push((table.to_string(), attribute.to_string(), path))
            }
            None => {
                let text_columns: Vec<&str> = network
                    .references()
                    .iter()
                    .filter(|r| r.table == stem)
                    .map(|r| r.attribute.as_str())
                    .collect();
                let table = load_table(&path, &stem, &text_columns)?;
                debug!("Loaded {} ({} entities)", stem, table.len());
                network.insert_table(table);
            }
        }
    }

    for (table, attribute, path) in series_files {
        let series = load_series(&path, network.snapshots())?;
        debug!("Loaded {}-{} ({} columns)", table, attribute, series.width());
        network.set_series(&table, &attribute, series);
    }

    info!(
        "Loaded network from {} ({} tables, {} snapshots)",
        dir.display(),
        network.table_names().count(),
        network.snapshots().len()
    );
    Ok(network)
}

fn load_snapshots(path: &Path) -> Result<(Vec<NaiveDateTime>, Vec<f64>)> {
    let mut reader = csv::Reader::from_path(path).context("Failed to open snapshots file")?;
    let has_weighting = reader
        .headers()
        .context("Failed to read snapshots header")?
        .iter()
        .any(|h| h.trim() == "weighting");

    let mut snapshots = Vec::new();
    let mut weightings = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Failed to read snapshot row {}", line + 2))?;
        snapshots.push(parse_snapshot(record.get(0).unwrap_or_default())?);
        let weighting = if has_weighting {
            parse_number(record.get(1).unwrap_or_default())?.unwrap_or(1.0)
        } else {
            1.0
        };
        weightings.push(weighting);
    }
    Ok((snapshots, weightings))
}

/// `<table>.csv`: first column `name`, one column per attribute.
/// `text_columns` are kept verbatim instead of being parsed.
pub fn load_table(path: &Path, name: &str, text_columns: &[&str]) -> Result<ComponentTable> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open component table: {}", path.display()))?;
    let headers = reader
        .headers()
        .with_context(|| format!("Failed to read header of {}", path.display()))?
        .clone();

    if headers.get(0).map(str::trim) != Some("name") {
        bail!("{}: first column must be 'name'", path.display());
    }

    let mut table = ComponentTable::new(name);
    for column in headers.iter().skip(1) {
        table.add_column(column.trim());
    }

    for (line, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Failed to read {} row {}", name, line + 2))?;
        let id = record.get(0).unwrap_or_default().trim();
        if id.is_empty() {
            bail!("{} row {}: empty name", path.display(), line + 2);
        }
        if table.contains(id) {
            bail!("{}: duplicate name '{}'", path.display(), id);
        }

        let mut entity = Entity::new(id);
        for (column, raw) in headers.iter().zip(record.iter()).skip(1) {
            let value = if text_columns.contains(&column.trim()) && !raw.trim().is_empty() {
                Value::text(raw.trim())
            } else {
                Value::parse(raw)
            };
            if !value.is_missing() {
                entity.set(column.trim(), value);
            }
        }
        table.insert(entity);
    }
    Ok(table)
}

/// `<table>-<attr>.csv`: first column `snapshot`, rows aligned with `snapshots`
pub fn load_series(path: &Path, snapshots: &[NaiveDateTime]) -> Result<TimeSeries> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open time series: {}", path.display()))?;
    let headers = reader
        .headers()
        .with_context(|| format!("Failed to read header of {}", path.display()))?
        .clone();
    let entities: Vec<String> = headers.iter().skip(1).map(|h| h.trim().to_string()).collect();

    let mut columns: Vec<Vec<Option<f64>>> = vec![Vec::with_capacity(snapshots.len()); entities.len()];
    let mut rows = 0;
    for (line, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Failed to read {} row {}", path.display(), line + 2))?;
        let snapshot = parse_snapshot(record.get(0).unwrap_or_default())?;
        if snapshots.get(line) != Some(&snapshot) {
            bail!(
                "{} row {}: snapshot {} does not match the network time axis",
                path.display(),
                line + 2,
                snapshot
            );
        }
        for (i, column) in columns.iter_mut().enumerate() {
            let value = parse_number(record.get(i + 1).unwrap_or_default())
                .with_context(|| format!("{} row {}", path.display(), line + 2))?;
            column.push(value);
        }
        rows += 1;
    }
    if rows != snapshots.len() {
        bail!(
            "{}: {} rows for {} snapshots",
            path.display(),
            rows,
            snapshots.len()
        );
    }

    let mut series = TimeSeries::new(snapshots.len());
    for (entity, values) in entities.into_iter().zip(columns) {
        series.insert(entity, values)?;
    }
    Ok(series)
}

// ============================================================================
// WRITE
// ============================================================================

/// Write `network` to `dir` in the same layout `load_network` reads
pub fn save_network(network: &Network, dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory: {}", dir.display()))?;

    let mut writer = csv::Writer::from_path(dir.join(SNAPSHOTS_FILE))
        .context("Failed to create snapshots file")?;
    writer.write_record(["snapshot", "weighting"])?;
    for (snapshot, weighting) in network.snapshots().iter().zip(network.weightings()) {
        writer.write_record([snapshot.format(WRITE_FORMAT).to_string(), weighting.to_string()])?;
    }
    writer.flush()?;

    for name in network.table_names() {
        let Some(table) = network.table(name) else {
            continue;
        };
        let path = dir.join(format!("{}.csv", name));
        let mut writer = csv::Writer::from_path(&path)
            .with_context(|| format!("Failed to create {}", path.display()))?;

        let mut header = vec!["name".to_string()];
        header.extend(table.columns().iter().cloned());
        writer.write_record(&header)?;
        for entity in table.entities() {
            let mut row = vec![entity.id.clone()];
            row.extend(table.columns().iter().map(|c| entity.get(c).to_string()));
            writer.write_record(&row)?;
        }
        writer.flush()?;
    }

    for (table, attribute) in network.series_keys() {
        let Some(series) = network.series(&table, &attribute) else {
            continue;
        };
        let path = dir.join(format!("{}-{}.csv", table, attribute));
        let mut writer = csv::Writer::from_path(&path)
            .with_context(|| format!("Failed to create {}", path.display()))?;

        let mut header = vec!["snapshot".to_string()];
        header.extend(series.entities().map(str::to_string));
        writer.write_record(&header)?;
        for (t, snapshot) in network.snapshots().iter().enumerate() {
            let mut row = vec![snapshot.format(WRITE_FORMAT).to_string()];
            row.extend(
                series
                    .columns()
                    .map(|(_, values)| values[t].map(|v| v.to_string()).unwrap_or_default()),
            );
            writer.write_record(&row)?;
        }
        writer.flush()?;
    }

    info!("Wrote network to {}", dir.display());
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
