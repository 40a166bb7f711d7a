// ⚙️ Run Configuration - TOML file describing which passes run and with which rules
// Relative paths are resolved against the directory of the config file

use crate::energy::CapacityFactorLimits;
use crate::grouping::MissingKeyPolicy;
use crate::model::ReferenceSpec;
use crate::rules::{RuleEntry, RuleTable};
use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Settings shared by every pass.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Group merges run before node aggregation (e.g. combined-cycle units).
    #[serde(default)]
    pub merge: Vec<MergeConfig>,

    /// Node aggregation.
    #[serde(default)]
    pub regions: RegionConfig,

    /// Parallel edge merging.
    #[serde(default)]
    pub edges: EdgeConfig,

    /// Unit aggregation after node aggregation (e.g. generators by carrier and bus).
    #[serde(default)]
    pub units: Vec<MergeConfig>,

    /// Regional load distribution and scaling.
    #[serde(default)]
    pub loads: LoadConfig,

    /// Carrier renaming.
    #[serde(default)]
    pub carriers: CarrierConfig,

    /// Monthly and per-snapshot side inputs, year shifting.
    #[serde(default)]
    pub temporal: TemporalConfig,

    /// Fixed generator set-points.
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Capacity-factor energy bounds.
    #[serde(default)]
    pub energy: EnergyConfig,

    /// Temporal resampling.
    #[serde(default)]
    pub resample: ResampleConfig,

    /// Directory relative paths are resolved against.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

// ============================================================================
// RULE SETS
// ============================================================================

/// Rule table assembled from CSV files plus inline entries (inline entries win).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleSet {
    /// Rule CSV files, loaded in order.
    #[serde(default)]
    pub files: Vec<PathBuf>,

    /// Inline rules appended after the files.
    #[serde(default)]
    pub entries: Vec<RuleEntry>,
}

impl RuleSet {
    pub fn is_configured(&self) -> bool {
        !self.files.is_empty() || !self.entries.is_empty()
    }

    /// Load every file (relative to `base_dir`) and append the inline entries.
    pub fn load(&self, base_dir: &Path) -> Result<RuleTable> {
        let mut table = RuleTable::new();
        for file in &self.files {
            let path = resolve_path(base_dir, file);
            table.extend(
                RuleTable::from_csv(&path)
                    .with_context(|| format!("Failed to load rules from {}", path.display()))?,
            );
        }
        for entry in &self.entries {
            table.push(entry.clone());
        }
        Ok(table)
    }
}

fn resolve_path(base_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

// ============================================================================
// PIPELINE
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Raise on degenerate numeric cases instead of substituting sentinels.
    #[serde(default)]
    pub strict: bool,

    /// Attribute used as the class selector during rule resolution.
    #[serde(default = "default_class_attribute")]
    pub class_attribute: String,

    /// Selector for `p_nom`-style pick rules and the unknown-rule fallback.
    #[serde(default = "default_capacity_attribute")]
    pub capacity_attribute: String,

    /// Extra reference columns beyond the built-in node and carrier references.
    #[serde(default)]
    pub references: Vec<ReferenceSpec>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            strict: false,
            class_attribute: default_class_attribute(),
            capacity_attribute: default_capacity_attribute(),
            references: Vec::new(),
        }
    }
}

fn default_class_attribute() -> String {
    "carrier".to_string()
}

fn default_capacity_attribute() -> String {
    "p_nom".to_string()
}

fn default_true() -> bool {
    true
}

// ============================================================================
// GROUP MERGES
// ============================================================================

/// One grouping pass over one component table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeConfig {
    /// Component table to aggregate.
    pub table: String,

    /// Grouping attributes; more than one forms a composite key.
    pub group_by: Vec<String>,

    /// Entities without a grouping value.
    #[serde(default)]
    pub missing: MissingKeyPolicy,

    /// New identifier pattern, e.g. `"{key}_CC"`.
    #[serde(default)]
    pub name_template: Option<String>,

    /// Co-aggregate time series (otherwise member series are dropped).
    #[serde(default = "default_true")]
    pub merge_series: bool,

    #[serde(default)]
    pub rules: RuleSet,
}

// ============================================================================
// REGIONS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Node attribute(s) holding the region.
    #[serde(default = "default_region_group_by")]
    pub group_by: Vec<String>,

    /// Collapse every node into one node with this name.
    #[serde(default)]
    pub single_node: Option<String>,

    #[serde(default)]
    pub missing: MissingKeyPolicy,

    /// CSV with `short,official` columns used to standardize region names.
    #[serde(default)]
    pub name_mapping: Option<PathBuf>,

    #[serde(default = "default_true")]
    pub merge_series: bool,

    #[serde(default)]
    pub rules: RuleSet,
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            group_by: default_region_group_by(),
            single_node: None,
            missing: MissingKeyPolicy::default(),
            name_mapping: None,
            merge_series: true,
            rules: RuleSet::default(),
        }
    }
}

fn default_region_group_by() -> Vec<String> {
    vec!["region".to_string()]
}

// ============================================================================
// EDGES
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Edge tables to merge.
    #[serde(default = "default_edge_tables")]
    pub tables: Vec<String>,

    #[serde(default = "default_from_attribute")]
    pub from_attribute: String,

    #[serde(default = "default_to_attribute")]
    pub to_attribute: String,

    /// Optional third grouping attribute (e.g. `v_nom`).
    #[serde(default)]
    pub class_attribute: Option<String>,

    #[serde(default = "default_true")]
    pub drop_self_loops: bool,

    /// Order endpoints so A→B and B→A merge together.
    #[serde(default)]
    pub canonical_direction: bool,

    /// Summed by default; zero becomes `unconstrained_capacity`.
    #[serde(default = "default_capacity_attributes")]
    pub capacity_attributes: Vec<String>,

    /// Weighted by `parallel_attribute` by default.
    #[serde(default = "default_impedance_attributes")]
    pub impedance_attributes: Vec<String>,

    #[serde(default = "default_parallel_attribute")]
    pub parallel_attribute: String,

    #[serde(default = "default_unconstrained_capacity")]
    pub unconstrained_capacity: f64,

    /// Co-aggregate edge time series instead of dropping them.
    #[serde(default)]
    pub merge_series: bool,

    #[serde(default)]
    pub rules: RuleSet,
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tables: default_edge_tables(),
            from_attribute: default_from_attribute(),
            to_attribute: default_to_attribute(),
            class_attribute: None,
            drop_self_loops: true,
            canonical_direction: false,
            capacity_attributes: default_capacity_attributes(),
            impedance_attributes: default_impedance_attributes(),
            parallel_attribute: default_parallel_attribute(),
            unconstrained_capacity: default_unconstrained_capacity(),
            merge_series: false,
            rules: RuleSet::default(),
        }
    }
}

fn default_edge_tables() -> Vec<String> {
    vec!["lines".to_string(), "links".to_string()]
}

fn default_from_attribute() -> String {
    "bus0".to_string()
}

fn default_to_attribute() -> String {
    "bus1".to_string()
}

fn default_capacity_attributes() -> Vec<String> {
    vec!["s_nom".to_string(), "p_nom".to_string()]
}

fn default_impedance_attributes() -> Vec<String> {
    ["r", "x", "b", "g"].into_iter().map(String::from).collect()
}

fn default_parallel_attribute() -> String {
    "num_parallel".to_string()
}

fn default_unconstrained_capacity() -> f64 {
    1e6 // MW
}

// ============================================================================
// LOADS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadConfig {
    /// CSV of region → demand weights; enables regional load distribution.
    #[serde(default)]
    pub demand_file: Option<PathBuf>,

    #[serde(default = "default_region_column")]
    pub region_column: String,

    #[serde(default = "default_demand_column")]
    pub demand_column: String,

    /// Multiplier for static demand when no load pattern exists.
    #[serde(default = "default_scale_factor")]
    pub scale_factor: f64,

    /// Scale all load series so their grand total equals this.
    #[serde(default)]
    pub target_total: Option<f64>,

    /// Carrier of generated loads.
    #[serde(default)]
    pub carrier: Option<String>,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            demand_file: None,
            region_column: default_region_column(),
            demand_column: default_demand_column(),
            scale_factor: default_scale_factor(),
            target_total: None,
            carrier: None,
        }
    }
}

fn default_region_column() -> String {
    "region".to_string()
}

fn default_demand_column() -> String {
    "demand".to_string()
}

fn default_scale_factor() -> f64 {
    1.0
}

// ============================================================================
// CARRIERS
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CarrierConfig {
    /// Old carrier name → new carrier name.
    #[serde(default)]
    pub mapping: BTreeMap<String, String>,
}

// ============================================================================
// TEMPORAL SIDE INPUTS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemporalConfig {
    /// Records applied to every snapshot of their month.
    #[serde(default)]
    pub monthly_file: Option<PathBuf>,

    /// Records applied to their exact snapshot.
    #[serde(default)]
    pub snapshot_file: Option<PathBuf>,

    /// Region name carried by national records.
    #[serde(default = "default_national_region")]
    pub national_region: String,

    /// Entity attribute matched against record regions.
    #[serde(default = "default_region_attribute")]
    pub region_attribute: String,

    /// Year of the loaded time axis and records.
    #[serde(default)]
    pub base_year: Option<i32>,

    /// Year to move them to; Feb 29 is dropped or copied from Feb 28.
    #[serde(default)]
    pub target_year: Option<i32>,

    /// Series duplicated after the side inputs, e.g. fuel cost → marginal cost.
    #[serde(default)]
    pub copy: Vec<SeriesCopy>,
}

impl Default for TemporalConfig {
    fn default() -> Self {
        Self {
            monthly_file: None,
            snapshot_file: None,
            national_region: default_national_region(),
            region_attribute: default_region_attribute(),
            base_year: None,
            target_year: None,
            copy: Vec::new(),
        }
    }
}

fn default_national_region() -> String {
    "national".to_string()
}

fn default_region_attribute() -> String {
    "province".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesCopy {
    pub table: String,
    pub from: String,
    pub to: String,
}

// ============================================================================
// DISPATCH & ENERGY
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Remove existing generator set-points first.
    #[serde(default)]
    pub clear: bool,

    /// Fix generators to capacity · availability.
    #[serde(default)]
    pub fixed: bool,

    /// Carriers to fix; empty means every generator with a profile.
    #[serde(default)]
    pub carriers: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnergyConfig {
    /// carrier → capacity-factor bounds.
    #[serde(default)]
    pub limits: BTreeMap<String, CapacityFactorLimits>,
}

// ============================================================================
// RESAMPLE
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResampleConfig {
    /// Number of original periods per resampled period; 1 disables resampling.
    #[serde(default = "default_factor")]
    pub factor: usize,

    #[serde(default)]
    pub rules: RuleSet,

    /// Attributes expressed per period, multiplied by the factor.
    #[serde(default = "default_rate_attributes")]
    pub rate_attributes: Vec<String>,

    /// First snapshot of the window kept before resampling.
    #[serde(default)]
    pub snapshot_start: Option<NaiveDateTime>,

    /// Number of snapshots kept before resampling.
    #[serde(default)]
    pub snapshot_count: Option<usize>,

    /// Bucket rule for series no rule names.
    #[serde(default = "default_series_rule")]
    pub default_series_rule: String,
}

impl Default for ResampleConfig {
    fn default() -> Self {
        Self {
            factor: default_factor(),
            rules: RuleSet::default(),
            rate_attributes: default_rate_attributes(),
            snapshot_start: None,
            snapshot_count: None,
            default_series_rule: default_series_rule(),
        }
    }
}

fn default_factor() -> usize {
    1
}

fn default_rate_attributes() -> Vec<String> {
    [
        "ramp_limit_up",
        "ramp_limit_down",
        "ramp_limit_start_up",
        "ramp_limit_shut_down",
        "standing_loss",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_series_rule() -> String {
    "mean".to_string()
}

// ============================================================================
// LOADING
// ============================================================================

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Ok(config)
    }

    /// Resolve a configured path against the config file's directory.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        resolve_path(&self.base_dir, path)
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Config::default()).unwrap_or_default()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(!config.pipeline.strict);
        assert_eq!(config.pipeline.class_attribute, "carrier");
        assert_eq!(config.edges.tables, vec!["lines", "links"]);
        assert_eq!(config.edges.unconstrained_capacity, 1e6);
        assert!(config.edges.drop_self_loops);
        assert!(!config.edges.merge_series);
        assert_eq!(config.resample.factor, 1);
        assert!(config.resample.rate_attributes.contains(&"standing_loss".to_string()));
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[pipeline]
strict = true

[[merge]]
table = "generators"
group_by = ["cc_group"]
name_template = "{key}_CC"

[regions]
enabled = true
group_by = ["province"]
missing = "drop"

[edges]
class_attribute = "v_nom"
canonical_direction = true

[[edges.rules.entries]]
component = "lines"
attribute = "length"
rule = "mean"

[resample]
factor = 3
snapshot_start = "2023-01-01T00:00:00"
snapshot_count = 48

[temporal]
monthly_file = "monthly.csv"
national_region = "KR"
base_year = 2023
target_year = 2024

[[temporal.copy]]
table = "generators"
from = "fuel_cost"
to = "marginal_cost"

[dispatch]
fixed = true
carriers = ["solar", "wind"]

[energy.limits.nuclear]
max_cf = 0.9
min_cf = 0.7
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert!(config.pipeline.strict);
        assert_eq!(config.merge.len(), 1);
        assert_eq!(config.merge[0].name_template.as_deref(), Some("{key}_CC"));
        assert!(config.merge[0].merge_series);
        assert_eq!(config.regions.missing, MissingKeyPolicy::Drop);
        assert_eq!(config.edges.class_attribute.as_deref(), Some("v_nom"));
        assert_eq!(config.edges.rules.entries.len(), 1);
        assert_eq!(config.resample.factor, 3);
        assert_eq!(config.resample.snapshot_count, Some(48));
        assert!(config.resample.snapshot_start.is_some());
        assert_eq!(config.temporal.national_region, "KR");
        assert_eq!(config.temporal.region_attribute, "province");
        assert_eq!(config.temporal.target_year, Some(2024));
        assert_eq!(config.temporal.copy[0].to, "marginal_cost");
        assert!(config.dispatch.fixed);
        assert_eq!(config.dispatch.carriers, vec!["solar", "wind"]);
        assert_eq!(config.energy.limits["nuclear"].min_cf, Some(0.7));
    }

    #[test]
    fn test_rule_set_loads_files_then_inline() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("rules.csv"),
            "component,attribute,class,rule,value,notes\nbuses,x,,mean,,\n",
        )
        .unwrap();

        let rules = RuleSet {
            files: vec![PathBuf::from("rules.csv")],
            entries: vec![RuleEntry::new("buses", "x", "max")],
        };
        let table = rules.load(dir.path()).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.entries()[1].rule, "max");
    }

    #[test]
    fn test_load_sets_base_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[resample]\nfactor = 2\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.resample.factor, 2);
        assert_eq!(config.resolve(Path::new("demand.csv")), dir.path().join("demand.csv"));
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(toml_str.contains("[pipeline]"));
        assert!(toml_str.contains("[resample]"));
    }
}
