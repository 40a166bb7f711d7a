// Network Reduction - Core Library
// Rule-driven aggregation and resampling of grid network models before optimization

pub mod model;          // Network container: tables, series, time axis, references
pub mod error;          // Fatal error taxonomy
pub mod diagnostics;    // Structured data-quality warnings
pub mod rules;          // Rule table + resolver
pub mod reducer;        // Attribute reducer (closed rule type)
pub mod grouping;       // Entity grouping + identity mapping
pub mod references;     // Reference rewriting + consistency check
pub mod series;         // Time-series co-aggregation
pub mod aggregate;      // Phase-tagged aggregation pass
pub mod edges;          // Parallel edge merging
pub mod resample;       // Temporal resampling + snapshot window
pub mod loads;          // Regional load distribution + scaling
pub mod carriers;       // Carrier standardization
pub mod calendar;       // Year shift with leap-day handling
pub mod temporal;       // Monthly / per-snapshot side inputs
pub mod dispatch;       // Fixed generator set-points
pub mod energy;         // Capacity-factor energy bounds
pub mod optimizer;      // Optimizer hand-off boundary
pub mod config;         // TOML run configuration
pub mod io;             // CSV network directory
pub mod pipeline;       // Orchestrator

// Re-export commonly used types
pub use model::{
    ComponentTable, Entity, Network, ReferenceSpec, TimeSeries, Value,
    BUSES, CARRIERS, GENERATORS, LINES, LINKS, LOADS, STORAGE_UNITS, STORES,
};
pub use error::{ReductionError, Result};
pub use diagnostics::{Diagnostics, Warning, WarningKind};
pub use rules::{ParseContext, RuleBook, RuleEntry, RuleKind, RuleSource, RuleTable};
pub use reducer::{reduce, Extreme, ReductionRule};
pub use grouping::{
    Group, Grouping, GroupingKey, GroupingSpec, IdentityMapping, MissingKeyPolicy, NameStandardizer,
};
pub use references::{check_consistency, drop_dependents, rewrite_references};
pub use aggregate::{aggregate_table, AggregationPass, AggregationReport};
pub use edges::{merge_edges, EdgeReport};
pub use resample::{limit_snapshots, resample, ResampleReport, ResampleRule, Resampler};
pub use loads::{distribute_loads, scale_to_target, DemandWeights, LoadReport};
pub use carriers::{standardize_carriers, CarrierReport};
pub use calendar::{shift_year, YearShift};
pub use temporal::{apply_records, load_records, MatchSettings, Resolution, Scope, TemporalRecord};
pub use dispatch::{clear_fixed_dispatch, set_fixed_dispatch, DispatchReport};
pub use energy::{apply_energy_limits, CapacityFactorLimits, EnergyReport};
pub use optimizer::{solve_checked, Optimizer, Solution, SolveFailure, SolveStatus};
pub use config::Config;
pub use io::{load_network, load_network_with_references, save_network};
pub use pipeline::{Pipeline, PipelineFailure, PipelineOutcome, RunSummary};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
