// 🔗 Pipeline Orchestrator - fixed pass order over one exclusively owned network
//
// Loaded → NodesAggregated → EdgesMerged → Resampled
//
// Side inputs are applied on the loaded network, before carriers are renamed.
// Each stage only exposes the passes that may run at that point, so edge
// merging cannot run before node identities are final and resampling always
// comes last. A failing pass consumes the model: nothing partial escapes.

use crate::aggregate::{aggregate_table, AggregationPass, AggregationReport, GroupRules};
use crate::calendar::shift_year;
use crate::carriers::standardize_carriers;
use crate::config::{Config, MergeConfig};
use crate::diagnostics::{Diagnostics, Warning, WarningKind};
use crate::dispatch::{clear_fixed_dispatch, set_fixed_dispatch};
use crate::edges::merge_edges;
use crate::energy::apply_energy_limits;
use crate::grouping::{GroupingKey, GroupingSpec, NameStandardizer};
use crate::loads::{distribute_loads, scale_to_target, DemandWeights};
use crate::model::{Network, BUSES, LOADS};
use crate::reducer::ReductionRule;
use crate::references::check_consistency;
use crate::resample::{limit_snapshots, resample};
use crate::rules::{ParseContext, RuleBook};
use crate::temporal::{apply_records, copy_series, load_records, shift_records, MatchSettings, Resolution};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use tracing::{debug, info};

// ============================================================================
// RUN SUMMARY
// ============================================================================

/// One committed pass, as reported to the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassSummary {
    pub pass: String,
    pub table: String,
    pub entities_before: usize,
    pub entities_after: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub passes: Vec<PassSummary>,
    pub snapshots_before: usize,
    pub snapshots_after: usize,
    pub resample_factor: Option<usize>,
    pub network_version: u64,
}

impl RunSummary {
    fn record(&mut self, pass: &str, table: &str, before: usize, after: usize) {
        info!("✓ {} on {}: {} → {} entities", pass, table, before, after);
        self.passes.push(PassSummary {
            pass: pass.to_string(),
            table: table.to_string(),
            entities_before: before,
            entities_after: after,
        });
    }
}

/// Reduced network plus everything the run reported
#[derive(Debug)]
pub struct PipelineOutcome {
    pub network: Network,
    pub summary: RunSummary,
    pub warnings: Vec<Warning>,
}

/// Fatal error together with the warnings collected before it
#[derive(Debug)]
pub struct PipelineFailure {
    pub error: anyhow::Error,
    pub warnings: Vec<Warning>,
}

impl fmt::Display for PipelineFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pipeline aborted: {:#}", self.error)?;
        if !self.warnings.is_empty() {
            write!(f, "\n{} warning(s) before the failure:", self.warnings.len())?;
            for warning in &self.warnings {
                write!(f, "\n  {}", warning)?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for PipelineFailure {}

// ============================================================================
// STAGES
// ============================================================================

/// Freshly loaded; node identities may still change
#[derive(Debug)]
pub struct Loaded;

/// Node identities are final
#[derive(Debug)]
pub struct NodesAggregated;

/// Parallel edges merged; units and loads may follow
#[derive(Debug)]
pub struct EdgesMerged;

/// Time axis final; ready for hand-off
#[derive(Debug)]
pub struct Resampled;

/// The network between passes, tagged with how far the run has come
pub struct Model<'c, Stage> {
    network: Network,
    config: &'c Config,
    context: ParseContext,
    diagnostics: Diagnostics,
    summary: RunSummary,
    _stage: PhantomData<Stage>,
}

impl<'c, Stage> Model<'c, Stage> {
    fn into_stage<Next>(self) -> Model<'c, Next> {
        Model {
            network: self.network,
            config: self.config,
            context: self.context,
            diagnostics: self.diagnostics,
            summary: self.summary,
            _stage: PhantomData,
        }
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    fn strict(&self) -> bool {
        self.config.pipeline.strict
    }

    fn class_attribute(&self) -> Option<&'c str> {
        let config: &'c Config = self.config;
        let class = config.pipeline.class_attribute.as_str();
        (!class.is_empty()).then_some(class)
    }

    fn fail(self, error: impl Into<anyhow::Error>) -> PipelineFailure {
        PipelineFailure {
            error: error.into(),
            warnings: self.diagnostics.into_warnings(),
        }
    }

    /// Run `step`, then the end-of-pass consistency check
    fn step<Next>(
        mut self,
        step: impl FnOnce(&mut Self) -> anyhow::Result<()>,
    ) -> Result<Model<'c, Next>, PipelineFailure> {
        if let Err(e) = step(&mut self) {
            return Err(self.fail(e));
        }
        if let Err(e) = check_consistency(&self.network) {
            return Err(self.fail(e));
        }
        Ok(self.into_stage())
    }

    fn run_merge(&mut self, pass: &str, merge: &MergeConfig) -> anyhow::Result<()> {
        let before = match self.network.table(&merge.table) {
            Some(table) => table.len(),
            None => {
                self.diagnostics.warn(
                    WarningKind::EmptyInput,
                    &merge.table,
                    None,
                    format!("table not present, {} pass skipped", pass),
                );
                return Ok(());
            }
        };

        let rules = merge.rules.load(&self.config.base_dir)?;
        let book = RuleBook::<ReductionRule>::build(&rules, &self.context, &mut self.diagnostics)?;

        let mut spec = GroupingSpec::by(GroupingKey::from_attributes(&merge.group_by))
            .with_missing(merge.missing);
        if let Some(template) = &merge.name_template {
            spec = spec.with_name_template(template.clone());
        }

        let class_attribute = self.class_attribute();
        let report = run_pass(
            &mut self.network,
            &merge.table,
            &spec,
            &book,
            class_attribute,
            merge.merge_series,
            &mut self.diagnostics,
        )?;
        debug!("{} references rewritten", report.rewritten_references);

        let after = self.network.table(&merge.table).map(|t| t.len()).unwrap_or(0);
        self.summary.record(pass, &merge.table, before, after);
        Ok(())
    }
}

/// Aggregate with or without series co-aggregation
fn run_pass(
    network: &mut Network,
    table: &str,
    spec: &GroupingSpec,
    book: &RuleBook<ReductionRule>,
    class_attribute: Option<&str>,
    merge_series: bool,
    diagnostics: &mut Diagnostics,
) -> anyhow::Result<AggregationReport> {
    if merge_series {
        return Ok(aggregate_table(network, table, spec, book, class_attribute, diagnostics)?);
    }
    let group_rules = GroupRules::new(book, spec.key.attributes());
    let report = AggregationPass::plan(network, table, spec, &group_rules, class_attribute, diagnostics)?
        .rewrite_references(diagnostics)
        .drop_series()
        .commit()?;
    Ok(report)
}

fn load_standardizer(config: &Config) -> anyhow::Result<Option<NameStandardizer>> {
    match &config.regions.name_mapping {
        Some(path) => Ok(Some(NameStandardizer::from_csv(config.resolve(path))?)),
        None => Ok(None),
    }
}

// ----------------------------------------------------------------------------
// Loaded
// ----------------------------------------------------------------------------

impl<'c> Model<'c, Loaded> {
    pub fn new(network: Network, config: &'c Config) -> Self {
        let context = ParseContext {
            capacity_attribute: config.pipeline.capacity_attribute.clone(),
            parallel_attribute: config.edges.parallel_attribute.clone(),
        };
        let summary = RunSummary {
            snapshots_before: network.snapshots().len(),
            ..RunSummary::default()
        };
        Model {
            network,
            config,
            context,
            diagnostics: Diagnostics::new(),
            summary,
            _stage: PhantomData,
        }
    }

    /// Extra references, side inputs, carrier renaming and the `[[merge]]` passes
    pub fn prepare(self) -> Result<Self, PipelineFailure> {
        self.step(|model| {
            let config = model.config;
            for spec in &config.pipeline.references {
                model.network.add_reference(spec.clone());
            }
            model.apply_temporal_inputs()?;
            standardize_carriers(&mut model.network, &config.carriers.mapping);
            check_consistency(&model.network)?;

            for merge in &config.merge {
                model.run_merge("merge", merge)?;
                check_consistency(&model.network)?;
            }
            Ok(())
        })
    }

    /// Year shift, then monthly and per-snapshot records, then series copies
    fn apply_temporal_inputs(&mut self) -> anyhow::Result<()> {
        let config = self.config;
        let temporal = &config.temporal;
        let years = match (temporal.base_year, temporal.target_year) {
            (Some(base), Some(target)) => Some((base, target)),
            _ => None,
        };
        if let Some((base, target)) = years {
            if let Some(shift) = shift_year(&mut self.network, base, target)? {
                debug!("{} Feb 29 row(s) dropped, {} added", shift.dropped, shift.added);
            }
        }

        let settings = MatchSettings {
            national_region: temporal.national_region.clone(),
            region_attribute: temporal.region_attribute.clone(),
        };
        let inputs = [
            (&temporal.monthly_file, Resolution::Monthly),
            (&temporal.snapshot_file, Resolution::Snapshot),
        ];
        for (file, resolution) in inputs {
            let Some(file) = file else {
                continue;
            };
            let mut records = load_records(config.resolve(file))?;
            if let Some((base, target)) = years {
                records = shift_records(&records, base, target)?;
            }
            apply_records(&mut self.network, &records, resolution, &settings, &mut self.diagnostics)?;
        }

        for copy in &temporal.copy {
            if !copy_series(&mut self.network, &copy.table, &copy.from, &copy.to) {
                self.diagnostics.warn(
                    WarningKind::EmptyInput,
                    &copy.table,
                    Some(&copy.from),
                    format!("no series to copy to '{}'", copy.to),
                );
            }
        }
        Ok(())
    }

    /// Regional or single-node aggregation of the node table
    pub fn aggregate_nodes(self) -> Result<Model<'c, NodesAggregated>, PipelineFailure> {
        self.step(|model| {
            let config = model.config;
            let regions = &config.regions;
            if !regions.enabled {
                debug!("Node aggregation disabled");
                return Ok(());
            }
            let Some(before) = model.network.table(BUSES).map(|t| t.len()) else {
                model
                    .diagnostics
                    .warn(WarningKind::EmptyInput, BUSES, None, "no node table, aggregation skipped");
                return Ok(());
            };

            let key = match &regions.single_node {
                Some(name) => GroupingKey::Constant(name.clone()),
                None => GroupingKey::from_attributes(&regions.group_by),
            };
            let mut spec = GroupingSpec::by(key).with_missing(regions.missing);
            if let Some(standardizer) = load_standardizer(config)? {
                spec = spec.with_standardizer(standardizer);
            }

            let rules = regions.rules.load(&config.base_dir)?;
            let book = RuleBook::<ReductionRule>::build(&rules, &model.context, &mut model.diagnostics)?;
            let class_attribute = model.class_attribute();
            let report = run_pass(
                &mut model.network,
                BUSES,
                &spec,
                &book,
                class_attribute,
                regions.merge_series,
                &mut model.diagnostics,
            )?;

            let after = model.network.table(BUSES).map(|t| t.len()).unwrap_or(0);
            debug!("{} references rewritten to new nodes", report.rewritten_references);
            model.summary.record("regions", BUSES, before, after);
            Ok(())
        })
    }
}

// ----------------------------------------------------------------------------
// NodesAggregated
// ----------------------------------------------------------------------------

impl<'c> Model<'c, NodesAggregated> {
    /// Merge parallel edges; endpoints were rewritten by the node pass
    pub fn merge_edges(self) -> Result<Model<'c, EdgesMerged>, PipelineFailure> {
        self.step(|model| {
            let config = model.config;
            let edges = &config.edges;
            if !edges.enabled {
                debug!("Edge merging disabled");
                return Ok(());
            }

            let rules = edges.rules.load(&config.base_dir)?;
            let book = RuleBook::<ReductionRule>::build(&rules, &model.context, &mut model.diagnostics)?;
            let strict = model.strict();
            for table in &edges.tables {
                let before = model.network.table(table).map(|t| t.len()).unwrap_or(0);
                let Some(report) =
                    merge_edges(&mut model.network, table, None, &book, edges, strict, &mut model.diagnostics)?
                else {
                    continue;
                };
                let after = model.network.table(table).map(|t| t.len()).unwrap_or(0);
                debug!(
                    "{}: {} self-loops dropped, {} unconstrained",
                    report.table, report.self_loops_dropped, report.unconstrained
                );
                model.summary.record("edges", table, before, after);
                check_consistency(&model.network)?;
            }
            Ok(())
        })
    }
}

// ----------------------------------------------------------------------------
// EdgesMerged
// ----------------------------------------------------------------------------

impl<'c> Model<'c, EdgesMerged> {
    /// The `[[units]]` passes (e.g. generators by carrier and node)
    pub fn aggregate_units(self) -> Result<Self, PipelineFailure> {
        self.step(|model| {
            let config = model.config;
            for units in &config.units {
                model.run_merge("units", units)?;
                check_consistency(&model.network)?;
            }
            Ok(())
        })
    }

    /// Regional load distribution, then scaling to the target total
    pub fn distribute_loads(self) -> Result<Self, PipelineFailure> {
        self.step(|model| {
            let config = model.config;
            let loads = &config.loads;
            if let Some(file) = &loads.demand_file {
                let standardizer = load_standardizer(config)?;
                let weights = DemandWeights::from_csv(
                    config.resolve(file),
                    &loads.region_column,
                    &loads.demand_column,
                    standardizer.as_ref(),
                )?;
                let before = model.network.table(LOADS).map(|t| t.len()).unwrap_or(0);
                let report = distribute_loads(
                    &mut model.network,
                    &weights,
                    loads,
                    config.pipeline.strict,
                    &mut model.diagnostics,
                )?;
                if report.unmapped > 0 {
                    debug!("{} demand region(s) matched no node", report.unmapped);
                }
                model.summary.record("loads", LOADS, before, report.created);
            }
            if let Some(target) = loads.target_total {
                scale_to_target(&mut model.network, target, &mut model.diagnostics);
            }
            Ok(())
        })
    }

    /// Clear and/or fix generator set-points
    pub fn fix_dispatch(self) -> Result<Self, PipelineFailure> {
        self.step(|model| {
            let config = model.config;
            let dispatch = &config.dispatch;
            if dispatch.clear {
                clear_fixed_dispatch(&mut model.network);
            }
            if dispatch.fixed {
                set_fixed_dispatch(
                    &mut model.network,
                    &dispatch.carriers,
                    &config.pipeline.capacity_attribute,
                    &mut model.diagnostics,
                )?;
            }
            Ok(())
        })
    }

    /// Snapshot window, energy limits over it, then temporal resampling
    pub fn resample(self) -> Result<Model<'c, Resampled>, PipelineFailure> {
        self.step(|model| {
            let config = model.config;
            let settings = &config.resample;
            if let Some(window) =
                limit_snapshots(&mut model.network, settings.snapshot_start, settings.snapshot_count)?
            {
                info!("Limited snapshots to {}..{}", window.start, window.end);
            }

            apply_energy_limits(
                &mut model.network,
                &config.energy.limits,
                &config.pipeline.capacity_attribute,
                &mut model.diagnostics,
            )?;

            let rules = if settings.rules.is_configured() {
                Some(settings.rules.load(&config.base_dir)?)
            } else {
                None
            };
            let class_attribute = model.class_attribute();
            let report = resample(
                &mut model.network,
                rules.as_ref(),
                settings,
                class_attribute,
                config.pipeline.strict,
                &mut model.diagnostics,
            )?;
            model.summary.resample_factor = report.map(|r| r.factor);
            Ok(())
        })
    }
}

// ----------------------------------------------------------------------------
// Resampled
// ----------------------------------------------------------------------------

impl Model<'_, Resampled> {
    pub fn finish(self) -> PipelineOutcome {
        let mut summary = self.summary;
        summary.snapshots_after = self.network.snapshots().len();
        summary.network_version = self.network.version();
        info!(
            "Pipeline complete: {} pass(es), {} → {} snapshots, {} warning(s)",
            summary.passes.len(),
            summary.snapshots_before,
            summary.snapshots_after,
            self.diagnostics.len()
        );
        PipelineOutcome {
            network: self.network,
            summary,
            warnings: self.diagnostics.into_warnings(),
        }
    }
}

// ============================================================================
// PIPELINE
// ============================================================================

/// Runs every configured pass in the only order that keeps references valid
pub struct Pipeline<'c> {
    config: &'c Config,
}

impl<'c> Pipeline<'c> {
    pub fn new(config: &'c Config) -> Self {
        Pipeline { config }
    }

    pub fn run(&self, network: Network) -> Result<PipelineOutcome, PipelineFailure> {
        info!("🚀 Starting reduction pipeline");
        let outcome = Model::new(network, self.config)
            .prepare()?
            .aggregate_nodes()?
            .merge_edges()?
            .aggregate_units()?
            .distribute_loads()?
            .fix_dispatch()?
            .resample()?
            .finish();
        Ok(outcome)
    }
}

// ============================================================================
// TESTS
// ============================================================================
