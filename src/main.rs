// ⚡ network-reduction - load a CSV network, run the reduction pipeline, write it back
//
// Exit codes:
//   0 - success
//   1 - configuration, I/O or pipeline failure

use anyhow::{Context, Result};
use clap::Parser;
use network_reduction::{load_network_with_references, save_network, Config, Pipeline, VERSION};
use std::path::PathBuf;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

/// Rule-driven aggregation and resampling of grid network models
///
/// Examples:
///   network-reduction --config config/config.toml --network data/kr --output out/kr
///   network-reduction --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Run configuration (TOML)
    #[arg(short, long, value_name = "FILE", env = "NETWORK_REDUCTION_CONFIG")]
    config: Option<PathBuf>,

    /// Input network directory
    #[arg(short, long, value_name = "DIR", required_unless_present = "init_config")]
    network: Option<PathBuf>,

    /// Output network directory
    #[arg(short, long, value_name = "DIR", required_unless_present = "init_config")]
    output: Option<PathBuf>,

    /// Write the run summary and warnings as JSON
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,

    /// Raise on degenerate numeric cases instead of substituting sentinels
    #[arg(long)]
    strict: bool,

    /// Write a default configuration to stdout and exit
    #[arg(long)]
    init_config: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

impl Args {
    fn log_level(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else if self.quiet {
            "error"
        } else {
            "info"
        }
    }
}

fn init_logging(args: &Args) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(args.log_level()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

fn main() {
    let args = Args::parse();

    if args.init_config {
        print!("{}", Config::default_toml());
        return;
    }

    init_logging(&args);
    info!("network-reduction v{}", VERSION);
    debug!("Arguments: {:?}", args);

    if let Err(e) = run(args) {
        error!("Run failed: {:#}", e);
        eprintln!("\n❌ {}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if args.strict {
        config.pipeline.strict = true;
    }

    let input = args.network.context("--network is required")?;
    let output = args.output.context("--output is required")?;

    println!("📂 Loading network from {}", input.display());
    let network = load_network_with_references(&input, &config.pipeline.references)?;

    let outcome = Pipeline::new(&config).run(network)?;

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for pass in &outcome.summary.passes {
        println!(
            "✓ {:<8} {:<16} {:>6} → {}",
            pass.pass, pass.table, pass.entities_before, pass.entities_after
        );
    }
    println!(
        "✓ snapshots        {:>6} → {}",
        outcome.summary.snapshots_before, outcome.summary.snapshots_after
    );
    if !outcome.warnings.is_empty() {
        println!("\n⚠️  {} warning(s):", outcome.warnings.len());
        for warning in &outcome.warnings {
            println!("   {}", warning);
        }
    }

    save_network(&outcome.network, &output)?;
    println!("\n💾 Wrote reduced network to {}", output.display());

    if let Some(path) = &args.report {
        let report = serde_json::json!({
            "summary": outcome.summary,
            "warnings": outcome.warnings,
        });
        let content = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write report: {}", path.display()))?;
        println!("📝 Report written to {}", path.display());
    }

    Ok(())
}
