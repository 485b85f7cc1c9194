//! Orbiter Bridge CLI Application
//!
//! Runs scripted simulation sessions against the in-process host of the
//! orbiter-bridge library:
//! - Scenario files (TOML) with objects and scripted events
//! - Dynamic loading of module libraries built with `declare_module!`
//! - Built-in tracing module
//! - Session reports (TXT/JSON)

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

mod config;
mod loader;
mod report;
mod scenario;
mod trace;

use config::OutputFormat;

/// Orbiter Bridge - Drive simulator modules through a scripted session
#[derive(Parser, Debug)]
#[command(name = "orbiter-bridge")]
#[command(about = "Run simulator modules through a scripted session", long_about = None)]
#[command(version)]
struct Args {
    /// Path to scenario file (scenario.toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Module library to load (overrides [module].library)
    #[arg(short, long, value_name = "FILE")]
    module: Option<PathBuf>,

    /// Number of steps to simulate (overrides [run].steps)
    #[arg(long, value_name = "COUNT")]
    steps: Option<u32>,

    /// Output file for the session report (default: stdout)
    #[arg(short, long, value_name = "FILE")]
    report: Option<PathBuf>,

    /// Report format (default: from the report file extension, else txt)
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,

    /// Do not register the built-in tracing module
    #[arg(long)]
    no_trace: bool,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet);

    log::info!("Orbiter Bridge CLI v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using bridge library v{}", orbiter_bridge::VERSION);
    log::debug!("ABI tag: {}", orbiter_bridge::abi_tag());

    let mut scenario = match &args.config {
        Some(path) => {
            log::info!("Loading scenario from: {:?}", path);
            config::load_config(path)?
        }
        None => {
            log::info!("No scenario given, running an empty session");
            config::ScenarioConfig::default()
        }
    };
    apply_overrides(&mut scenario, &args);
    scenario.validate()?;

    let format = args
        .format
        .or_else(|| args.report.as_deref().and_then(OutputFormat::from_path))
        .unwrap_or(scenario.output.format);
    let report_path = args.report.clone().or_else(|| scenario.output.path.clone());

    let mut runner = scenario::ScenarioRunner::new(scenario)?;
    let summary = runner.run()?;
    runner.finish();
    log::info!(
        "{} frame(s), {} event(s) applied, {} skipped",
        summary.frames,
        summary.events_applied,
        summary.events_skipped
    );

    let report = report::RunReport::from_runner(&runner);
    report::write_report(&report, format, report_path.as_deref())?;

    Ok(())
}

/// Command-line flags take precedence over the scenario file
fn apply_overrides(scenario: &mut config::ScenarioConfig, args: &Args) {
    if let Some(module) = &args.module {
        scenario.module.library = Some(module.clone());
    }
    if let Some(steps) = args.steps {
        scenario.run.steps = steps;
    }
    if args.no_trace {
        scenario.module.trace = false;
    }
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}
