//! Command-line ICMP hop-count probe (spec §6).
//!
//! Wires the pure [`hoptrace_core::Engine`] to a real raw socket and the
//! system clock, resolves the destination, prints the result, and maps
//! every failure mode to the exit codes spec §7 describes.

mod args;
mod report;
mod signal;
mod transport;

use args::{Args, OutputMode, ProgressMode, StatisticsMode};
use clap::Parser;
use hoptrace_core::{Engine, EngineError, Probe, SystemClock};
use std::collections::BTreeMap;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let args = Args::parse();
    install_tracing(args.debug, args.progress_mode());

    match run(&args) {
        Ok(code) => code,
        Err(error) => {
            eprintln!("hoptrace: error: {error:#}");
            ExitCode::FAILURE
        }
    }
}

/// `-debug` always wins; otherwise progress verbosity picks the level
/// that `tracing`'s `debug!`/`warn!` calls in the engine and transport
/// are emitted at (spec §6, "Presentation").
fn install_tracing(debug: bool, progress: ProgressMode) {
    let level = if debug {
        "debug"
    } else {
        match progress {
            ProgressMode::Quiet => "warn",
            ProgressMode::Progress | ProgressMode::Detailed => "debug",
        }
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("hoptrace_core={level},hoptrace_cli={level},hoptrace_packet={level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();
}

fn run(args: &Args) -> anyhow::Result<ExitCode> {
    let config = args.to_engine_config()?;

    let destination = transport::resolve_destination(&args.destination)?;
    let source = transport::discover_source_address(destination)?;
    let mut socket = transport::RawIcmpTransport::new(args.interface.as_deref())?;
    signal::install()?;

    let progress = args.progress_mode();
    let mut seen_probes: BTreeMap<u16, Probe> = BTreeMap::new();
    let mut engine = Engine::new(config);
    let outcome = engine.run(
        source,
        destination,
        &mut socket,
        &SystemClock,
        signal::interrupted,
        |probe| {
            if !matches!(progress, ProgressMode::Quiet) {
                if let Some(line) = report::progress_line(probe, matches!(progress, ProgressMode::Detailed)) {
                    println!("{line}");
                }
            }
            seen_probes.insert(probe.id.0, *probe);
        },
    );

    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(EngineError::Exhausted { sent }) => {
            anyhow::bail!("probe table exhausted after {sent} probes")
        }
        Err(EngineError::Transport(error)) => return Err(error.into()),
    };

    match args.output_mode() {
        OutputMode::MachineReadable => println!("{}", report::machine_readable(&outcome)),
        OutputMode::Human => println!("{}", report::human_readable(&args.destination, &outcome)),
    }

    match args.statistics_mode() {
        StatisticsMode::None => {}
        StatisticsMode::Summary => println!("{}", report::summary_statistics(&outcome)),
        StatisticsMode::Full => {
            print!("{}", report::full_statistics(seen_probes.values()));
            println!("{}", report::summary_statistics(&outcome));
        }
    }

    Ok(ExitCode::SUCCESS)
}
