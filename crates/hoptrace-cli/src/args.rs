//! Command-line surface (spec §6).

use clap::Parser;
use hoptrace_core::{Config, InversionPolicy, TtlAlgorithm};
use std::time::Duration;
use thiserror::Error;

/// Determine, as efficiently as possible, the number of IP-layer hops to
/// a destination using an adaptive ICMP Echo probe search.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Destination hostname or dotted-quad address.
    pub destination: String,

    /// Outgoing network interface.
    #[arg(long, value_name = "NAME")]
    pub interface: Option<String>,

    /// First TTL used by the `sequential` algorithm.
    #[arg(long, default_value_t = 1, value_name = "N")]
    pub startttl: u8,

    /// Upper bound of the TTL search range.
    #[arg(long, default_value_t = 64, value_name = "N")]
    pub maxttl: u8,

    /// Hard cap on the number of probes ever sent.
    #[arg(long, default_value_t = 256, value_name = "N")]
    pub maxprobes: u32,

    /// Maximum tries (initial probe plus retransmissions) per TTL.
    #[arg(long, default_value_t = 3, value_name = "N")]
    pub maxtries: u32,

    /// Maximum number of outstanding probes in flight.
    #[arg(long, default_value_t = 4, value_name = "N", conflicts_with = "no_parallel")]
    pub parallel: u8,

    /// Disable parallel probing (equivalent to `-parallel 1`).
    #[arg(long)]
    pub no_parallel: bool,

    /// Extra idle-poll microseconds used to pace new probes apart.
    #[arg(long = "probe-pacing", default_value_t = 0, value_name = "US")]
    pub probe_pacing: u64,

    /// ICMP payload size in bytes.
    #[arg(long, default_value_t = 56, value_name = "BYTES")]
    pub size: usize,

    /// TTL-selection algorithm.
    #[arg(long, value_enum, default_value_t = AlgorithmArg::Binarysearch)]
    pub algorithm: AlgorithmArg,

    /// Bias the first few binary-search probes toward the typical
    /// Internet hop-count range.
    #[arg(long, overrides_with = "no_likely_candidates")]
    pub likely_candidates: bool,

    /// Disable the typical-hop-count bias.
    #[arg(long, overrides_with = "likely_candidates")]
    pub no_likely_candidates: bool,

    /// Use the probability-weighted binary search partitioning.
    #[arg(long, overrides_with = "plain_distribution")]
    pub probabilistic_distribution: bool,

    /// Use plain index-based binary search partitioning.
    #[arg(long, overrides_with = "probabilistic_distribution")]
    pub plain_distribution: bool,

    /// Prefer retransmitting a stalled probe over spending the token on a
    /// fresh TTL.
    #[arg(long, overrides_with = "new_probe_priority")]
    pub retransmit_priority: bool,

    /// Prefer spending the token on a fresh TTL over retransmitting.
    #[arg(long, overrides_with = "retransmit_priority")]
    pub new_probe_priority: bool,

    /// Snap `sequential`/`reversesequential` back into the learned
    /// interval when they step outside it.
    #[arg(long, overrides_with = "no_readjust")]
    pub readjust: bool,

    /// Disable readjustment.
    #[arg(long, overrides_with = "readjust")]
    pub no_readjust: bool,

    /// Show per-probe progress as it happens.
    #[arg(long, overrides_with = "quiet")]
    pub progress: bool,

    /// Suppress per-probe progress.
    #[arg(long, overrides_with = "progress")]
    pub quiet: bool,

    /// Show extended per-probe progress (response delay, duplicate count).
    #[arg(long)]
    pub detailed_progress: bool,

    /// Print `minHops-maxHops:reachability` instead of a narrative summary.
    #[arg(long, overrides_with = "human_readable")]
    pub machine_readable: bool,

    /// Print a human narrative summary (the default).
    #[arg(long, overrides_with = "machine_readable")]
    pub human_readable: bool,

    /// Print summary statistics after the run.
    #[arg(long, overrides_with_all = ["full_statistics", "no_statistics"])]
    pub statistics: bool,

    /// Print per-probe statistics after the run.
    #[arg(long, overrides_with_all = ["statistics", "no_statistics"])]
    pub full_statistics: bool,

    /// Suppress statistics entirely.
    #[arg(long, overrides_with_all = ["statistics", "full_statistics"])]
    pub no_statistics: bool,

    /// Enable debug-level tracing output.
    #[arg(long)]
    pub debug: bool,

    /// Seed the engine's pseudo-random generator for reproducible runs.
    #[arg(long, value_name = "SEED")]
    pub rng_seed: Option<u64>,

    /// Adjustment applied to a received IP TTL before the Kivinen bound
    /// (spec §9, Open Question 1); default 0, never baked in.
    #[arg(long, default_value_t = 0, value_name = "HOPS", allow_hyphen_values = true)]
    pub kivinen_adjustment: i16,

    /// Policy applied when an interval update would invert the bounds.
    #[arg(long, value_enum, default_value_t = InversionPolicyArg::ClampToMin)]
    pub on_inversion: InversionPolicyArg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum AlgorithmArg {
    Random,
    Sequential,
    Reversesequential,
    Binarysearch,
}

impl From<AlgorithmArg> for TtlAlgorithm {
    fn from(value: AlgorithmArg) -> Self {
        match value {
            AlgorithmArg::Random => Self::Random,
            AlgorithmArg::Sequential => Self::Sequential,
            AlgorithmArg::Reversesequential => Self::ReverseSequential,
            AlgorithmArg::Binarysearch => Self::BinarySearch,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum InversionPolicyArg {
    ClampToMin,
    Reject,
}

impl From<InversionPolicyArg> for InversionPolicy {
    fn from(value: InversionPolicyArg) -> Self {
        match value {
            InversionPolicyArg::ClampToMin => Self::ClampToMin,
            InversionPolicyArg::Reject => Self::Reject,
        }
    }
}

/// How the run should present its results (spec §6, "Output"/"Presentation").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    MachineReadable,
    Human,
}

/// How verbosely per-probe progress should be shown while the engine runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressMode {
    Quiet,
    Progress,
    Detailed,
}

/// How much statistics detail to print after the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatisticsMode {
    None,
    Summary,
    Full,
}

/// Error raised when the CLI arguments are individually well-formed but
/// mutually or numerically invalid (spec §7, "Fatal configuration").
#[derive(Debug, Error)]
pub enum ArgsError {
    #[error("-maxttl must be at least 1, got {0}")]
    MaxTtlTooLow(u8),
    #[error("-startttl ({startttl}) must not exceed -maxttl ({maxttl})")]
    StartTtlAboveMaxTtl { startttl: u8, maxttl: u8 },
    #[error("-parallel must be at least 1, got {0}")]
    ParallelTooLow(u8),
    #[error("-maxtries must be at least 1, got {0}")]
    MaxTriesTooLow(u32),
}

impl Args {
    /// Translate validated CLI arguments into an engine [`Config`].
    ///
    /// # Errors
    ///
    /// Returns [`ArgsError`] for any numeric argument that is individually
    /// well-formed but out of the range the engine requires.
    pub fn to_engine_config(&self) -> Result<Config, ArgsError> {
        if self.maxttl < 1 {
            return Err(ArgsError::MaxTtlTooLow(self.maxttl));
        }
        if self.startttl > self.maxttl {
            return Err(ArgsError::StartTtlAboveMaxTtl {
                startttl: self.startttl,
                maxttl: self.maxttl,
            });
        }
        let parallel = if self.no_parallel { 1 } else { self.parallel };
        if parallel < 1 {
            return Err(ArgsError::ParallelTooLow(parallel));
        }
        if self.maxtries < 1 {
            return Err(ArgsError::MaxTriesTooLow(self.maxtries));
        }

        Ok(Config {
            first_ttl: hoptrace_core::Hops(self.startttl),
            max_ttl: hoptrace_core::Hops(self.maxttl),
            max_probes: self.maxprobes,
            max_tries: self.maxtries,
            parallel,
            probe_pacing: Duration::from_micros(self.probe_pacing),
            icmp_data_length: self.size,
            algorithm: self.algorithm.into(),
            likely_candidates: self.likely_candidates || !self.no_likely_candidates,
            probabilistic_distribution: self.probabilistic_distribution || !self.plain_distribution,
            prefer_retransmission: self.retransmit_priority || !self.new_probe_priority,
            readjust: self.readjust || !self.no_readjust,
            kivinen_adjustment: self.kivinen_adjustment,
            on_inversion: self.on_inversion.into(),
            rng_seed: self.rng_seed,
            ..Config::default()
        })
    }

    #[must_use]
    pub fn output_mode(&self) -> OutputMode {
        if self.machine_readable {
            OutputMode::MachineReadable
        } else {
            OutputMode::Human
        }
    }

    #[must_use]
    pub fn progress_mode(&self) -> ProgressMode {
        if self.quiet {
            ProgressMode::Quiet
        } else if self.detailed_progress {
            ProgressMode::Detailed
        } else if self.progress {
            ProgressMode::Progress
        } else {
            ProgressMode::Quiet
        }
    }

    #[must_use]
    pub fn statistics_mode(&self) -> StatisticsMode {
        if self.no_statistics {
            StatisticsMode::None
        } else if self.full_statistics {
            StatisticsMode::Full
        } else if self.statistics {
            StatisticsMode::Summary
        } else {
            StatisticsMode::None
        }
    }
}
