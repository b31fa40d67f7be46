//! Command-line options.

use log::LevelFilter;
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "autoupdater",
    about = "Staged-rollout firmware update agent."
)]
pub(crate) struct CliOptions {
    /// Update branch to follow, overriding configuration.
    #[structopt(short = "b", long = "branch")]
    pub(crate) branch: Option<String>,

    /// Update now, ignoring the staged rollout and the `enabled` setting.
    #[structopt(short = "f", long = "force")]
    pub(crate) force: bool,

    /// Only update once the rollout window is over by one day.
    #[structopt(long = "fallback")]
    pub(crate) fallback: bool,

    /// Verbosity level (higher is more verbose).
    #[structopt(short = "v", parse(from_occurrences))]
    pub(crate) verbosity: u8,
}

impl CliOptions {
    /// Log level for this crate, from verbosity flags.
    pub(crate) fn loglevel(&self) -> LevelFilter {
        match self.verbosity {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}
