//! autoupdater: staged-rollout firmware update agent.
//!
//! This binary is meant to be run periodically by an external
//! scheduler. Each run decides whether this device should update
//! now, based on a staged rollout, and then tries configured mirrors
//! in random order until one of them yields an applied update.
//!
//! It is made of a few single-purpose pieces:
//!  * `probability` - staged rollout, clock-skew tolerant.
//!  * `lock` - single-instance guard.
//!  * `mirrors` - randomized, non-repeating mirror selection.
//!  * `hooks` - external download, verification and upgrade programs.
//!  * `update_agent` - the state-machine driving all of the above.

#[macro_use]
extern crate failure;
#[macro_use]
extern crate log;
#[macro_use]
extern crate serde_derive;

mod cli;
mod config;
mod hooks;
mod lock;
mod mirrors;
mod probability;
mod update_agent;

use crate::cli::CliOptions;
use crate::config::Settings;
use crate::hooks::ProcessHooks;
use crate::probability::ProcUptime;
use crate::update_agent::{RunContext, RunError, RunFlags, RunOutcome, UpdateAgent};
use failure::Fallible;
use itertools::Itertools;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::{SystemTime, UNIX_EPOCH};
use structopt::StructOpt;

/// Base directories for configuration snippets, by increasing priority.
static CONFIG_DIRS: [&str; 3] = ["/usr/lib", "/run", "/etc"];

fn main() {
    let exit_code = match run() {
        Ok(outcome) => {
            trace!("run outcome: {:?}", outcome);
            0
        }
        Err(e) => {
            match e.downcast_ref::<RunError>() {
                Some(err) => error!("{}", err),
                None => error!("error: {}", e.iter_chain().join(": ")),
            }
            1
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Fallible<RunOutcome> {
    let cli = CliOptions::from_args();

    let mut logger = env_logger::Builder::new();
    logger.filter(Some(module_path!()), cli.loglevel());
    if let Ok(filters) = std::env::var("RUST_LOG") {
        logger.parse_filters(&filters);
    }
    logger.try_init()?;
    trace!("command-line options: {:?}", cli);

    let settings = Settings::read_config(&CONFIG_DIRS, cli.branch.as_deref())?;
    let hooks = ProcessHooks::new(settings.hooks_dir.clone(), settings.hook_timeout);
    let flags = RunFlags {
        force: cli.force,
        fallback: cli.fallback,
    };
    let ctx = RunContext::try_from_settings(settings, flags, chrono::Utc::now())?;
    debug!("run context:\n{}", serde_json::to_string_pretty(&ctx)?);

    let mut rng = seeded_rng()?;
    let mut agent = UpdateAgent::new(&ctx, hooks, ProcUptime::default());
    agent.run(&mut rng)
}

/// Random source for this run, seeded from the wall clock.
fn seeded_rng() -> Fallible<StdRng> {
    let now = SystemTime::now().duration_since(UNIX_EPOCH)?;
    Ok(StdRng::seed_from_u64(now.as_nanos() as u64))
}
