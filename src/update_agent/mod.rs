//! Update agent state-machine.

mod agent;
mod context;

pub(crate) use agent::{RunError, RunOutcome, UpdateAgent};
pub(crate) use context::{RunContext, RunFlags, RunMode};
