//! Update agent.

use super::{RunContext, RunMode};
use crate::hooks::{AttemptOutcome, HookRunner};
use crate::lock::{LockError, RunLock};
use crate::mirrors::CandidateSet;
use crate::probability::{self, UptimeSource};
use failure::Fallible;
use rand::Rng;

/// Successful end of a run.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum RunOutcome {
    /// Updates are disabled, nothing done.
    Disabled,
    /// Not this device's turn in the staged rollout.
    Skipped { probability: f64 },
    /// Update applied from `mirror`.
    Updated { mirror: String, attempts: usize },
}

/// Unsuccessful end of a run.
#[derive(Debug, Fail)]
pub(crate) enum RunError {
    #[fail(display = "another instance is currently running")]
    AlreadyRunning,
    #[fail(display = "no usable mirror found ({} attempted)", attempts)]
    NoUsableMirror { attempts: usize },
}

/// Agent driving a single update run.
#[derive(Debug)]
pub(crate) struct UpdateAgent<'a, H, U> {
    ctx: &'a RunContext,
    hooks: H,
    uptime: U,
    /// Held from the go decision until the agent is dropped.
    _lock: Option<RunLock>,
}

impl<'a, H, U> UpdateAgent<'a, H, U>
where
    H: HookRunner,
    U: UptimeSource,
{
    pub(crate) fn new(ctx: &'a RunContext, hooks: H, uptime: U) -> Self {
        Self {
            ctx,
            hooks,
            uptime,
            _lock: None,
        }
    }

    /// Run the update state-machine to completion.
    pub(crate) fn run<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Fallible<RunOutcome> {
        match self.ctx.mode {
            RunMode::Disabled => {
                info!("autoupdater is disabled");
                return Ok(RunOutcome::Disabled);
            }
            RunMode::Forced => info!("update forced, skipping rollout check"),
            RunMode::Staged(ref input) => {
                let estimate = probability::probability(input, &self.uptime)?;
                debug!(
                    "update probability: {} (clock fault: {})",
                    estimate.probability, estimate.clock_fault
                );
                if !estimate.draw(rng) {
                    info!("no update this time (probability {})", estimate.probability);
                    return Ok(RunOutcome::Skipped {
                        probability: estimate.probability,
                    });
                }
            }
        }

        self._lock = match RunLock::acquire(&self.ctx.lock_path) {
            Ok(lock) => Some(lock),
            Err(LockError::AlreadyRunning) => return Err(RunError::AlreadyRunning.into()),
            Err(e) => return Err(e.into()),
        };

        let mut candidates = CandidateSet::new(self.ctx.mirrors.iter().cloned());
        let mut attempts = 0;
        while let Some(slot) = candidates.pick(rng) {
            let mirror = match candidates.mirror(slot) {
                Some(m) => m.to_string(),
                None => break,
            };
            attempts += 1;
            trace!("{} mirror(s) left before this attempt", candidates.live());

            let outcome = self.try_mirror(&mirror);
            candidates.retire(slot);
            if outcome == AttemptOutcome::Success {
                info!("update from '{}' applied", mirror);
                return Ok(RunOutcome::Updated { mirror, attempts });
            }
        }

        error!("no usable mirror found");
        Err(RunError::NoUsableMirror { attempts }.into())
    }

    /// Try a full download, verify and upgrade cycle on a mirror.
    fn try_mirror(&mut self, mirror: &str) -> AttemptOutcome {
        info!("trying mirror '{}'", mirror);

        let outcome = if let Err(e) = self.hooks.download(self.ctx, mirror) {
            warn!("download from '{}' failed: {}", mirror, e);
            AttemptOutcome::DownloadFailed
        } else if let Err(e) = self.hooks.verify(self.ctx, mirror) {
            warn!("verification of update from '{}' failed: {}", mirror, e);
            AttemptOutcome::VerificationFailed
        } else if let Err(e) = self.hooks.upgrade(self.ctx, mirror) {
            error!("upgrade from '{}' failed: {}", mirror, e);
            AttemptOutcome::ApplyFailed
        } else {
            AttemptOutcome::Success
        };

        if outcome != AttemptOutcome::Success {
            if let Err(e) = self.hooks.abort(self.ctx, mirror) {
                warn!("cleanup after '{}' failed: {}", mirror, e);
            }
        }
        outcome
    }
}
