//! Staged rollout probability.
//!
//! This module turns the announcement date and priority of an update
//! into the probability that this device should try to update now.
//! Updates are rolled out over `priority` days, following a smooth
//! ramp from 0 to 1 across the rollout window.

use chrono::{DateTime, Utc};
use failure::{Fallible, ResultExt};
use rand::Rng;
use std::path::PathBuf;
use std::time::Duration;

/// Length of a rollout day, in seconds.
const DAY_SECS: f64 = 86_400.0;

/// Uptime below which the clock is assumed not to be synchronized yet.
const MIN_SYNCED_UPTIME: Duration = Duration::from_secs(600);

/// Decay base used when the local clock can't be trusted.
const CLOCK_FAULT_BASE: f64 = 0.75;

/// Default source of system uptime.
static PROC_UPTIME_PATH: &str = "/proc/uptime";

/// Inputs for a single update decision.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub(crate) struct UpdateDecisionInput {
    /// Announcement timestamp from the manifest.
    pub(crate) announced_at: DateTime<Utc>,
    /// Rollout duration, in days.
    pub(crate) priority: f64,
    /// Current local time.
    pub(crate) now: DateTime<Utc>,
    /// Whether to collapse the ramp into a single delayed step.
    pub(crate) fallback: bool,
}

/// Result of a probability computation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Estimate {
    /// Probability of updating, in `[0, 1]`.
    pub(crate) probability: f64,
    /// Whether the local clock appears to be behind the announcement.
    pub(crate) clock_fault: bool,
}

impl Estimate {
    /// Roll the dice: `true` means the update should go ahead.
    pub(crate) fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> bool {
        let dice: f64 = rng.gen();
        trace!("rollout draw {} against probability {}", dice, self.probability);
        dice < self.probability
    }
}

/// Source of elapsed time since boot.
pub(crate) trait UptimeSource {
    fn uptime(&self) -> Fallible<Duration>;
}

/// Uptime reader for procfs.
#[derive(Clone, Debug)]
pub(crate) struct ProcUptime {
    path: PathBuf,
}

impl Default for ProcUptime {
    fn default() -> Self {
        Self {
            path: PathBuf::from(PROC_UPTIME_PATH),
        }
    }
}

impl UptimeSource for ProcUptime {
    fn uptime(&self) -> Fallible<Duration> {
        let content = std::fs::read_to_string(&self.path)
            .context(format!("failed to read '{}'", self.path.display()))?;
        let field = content
            .split_whitespace()
            .next()
            .ok_or_else(|| format_err!("empty uptime record"))?;
        let secs = field
            .parse::<f64>()
            .context(format!("invalid uptime value '{}'", field))?;
        if !secs.is_finite() || secs < 0.0 {
            bail!("invalid uptime value '{}'", field);
        }

        Ok(Duration::from_secs_f64(secs))
    }
}

/// Compute the probability of updating for the given input.
///
/// A manifest dated in the future is taken as a sign that the local
/// clock is wrong. In that case the probability only depends on
/// priority, unless the device just booted and may still be waiting
/// for time synchronization. Uptime is only queried in that case.
pub(crate) fn probability<U>(input: &UpdateDecisionInput, uptime: &U) -> Fallible<Estimate>
where
    U: UptimeSource + ?Sized,
{
    let seconds = input.priority * DAY_SECS;
    let diff = (input.now - input.announced_at).num_seconds() as f64;

    if diff < 0.0 {
        warn!("clock seems to be incorrect");
        let up = uptime
            .uptime()
            .context("unable to determine uptime")?;
        let probability = if up < MIN_SYNCED_UPTIME {
            debug!("low uptime ({}s), deferring update", up.as_secs());
            0.0
        } else {
            CLOCK_FAULT_BASE.powf(input.priority)
        };
        return Ok(Estimate {
            probability,
            clock_fault: true,
        });
    }

    let probability = if input.fallback {
        if diff >= seconds + DAY_SECS {
            1.0
        } else {
            0.0
        }
    } else if diff >= seconds {
        1.0
    } else {
        smoothstep(diff / seconds)
    };

    Ok(Estimate {
        probability,
        clock_fault: false,
    })
}

/// Cubic ramp, flat at both ends of `[0, 1]`.
fn smoothstep(x: f64) -> f64 {
    3.0 * x * x - 2.0 * x * x * x
}

#[cfg(test)]
impl UptimeSource for Duration {
    fn uptime(&self) -> Fallible<Duration> {
        Ok(*self)
    }
}
