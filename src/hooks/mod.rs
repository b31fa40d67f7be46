//! Extension points for update attempts.
//!
//! Downloading, signature verification and upgrade application are
//! performed outside of this agent, by hooks. `HookRunner` abstracts
//! over how hooks are run; `ProcessHooks` runs executables from
//! well-known directories.

mod process;

pub(crate) use process::{ProcessHooks, DEFAULT_HOOKS_DIR};

use crate::update_agent::RunContext;
use failure::Fallible;

/// Result of one update attempt against a mirror.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum AttemptOutcome {
    Success,
    DownloadFailed,
    VerificationFailed,
    ApplyFailed,
}

/// Kind of hook, one per extension point.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum HookKind {
    Download,
    Verify,
    Upgrade,
    Abort,
}

impl HookKind {
    /// Directory name holding hooks of this kind.
    pub(crate) fn dir_name(self) -> &'static str {
        match self {
            HookKind::Download => "download.d",
            HookKind::Verify => "verify.d",
            HookKind::Upgrade => "upgrade.d",
            HookKind::Abort => "abort.d",
        }
    }
}

/// Runner for update hooks.
///
/// Each method returns an error if the corresponding stage failed
/// for the given mirror.
pub(crate) trait HookRunner {
    /// Fetch update artifacts and manifest from `mirror`.
    fn download(&mut self, ctx: &RunContext, mirror: &str) -> Fallible<()>;

    /// Check that the downloaded manifest carries at least
    /// `good_signatures` valid signatures from trusted keys.
    fn verify(&mut self, ctx: &RunContext, mirror: &str) -> Fallible<()>;

    /// Apply the verified update.
    fn upgrade(&mut self, ctx: &RunContext, mirror: &str) -> Fallible<()>;

    /// Clean up after a failed attempt on `mirror`.
    fn abort(&mut self, ctx: &RunContext, mirror: &str) -> Fallible<()>;
}
