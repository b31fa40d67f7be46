//! Configuration parsing and validation.
//!
//! This module contains three logical entities:
//!  * Snippets: single configuration files, holding a subset of configuration entries.
//!  * Inputs: configuration snippets merged, but not yet validated.
//!  * Settings: validated configuration for the update agent.

mod inputs;
mod snippets;

use crate::hooks::DEFAULT_HOOKS_DIR;
use crate::lock::DEFAULT_LOCK_PATH;
use failure::{Fallible, ResultExt};
use std::path::PathBuf;
use std::time::Duration;

/// Validated runtime configuration.
#[derive(Debug, Serialize)]
pub(crate) struct Settings {
    pub(crate) enabled: bool,
    /// Branch identifier.
    pub(crate) branch: String,
    /// Human-readable branch name.
    pub(crate) branch_name: String,
    pub(crate) mirrors: Vec<String>,
    pub(crate) good_signatures: u64,
    pub(crate) pubkeys: Vec<String>,
    pub(crate) version_file: Option<PathBuf>,
    pub(crate) manifest_file: Option<PathBuf>,
    pub(crate) lock_file: PathBuf,
    pub(crate) hooks_dir: PathBuf,
    pub(crate) hook_timeout: Option<Duration>,
}

impl Settings {
    /// Read and validate configuration, optionally overriding the branch.
    pub(crate) fn read_config(dirs: &[&str], branch: Option<&str>) -> Fallible<Self> {
        let cfg = inputs::ConfigInput::read_config(dirs)?;
        Self::try_from_input(cfg, branch)
    }

    /// Validate inputs and return a valid agent configuration.
    fn try_from_input(mut cfg: inputs::ConfigInput, branch: Option<&str>) -> Fallible<Self> {
        let branch = match branch {
            Some(b) => b.to_string(),
            None if !cfg.settings.branch.is_empty() => cfg.settings.branch.clone(),
            None => bail!("no branch given in settings or command line"),
        };

        let input = cfg
            .branches
            .remove(&branch)
            .ok_or_else(|| format_err!("unable to load configuration for branch '{}'", branch))?;
        let branch_name = if input.name.is_empty() {
            branch.clone()
        } else {
            input.name
        };
        let good_signatures = match input.good_signatures {
            Some(0) => bail!("invalid value for option 'good_signatures'"),
            Some(n) => n,
            None => bail!("unable to load option 'good_signatures'"),
        };
        let mirrors = input
            .mirrors
            .ok_or_else(|| format_err!("unable to load option 'mirrors'"))?;
        if mirrors.is_empty() {
            warn!("no mirrors configured for branch '{}'", branch);
        }
        let pubkeys = input
            .pubkeys
            .ok_or_else(|| format_err!("unable to load option 'pubkeys'"))?;

        let s = cfg.settings;
        let optional_path = |p: String| {
            if p.is_empty() {
                None
            } else {
                Some(PathBuf::from(p))
            }
        };
        let lock_file = optional_path(s.lock_file).unwrap_or_else(|| DEFAULT_LOCK_PATH.into());
        let hooks_dir = optional_path(s.hooks_dir).unwrap_or_else(|| DEFAULT_HOOKS_DIR.into());
        let hook_timeout = match s.hook_timeout_secs {
            Some(0) => bail!("invalid value for option 'hook_timeout_secs'"),
            t => t.map(Duration::from_secs),
        };

        let settings = Self {
            enabled: s.enabled,
            branch,
            branch_name,
            mirrors,
            good_signatures,
            pubkeys,
            version_file: optional_path(s.version_file),
            manifest_file: optional_path(s.manifest_file),
            lock_file,
            hooks_dir,
            hook_timeout,
        };
        debug!(
            "runtime configuration:\n{}",
            serde_json::to_string_pretty(&settings).context("failed to render configuration")?
        );

        Ok(settings)
    }
}
