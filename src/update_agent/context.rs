use crate::config::Settings;
use crate::probability::UpdateDecisionInput;
use chrono::{DateTime, Utc};
use failure::{Fallible, ResultExt};
use std::path::{Path, PathBuf};

/// How this run relates to the staged rollout.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub(crate) enum RunMode {
    /// Updates are disabled in configuration.
    Disabled,
    /// Forced from command-line, bypassing both `enabled` and rollout.
    Forced,
    /// Regular run, subject to staged rollout.
    Staged(UpdateDecisionInput),
}

/// Immutable context for a single run.
#[derive(Clone, Debug, Serialize)]
pub(crate) struct RunContext {
    pub(crate) branch: String,
    pub(crate) branch_name: String,
    pub(crate) mirrors: Vec<String>,
    pub(crate) pubkeys: Vec<String>,
    /// Minimum number of valid signatures from `pubkeys`.
    pub(crate) good_signatures: u64,
    /// Currently installed version, if known.
    pub(crate) old_version: Option<String>,
    pub(crate) fallback: bool,
    pub(crate) lock_path: PathBuf,
    pub(crate) mode: RunMode,
}

/// Operator flags from command-line.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct RunFlags {
    pub(crate) force: bool,
    pub(crate) fallback: bool,
}

/// Announcement data for the available update.
#[derive(Debug, Deserialize)]
struct ManifestInfo {
    /// RFC 3339 announcement timestamp.
    date: String,
    /// Rollout duration, in days.
    priority: f64,
}

impl RunContext {
    pub(crate) fn try_from_settings(
        cfg: Settings,
        flags: RunFlags,
        now: DateTime<Utc>,
    ) -> Fallible<Self> {
        let mode = if flags.force {
            RunMode::Forced
        } else if !cfg.enabled {
            RunMode::Disabled
        } else {
            let path = cfg
                .manifest_file
                .as_ref()
                .ok_or_else(|| format_err!("no manifest file given in settings"))?;
            let (announced_at, priority) =
                read_manifest_info(path).context("failed to load update manifest")?;
            RunMode::Staged(UpdateDecisionInput {
                announced_at,
                priority,
                now,
                fallback: flags.fallback,
            })
        };

        let old_version = cfg.version_file.as_ref().and_then(|p| read_one_line(p));

        let ctx = Self {
            branch: cfg.branch,
            branch_name: cfg.branch_name,
            mirrors: cfg.mirrors,
            pubkeys: cfg.pubkeys,
            good_signatures: cfg.good_signatures,
            old_version,
            fallback: flags.fallback,
            lock_path: cfg.lock_file,
            mode,
        };
        Ok(ctx)
    }

    pub(crate) fn is_forced(&self) -> bool {
        self.mode == RunMode::Forced
    }

    /// Environment passed to hooks working on `mirror`.
    pub(crate) fn hook_env(&self, mirror: &str) -> Vec<(&'static str, String)> {
        let flag = |b: bool| String::from(if b { "1" } else { "0" });

        let mut env = vec![
            ("AUTOUPDATER_MIRROR", mirror.to_string()),
            ("AUTOUPDATER_BRANCH", self.branch.clone()),
            ("AUTOUPDATER_BRANCH_NAME", self.branch_name.clone()),
            ("AUTOUPDATER_FORCE", flag(self.is_forced())),
            ("AUTOUPDATER_FALLBACK", flag(self.fallback)),
            ("AUTOUPDATER_GOOD_SIGNATURES", self.good_signatures.to_string()),
            ("AUTOUPDATER_PUBKEYS", self.pubkeys.join(" ")),
        ];
        if let Some(ref v) = self.old_version {
            env.push(("AUTOUPDATER_OLD_VERSION", v.clone()));
        }
        env
    }

    #[cfg(test)]
    pub(crate) fn sample(mirrors: &[&str], lock_path: PathBuf, mode: RunMode) -> Self {
        Self {
            branch: "stable".to_string(),
            branch_name: "stable".to_string(),
            mirrors: mirrors.iter().map(|m| m.to_string()).collect(),
            pubkeys: vec!["aaaa".to_string(), "bbbb".to_string()],
            good_signatures: 1,
            old_version: Some("v2016.1".to_string()),
            fallback: false,
            lock_path,
            mode,
        }
    }
}

fn read_manifest_info(path: &Path) -> Fallible<(DateTime<Utc>, f64)> {
    let content = std::fs::read_to_string(path)
        .context(format!("failed to read '{}'", path.display()))?;
    let info: ManifestInfo = toml::from_str(&content).context("failed to parse TOML")?;

    let date = DateTime::parse_from_rfc3339(&info.date)
        .context(format!("invalid date '{}'", info.date))?
        .with_timezone(&Utc);
    if !info.priority.is_finite() || info.priority < 0.0 {
        bail!("invalid priority {}", info.priority);
    }

    Ok((date, info.priority))
}

/// Read the first line of a file, without its trailing newline.
fn read_one_line(path: &Path) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(content) => content.lines().next().map(String::from),
        Err(e) => {
            warn!("unable to read version file '{}': {}", path.display(), e);
            None
        }
    }
}
