use crate::config::snippets;
use failure::{Fallible, ResultExt};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Configuration fragments directory, relative to each base directory.
static SNIPPETS_SUBDIR: &str = "autoupdater/config.d";

/// Runtime configuration holding environmental inputs.
#[derive(Debug)]
pub(crate) struct ConfigInput {
    pub(crate) settings: SettingsInput,
    pub(crate) branches: BTreeMap<String, BranchInput>,
}

impl ConfigInput {
    /// Read config snippets and merge them into a single config.
    pub(crate) fn read_config(dirs: &[&str]) -> Fallible<Self> {
        let paths = collect_snippets(dirs)?;
        if paths.is_empty() {
            bail!("no configuration snippets found in {:?}", dirs);
        }

        let mut snips = vec![];
        for path in paths {
            trace!("reading config snippet {:?}", path);
            let content = std::fs::read_to_string(&path)
                .context(format!("failed to read file '{}'", path.display()))?;
            let snippet: snippets::ConfigSnippet = toml::from_str(&content)
                .context(format!("failed to parse TOML in '{}'", path.display()))?;
            snips.push(snippet);
        }

        let cfg = Self::merge_snippets(snips);
        debug!("configuration input:\n{:#?}", cfg);

        Ok(cfg)
    }

    /// Merge multiple snippets into a single configuration.
    fn merge_snippets(snippets: Vec<snippets::ConfigSnippet>) -> Self {
        let mut settings = vec![];
        let mut branches: BTreeMap<String, Vec<snippets::BranchSnippet>> = BTreeMap::new();

        for snip in snippets {
            if let Some(s) = snip.settings {
                settings.push(s);
            }
            for (id, b) in snip.branches.unwrap_or_default() {
                branches.entry(id).or_default().push(b);
            }
        }

        Self {
            settings: SettingsInput::from_snippets(settings),
            branches: branches
                .into_iter()
                .map(|(id, snips)| (id, BranchInput::from_snippets(snips)))
                .collect(),
        }
    }
}

/// Find snippets under all base directories.
///
/// A snippet in a later directory masks one with the same file name
/// in an earlier directory. The result is sorted by file name.
fn collect_snippets(dirs: &[&str]) -> Fallible<Vec<PathBuf>> {
    let mut found: BTreeMap<String, PathBuf> = BTreeMap::new();
    for base in dirs {
        let dir = Path::new(base).join(SNIPPETS_SUBDIR);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(ref e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => {
                return Err(e)
                    .context(format!("failed to list '{}'", dir.display()))
                    .map_err(Into::into)
            }
        };

        for entry in entries {
            let entry = entry.context(format!("failed to list '{}'", dir.display()))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') || !name.ends_with(".toml") {
                continue;
            }
            if let Some(prev) = found.insert(name, entry.path()) {
                trace!("config snippet {:?} masked", prev);
            }
        }
    }

    Ok(found.into_iter().map(|(_, path)| path).collect())
}

#[derive(Debug, Default)]
pub(crate) struct SettingsInput {
    pub(crate) enabled: bool,
    pub(crate) branch: String,
    pub(crate) version_file: String,
    pub(crate) manifest_file: String,
    pub(crate) lock_file: String,
    pub(crate) hooks_dir: String,
    pub(crate) hook_timeout_secs: Option<u64>,
}

impl SettingsInput {
    fn from_snippets(snippets: Vec<snippets::SettingsSnippet>) -> Self {
        let mut cfg = Self::default();

        for snip in snippets {
            if let Some(e) = snip.enabled {
                cfg.enabled = e;
            }
            if let Some(b) = snip.branch {
                cfg.branch = b;
            }
            if let Some(v) = snip.version_file {
                cfg.version_file = v;
            }
            if let Some(m) = snip.manifest_file {
                cfg.manifest_file = m;
            }
            if let Some(l) = snip.lock_file {
                cfg.lock_file = l;
            }
            if let Some(h) = snip.hooks_dir {
                cfg.hooks_dir = h;
            }
            if let Some(t) = snip.hook_timeout_secs {
                cfg.hook_timeout_secs = Some(t);
            }
        }

        cfg
    }
}

#[derive(Debug, Default)]
pub(crate) struct BranchInput {
    pub(crate) name: String,
    pub(crate) mirrors: Option<Vec<String>>,
    pub(crate) good_signatures: Option<u64>,
    pub(crate) pubkeys: Option<Vec<String>>,
}

impl BranchInput {
    fn from_snippets(snippets: Vec<snippets::BranchSnippet>) -> Self {
        let mut cfg = Self::default();

        for snip in snippets {
            if let Some(n) = snip.name {
                cfg.name = n;
            }
            if let Some(m) = snip.mirrors {
                cfg.mirrors = Some(m);
            }
            if let Some(g) = snip.good_signatures {
                cfg.good_signatures = Some(g);
            }
            if let Some(p) = snip.pubkeys {
                cfg.pubkeys = Some(p);
            }
        }

        cfg
    }
}
