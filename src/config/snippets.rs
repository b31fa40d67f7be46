use std::collections::BTreeMap;

/// Top-level configuration stanza.
#[derive(Debug, Deserialize)]
pub(crate) struct ConfigSnippet {
    /// General agent settings.
    pub(crate) settings: Option<SettingsSnippet>,
    /// Update branches, by identifier.
    pub(crate) branches: Option<BTreeMap<String, BranchSnippet>>,
}

/// General agent settings.
#[derive(Debug, Deserialize)]
pub(crate) struct SettingsSnippet {
    /// Whether automatic updates are enabled (default: false)
    pub(crate) enabled: Option<bool>,
    /// Branch to follow, overridable from command-line.
    pub(crate) branch: Option<String>,
    /// File holding the currently installed version.
    pub(crate) version_file: Option<String>,
    /// File holding announcement date and priority of the latest update.
    pub(crate) manifest_file: Option<String>,
    /// Lock-file path (default: /var/run/autoupdater.lock)
    pub(crate) lock_file: Option<String>,
    /// Root of hook directories (default: /usr/lib/autoupdater)
    pub(crate) hooks_dir: Option<String>,
    /// Maximum run time for a single hook (default: unbounded)
    pub(crate) hook_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BranchSnippet {
    /// Human-readable branch name (default: branch identifier)
    pub(crate) name: Option<String>,
    /// Mirrors serving this branch.
    pub(crate) mirrors: Option<Vec<String>>,
    /// Minimum number of valid signatures.
    pub(crate) good_signatures: Option<u64>,
    /// Trusted public keys.
    pub(crate) pubkeys: Option<Vec<String>>,
}
