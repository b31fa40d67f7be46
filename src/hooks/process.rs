//! Hooks as external programs.

use super::{HookKind, HookRunner};
use crate::update_agent::RunContext;
use failure::{Fallible, ResultExt};
use itertools::Itertools;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};
use std::{fs, io, thread};

/// Default root for hook directories.
pub(crate) static DEFAULT_HOOKS_DIR: &str = "/usr/lib/autoupdater";

/// Polling interval while waiting on a bounded hook.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Hook runner spawning executables from `<root>/<kind>.d/`.
///
/// Hooks in a directory run in lexicographic order. Hidden entries,
/// directories and non-executable files are ignored. Each hook leads
/// its own process group, which is killed as a whole on timeout.
#[derive(Clone, Debug)]
pub(crate) struct ProcessHooks {
    root: PathBuf,
    timeout: Option<Duration>,
}

impl ProcessHooks {
    pub(crate) fn new<P: Into<PathBuf>>(root: P, timeout: Option<Duration>) -> Self {
        Self {
            root: root.into(),
            timeout,
        }
    }

    /// List runnable hooks of the given kind.
    fn list(&self, kind: HookKind) -> Fallible<Vec<PathBuf>> {
        let dir = self.root.join(kind.dir_name());
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(ref e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("no hooks directory '{}'", dir.display());
                return Ok(vec![]);
            }
            Err(e) => {
                return Err(e)
                    .context(format!("failed to list '{}'", dir.display()))
                    .map_err(Into::into)
            }
        };

        let mut hooks = vec![];
        for entry in entries {
            let entry = entry.context(format!("failed to list '{}'", dir.display()))?;
            if entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }
            let path = entry.path();
            if is_executable(&path) {
                hooks.push(path);
            } else {
                trace!("skipping non-executable '{}'", path.display());
            }
        }

        Ok(hooks.into_iter().sorted().collect())
    }

    /// Run hooks in order, stopping at the first failure.
    fn run_chain(&self, kind: HookKind, ctx: &RunContext, mirror: &str) -> Fallible<()> {
        for hook in self.list(kind)? {
            self.run_one(&hook, ctx, mirror)?;
        }
        Ok(())
    }

    /// Run all hooks, whatever their outcome.
    fn run_all(&self, kind: HookKind, ctx: &RunContext, mirror: &str) -> Fallible<()> {
        let mut failed = 0;
        for hook in self.list(kind)? {
            if let Err(e) = self.run_one(&hook, ctx, mirror) {
                warn!("{}", e);
                failed += 1;
            }
        }

        if failed > 0 {
            bail!("{} {} hook(s) failed", failed, kind.dir_name());
        }
        Ok(())
    }

    fn run_one(&self, hook: &Path, ctx: &RunContext, mirror: &str) -> Fallible<()> {
        debug!("running hook '{}' for '{}'", hook.display(), mirror);
        let mut child = Command::new(hook)
            .arg(mirror)
            .envs(ctx.hook_env(mirror))
            .stdin(Stdio::null())
            .process_group(0)
            .spawn()
            .context(format!("failed to run hook '{}'", hook.display()))?;

        let status = match self.timeout {
            Some(t) => wait_bounded(&mut child, t)
                .context(format!("hook '{}' did not complete", hook.display()))?,
            None => child
                .wait()
                .context(format!("failed to wait on hook '{}'", hook.display()))?,
        };

        if !status.success() {
            bail!("hook '{}' failed: {}", hook.display(), status);
        }
        Ok(())
    }
}

impl HookRunner for ProcessHooks {
    fn download(&mut self, ctx: &RunContext, mirror: &str) -> Fallible<()> {
        self.run_chain(HookKind::Download, ctx, mirror)
    }

    fn verify(&mut self, ctx: &RunContext, mirror: &str) -> Fallible<()> {
        self.run_chain(HookKind::Verify, ctx, mirror)
    }

    fn upgrade(&mut self, ctx: &RunContext, mirror: &str) -> Fallible<()> {
        self.run_chain(HookKind::Upgrade, ctx, mirror)
    }

    fn abort(&mut self, ctx: &RunContext, mirror: &str) -> Fallible<()> {
        self.run_all(HookKind::Abort, ctx, mirror)
    }
}

fn is_executable(path: &Path) -> bool {
    match fs::metadata(path) {
        Ok(meta) => meta.is_file() && meta.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}

/// Wait for a process-group leader up to `timeout`, killing its whole
/// group on expiry.
fn wait_bounded(child: &mut Child, timeout: Duration) -> Fallible<ExitStatus> {
    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        if start.elapsed() > timeout {
            let pgid = Pid::from_raw(child.id() as i32);
            if let Err(e) = signal::killpg(pgid, Signal::SIGKILL) {
                warn!("failed to kill hook group (pgid {}): {}", pgid, e);
                if let Err(e) = child.kill() {
                    warn!("failed to kill hook (pid {}): {}", child.id(), e);
                }
            }
            child.wait()?;
            bail!("timed out after {}ms", timeout.as_millis());
        }
        thread::sleep(POLL_INTERVAL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::update_agent::RunMode;
    use serial_test::serial;

    struct Fixture {
        tmpdir: tempfile::TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                tmpdir: tempfile::tempdir().unwrap(),
            }
        }

        fn root(&self) -> PathBuf {
            self.tmpdir.path().join("hooks")
        }

        fn log(&self) -> PathBuf {
            self.tmpdir.path().join("calls.log")
        }

        fn calls(&self) -> Vec<String> {
            match fs::read_to_string(self.log()) {
                Ok(s) => s.lines().map(String::from).collect(),
                Err(_) => vec![],
            }
        }

        /// Install a shell hook logging its name and arguments.
        fn hook(&self, kind: HookKind, name: &str, body: &str, mode: u32) {
            let dir = self.root().join(kind.dir_name());
            fs::create_dir_all(&dir).unwrap();
            let path = dir.join(name);
            let script = format!(
                "#!/bin/sh\necho \"{} $1\" >> '{}'\n{}\n",
                name,
                self.log().display(),
                body
            );
            fs::write(&path, script).unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(mode)).unwrap();
        }

        fn runner(&self, timeout: Option<Duration>) -> ProcessHooks {
            ProcessHooks::new(self.root(), timeout)
        }

        fn ctx(&self) -> RunContext {
            RunContext::sample(&["http://m/"], self.tmpdir.path().join("lock"), RunMode::Forced)
        }
    }

    #[test]
    #[serial]
    fn hooks_run_in_lexicographic_order() {
        let fx = Fixture::new();
        fx.hook(HookKind::Download, "20-second", "exit 0", 0o755);
        fx.hook(HookKind::Download, "10-first", "exit 0", 0o755);
        fx.hook(HookKind::Download, "30-third", "exit 0", 0o755);

        fx.runner(None).download(&fx.ctx(), "http://m/").unwrap();
        assert_eq!(
            fx.calls(),
            vec!["10-first http://m/", "20-second http://m/", "30-third http://m/"]
        );
    }

    #[test]
    #[serial]
    fn non_runnable_entries_are_skipped() {
        let fx = Fixture::new();
        fx.hook(HookKind::Upgrade, "10-run", "exit 0", 0o755);
        fx.hook(HookKind::Upgrade, "20-noexec", "exit 1", 0o644);
        fx.hook(HookKind::Upgrade, ".hidden", "exit 1", 0o755);
        fs::create_dir_all(fx.root().join("upgrade.d").join("30-subdir")).unwrap();

        fx.runner(None).upgrade(&fx.ctx(), "http://m/").unwrap();
        assert_eq!(fx.calls(), vec!["10-run http://m/"]);
    }

    #[test]
    #[serial]
    fn chain_stops_at_first_failure() {
        let fx = Fixture::new();
        fx.hook(HookKind::Download, "10-ok", "exit 0", 0o755);
        fx.hook(HookKind::Download, "20-fail", "exit 3", 0o755);
        fx.hook(HookKind::Download, "30-never", "exit 0", 0o755);

        assert!(fx.runner(None).download(&fx.ctx(), "http://m/").is_err());
        assert_eq!(fx.calls(), vec!["10-ok http://m/", "20-fail http://m/"]);
    }

    #[test]
    #[serial]
    fn abort_runs_every_hook() {
        let fx = Fixture::new();
        fx.hook(HookKind::Abort, "10-fail", "exit 1", 0o755);
        fx.hook(HookKind::Abort, "20-cleanup", "exit 0", 0o755);

        assert!(fx.runner(None).abort(&fx.ctx(), "http://m/").is_err());
        assert_eq!(fx.calls(), vec!["10-fail http://m/", "20-cleanup http://m/"]);
    }

    #[test]
    #[serial]
    fn missing_directory_means_no_hooks() {
        let fx = Fixture::new();
        let mut runner = fx.runner(None);
        runner.verify(&fx.ctx(), "http://m/").unwrap();
        runner.abort(&fx.ctx(), "http://m/").unwrap();
        assert!(fx.calls().is_empty());
    }

    #[test]
    #[serial]
    fn verify_hooks_see_trust_settings() {
        let fx = Fixture::new();
        let body = "[ \"$AUTOUPDATER_GOOD_SIGNATURES\" = 1 ] && \
                    [ \"$AUTOUPDATER_PUBKEYS\" = 'aaaa bbbb' ] && \
                    [ \"$AUTOUPDATER_MIRROR\" = \"$1\" ]";
        fx.hook(HookKind::Verify, "10-check", body, 0o755);

        fx.runner(None).verify(&fx.ctx(), "http://m/").unwrap();
        assert!(fx.runner(None).verify(&fx.ctx(), "http://other/").is_ok());

        let mut ctx = fx.ctx();
        ctx.good_signatures = 2;
        assert!(fx.runner(None).verify(&ctx, "http://m/").is_err());
    }

    #[test]
    #[serial]
    fn slow_hook_is_killed() {
        let fx = Fixture::new();
        fx.hook(HookKind::Download, "10-slow", "sleep 10", 0o755);

        let start = Instant::now();
        let res = fx
            .runner(Some(Duration::from_millis(200)))
            .download(&fx.ctx(), "http://m/");
        assert!(res.is_err());
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    #[serial]
    fn timeout_kills_hook_descendants() {
        let fx = Fixture::new();
        let marker = fx.tmpdir.path().join("late-write");
        let body = format!(
            "sh -c 'sleep 1; echo still-downloading > \"{}\"'",
            marker.display()
        );
        fx.hook(HookKind::Download, "10-fetch", &body, 0o755);

        let res = fx
            .runner(Some(Duration::from_millis(200)))
            .download(&fx.ctx(), "http://m/");
        assert!(res.is_err());

        thread::sleep(Duration::from_millis(1500));
        assert!(!marker.exists());
    }
}
