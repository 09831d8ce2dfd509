//! yum and dnf backends.

use std::path::PathBuf;

use super::mirror::{MigrationOutcome, MirrorMigration};
use super::runner::command_line;
use super::{
    AdapterError, CommandRunner, InstallOptions, PackageManagerAdapter, PackageManagerKind,
    RepoCache, RepositoryRef,
};
use crate::ui::prelude::*;

const SKIP_UNAVAILABLE: &str = "--setopt=*.skip_if_unavailable=True";

/// Output noise yum/dnf print around `repolist` tables.
const REPOLIST_NOISE: &[&str] = &[
    "Loaded plugins",
    "Loading mirror speeds",
    "Determining fastest mirrors",
    "Last metadata expiration",
    "repolist:",
    "This system is",
    " * ",
];

fn args(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// Parse the table printed by `yum repolist` / `dnf repolist`.
///
/// yum decorates ids with `!` (expired cache) or `*` and appends
/// `/$releasever/$basearch`; both are stripped.
pub fn parse_repolist(output: &str) -> Vec<RepositoryRef> {
    let mut lines: Vec<&str> = output.lines().collect();
    if let Some(header) = lines
        .iter()
        .position(|l| l.trim_start().starts_with("repo id"))
    {
        lines.drain(..=header);
    }

    let mut repos: Vec<RepositoryRef> = Vec::new();
    for line in lines {
        if line.trim().is_empty() || REPOLIST_NOISE.iter().any(|n| line.starts_with(n)) {
            continue;
        }
        let Some(token) = line.split_whitespace().next() else {
            continue;
        };
        let id = token.trim_start_matches(['!', '*']);
        let id = id.split('/').next().unwrap_or(id);
        if id.is_empty() {
            continue;
        }
        let repo = RepositoryRef::rpm(id);
        if !repos.contains(&repo) {
            repos.push(repo);
        }
    }
    repos
}

fn already_installed(output: &super::CommandOutput) -> bool {
    let text = format!("{}\n{}", output.stdout, output.stderr);
    text.contains("already installed") || text.contains("Nothing to do")
}

/// Adapter over the RPM family. yum and dnf share everything but command lines.
pub struct RpmAdapter {
    kind: PackageManagerKind,
    root: PathBuf,
    runner: Box<dyn CommandRunner>,
    cache: RepoCache,
}

impl RpmAdapter {
    pub fn new(
        kind: PackageManagerKind,
        root: impl Into<PathBuf>,
        runner: Box<dyn CommandRunner>,
    ) -> Self {
        Self {
            kind,
            root: root.into(),
            runner,
            cache: RepoCache::new(),
        }
    }

    #[cfg(test)]
    pub fn cache(&self) -> &RepoCache {
        &self.cache
    }

    fn binary(&self) -> &'static str {
        self.kind.binary()
    }

    /// Run a query, retrying once with the skip-unavailable flavor.
    fn query(&self, primary: &[&str], fallback: &[&str]) -> Result<String, AdapterError> {
        let program = self.binary();
        match self.runner.run(program, &args(primary)) {
            Ok(out) if out.success() => return Ok(out.stdout),
            Ok(out) => emit(
                Level::Debug,
                "repocheck.adapter.retry",
                &format!(
                    "{} failed ({}), retrying with unavailable repositories skipped",
                    command_line(program, &args(primary)),
                    out.reason()
                ),
                None,
            ),
            Err(e) => emit(
                Level::Debug,
                "repocheck.adapter.retry",
                &format!("{}, retrying with unavailable repositories skipped", e),
                None,
            ),
        }

        let fallback = args(fallback);
        let command = command_line(program, &fallback);
        let out = self.runner.run(program, &fallback)?;
        if out.success() {
            Ok(out.stdout)
        } else {
            Err(AdapterError::Unavailable {
                command,
                reason: out.reason(),
            })
        }
    }

    fn is_enabled(&mut self, id: &str) -> Result<bool, AdapterError> {
        let wanted = RepositoryRef::rpm(id);
        Ok(self.list_enabled_repos()?.iter().any(|r| r.matches(&wanted)))
    }

    /// Run a mutating command, invalidate, then verify the repository is enabled.
    fn toggle_and_verify(
        &mut self,
        id: &str,
        program: &str,
        argv: &[&str],
    ) -> Result<bool, AdapterError> {
        if self.is_enabled(id)? {
            return Ok(true);
        }
        let argv = args(argv);
        match self.runner.run(program, &argv) {
            Ok(out) if !out.success() => emit(
                Level::Debug,
                "repocheck.adapter.enable",
                &format!("{}: {}", command_line(program, &argv), out.reason()),
                None,
            ),
            Ok(_) => {}
            Err(e) => emit(Level::Debug, "repocheck.adapter.enable", &e.to_string(), None),
        }
        self.cache.invalidate();
        self.is_enabled(id)
    }
}

impl PackageManagerAdapter for RpmAdapter {
    fn kind(&self) -> PackageManagerKind {
        self.kind
    }

    fn list_enabled_repos(&mut self) -> Result<Vec<RepositoryRef>, AdapterError> {
        if let Some(repos) = self.cache.enabled() {
            return Ok(repos.to_vec());
        }
        let stdout = self.query(
            &["-C", "-q", "repolist", "enabled"],
            &["-q", "repolist", "enabled", SKIP_UNAVAILABLE],
        )?;
        let repos = parse_repolist(&stdout);
        self.cache.set_enabled(repos.clone());
        Ok(repos)
    }

    fn list_available_repos(&mut self) -> Result<Vec<RepositoryRef>, AdapterError> {
        if let Some(repos) = self.cache.available() {
            return Ok(repos.to_vec());
        }
        let stdout = self.query(
            &["-q", "repolist", "enabled"],
            &["-q", "repolist", "enabled", SKIP_UNAVAILABLE],
        )?;
        let repos = parse_repolist(&stdout);
        self.cache.set_available(repos.clone());
        Ok(repos)
    }

    fn enable_repo(&mut self, repo: &RepositoryRef) -> Result<bool, AdapterError> {
        let RepositoryRef::Rpm(id) = repo else {
            return Ok(false);
        };
        match self.kind {
            PackageManagerKind::Yum => {
                self.toggle_and_verify(id, "yum-config-manager", &["--enable", id])
            }
            _ => self.toggle_and_verify(id, "dnf", &["config-manager", "--set-enabled", id]),
        }
    }

    fn has_config_manager_tool(&mut self) -> bool {
        match self.kind {
            PackageManagerKind::Yum => self.runner.has_program("yum-config-manager"),
            _ => self
                .runner
                .run("dnf", &args(&["config-manager", "--help"]))
                .map(|out| out.success())
                .unwrap_or(false),
        }
    }

    fn install_config_manager_tool(&mut self) -> Result<(), AdapterError> {
        match self.kind.config_manager_package() {
            Some(package) => self.install_package(package, &InstallOptions::default()),
            None => Ok(()),
        }
    }

    fn install_package(
        &mut self,
        target: &str,
        opts: &InstallOptions,
    ) -> Result<(), AdapterError> {
        let (program, base_args) = self.kind.install_command();
        let mut argv = args(base_args);
        argv.extend(opts.enable_repos.iter().map(|r| format!("--enablerepo={}", r)));
        argv.push(target.to_string());

        let result = self.runner.run(program, &argv);
        self.cache.invalidate();
        let out = result?;
        if out.success() || already_installed(&out) {
            Ok(())
        } else {
            Err(AdapterError::Unavailable {
                command: command_line(program, &argv),
                reason: out.reason(),
            })
        }
    }

    fn invalidate(&mut self) {
        self.cache.invalidate();
    }

    fn enable_subscription_repo(&mut self, id: &str) -> Result<bool, AdapterError> {
        self.toggle_and_verify(id, "subscription-manager", &["repos", "--enable", id])
    }

    fn refresh_repos(&mut self, pattern: &str) -> Result<(), AdapterError> {
        let argv = vec![
            "-q".to_string(),
            "makecache".to_string(),
            "--disablerepo=*".to_string(),
            format!("--enablerepo={}", pattern),
        ];
        let result = self.runner.run(self.binary(), &argv);
        self.cache.invalidate();
        let out = result?;
        if out.success() {
            Ok(())
        } else {
            Err(AdapterError::Unavailable {
                command: command_line(self.binary(), &argv),
                reason: out.reason(),
            })
        }
    }

    fn rewrite_mirror_urls(
        &mut self,
        old_host: &str,
        new_host: &str,
    ) -> Result<MigrationOutcome, AdapterError> {
        let dir = self.root.join("etc/yum.repos.d");
        let outcome = MirrorMigration::prepare(&dir, old_host, new_host)?.run();
        if !outcome.changed_files.is_empty() {
            self.cache.invalidate();
        }
        Ok(outcome)
    }
}
