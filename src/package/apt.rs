//! apt backend.
//!
//! Enabled repositories come from the source files; available ones from
//! `apt-cache policy`, which only lists sources whose indexes were downloaded.

use std::fs;
use std::path::{Path, PathBuf};

use super::runner::command_line;
use super::sources;
use super::{
    AdapterError, AptPattern, AptRepo, CommandRunner, InstallOptions, PackageManagerAdapter,
    PackageManagerKind, RepoCache, RepositoryRef,
};
use crate::ui::prelude::*;

/// Parse the "Package files" section of `apt-cache policy`.
pub fn parse_apt_cache_policy(output: &str) -> Vec<AptRepo> {
    let mut entries: Vec<AptRepo> = Vec::new();
    // Whether the last entry line was a remote source we kept
    let mut current: Option<usize> = None;

    for line in output.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("Pinned packages") {
            break;
        }
        if let Some(release) = trimmed.strip_prefix("release ") {
            if let Some(idx) = current {
                apply_release(&mut entries[idx], release);
            }
            continue;
        }

        let mut fields = trimmed.split_whitespace();
        let is_entry = fields.next().is_some_and(|p| p.parse::<i32>().is_ok());
        if !is_entry {
            continue;
        }
        current = None;
        let (Some(uri), Some(dist)) = (fields.next(), fields.next()) else {
            continue;
        };
        if !uri.contains(':') {
            // Local status files such as /var/lib/dpkg/status
            continue;
        }
        let (suite, component) = match dist.rsplit_once('/') {
            Some((suite, component)) if !suite.is_empty() && !component.is_empty() => {
                (suite, component)
            }
            _ => (dist, ""),
        };
        let repo = AptRepo::new(uri, suite, component);
        match entries.iter().position(|e| e.same_source(&repo)) {
            Some(idx) => current = Some(idx),
            None => {
                entries.push(repo);
                current = Some(entries.len() - 1);
            }
        }
    }
    entries
}

fn apply_release(entry: &mut AptRepo, release: &str) {
    for pair in release.split(',') {
        match pair.trim().split_once('=') {
            Some(("l", value)) => entry.label = Some(value.to_string()),
            Some(("n", value)) => entry.codename = Some(value.to_string()),
            _ => {}
        }
    }
}

pub struct AptAdapter {
    root: PathBuf,
    runner: Box<dyn CommandRunner>,
    cache: RepoCache,
}

impl AptAdapter {
    pub fn new(root: impl Into<PathBuf>, runner: Box<dyn CommandRunner>) -> Self {
        Self {
            root: root.into(),
            runner,
            cache: RepoCache::new(),
        }
    }

    #[cfg(test)]
    pub fn cache(&self) -> &RepoCache {
        &self.cache
    }

    fn apt_dir(&self) -> PathBuf {
        self.root.join("etc/apt")
    }

    fn files_with_extension(&self, extension: &str) -> Vec<PathBuf> {
        let pattern = format!("{}/sources.list.d/*.{}", self.apt_dir().display(), extension);
        let mut files: Vec<PathBuf> = glob::glob(&pattern)
            .map(|paths| paths.flatten().collect())
            .unwrap_or_default();
        files.sort();
        files
    }

    /// `sources.list` plus every `sources.list.d/*.list`.
    fn list_files(&self) -> Vec<PathBuf> {
        let mut files = vec![self.apt_dir().join("sources.list")];
        files.extend(self.files_with_extension("list"));
        files.into_iter().filter(|p| p.is_file()).collect()
    }

    fn deb822_files(&self) -> Vec<PathBuf> {
        self.files_with_extension("sources")
    }

    fn read(path: &Path) -> Result<String, AdapterError> {
        fs::read_to_string(path).map_err(|e| AdapterError::io(path, e))
    }

    fn write(path: &Path, content: &str) -> Result<(), AdapterError> {
        fs::write(path, content).map_err(|e| AdapterError::io(path, e))
    }

    /// Parsed `apt-cache policy`, memoized until the next mutation.
    fn policy(&mut self) -> Result<Vec<AptRepo>, AdapterError> {
        if let Some(entries) = self.cache.policy() {
            return Ok(entries.to_vec());
        }
        let argv = vec!["policy".to_string()];
        let command = command_line("apt-cache", &argv);
        let mut last_reason = String::new();
        for attempt in 0..2 {
            match self.runner.run("apt-cache", &argv) {
                Ok(out) if out.success() => {
                    let entries = parse_apt_cache_policy(&out.stdout);
                    self.cache.set_policy(entries.clone());
                    return Ok(entries);
                }
                Ok(out) => last_reason = out.reason(),
                Err(e) => last_reason = e.to_string(),
            }
            if attempt == 0 {
                emit(
                    Level::Debug,
                    "repocheck.adapter.retry",
                    &format!("{} failed ({}), retrying once", command, last_reason),
                    None,
                );
            }
        }
        Err(AdapterError::Unavailable {
            command,
            reason: last_reason,
        })
    }
}

impl PackageManagerAdapter for AptAdapter {
    fn kind(&self) -> PackageManagerKind {
        PackageManagerKind::Apt
    }

    fn list_enabled_repos(&mut self) -> Result<Vec<RepositoryRef>, AdapterError> {
        if let Some(repos) = self.cache.enabled() {
            return Ok(repos.to_vec());
        }
        let mut repos: Vec<AptRepo> = Vec::new();
        for path in self.list_files() {
            repos.extend(sources::parse_list(&Self::read(&path)?));
        }
        for path in self.deb822_files() {
            repos.extend(sources::parse_deb822(&Self::read(&path)?));
        }

        let mut unique: Vec<RepositoryRef> = Vec::new();
        for repo in repos {
            let repo = RepositoryRef::Apt(repo);
            if !unique.iter().any(|r| r.matches(&repo)) {
                unique.push(repo);
            }
        }
        self.cache.set_enabled(unique.clone());
        Ok(unique)
    }

    fn list_available_repos(&mut self) -> Result<Vec<RepositoryRef>, AdapterError> {
        if let Some(repos) = self.cache.available() {
            return Ok(repos.to_vec());
        }
        let repos: Vec<RepositoryRef> = self
            .policy()?
            .into_iter()
            .map(RepositoryRef::Apt)
            .collect();
        self.cache.set_available(repos.clone());
        Ok(repos)
    }

    fn enable_repo(&mut self, repo: &RepositoryRef) -> Result<bool, AdapterError> {
        let RepositoryRef::Apt(wanted) = repo else {
            return Ok(false);
        };
        if self.list_enabled_repos()?.iter().any(|r| r.matches(repo)) {
            return Ok(true);
        }
        for path in self.list_files() {
            let content = Self::read(&path)?;
            if let Some(updated) = sources::enable_list_entry(&content, wanted) {
                Self::write(&path, &updated)?;
                break;
            }
        }
        self.cache.invalidate();
        Ok(self.list_enabled_repos()?.iter().any(|r| r.matches(repo)))
    }

    fn has_config_manager_tool(&mut self) -> bool {
        true
    }

    fn install_config_manager_tool(&mut self) -> Result<(), AdapterError> {
        Ok(())
    }

    fn install_package(
        &mut self,
        target: &str,
        _opts: &InstallOptions,
    ) -> Result<(), AdapterError> {
        let (program, base_args) = PackageManagerKind::Apt.install_command();
        let mut argv: Vec<String> = base_args.iter().map(|s| s.to_string()).collect();
        argv.push(target.to_string());
        let result = self.runner.run(program, &argv);
        self.cache.invalidate();
        let out = result?;
        if out.success() {
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

    fn find_matching_repos(
        &mut self,
        pattern: &AptPattern,
    ) -> Result<Vec<RepositoryRef>, AdapterError> {
        Ok(self
            .policy()?
            .into_iter()
            .filter(|entry| pattern.matches(entry))
            .map(RepositoryRef::Apt)
            .collect())
    }

    fn disable_repo_pattern(&mut self, suite: &str) -> Result<usize, AdapterError> {
        let mut total = 0;
        for path in self.list_files() {
            let content = Self::read(&path)?;
            let (updated, changed) = sources::disable_list_suite(&content, suite);
            if changed > 0 {
                Self::write(&path, &updated)?;
                total += changed;
            }
        }
        self.cache.invalidate();
        Ok(total)
    }

    fn disable_suites_deb822(&mut self, suites: &[&str]) -> Result<usize, AdapterError> {
        let mut total = 0;
        for path in self.deb822_files() {
            let content = Self::read(&path)?;
            let (updated, changed) = sources::disable_deb822_suites(&content, suites);
            if changed > 0 {
                Self::write(&path, &updated)?;
                total += changed;
            }
        }
        self.cache.invalidate();
        Ok(total)
    }
}
