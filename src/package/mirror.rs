//! End-of-life mirror migration for yum/dnf `.repo` files.
//!
//! The migration is a scoped operation: [`MirrorMigration::run`] takes the
//! backup first and only rewrites files when the backup succeeded. Problems
//! are recorded in the returned [`MigrationOutcome`] instead of aborting.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::AdapterError;

/// What a migration did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MigrationOutcome {
    pub backup: Option<PathBuf>,
    pub changed_files: Vec<PathBuf>,
    pub errors: Vec<String>,
}

impl MigrationOutcome {
    pub fn is_noop(&self) -> bool {
        self.backup.is_none() && self.changed_files.is_empty() && self.errors.is_empty()
    }
}

pub struct MirrorMigration<'a> {
    dir: PathBuf,
    old_host: &'a str,
    new_host: &'a str,
    affected: Vec<PathBuf>,
}

fn baseurl_body(line: &str) -> Option<&str> {
    let body = line.trim_start().trim_start_matches('#').trim_start();
    let (key, _) = body.split_once('=')?;
    (key.trim() == "baseurl").then_some(body)
}

fn mentions_old_host(content: &str, old_host: &str) -> bool {
    content
        .lines()
        .filter_map(baseurl_body)
        .any(|body| body.contains(old_host))
}

/// Rewrite one `.repo` file. Returns `None` when nothing references `old_host`.
///
/// In every section whose `baseurl` points at `old_host`, the baseurl is
/// uncommented and moved to `new_host` and active `mirrorlist=` lines are
/// commented out.
pub fn rewrite_repo_content(content: &str, old_host: &str, new_host: &str) -> Option<String> {
    let lines: Vec<&str> = content.lines().collect();
    let mut section_of = Vec::with_capacity(lines.len());
    let mut section = 0usize;
    let mut affected = HashSet::new();

    for line in &lines {
        if line.trim_start().starts_with('[') {
            section += 1;
        }
        section_of.push(section);
        if baseurl_body(line).is_some_and(|body| body.contains(old_host)) {
            affected.insert(section);
        }
    }

    if affected.is_empty() {
        return None;
    }

    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    for (line, section) in lines.iter().zip(section_of) {
        if !affected.contains(&section) {
            out.push(line.to_string());
            continue;
        }
        let trimmed = line.trim_start();
        if let Some(body) = baseurl_body(line).filter(|body| body.contains(old_host)) {
            out.push(body.replace(old_host, new_host));
        } else if trimmed.starts_with("mirrorlist") && trimmed.contains('=') {
            out.push(format!("#{}", trimmed));
        } else {
            out.push(line.to_string());
        }
    }

    let mut rewritten = out.join("\n");
    if content.ends_with('\n') {
        rewritten.push('\n');
    }
    Some(rewritten)
}

impl<'a> MirrorMigration<'a> {
    /// Scan `dir` for `.repo` files that reference `old_host`.
    pub fn prepare(
        dir: &Path,
        old_host: &'a str,
        new_host: &'a str,
    ) -> Result<Self, AdapterError> {
        let mut affected = Vec::new();
        if dir.is_dir() {
            let pattern = format!("{}/*.repo", dir.display());
            let entries = glob::glob(&pattern).map_err(|e| {
                AdapterError::io(dir, std::io::Error::new(std::io::ErrorKind::InvalidInput, e))
            })?;
            for path in entries.flatten() {
                let content =
                    fs::read_to_string(&path).map_err(|e| AdapterError::io(&path, e))?;
                if mentions_old_host(&content, old_host) {
                    affected.push(path);
                }
            }
        }
        affected.sort();
        Ok(Self {
            dir: dir.to_path_buf(),
            old_host,
            new_host,
            affected,
        })
    }

    pub fn needed(&self) -> bool {
        !self.affected.is_empty()
    }

    fn backup_path(&self) -> PathBuf {
        let stamp = chrono::Utc::now().format("%Y%m%d%H%M%S");
        let name = self
            .dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "repos".to_string());
        let base = self.dir.with_file_name(format!("{}.repocheck-{}", name, stamp));
        let mut candidate = base.clone();
        let mut n = 1;
        while candidate.exists() {
            candidate = PathBuf::from(format!("{}-{}", base.display(), n));
            n += 1;
        }
        candidate
    }

    /// Copy the whole configuration directory next to itself.
    pub fn backup(&self) -> Result<PathBuf, AdapterError> {
        let target = self.backup_path();
        for entry in WalkDir::new(&self.dir) {
            let entry = entry.map_err(|e| {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| self.dir.clone());
                AdapterError::io(path, std::io::Error::other(e.to_string()))
            })?;
            let Ok(relative) = entry.path().strip_prefix(&self.dir) else {
                continue;
            };
            let dest = target.join(relative);
            if entry.file_type().is_dir() {
                fs::create_dir_all(&dest).map_err(|e| AdapterError::io(&dest, e))?;
            } else {
                fs::copy(entry.path(), &dest).map_err(|e| AdapterError::io(&dest, e))?;
            }
        }
        Ok(target)
    }

    fn rewrite(&self, outcome: &mut MigrationOutcome) {
        for path in &self.affected {
            let result = fs::read_to_string(path).and_then(|content| {
                match rewrite_repo_content(&content, self.old_host, self.new_host) {
                    Some(new_content) => fs::write(path, new_content).map(|_| true),
                    None => Ok(false),
                }
            });
            match result {
                Ok(true) => outcome.changed_files.push(path.clone()),
                Ok(false) => {}
                Err(e) => outcome.errors.push(format!("{}: {}", path.display(), e)),
            }
        }
    }

    /// Back up, then rewrite. A no-op when no file references the old host.
    pub fn run(self) -> MigrationOutcome {
        let mut outcome = MigrationOutcome::default();
        if !self.needed() {
            return outcome;
        }
        match self.backup() {
            Ok(path) => outcome.backup = Some(path),
            Err(e) => {
                outcome.errors.push(format!("backup failed, nothing rewritten: {}", e));
                return outcome;
            }
        }
        self.rewrite(&mut outcome);
        outcome
    }
}
