use crate::package::{AptPattern, RepositoryRef};
use crate::policy::checks::adapter_unavailable;
use crate::policy::{CheckContext, CheckOutcome, ErrorKind, Finding, Mode, PolicyCheck};

/// Whether an archive codename belongs to the host release
/// (`bookworm`, `bookworm-security`, `jammy-updates`, ...).
pub fn same_release(archive_codename: &str, host_codename: &str) -> bool {
    archive_codename == host_codename
        || archive_codename
            .strip_prefix(host_codename)
            .is_some_and(|rest| rest.starts_with('-'))
}

/// Distribution archives that belong to a different release or a different
/// distribution than the host.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedReposCheck;

impl PolicyCheck for UnsupportedReposCheck {
    fn id(&self) -> &'static str {
        "unsupported-repos"
    }

    fn name(&self) -> &'static str {
        "Repositories from other releases"
    }

    fn run(&self, ctx: &mut CheckContext<'_>) -> Vec<CheckOutcome> {
        let Some(host) = ctx.platform.codename().map(str::to_string) else {
            return vec![CheckOutcome::Ok];
        };

        let os = ctx.platform.os.clone();
        let mut foreign: Vec<(RepositoryRef, String)> = Vec::new();

        for label in os.archive_labels() {
            let matches = match ctx.adapter.find_matching_repos(&labelled(label)) {
                Ok(matches) => matches,
                Err(e) => return vec![adapter_unavailable(&e)],
            };
            for repo in matches {
                let RepositoryRef::Apt(entry) = &repo else {
                    continue;
                };
                let Some(codename) = entry.codename.clone() else {
                    continue;
                };
                if !same_release(&codename, &host) {
                    foreign.push((repo, codename));
                }
            }
        }

        for label in os.foreign_archive_labels() {
            let matches = match ctx.adapter.find_matching_repos(&labelled(label)) {
                Ok(matches) => matches,
                Err(e) => return vec![adapter_unavailable(&e)],
            };
            for repo in matches {
                let target = match &repo {
                    RepositoryRef::Apt(entry) => match &entry.codename {
                        Some(codename) => format!("{} {}", label, codename),
                        None => label.to_string(),
                    },
                    RepositoryRef::Rpm(_) => continue,
                };
                foreign.push((repo, target));
            }
        }

        if foreign.is_empty() {
            return vec![CheckOutcome::Ok];
        }
        foreign
            .into_iter()
            .map(|(repo, target)| {
                let message = format!(
                    "Repository {} is for {} but this system runs {} {}. Remove it and retry.",
                    repo, target, os, host
                );
                let finding = Finding::new(ErrorKind::RepoNotSupported, Some(repo), message);
                match ctx.mode {
                    Mode::Install => CheckOutcome::Fatal(finding),
                    Mode::Check => CheckOutcome::Warn(finding),
                }
            })
            .collect()
    }
}

fn labelled(label: &str) -> AptPattern {
    AptPattern {
        label: Some(label.to_string()),
        ..Default::default()
    }
}
