use crate::package::RepositoryRef;
use crate::policy::checks::adapter_unavailable;
use crate::policy::{CheckContext, CheckOutcome, ErrorKind, Finding, PolicyCheck};

/// Enabled repositories that are missing from the available set, in
/// enabled-listing order.
pub fn broken_repos(enabled: &[RepositoryRef], available: &[RepositoryRef]) -> Vec<RepositoryRef> {
    enabled
        .iter()
        .filter(|repo| !available.iter().any(|a| a.matches(repo)))
        .cloned()
        .collect()
}

/// Repositories the package manager would consult but could not fetch.
#[derive(Debug, Default, Clone, Copy)]
pub struct BrokenReposCheck;

impl PolicyCheck for BrokenReposCheck {
    fn id(&self) -> &'static str {
        "broken-repos"
    }

    fn name(&self) -> &'static str {
        "Unreachable repositories"
    }

    fn run(&self, ctx: &mut CheckContext<'_>) -> Vec<CheckOutcome> {
        let enabled = match ctx.adapter.list_enabled_repos() {
            Ok(repos) => repos,
            Err(e) => return vec![adapter_unavailable(&e)],
        };
        let available = match ctx.adapter.list_available_repos() {
            Ok(repos) => repos,
            Err(e) => return vec![adapter_unavailable(&e)],
        };

        let broken = broken_repos(&enabled, &available);
        if broken.is_empty() {
            return vec![CheckOutcome::Ok];
        }
        broken
            .into_iter()
            .map(|repo| {
                let message = format!(
                    "Repository {} is enabled but its metadata could not be downloaded. \
                     Fix or disable {} and retry.",
                    repo, repo
                );
                CheckOutcome::Warn(Finding::new(ErrorKind::RepoNotCached, Some(repo), message))
            })
            .collect()
    }
}
