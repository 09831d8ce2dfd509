use super::{AptRepo, RepositoryRef};

/// Memoized listings for one run.
///
/// Owned by the adapter. Every mutating adapter operation calls
/// [`RepoCache::invalidate`] so later reads go back to the package manager.
#[derive(Debug, Default)]
pub struct RepoCache {
    enabled: Option<Vec<RepositoryRef>>,
    available: Option<Vec<RepositoryRef>>,
    policy: Option<Vec<AptRepo>>,
    generation: u64,
}

impl RepoCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enabled(&self) -> Option<&[RepositoryRef]> {
        self.enabled.as_deref()
    }

    pub fn set_enabled(&mut self, repos: Vec<RepositoryRef>) {
        self.enabled = Some(repos);
    }

    pub fn available(&self) -> Option<&[RepositoryRef]> {
        self.available.as_deref()
    }

    pub fn set_available(&mut self, repos: Vec<RepositoryRef>) {
        self.available = Some(repos);
    }

    pub(crate) fn policy(&self) -> Option<&[AptRepo]> {
        self.policy.as_deref()
    }

    pub(crate) fn set_policy(&mut self, entries: Vec<AptRepo>) {
        self.policy = Some(entries);
    }

    pub fn invalidate(&mut self) {
        self.enabled = None;
        self.available = None;
        self.policy = None;
        self.generation += 1;
    }

    /// Number of invalidations so far.
    #[cfg(test)]
    pub fn generation(&self) -> u64 {
        self.generation
    }
}
