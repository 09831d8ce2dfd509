//! Uniform capability surface over the host package manager.
//!
//! # Architecture
//!
//! - [`PackageManagerKind`]: the three supported backend families
//! - [`PackageManagerAdapter`]: operations the policy checks drive
//! - [`RpmAdapter`]: yum and dnf, which differ only in command lines
//! - [`AptAdapter`]: apt, backed by the source files and `apt-cache policy`
//! - [`CommandRunner`]: process execution seam (duct in production)
//!
//! Every adapter owns a [`RepoCache`]. Mutating operations invalidate it
//! before returning, so a listing read after a mutation is always fresh.

mod apt;
mod cache;
mod error;
mod manager;
mod mirror;
mod rpm;
mod runner;
mod sources;

pub use apt::AptAdapter;
pub use cache::RepoCache;
pub use error::AdapterError;
pub use manager::PackageManagerKind;
pub use mirror::MigrationOutcome;
pub use rpm::RpmAdapter;
pub use runner::{CommandOutput, CommandRunner, DuctRunner};

#[cfg(test)]
pub use runner::fake::FakeRunner;

#[cfg(test)]
pub(crate) use apt::tests::BOOKWORM_POLICY;

use std::fmt;
use std::path::PathBuf;

use crate::common::distro::PlatformInfo;

/// An apt source, as configured in a sources file or reported by `apt-cache policy`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AptRepo {
    pub uri: String,
    pub suite: String,
    pub component: String,
    /// Release label (`l=`), only known for cached entries
    pub label: Option<String>,
    /// Release codename (`n=`), only known for cached entries
    pub codename: Option<String>,
}

impl AptRepo {
    pub fn new(uri: &str, suite: &str, component: &str) -> Self {
        Self {
            uri: normalize_uri(uri),
            suite: suite.to_string(),
            component: component.to_string(),
            label: None,
            codename: None,
        }
    }

    /// Same source location, ignoring release metadata.
    pub fn same_source(&self, other: &AptRepo) -> bool {
        self.uri == other.uri && self.suite == other.suite && self.component == other.component
    }
}

pub(crate) fn normalize_uri(uri: &str) -> String {
    uri.trim().trim_end_matches('/').to_string()
}

/// Opaque repository identifier. Matching is backend specific.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepositoryRef {
    Rpm(String),
    Apt(AptRepo),
}

impl RepositoryRef {
    pub fn rpm(id: impl Into<String>) -> Self {
        Self::Rpm(id.into())
    }

    pub fn matches(&self, other: &RepositoryRef) -> bool {
        match (self, other) {
            (Self::Rpm(a), Self::Rpm(b)) => a == b,
            (Self::Apt(a), Self::Apt(b)) => a.same_source(b),
            _ => false,
        }
    }
}

impl fmt::Display for RepositoryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rpm(id) => write!(f, "{}", id),
            Self::Apt(repo) if repo.component.is_empty() => {
                write!(f, "{} {}", repo.uri, repo.suite)
            }
            Self::Apt(repo) => write!(f, "{} {}/{}", repo.uri, repo.suite, repo.component),
        }
    }
}

/// Structured apt match. `None` fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AptPattern {
    pub label: Option<String>,
    pub suite: Option<String>,
    pub component: Option<String>,
}

impl AptPattern {
    pub fn matches(&self, repo: &AptRepo) -> bool {
        fn field(want: &Option<String>, have: Option<&str>) -> bool {
            match want {
                None => true,
                Some(want) => have == Some(want.as_str()),
            }
        }
        field(&self.label, repo.label.as_deref())
            && field(&self.suite, Some(repo.suite.as_str()))
            && field(&self.component, Some(repo.component.as_str()))
    }
}

/// Extra switches for [`PackageManagerAdapter::install_package`].
#[derive(Debug, Clone, Default)]
pub struct InstallOptions {
    /// Repositories to enable for this transaction only
    pub enable_repos: Vec<String>,
}

/// Capability surface shared by all backends.
///
/// Backend specific operations have default implementations that report
/// [`AdapterError::Unsupported`]; the registry only wires checks that use them
/// to platforms whose backend provides them.
pub trait PackageManagerAdapter {
    fn kind(&self) -> PackageManagerKind;

    /// Repositories the package manager would consult, reachable or not.
    fn list_enabled_repos(&mut self) -> Result<Vec<RepositoryRef>, AdapterError>;

    /// Repositories that were actually fetched/cached.
    fn list_available_repos(&mut self) -> Result<Vec<RepositoryRef>, AdapterError>;

    /// Enable a repository. Returns whether it is enabled afterwards.
    fn enable_repo(&mut self, repo: &RepositoryRef) -> Result<bool, AdapterError>;

    fn has_config_manager_tool(&mut self) -> bool;

    fn install_config_manager_tool(&mut self) -> Result<(), AdapterError>;

    /// Install a package by name or URL. Already installed counts as success.
    fn install_package(&mut self, target: &str, opts: &InstallOptions)
    -> Result<(), AdapterError>;

    /// Drop every memoized listing.
    fn invalidate(&mut self);

    fn enable_subscription_repo(&mut self, _id: &str) -> Result<bool, AdapterError> {
        Err(AdapterError::Unsupported("enable_subscription_repo"))
    }

    fn refresh_repos(&mut self, _pattern: &str) -> Result<(), AdapterError> {
        Err(AdapterError::Unsupported("refresh_repos"))
    }

    fn rewrite_mirror_urls(
        &mut self,
        _old_host: &str,
        _new_host: &str,
    ) -> Result<MigrationOutcome, AdapterError> {
        Err(AdapterError::Unsupported("rewrite_mirror_urls"))
    }

    fn find_matching_repos(
        &mut self,
        _pattern: &AptPattern,
    ) -> Result<Vec<RepositoryRef>, AdapterError> {
        Err(AdapterError::Unsupported("find_matching_repos"))
    }

    /// Comment out one-line sources for `suite`. Returns the number of lines changed.
    fn disable_repo_pattern(&mut self, _suite: &str) -> Result<usize, AdapterError> {
        Err(AdapterError::Unsupported("disable_repo_pattern"))
    }

    /// Remove suites from deb822 stanzas. Returns the number of stanzas changed.
    fn disable_suites_deb822(&mut self, _suites: &[&str]) -> Result<usize, AdapterError> {
        Err(AdapterError::Unsupported("disable_suites_deb822"))
    }
}

/// Build the adapter for a detected platform. Chosen once per run.
pub fn adapter_for(
    platform: &PlatformInfo,
    root: impl Into<PathBuf>,
    runner: Box<dyn CommandRunner>,
) -> Box<dyn PackageManagerAdapter> {
    match platform.package_manager {
        PackageManagerKind::Yum | PackageManagerKind::Dnf => {
            Box::new(RpmAdapter::new(platform.package_manager, root, runner))
        }
        PackageManagerKind::Apt => Box::new(AptAdapter::new(root, runner)),
    }
}
