//! Repository policies: what each platform requires and how it is enforced.

use colored::*;
use std::fmt::Display;
use std::ops::{BitOr, BitOrAssign};

use crate::common::distro::PlatformInfo;
use crate::package::{PackageManagerAdapter, RepositoryRef};

pub mod checks;
pub mod registry;
pub mod run;

/// Whether ambiguous findings block installation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Report-only run (`""` / `check`)
    #[default]
    Check,
    /// Pre-install run (`install`)
    Install,
}

impl Mode {
    pub fn from_arg(arg: Option<&str>) -> Option<Self> {
        match arg.map(str::trim) {
            None | Some("") | Some("check") => Some(Self::Check),
            Some("install") => Some(Self::Install),
            Some(_) => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Check => "check",
            Self::Install => "install",
        }
    }
}

/// Exit status bits. Combining never clears a bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Status(u8);

impl Status {
    pub const OK: Status = Status(0);
    pub const WARN: Status = Status(1);
    pub const FATAL: Status = Status(2);

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn has_warning(self) -> bool {
        self.0 & Self::WARN.0 != 0
    }

    pub fn is_fatal(self) -> bool {
        self.0 & Self::FATAL.0 != 0
    }

    pub fn exit_code(self) -> i32 {
        i32::from(self.0)
    }
}

impl BitOr for Status {
    type Output = Status;

    fn bitor(self, rhs: Status) -> Status {
        Status(self.0 | rhs.0)
    }
}

impl BitOrAssign for Status {
    fn bitor_assign(&mut self, rhs: Status) {
        self.0 |= rhs.0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    DetectionIncomplete,
    AdapterUnavailable,
    RepoNotEnabled,
    RepoNotCached,
    RepoNotSupported,
    ConfigManagerMissing,
}

impl ErrorKind {
    /// Value of the `errtype` field in failure reports.
    ///
    /// `AdapterUnavailable` has no category of its own: the package manager
    /// state could not be read, which the installer treats like an uncached repo.
    pub fn errtype(&self) -> &'static str {
        match self {
            Self::RepoNotCached | Self::AdapterUnavailable | Self::DetectionIncomplete => {
                "reponotcached"
            }
            Self::RepoNotEnabled => "reponotenabled",
            Self::RepoNotSupported => "reponotsupported",
            Self::ConfigManagerMissing => "configmanagernotinstalled",
        }
    }
}

/// Details of a warning or fatal outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub kind: ErrorKind,
    pub repo: Option<RepositoryRef>,
    /// Human readable problem plus remediation hint
    pub message: String,
}

impl Finding {
    pub fn new(kind: ErrorKind, repo: Option<RepositoryRef>, message: impl Into<String>) -> Self {
        Self {
            kind,
            repo,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    Ok,
    Warn(Finding),
    Fatal(Finding),
}

impl CheckOutcome {
    pub fn status(&self) -> Status {
        match self {
            Self::Ok => Status::OK,
            Self::Warn(_) => Status::WARN,
            Self::Fatal(_) => Status::FATAL,
        }
    }

    pub fn finding(&self) -> Option<&Finding> {
        match self {
            Self::Ok => None,
            Self::Warn(f) | Self::Fatal(f) => Some(f),
        }
    }

    #[cfg(test)]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }

    pub fn color_status(&self) -> impl Display {
        match self {
            Self::Ok => "OK".green(),
            Self::Warn(_) => "WARN".yellow(),
            Self::Fatal(_) => "FATAL".red(),
        }
    }
}

/// Settings checks need beyond the platform itself.
#[derive(Debug, Clone, Default)]
pub struct CheckSettings {
    /// Base URL of a vendor mirror carrying `epel-release` RPMs
    pub vendor_mirror: Option<String>,
}

/// Everything a check may look at or act on.
pub struct CheckContext<'a> {
    pub platform: &'a PlatformInfo,
    pub adapter: &'a mut dyn PackageManagerAdapter,
    pub mode: Mode,
    pub settings: &'a CheckSettings,
}

impl CheckContext<'_> {
    /// Substitute `{major}`, `{machine}`, `{arch}` and `{codename}` in a template.
    pub fn expand(&self, template: &str) -> String {
        template
            .replace("{major}", &self.platform.major_version.to_string())
            .replace("{machine}", &self.platform.machine)
            .replace("{arch}", &self.platform.architecture)
            .replace("{codename}", self.platform.codename().unwrap_or(""))
    }
}

/// One rule of a repository policy.
///
/// Checks are idempotent: running one twice without outside changes yields the
/// same outcomes and performs no further mutation.
pub trait PolicyCheck: Send + Sync {
    /// Stable identifier, e.g. `epel`.
    fn id(&self) -> &'static str;

    fn name(&self) -> &'static str;

    /// Evaluate and remediate. Returns at least one outcome.
    fn run(&self, ctx: &mut CheckContext<'_>) -> Vec<CheckOutcome>;

    /// A fatal outcome of a gate check skips the rest of the policy.
    fn is_gate(&self) -> bool {
        false
    }

    /// Short description for `--list-policies`.
    fn describe(&self) -> String {
        self.name().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_bits_combine() {
        let mut status = Status::OK;
        status |= Status::WARN;
        status |= Status::FATAL;
        assert_eq!(status.bits(), 3);
        assert!(status.is_fatal());
        assert!(status.has_warning());

        assert_eq!((Status::WARN | Status::WARN).bits(), 1);
        assert!(!(Status::WARN | Status::OK).is_fatal());
    }

    #[test]
    fn fatal_is_never_downgraded() {
        let mut status = Status::FATAL;
        status |= Status::OK;
        status |= Status::WARN;
        assert!(status.is_fatal());
    }

    #[test]
    fn mode_parsing() {
        assert_eq!(Mode::from_arg(None), Some(Mode::Check));
        assert_eq!(Mode::from_arg(Some("")), Some(Mode::Check));
        assert_eq!(Mode::from_arg(Some("install")), Some(Mode::Install));
        assert_eq!(Mode::from_arg(Some("upgrade")), None);
    }

    #[test]
    fn errtypes_are_from_the_fixed_set() {
        let allowed = [
            "reponotcached",
            "reponotenabled",
            "reponotsupported",
            "configmanagernotinstalled",
        ];
        for kind in [
            ErrorKind::DetectionIncomplete,
            ErrorKind::AdapterUnavailable,
            ErrorKind::RepoNotEnabled,
            ErrorKind::RepoNotCached,
            ErrorKind::RepoNotSupported,
            ErrorKind::ConfigManagerMissing,
        ] {
            assert!(allowed.contains(&kind.errtype()));
        }
    }
}
