//! Package manager backend families.

/// Which command-line tool family manages repositories on the host.
///
/// Selected once from the detected platform and never switched mid-run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PackageManagerKind {
    /// yum - RHEL/CentOS 7 and Amazon Linux 2, metadata cache based
    Yum,
    /// dnf - RHEL 8+ family and Fedora
    Dnf,
    /// APT - Debian/Ubuntu family
    Apt,
}

impl PackageManagerKind {
    /// Binary that performs queries and installs.
    pub fn binary(&self) -> &'static str {
        match self {
            Self::Yum => "yum",
            Self::Dnf => "dnf",
            Self::Apt => "apt-get",
        }
    }

    /// Get the install command prefix for this package manager.
    pub fn install_command(&self) -> (&'static str, &'static [&'static str]) {
        match self {
            Self::Yum => ("yum", &["-y", "install"]),
            Self::Dnf => ("dnf", &["-y", "install"]),
            Self::Apt => ("apt-get", &["-y", "install"]),
        }
    }

    /// Package that provides the repository toggling tool, if the backend needs one.
    pub fn config_manager_package(&self) -> Option<&'static str> {
        match self {
            Self::Yum => Some("yum-utils"),
            Self::Dnf => Some("dnf-plugins-core"),
            Self::Apt => None,
        }
    }

    /// Get a human-readable name for this package manager.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Yum => "YUM",
            Self::Dnf => "DNF",
            Self::Apt => "APT",
        }
    }
}

impl std::fmt::Display for PackageManagerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}
