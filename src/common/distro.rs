use std::fs;
use std::path::PathBuf;
use thiserror::Error;

use crate::package::PackageManagerKind;

/// Detected distribution, normalized from the os-release `ID` field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatingSystem {
    /// Red Hat Enterprise Linux
    Rhel,
    /// CentOS (Linux and Stream)
    CentOS,
    /// Rocky Linux
    Rocky,
    /// AlmaLinux
    AlmaLinux,
    /// Oracle Linux
    OracleLinux,
    /// Amazon Linux
    Amazon,
    /// Fedora
    Fedora,
    /// Debian
    Debian,
    /// Ubuntu
    Ubuntu,
    /// Unknown distribution with ID
    Unknown(String),
}

impl OperatingSystem {
    fn from_id(id: &str) -> Self {
        match id {
            "rhel" => Self::Rhel,
            "centos" => Self::CentOS,
            "rocky" => Self::Rocky,
            "almalinux" => Self::AlmaLinux,
            "ol" => Self::OracleLinux,
            "amzn" => Self::Amazon,
            "fedora" => Self::Fedora,
            "debian" => Self::Debian,
            "ubuntu" => Self::Ubuntu,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// Identifier used to build policy keys (`rocky9`, `debian`, ...).
    pub fn id(&self) -> &str {
        match self {
            Self::Rhel => "rhel",
            Self::CentOS => "centos",
            Self::Rocky => "rocky",
            Self::AlmaLinux => "almalinux",
            Self::OracleLinux => "ol",
            Self::Amazon => "amzn",
            Self::Fedora => "fedora",
            Self::Debian => "debian",
            Self::Ubuntu => "ubuntu",
            Self::Unknown(id) => id,
        }
    }

    /// Returns true for the RHEL rebuild family (everything that follows RHEL major versions).
    pub fn is_rhel_like(&self) -> bool {
        matches!(
            self,
            Self::Rhel | Self::CentOS | Self::Rocky | Self::AlmaLinux | Self::OracleLinux
        )
    }

    /// Archive labels (`l=`) apt reports for the distribution's own repositories.
    pub fn archive_labels(&self) -> &'static [&'static str] {
        match self {
            Self::Debian => &["Debian", "Debian-Security", "Debian Backports"],
            Self::Ubuntu => &["Ubuntu"],
            _ => &[],
        }
    }

    /// Archive labels of the other apt distributions; never valid on this host.
    pub fn foreign_archive_labels(&self) -> &'static [&'static str] {
        match self {
            Self::Debian => Self::Ubuntu.archive_labels(),
            Self::Ubuntu => Self::Debian.archive_labels(),
            _ => &[],
        }
    }

    /// Pick the package manager backend for a given major version.
    pub fn package_manager(&self, major_version: u32) -> Option<PackageManagerKind> {
        match self {
            Self::Debian | Self::Ubuntu => Some(PackageManagerKind::Apt),
            Self::Fedora => Some(PackageManagerKind::Dnf),
            Self::Amazon if major_version <= 2 => Some(PackageManagerKind::Yum),
            Self::Amazon => Some(PackageManagerKind::Dnf),
            _ if self.is_rhel_like() && major_version <= 7 => Some(PackageManagerKind::Yum),
            _ if self.is_rhel_like() => Some(PackageManagerKind::Dnf),
            _ => None,
        }
    }

    /// Get the display name of the operating system
    pub fn name(&self) -> &str {
        match self {
            Self::Rhel => "Red Hat Enterprise Linux",
            Self::CentOS => "CentOS",
            Self::Rocky => "Rocky Linux",
            Self::AlmaLinux => "AlmaLinux",
            Self::OracleLinux => "Oracle Linux",
            Self::Amazon => "Amazon Linux",
            Self::Fedora => "Fedora",
            Self::Debian => "Debian",
            Self::Ubuntu => "Ubuntu",
            Self::Unknown(_) => "Unknown",
        }
    }
}

impl std::fmt::Display for OperatingSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown(name) => write!(f, "Unknown ({})", name),
            _ => write!(f, "{}", self.name()),
        }
    }
}

/// Normalized host identity. Computed once per run and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformInfo {
    pub os: OperatingSystem,
    pub major_version: u32,
    /// Mapped architecture (`amd64`, `arm64`, or the raw machine name)
    pub architecture: String,
    /// Raw `uname -m` value
    pub machine: String,
    pub codename: Option<String>,
    pub package_manager: PackageManagerKind,
}

impl PlatformInfo {
    /// Exact policy key, e.g. `centos7`.
    pub fn policy_key(&self) -> String {
        format!("{}{}", self.os.id(), self.major_version)
    }

    /// Family-level policy key, e.g. `centos`.
    pub fn family_key(&self) -> &str {
        self.os.id()
    }

    pub fn codename(&self) -> Option<&str> {
        self.codename.as_deref().filter(|c| !c.is_empty())
    }
}

impl std::fmt::Display for PlatformInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} ({})", self.os, self.major_version, self.architecture)?;
        if let Some(codename) = self.codename() {
            write!(f, " [{}]", codename)?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("no os-release file found under {0}")]
    MissingOsRelease(PathBuf),
    #[error("could not read {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("platform detection incomplete: {0}")]
    Incomplete(String),
    #[error("no supported package manager for {0}")]
    UnsupportedFamily(String),
}

/// Map `uname -m` output to the architecture names used by repositories.
pub fn map_architecture(machine: &str) -> String {
    match machine {
        "x86_64" => "amd64".to_string(),
        "aarch64" => "arm64".to_string(),
        other => other.to_string(),
    }
}

/// Static codename fallback for os-release files without `VERSION_CODENAME`.
pub fn fallback_codename(os: &OperatingSystem, major_version: u32) -> Option<&'static str> {
    match (os, major_version) {
        (OperatingSystem::Debian, 9) => Some("stretch"),
        (OperatingSystem::Debian, 10) => Some("buster"),
        (OperatingSystem::Debian, 11) => Some("bullseye"),
        (OperatingSystem::Debian, 12) => Some("bookworm"),
        (OperatingSystem::Debian, 13) => Some("trixie"),
        (OperatingSystem::Ubuntu, 18) => Some("bionic"),
        (OperatingSystem::Ubuntu, 20) => Some("focal"),
        (OperatingSystem::Ubuntu, 22) => Some("jammy"),
        (OperatingSystem::Ubuntu, 24) => Some("noble"),
        _ => None,
    }
}

/// Reads host identity from os-release files below a system root.
#[derive(Debug, Clone)]
pub struct PlatformDetector {
    root: PathBuf,
    machine: Option<String>,
}

impl PlatformDetector {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            machine: None,
        }
    }

    /// Override the machine name instead of using the running binary's architecture.
    pub fn with_machine(mut self, machine: Option<String>) -> Self {
        self.machine = machine;
        self
    }

    pub fn detect(&self) -> Result<PlatformInfo, DetectError> {
        let path = self.os_release_path()?;
        let content = fs::read_to_string(&path).map_err(|source| DetectError::Unreadable {
            path: path.clone(),
            source,
        })?;
        let machine = self
            .machine
            .clone()
            .unwrap_or_else(|| std::env::consts::ARCH.to_string());
        parse_platform(&content, &machine)
    }

    fn os_release_path(&self) -> Result<PathBuf, DetectError> {
        ["etc/os-release", "usr/lib/os-release"]
            .iter()
            .map(|rel| self.root.join(rel))
            .find(|p| p.exists())
            .ok_or_else(|| DetectError::MissingOsRelease(self.root.clone()))
    }
}

fn os_release_value(line: &str, key: &str) -> Option<String> {
    let val = line.strip_prefix(key)?.strip_prefix('=')?;
    Some(val.trim().trim_matches('"').trim_matches('\'').to_string())
}

/// Parse os-release content into a [`PlatformInfo`].
pub fn parse_platform(content: &str, machine: &str) -> Result<PlatformInfo, DetectError> {
    let mut id = String::new();
    let mut id_like = String::new();
    let mut version_id = String::new();
    let mut codename = String::new();
    let mut ubuntu_codename = String::new();

    for line in content.lines().map(str::trim) {
        if let Some(val) = os_release_value(line, "ID") {
            id = val;
        } else if let Some(val) = os_release_value(line, "ID_LIKE") {
            id_like = val;
        } else if let Some(val) = os_release_value(line, "VERSION_ID") {
            version_id = val;
        } else if let Some(val) = os_release_value(line, "VERSION_CODENAME") {
            codename = val;
        } else if let Some(val) = os_release_value(line, "UBUNTU_CODENAME") {
            ubuntu_codename = val;
        }
    }

    if id.is_empty() {
        return Err(DetectError::Incomplete("distribution id is missing".into()));
    }
    let major_version = version_id
        .split('.')
        .next()
        .and_then(|major| major.parse::<u32>().ok())
        .ok_or_else(|| {
            DetectError::Incomplete(format!("cannot determine major version of {}", id))
        })?;

    let os = OperatingSystem::from_id(&id.to_lowercase());
    let package_manager = os
        .package_manager(major_version)
        .or_else(|| family_package_manager(&id_like, major_version))
        .ok_or_else(|| DetectError::UnsupportedFamily(id.clone()))?;

    let codename = [codename, ubuntu_codename]
        .into_iter()
        .find(|c| !c.is_empty())
        .or_else(|| fallback_codename(&os, major_version).map(str::to_string));

    Ok(PlatformInfo {
        os,
        major_version,
        architecture: map_architecture(machine),
        machine: machine.to_string(),
        codename,
        package_manager,
    })
}

fn family_package_manager(id_like: &str, major_version: u32) -> Option<PackageManagerKind> {
    id_like
        .split_whitespace()
        .find_map(|like| OperatingSystem::from_id(like).package_manager(major_version))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_centos7() {
        let content = r#"NAME="CentOS Linux"
VERSION="7 (Core)"
ID="centos"
ID_LIKE="rhel fedora"
VERSION_ID="7"
PRETTY_NAME="CentOS Linux 7 (Core)"
CPE_NAME="cpe:/o:centos:centos:7""#;
        let info = parse_platform(content, "x86_64").unwrap();
        assert_eq!(info.os, OperatingSystem::CentOS);
        assert_eq!(info.major_version, 7);
        assert_eq!(info.architecture, "amd64");
        assert_eq!(info.machine, "x86_64");
        assert_eq!(info.codename, None);
        assert_eq!(info.package_manager, PackageManagerKind::Yum);
        assert_eq!(info.policy_key(), "centos7");
        assert_eq!(info.family_key(), "centos");
    }

    #[test]
    fn test_parse_rocky9_uses_dnf() {
        let content = "ID=\"rocky\"\nID_LIKE=\"rhel centos fedora\"\nVERSION_ID=\"9.3\"\n";
        let info = parse_platform(content, "aarch64").unwrap();
        assert_eq!(info.os, OperatingSystem::Rocky);
        assert_eq!(info.major_version, 9);
        assert_eq!(info.architecture, "arm64");
        assert_eq!(info.package_manager, PackageManagerKind::Dnf);
    }

    #[test]
    fn test_parse_ubuntu_codename() {
        let content = r#"PRETTY_NAME="Ubuntu 22.04.3 LTS"
NAME="Ubuntu"
VERSION_ID="22.04"
VERSION_CODENAME=jammy
ID=ubuntu
ID_LIKE=debian
UBUNTU_CODENAME=jammy"#;
        let info = parse_platform(content, "x86_64").unwrap();
        assert_eq!(info.os, OperatingSystem::Ubuntu);
        assert_eq!(info.major_version, 22);
        assert_eq!(info.codename(), Some("jammy"));
        assert_eq!(info.package_manager, PackageManagerKind::Apt);
    }

    #[test]
    fn test_codename_falls_back_to_table() {
        let content = "ID=debian\nVERSION_ID=\"11\"\n";
        let info = parse_platform(content, "x86_64").unwrap();
        assert_eq!(info.codename(), Some("bullseye"));
    }

    #[test]
    fn test_unknown_codename_is_empty() {
        let content = "ID=debian\nVERSION_ID=\"99\"\n";
        let info = parse_platform(content, "x86_64").unwrap();
        assert_eq!(info.codename(), None);
    }

    #[test]
    fn test_unknown_arch_passes_through() {
        assert_eq!(map_architecture("ppc64le"), "ppc64le");
        assert_eq!(map_architecture("s390x"), "s390x");
    }

    #[test]
    fn test_missing_version_is_incomplete() {
        let err = parse_platform("ID=debian\n", "x86_64").unwrap_err();
        assert!(matches!(err, DetectError::Incomplete(_)));

        let err = parse_platform("VERSION_ID=12\n", "x86_64").unwrap_err();
        assert!(matches!(err, DetectError::Incomplete(_)));
    }

    #[test]
    fn test_unknown_id_keeps_identity_but_gets_family_manager() {
        let content = "ID=eurolinux\nID_LIKE=\"rhel centos\"\nVERSION_ID=8.9\n";
        let info = parse_platform(content, "x86_64").unwrap();
        assert_eq!(info.os, OperatingSystem::Unknown("eurolinux".into()));
        assert_eq!(info.package_manager, PackageManagerKind::Dnf);
        assert_eq!(info.policy_key(), "eurolinux8");
    }

    #[test]
    fn test_unknown_family_is_unsupported() {
        let err = parse_platform("ID=arch\nVERSION_ID=1\n", "x86_64").unwrap_err();
        assert!(matches!(err, DetectError::UnsupportedFamily(_)));
    }

    #[test]
    fn test_detector_reads_sysroot() {
        let root = tempfile::tempdir().unwrap();
        assert!(matches!(
            PlatformDetector::new(root.path()).detect(),
            Err(DetectError::MissingOsRelease(_))
        ));

        std::fs::create_dir_all(root.path().join("etc")).unwrap();
        std::fs::write(
            root.path().join("etc/os-release"),
            "ID=almalinux\nVERSION_ID=\"8.10\"\n",
        )
        .unwrap();
        let info = PlatformDetector::new(root.path())
            .with_machine(Some("x86_64".into()))
            .detect()
            .unwrap();
        assert_eq!(info.policy_key(), "almalinux8");
        assert_eq!(info.to_string(), "AlmaLinux 8 (amd64)");
    }
}
