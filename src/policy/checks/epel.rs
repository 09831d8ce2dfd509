use std::fmt;

use crate::package::{InstallOptions, RepositoryRef};
use crate::policy::checks::adapter_unavailable;
use crate::policy::{CheckContext, CheckOutcome, ErrorKind, Finding, PolicyCheck};
use crate::ui::prelude::*;

const UPSTREAM_RELEASE_URL: &str = "https://dl.fedoraproject.org/pub/epel";

/// Where an `epel-release` provider can come from, in preference order.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ProviderSource {
    /// Package from the distribution's own repositories
    Official(String),
    /// RPM published on the configured vendor mirror
    VendorMirror(String),
    /// RPM from the Fedora project
    Upstream(String),
}

impl ProviderSource {
    fn target(&self) -> &str {
        match self {
            Self::Official(target) | Self::VendorMirror(target) | Self::Upstream(target) => target,
        }
    }
}

impl fmt::Display for ProviderSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Official(package) => write!(f, "package {}", package),
            Self::VendorMirror(url) => write!(f, "vendor mirror {}", url),
            Self::Upstream(url) => write!(f, "upstream {}", url),
        }
    }
}

/// Ensure the EPEL repository is enabled, installing its release package
/// when needed.
#[derive(Debug, Clone, Copy)]
pub struct EpelCheck {
    /// Repository id template
    repo_id: &'static str,
    /// Release package template
    package: &'static str,
    /// Whether the generic `epel-release-latest` RPMs provide `repo_id`
    release_rpms: bool,
}

impl EpelCheck {
    pub const STANDARD: EpelCheck = EpelCheck {
        repo_id: "epel",
        package: "epel-release",
        release_rpms: true,
    };

    /// Oracle ships EPEL under its own repository and package names.
    pub const ORACLE: EpelCheck = EpelCheck {
        repo_id: "ol{major}_developer_EPEL",
        package: "oracle-epel-release-el{major}",
        release_rpms: false,
    };

    fn sources(&self, ctx: &CheckContext<'_>) -> Vec<ProviderSource> {
        let mut sources = vec![ProviderSource::Official(ctx.expand(self.package))];
        if !self.release_rpms {
            return sources;
        }
        let rpm = ctx.expand("epel-release-latest-{major}.noarch.rpm");
        if let Some(mirror) = ctx.settings.vendor_mirror.as_deref() {
            sources.push(ProviderSource::VendorMirror(format!(
                "{}/{}",
                mirror.trim_end_matches('/'),
                rpm
            )));
        }
        sources.push(ProviderSource::Upstream(format!(
            "{}/{}",
            UPSTREAM_RELEASE_URL, rpm
        )));
        sources
    }

    /// Install one provider and try to enable the repository it brings.
    fn try_source(
        &self,
        ctx: &mut CheckContext<'_>,
        source: &ProviderSource,
        repo: &RepositoryRef,
    ) -> bool {
        emit(
            Level::Info,
            "repocheck.check.epel.install",
            &format!("Installing the {} provider from {}", repo, source),
            None,
        );
        if let Err(e) = ctx
            .adapter
            .install_package(source.target(), &InstallOptions::default())
        {
            emit(
                Level::Debug,
                "repocheck.check.epel.install_failed",
                &e.to_string(),
                None,
            );
            return false;
        }

        let pattern = format!("{}*", ctx.expand(self.repo_id));
        if let Err(e) = ctx.adapter.refresh_repos(&pattern) {
            emit(
                Level::Debug,
                "repocheck.check.epel.refresh_failed",
                &e.to_string(),
                None,
            );
        }

        match ctx.adapter.enable_repo(repo) {
            Ok(enabled) => enabled,
            Err(e) => {
                emit(
                    Level::Debug,
                    "repocheck.check.epel.enable_failed",
                    &e.to_string(),
                    None,
                );
                false
            }
        }
    }
}

impl Default for EpelCheck {
    fn default() -> Self {
        Self::STANDARD
    }
}

impl PolicyCheck for EpelCheck {
    fn id(&self) -> &'static str {
        "epel"
    }

    fn name(&self) -> &'static str {
        "EPEL repository"
    }

    fn describe(&self) -> String {
        format!("EPEL repository ({} from {})", self.repo_id, self.package)
    }

    fn run(&self, ctx: &mut CheckContext<'_>) -> Vec<CheckOutcome> {
        let id = ctx.expand(self.repo_id);
        let repo = RepositoryRef::rpm(id.as_str());

        match ctx.adapter.enable_repo(&repo) {
            Ok(true) => return vec![CheckOutcome::Ok],
            Ok(false) => {}
            Err(e) => return vec![adapter_unavailable(&e)],
        }

        for source in self.sources(ctx) {
            if self.try_source(ctx, &source, &repo) {
                return vec![CheckOutcome::Ok];
            }
        }

        vec![CheckOutcome::Fatal(Finding::new(
            ErrorKind::RepoNotEnabled,
            Some(repo),
            format!(
                "The {} repository is not enabled and none of its providers could be installed. \
                 Install {} and enable {} and retry.",
                id,
                ctx.expand(self.package),
                id
            ),
        ))]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::distro::OperatingSystem;
    use crate::package::{FakeRunner, PackageManagerKind, RpmAdapter};
    use crate::policy::checks::testing::{platform, run_check};
    use crate::policy::{CheckSettings, Mode};

    const WITHOUT_EPEL: &str = "repo id      repo name\nappstream    AppStream\nbaseos       BaseOS\n";
    const WITH_EPEL: &str =
        "repo id      repo name\nappstream    AppStream\nbaseos       BaseOS\nepel         EPEL 9\n";

    fn check(fake: &FakeRunner, settings: &CheckSettings) -> Vec<CheckOutcome> {
        let mut adapter = RpmAdapter::new(PackageManagerKind::Dnf, "/", fake.boxed());
        run_check(
            &EpelCheck::STANDARD,
            &platform(OperatingSystem::Rocky, 9, None),
            &mut adapter,
            Mode::Install,
            settings,
        )
    }

    #[test]
    fn already_enabled_needs_no_install() {
        let fake = FakeRunner::new();
        fake.ok("dnf -C -q repolist enabled", WITH_EPEL);
        assert_eq!(check(&fake, &CheckSettings::default()), vec![CheckOutcome::Ok]);
        assert!(fake.calls().iter().all(|c| !c.contains("install")));
    }

    #[test]
    fn official_package_then_refresh_then_enable() {
        let fake = FakeRunner::new();
        fake.ok("dnf -C -q repolist enabled", WITHOUT_EPEL)
            .ok("dnf -C -q repolist enabled", WITHOUT_EPEL)
            .ok("dnf -C -q repolist enabled", WITHOUT_EPEL)
            .ok("dnf -C -q repolist enabled", WITH_EPEL);
        fake.ok("dnf -y install epel-release", "");
        fake.ok("dnf -q makecache --disablerepo=* --enablerepo=epel*", "");

        assert_eq!(check(&fake, &CheckSettings::default()), vec![CheckOutcome::Ok]);
        assert_eq!(fake.call_count("dnf -y install epel-release"), 1);
        assert_eq!(
            fake.call_count("dnf -q makecache --disablerepo=* --enablerepo=epel*"),
            1
        );
        assert!(fake.calls().iter().all(|c| !c.contains("fedoraproject")));
    }

    #[test]
    fn falls_back_to_vendor_mirror_then_upstream() {
        let fake = FakeRunner::new();
        fake.ok("dnf -C -q repolist enabled", WITHOUT_EPEL);
        let settings = CheckSettings {
            vendor_mirror: Some("https://mirror.example.com/epel/".into()),
        };

        let outcomes = check(&fake, &settings);
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].is_fatal());
        let finding = outcomes[0].finding().unwrap();
        assert_eq!(finding.kind, ErrorKind::RepoNotEnabled);
        assert_eq!(finding.repo, Some(RepositoryRef::rpm("epel")));

        let installs: Vec<String> = fake
            .calls()
            .into_iter()
            .filter(|c| c.starts_with("dnf -y install"))
            .collect();
        assert_eq!(
            installs,
            vec![
                "dnf -y install epel-release",
                "dnf -y install https://mirror.example.com/epel/epel-release-latest-9.noarch.rpm",
                "dnf -y install https://dl.fedoraproject.org/pub/epel/epel-release-latest-9.noarch.rpm",
            ]
        );
    }

    #[test]
    fn vendor_mirror_is_skipped_when_unset() {
        let fake = FakeRunner::new();
        fake.ok("dnf -C -q repolist enabled", WITHOUT_EPEL);
        check(&fake, &CheckSettings::default());
        let installs = fake
            .calls()
            .into_iter()
            .filter(|c| c.starts_with("dnf -y install"))
            .count();
        assert_eq!(installs, 2);
    }

    #[test]
    fn oracle_uses_its_own_names() {
        let fake = FakeRunner::new();
        fake.ok("dnf -C -q repolist enabled", WITHOUT_EPEL);
        let mut adapter = RpmAdapter::new(PackageManagerKind::Dnf, "/", fake.boxed());
        let outcomes = run_check(
            &EpelCheck::ORACLE,
            &platform(OperatingSystem::OracleLinux, 8, None),
            &mut adapter,
            Mode::Check,
            &CheckSettings::default(),
        );
        assert_eq!(
            outcomes[0].finding().unwrap().repo,
            Some(RepositoryRef::rpm("ol8_developer_EPEL"))
        );
        assert_eq!(fake.call_count("dnf -y install oracle-epel-release-el8"), 1);
        assert!(fake.calls().iter().all(|c| !c.contains("fedoraproject")));
    }

    #[test]
    fn unreadable_package_manager_skips_installs() {
        let fake = FakeRunner::new();
        let outcomes = check(&fake, &CheckSettings::default());
        assert_eq!(outcomes.len(), 1);
        let finding = outcomes[0].finding().unwrap();
        assert_eq!(finding.kind, ErrorKind::AdapterUnavailable);
        assert_eq!(finding.kind.errtype(), "reponotcached");
        assert!(fake.calls().iter().all(|c| !c.contains("install")));
        assert_eq!(
            fake.call_count("dnf -q repolist enabled --setopt=*.skip_if_unavailable=True"),
            1
        );
    }
}
