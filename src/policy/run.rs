//! One reconciliation pass: skip flag, platform detection, policy lookup,
//! checks in declared order, aggregated status.

use std::path::PathBuf;

use super::registry::REGISTRY;
use super::{CheckContext, CheckOutcome, ErrorKind, Mode, PolicyCheck, Status};
use crate::common::config::RepoCheckConfig;
use crate::common::distro::{DetectError, PlatformDetector, PlatformInfo};
use crate::package::{CommandRunner, adapter_for};
use crate::report::Reporter;
use crate::ui::prelude::*;

/// What one check produced.
#[derive(Debug, Clone)]
pub struct CheckRecord {
    pub id: &'static str,
    pub status: Status,
    pub outcomes: Vec<CheckOutcome>,
}

#[derive(Debug, Clone, Default)]
pub struct ReconciliationResult {
    pub status: Status,
    pub records: Vec<CheckRecord>,
    /// Checks not run because a gate check failed
    pub skipped: Vec<&'static str>,
}

impl ReconciliationResult {
    pub fn checks_run(&self) -> usize {
        self.records.len()
    }

    /// Warning and fatal outcomes in emission order.
    pub fn findings(&self) -> impl Iterator<Item = &CheckOutcome> {
        self.records
            .iter()
            .flat_map(|record| record.outcomes.iter())
            .filter(|outcome| outcome.finding().is_some())
    }
}

/// Run `checks` in order, reporting every finding as it is produced.
///
/// Statuses are OR-ed together. Only a fatal gate check stops the sequence.
pub fn run_checks(
    checks: &[Box<dyn PolicyCheck>],
    ctx: &mut CheckContext<'_>,
    reporter: &mut Reporter,
) -> ReconciliationResult {
    let mut result = ReconciliationResult::default();

    for (idx, check) in checks.iter().enumerate() {
        emit(
            Level::Debug,
            "repocheck.check.start",
            &format!("Running {} ({})", check.name(), check.id()),
            None,
        );

        let mut outcomes = check.run(ctx);
        if outcomes.is_empty() {
            outcomes.push(CheckOutcome::Ok);
        }
        let mut status = Status::OK;
        for outcome in &outcomes {
            status |= outcome.status();
            reporter.report(outcome);
        }
        result.status |= status;

        emit(
            Level::Debug,
            "repocheck.check.done",
            &format!("{}: {}", check.id(), outcomes[0].color_status()),
            None,
        );
        result.records.push(CheckRecord {
            id: check.id(),
            status,
            outcomes,
        });

        if check.is_gate() && status.is_fatal() {
            result.skipped = checks[idx + 1..].iter().map(|c| c.id()).collect();
            if !result.skipped.is_empty() {
                emit(
                    Level::Warn,
                    "repocheck.check.gate",
                    &format!(
                        "Skipping {} because {} failed",
                        result.skipped.join(", "),
                        check.id()
                    ),
                    None,
                );
            }
            break;
        }
    }

    result
}

/// Why a run ended without running any check.
#[derive(Debug)]
pub enum SkipReason {
    SkipFlag(PathBuf),
    Detection(DetectError),
    NoPolicy(PlatformInfo),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SkipFlag(path) => write!(f, "skip flag {} present", path.display()),
            Self::Detection(e) => write!(f, "platform not detected: {}", e),
            Self::NoPolicy(platform) => write!(f, "no policy for {}", platform),
        }
    }
}

#[derive(Debug)]
pub enum RunOutcome {
    Skipped(SkipReason),
    Completed {
        platform: PlatformInfo,
        policy: &'static str,
        result: ReconciliationResult,
    },
}

impl RunOutcome {
    pub fn status(&self) -> Status {
        match self {
            Self::Skipped(_) => Status::OK,
            Self::Completed { result, .. } => result.status,
        }
    }
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Skipped(reason) => write!(f, "skipped: {}", reason),
            Self::Completed {
                platform,
                policy,
                result,
            } => write!(
                f,
                "{} with policy {}: {} checks, status {}",
                platform,
                policy,
                result.checks_run(),
                result.status.bits()
            ),
        }
    }
}

pub struct Reconciler<'a> {
    config: &'a RepoCheckConfig,
    mode: Mode,
}

impl<'a> Reconciler<'a> {
    pub fn new(config: &'a RepoCheckConfig, mode: Mode) -> Self {
        Self { config, mode }
    }

    pub fn run(&self, runner: Box<dyn CommandRunner>, reporter: &mut Reporter) -> RunOutcome {
        let skip_file = &self.config.skip_file;
        if skip_file.exists() {
            emit(
                Level::Success,
                "repocheck.engine.skip",
                &format!("Repository checks skipped ({} exists)", skip_file.display()),
                None,
            );
            return RunOutcome::Skipped(SkipReason::SkipFlag(skip_file.clone()));
        }

        let detector =
            PlatformDetector::new(&self.config.sysroot).with_machine(self.config.machine.clone());
        let platform = match detector.detect() {
            Ok(platform) => platform,
            Err(e) => {
                emit(
                    Level::Info,
                    "repocheck.engine.detect",
                    &format!("Skipping repository checks: {}", e),
                    Some(serde_json::json!({
                        "kind": format!("{:?}", ErrorKind::DetectionIncomplete),
                        "reason": e.to_string(),
                    })),
                );
                return RunOutcome::Skipped(SkipReason::Detection(e));
            }
        };

        let Some(policy) = REGISTRY.lookup(&platform) else {
            emit(
                Level::Info,
                "repocheck.engine.no_policy",
                &format!("No repository policy for {}, nothing to check", platform),
                None,
            );
            return RunOutcome::Skipped(SkipReason::NoPolicy(platform));
        };

        emit(
            Level::Info,
            "repocheck.engine.start",
            &format!(
                "Checking repositories for {} ({} mode, policy {}, {})",
                platform,
                self.mode.as_str(),
                policy.key,
                platform.package_manager
            ),
            None,
        );

        let mut adapter = adapter_for(&platform, &self.config.sysroot, runner);
        let settings = self.config.check_settings();
        let mut ctx = CheckContext {
            platform: &platform,
            adapter: adapter.as_mut(),
            mode: self.mode,
            settings: &settings,
        };
        let result = run_checks(&policy.checks, &mut ctx, reporter);
        summarize(&result);

        RunOutcome::Completed {
            platform,
            policy: policy.key,
            result,
        }
    }
}

fn summarize(result: &ReconciliationResult) {
    let (level, message) = if result.status.is_fatal() {
        (Level::Error, "Repository checks failed")
    } else if result.status.has_warning() {
        (Level::Warn, "Repository checks finished with warnings")
    } else {
        (Level::Success, "Repository checks passed")
    };
    let checks: Vec<serde_json::Value> = result
        .records
        .iter()
        .map(|record| {
            serde_json::json!({
                "id": record.id,
                "status": record.status.bits(),
                "findings": record.outcomes.iter().filter(|o| o.finding().is_some()).count(),
            })
        })
        .collect();
    emit(
        level,
        "repocheck.engine.done",
        &format!("{} ({} checks run)", message, result.checks_run()),
        Some(serde_json::json!({
            "status": result.status.bits(),
            "checks": checks,
            "findings": result.findings().count(),
            "skipped": result.skipped,
        })),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::distro::OperatingSystem;
    use crate::package::{FakeRunner, PackageManagerKind, RpmAdapter};
    use crate::policy::checks::testing::platform;
    use crate::policy::{CheckSettings, ErrorKind, Finding};
    use std::fs;
    use std::path::Path;

    /// Check with canned outcomes.
    struct Scripted {
        id: &'static str,
        gate: bool,
        outcomes: Vec<CheckOutcome>,
    }

    impl PolicyCheck for Scripted {
        fn id(&self) -> &'static str {
            self.id
        }

        fn name(&self) -> &'static str {
            self.id
        }

        fn is_gate(&self) -> bool {
            self.gate
        }

        fn run(&self, _ctx: &mut CheckContext<'_>) -> Vec<CheckOutcome> {
            self.outcomes.clone()
        }
    }

    fn scripted(id: &'static str, gate: bool, outcomes: Vec<CheckOutcome>) -> Box<dyn PolicyCheck> {
        Box::new(Scripted { id, gate, outcomes })
    }

    fn warn() -> CheckOutcome {
        CheckOutcome::Warn(Finding::new(ErrorKind::RepoNotCached, None, "uncached"))
    }

    fn fatal() -> CheckOutcome {
        CheckOutcome::Fatal(Finding::new(ErrorKind::RepoNotEnabled, None, "not enabled"))
    }

    fn run(checks: &[Box<dyn PolicyCheck>]) -> ReconciliationResult {
        let info = platform(OperatingSystem::Rocky, 9, None);
        let mut adapter = RpmAdapter::new(PackageManagerKind::Dnf, "/", FakeRunner::new().boxed());
        let settings = CheckSettings::default();
        let mut ctx = CheckContext {
            platform: &info,
            adapter: &mut adapter,
            mode: Mode::Check,
            settings: &settings,
        };
        run_checks(checks, &mut ctx, &mut Reporter::new("repositories", None))
    }

    #[test]
    fn warn_and_fatal_combine() {
        let result = run(&[
            scripted("a", false, vec![warn()]),
            scripted("b", false, vec![fatal()]),
            scripted("c", false, vec![CheckOutcome::Ok]),
        ]);
        assert_eq!(result.status.bits(), 3);
        assert_eq!(result.checks_run(), 3);
        assert_eq!(result.findings().count(), 2);
    }

    #[test]
    fn warnings_only_never_set_fatal() {
        let result = run(&[
            scripted("a", false, vec![warn(), warn()]),
            scripted("b", false, vec![warn()]),
        ]);
        assert_eq!(result.status, Status::WARN);
    }

    #[test]
    fn non_gate_fatal_does_not_stop_the_policy() {
        let result = run(&[
            scripted("a", false, vec![fatal()]),
            scripted("b", false, vec![warn()]),
        ]);
        assert_eq!(result.checks_run(), 2);
        assert!(result.skipped.is_empty());
    }

    #[test]
    fn fatal_gate_skips_the_rest() {
        let result = run(&[
            scripted("gate", true, vec![fatal()]),
            scripted("b", false, vec![warn()]),
            scripted("c", false, vec![warn()]),
        ]);
        assert_eq!(result.status, Status::FATAL);
        assert_eq!(result.checks_run(), 1);
        assert_eq!(result.skipped, vec!["b", "c"]);
    }

    #[test]
    fn passing_gate_continues() {
        let result = run(&[
            scripted("gate", true, vec![CheckOutcome::Ok]),
            scripted("b", false, vec![warn()]),
        ]);
        assert_eq!(result.checks_run(), 2);
        assert_eq!(result.status, Status::WARN);
    }

    #[test]
    fn empty_outcome_list_counts_as_ok() {
        let result = run(&[scripted("quiet", false, Vec::new())]);
        assert_eq!(result.status, Status::OK);
        assert_eq!(result.records[0].outcomes, vec![CheckOutcome::Ok]);
    }

    fn sysroot(os_release: Option<&str>) -> (tempfile::TempDir, RepoCheckConfig) {
        let root = tempfile::tempdir().unwrap();
        if let Some(content) = os_release {
            fs::create_dir_all(root.path().join("etc")).unwrap();
            fs::write(root.path().join("etc/os-release"), content).unwrap();
        }
        let config = RepoCheckConfig {
            sysroot: root.path().to_path_buf(),
            skip_file: root.path().join("skip"),
            machine: Some("x86_64".into()),
            ..Default::default()
        };
        (root, config)
    }

    fn reconcile(config: &RepoCheckConfig, mode: Mode, fake: &FakeRunner) -> RunOutcome {
        let mut reporter = Reporter::new(&config.stage, None);
        Reconciler::new(config, mode).run(fake.boxed(), &mut reporter)
    }

    #[test]
    fn skip_flag_makes_no_adapter_calls() {
        let (root, config) = sysroot(Some("ID=rocky\nVERSION_ID=9.3\n"));
        fs::write(root.path().join("skip"), "").unwrap();
        let fake = FakeRunner::new();
        let outcome = reconcile(&config, Mode::Install, &fake);
        assert!(matches!(outcome, RunOutcome::Skipped(SkipReason::SkipFlag(_))));
        assert_eq!(outcome.status(), Status::OK);
        assert!(fake.calls().is_empty());
    }

    #[test]
    fn missing_os_release_is_success() {
        let (_root, config) = sysroot(None);
        let fake = FakeRunner::new();
        let outcome = reconcile(&config, Mode::Install, &fake);
        assert!(matches!(outcome, RunOutcome::Skipped(SkipReason::Detection(_))));
        assert_eq!(outcome.status(), Status::OK);
        assert!(fake.calls().is_empty());
    }

    #[test]
    fn unregistered_platform_runs_no_checks() {
        let (_root, config) = sysroot(Some("ID=amzn\nVERSION_ID=2023\nID_LIKE=fedora\n"));
        let fake = FakeRunner::new();
        let outcome = reconcile(&config, Mode::Install, &fake);
        assert!(matches!(outcome, RunOutcome::Skipped(SkipReason::NoPolicy(_))));
        assert_eq!(outcome.status(), Status::OK);
        assert!(fake.calls().is_empty());
    }

    const FEDORA_ENABLED: &str = "repo id      repo name\nfedora       Fedora 40\nupdates      Updates\n";
    const FEDORA_CACHED: &str = "repo id      repo name\nfedora       Fedora 40\n";

    #[test]
    fn fedora_reports_uncached_repo_as_warning() {
        let (_root, config) = sysroot(Some("ID=fedora\nVERSION_ID=40\n"));
        let fake = FakeRunner::new();
        fake.ok("dnf -C -q repolist enabled", FEDORA_ENABLED);
        fake.ok("dnf -q repolist enabled", FEDORA_CACHED);

        let outcome = reconcile(&config, Mode::Install, &fake);
        let RunOutcome::Completed { policy, result, .. } = &outcome else {
            panic!("expected a completed run");
        };
        assert_eq!(*policy, "fedora");
        assert_eq!(result.status, Status::WARN);
        let finding = result.findings().next().and_then(CheckOutcome::finding).unwrap();
        assert_eq!(finding.repo.as_ref().map(ToString::to_string).as_deref(), Some("updates"));
    }

    #[test]
    fn identical_state_gives_identical_results() {
        let (_root, config) = sysroot(Some("ID=fedora\nVERSION_ID=40\n"));
        let fake = FakeRunner::new();
        fake.ok("dnf -C -q repolist enabled", FEDORA_ENABLED);
        fake.ok("dnf -q repolist enabled", FEDORA_CACHED);

        let first = reconcile(&config, Mode::Check, &fake);
        let second = reconcile(&config, Mode::Check, &fake);
        let outcomes = |run: &RunOutcome| match run {
            RunOutcome::Completed { result, .. } => result.findings().cloned().collect::<Vec<_>>(),
            RunOutcome::Skipped(_) => Vec::new(),
        };
        assert_eq!(outcomes(&first), outcomes(&second));
        assert_eq!(first.status(), second.status());
    }

    fn debian_with_foreign_archive(root: &Path) {
        fs::create_dir_all(root.join("etc/apt")).unwrap();
        fs::write(
            root.join("etc/apt/sources.list"),
            "deb http://deb.debian.org/debian bookworm main\n\
             deb http://deb.debian.org/debian-security bookworm-security main\n\
             deb http://deb.debian.org/debian bullseye main\n",
        )
        .unwrap();
    }

    const MIXED_POLICY: &str = "Package files:
 500 http://deb.debian.org/debian-security bookworm-security/main amd64 Packages
     release v=12,o=Debian,a=stable-security,n=bookworm-security,l=Debian-Security,c=main,b=amd64
 500 http://deb.debian.org/debian bookworm/main amd64 Packages
     release v=12.5,o=Debian,a=stable,n=bookworm,l=Debian,c=main,b=amd64
 500 http://deb.debian.org/debian bullseye/main amd64 Packages
     release v=11.9,o=Debian,a=oldstable,n=bullseye,l=Debian,c=main,b=amd64
Pinned packages:
";

    #[test]
    fn mode_decides_severity_of_foreign_archives() {
        let debian = "ID=debian\nVERSION_ID=\"12\"\nVERSION_CODENAME=bookworm\n";

        let (root, config) = sysroot(Some(debian));
        debian_with_foreign_archive(root.path());
        let fake = FakeRunner::new();
        fake.ok("apt-cache policy", MIXED_POLICY);
        assert_eq!(reconcile(&config, Mode::Check, &fake).status(), Status::WARN);

        let (root, config) = sysroot(Some(debian));
        debian_with_foreign_archive(root.path());
        let fake = FakeRunner::new();
        fake.ok("apt-cache policy", MIXED_POLICY);
        assert_eq!(reconcile(&config, Mode::Install, &fake).status(), Status::FATAL);
    }
}
