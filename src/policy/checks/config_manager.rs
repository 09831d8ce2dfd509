use crate::policy::{CheckContext, CheckOutcome, ErrorKind, Finding, PolicyCheck};
use crate::ui::prelude::*;

/// Every other RPM check toggles repositories through this tool, so a
/// missing tool ends the policy.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConfigManagerCheck;

impl PolicyCheck for ConfigManagerCheck {
    fn id(&self) -> &'static str {
        "config-manager"
    }

    fn name(&self) -> &'static str {
        "Repository configuration tool"
    }

    fn is_gate(&self) -> bool {
        true
    }

    fn run(&self, ctx: &mut CheckContext<'_>) -> Vec<CheckOutcome> {
        if ctx.adapter.has_config_manager_tool() {
            return vec![CheckOutcome::Ok];
        }

        let kind = ctx.adapter.kind();
        let package = kind.config_manager_package().unwrap_or("config-manager");
        emit(
            Level::Info,
            "repocheck.check.config_manager.install",
            &format!("Installing {} to manage {} repositories", package, kind),
            None,
        );
        if let Err(e) = ctx.adapter.install_config_manager_tool() {
            emit(
                Level::Debug,
                "repocheck.check.config_manager.install_failed",
                &e.to_string(),
                None,
            );
        }

        if ctx.adapter.has_config_manager_tool() {
            vec![CheckOutcome::Ok]
        } else {
            vec![CheckOutcome::Fatal(Finding::new(
                ErrorKind::ConfigManagerMissing,
                None,
                format!(
                    "The {} repository configuration tool is not installed. Install {} and retry.",
                    kind, package
                ),
            ))]
        }
    }
}
