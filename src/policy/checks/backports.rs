use crate::package::AdapterError;
use crate::policy::{CheckContext, CheckOutcome, ErrorKind, Finding, PolicyCheck};
use crate::ui::prelude::*;

/// First Debian release whose default sources use the deb822 format.
const DEB822_SINCE: u32 = 12;

/// Disable the backports suite of the running Debian release.
#[derive(Debug, Default, Clone, Copy)]
pub struct BackportsCheck;

impl BackportsCheck {
    fn disable(ctx: &mut CheckContext<'_>, suite: &str) -> Result<usize, AdapterError> {
        let mut changed = 0;
        if ctx.platform.major_version >= DEB822_SINCE {
            changed += ctx.adapter.disable_suites_deb822(&[suite])?;
        }
        changed += ctx.adapter.disable_repo_pattern(suite)?;
        Ok(changed)
    }
}

impl PolicyCheck for BackportsCheck {
    fn id(&self) -> &'static str {
        "backports"
    }

    fn name(&self) -> &'static str {
        "Backports suite"
    }

    fn run(&self, ctx: &mut CheckContext<'_>) -> Vec<CheckOutcome> {
        let Some(codename) = ctx.platform.codename() else {
            return vec![CheckOutcome::Ok];
        };
        let suite = format!("{}-backports", codename);

        let result = Self::disable(ctx, &suite);
        ctx.adapter.invalidate();

        match result {
            Ok(0) => vec![CheckOutcome::Ok],
            Ok(changed) => {
                emit(
                    Level::Info,
                    "repocheck.check.backports.disabled",
                    &format!("Disabled {} ({} source entries)", suite, changed),
                    None,
                );
                vec![CheckOutcome::Ok]
            }
            Err(e) => vec![CheckOutcome::Warn(Finding::new(
                ErrorKind::RepoNotSupported,
                None,
                format!(
                    "Could not disable {} ({}). Remove the {} sources and retry.",
                    suite, e, suite
                ),
            ))],
        }
    }
}
