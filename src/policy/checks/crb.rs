use crate::package::{AdapterError, RepositoryRef};
use crate::policy::checks::adapter_unavailable;
use crate::policy::{CheckContext, CheckOutcome, ErrorKind, Finding, PolicyCheck};
use crate::ui::prelude::*;

/// One way to get the build tools repository on a given release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrbVariant {
    /// Plain repository id toggled by the config manager
    Repo(&'static str),
    /// Repository id managed by `subscription-manager`
    Subscription(&'static str),
}

impl CrbVariant {
    fn template(&self) -> &'static str {
        match self {
            Self::Repo(id) | Self::Subscription(id) => id,
        }
    }
}

/// Build tools repository (CRB, PowerTools or CodeReady Builder depending
/// on the release). Variants are tried in order until one is enabled.
#[derive(Debug, Clone, Copy)]
pub struct CrbCheck {
    variants: &'static [CrbVariant],
}

impl CrbCheck {
    pub const fn new(variants: &'static [CrbVariant]) -> Self {
        Self { variants }
    }

    /// Whether any variant is enabled already, so nothing needs toggling.
    fn any_enabled(&self, ctx: &mut CheckContext<'_>) -> Result<bool, AdapterError> {
        let enabled = ctx.adapter.list_enabled_repos()?;
        Ok(self.variants.iter().any(|variant| {
            let wanted = RepositoryRef::rpm(ctx.expand(variant.template()));
            enabled.iter().any(|r| r.matches(&wanted))
        }))
    }

    fn try_variant(&self, ctx: &mut CheckContext<'_>, variant: &CrbVariant) -> bool {
        let id = ctx.expand(variant.template());
        let result = match variant {
            CrbVariant::Repo(_) => ctx.adapter.enable_repo(&RepositoryRef::rpm(id.as_str())),
            CrbVariant::Subscription(_) => ctx.adapter.enable_subscription_repo(&id),
        };
        match result {
            Ok(enabled) => enabled,
            Err(e) => {
                emit(
                    Level::Debug,
                    "repocheck.check.crb.enable_failed",
                    &format!("{}: {}", id, e),
                    None,
                );
                false
            }
        }
    }
}

impl PolicyCheck for CrbCheck {
    fn id(&self) -> &'static str {
        "crb"
    }

    fn name(&self) -> &'static str {
        "Build tools repository"
    }

    fn describe(&self) -> String {
        let ids: Vec<&str> = self.variants.iter().map(CrbVariant::template).collect();
        format!("Build tools repository ({})", ids.join(", "))
    }

    fn run(&self, ctx: &mut CheckContext<'_>) -> Vec<CheckOutcome> {
        match self.any_enabled(ctx) {
            Ok(true) => return vec![CheckOutcome::Ok],
            Ok(false) => {}
            Err(e) => return vec![adapter_unavailable(&e)],
        }
        for variant in self.variants {
            if self.try_variant(ctx, variant) {
                return vec![CheckOutcome::Ok];
            }
        }

        let Some(first) = self.variants.first() else {
            return vec![CheckOutcome::Ok];
        };
        let id = ctx.expand(first.template());
        vec![CheckOutcome::Fatal(Finding::new(
            ErrorKind::RepoNotEnabled,
            Some(RepositoryRef::rpm(id.as_str())),
            format!(
                "The build tools repository {} is not enabled. Enable {} and retry.",
                id, id
            ),
        ))]
    }
}
