use crate::policy::{CheckContext, CheckOutcome, PolicyCheck};
use crate::ui::prelude::*;

/// Point repository definitions of an end-of-life release at its archive
/// mirror. Best effort: never fails the run.
#[derive(Debug, Clone, Copy)]
pub struct EolMirrorCheck {
    old_host: &'static str,
    new_host: &'static str,
}

impl EolMirrorCheck {
    pub const fn new(old_host: &'static str, new_host: &'static str) -> Self {
        Self { old_host, new_host }
    }
}

impl PolicyCheck for EolMirrorCheck {
    fn id(&self) -> &'static str {
        "eol-mirror"
    }

    fn name(&self) -> &'static str {
        "End-of-life mirror migration"
    }

    fn describe(&self) -> String {
        format!("Mirror migration ({} -> {})", self.old_host, self.new_host)
    }

    fn run(&self, ctx: &mut CheckContext<'_>) -> Vec<CheckOutcome> {
        let outcome = match ctx.adapter.rewrite_mirror_urls(self.old_host, self.new_host) {
            Ok(outcome) => outcome,
            Err(e) => {
                emit(
                    Level::Debug,
                    "repocheck.check.eol_mirror.failed",
                    &e.to_string(),
                    None,
                );
                return vec![CheckOutcome::Ok];
            }
        };

        if outcome.is_noop() {
            emit(
                Level::Debug,
                "repocheck.check.eol_mirror.noop",
                &format!("No repository references {}", self.old_host),
                None,
            );
            return vec![CheckOutcome::Ok];
        }

        if !outcome.changed_files.is_empty() {
            let backup = outcome
                .backup
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            emit(
                Level::Info,
                "repocheck.check.eol_mirror.migrated",
                &format!(
                    "Moved {} repository file(s) from {} to {} (backup in {})",
                    outcome.changed_files.len(),
                    self.old_host,
                    self.new_host,
                    backup
                ),
                Some(serde_json::json!({
                    "backup": backup,
                    "files": outcome
                        .changed_files
                        .iter()
                        .map(|p| p.display().to_string())
                        .collect::<Vec<_>>(),
                })),
            );
        }
        for error in &outcome.errors {
            emit(Level::Debug, "repocheck.check.eol_mirror.error", error, None);
        }
        vec![CheckOutcome::Ok]
    }
}
