//! Policy check implementations
//!
//! - config_manager.rs: repository toggling tool (the gate)
//! - epel.rs: EPEL enablement with provider fallbacks
//! - crb.rs: build tools repository (CRB / PowerTools / CodeReady Builder)
//! - broken.rs: enabled but uncached repositories
//! - unsupported.rs: apt sources from another release
//! - eol_mirror.rs: mirror migration for end-of-life releases
//! - backports.rs: Debian backports suites

use crate::package::AdapterError;
use crate::policy::{CheckOutcome, ErrorKind, Finding};

pub mod backports;
pub mod broken;
pub mod config_manager;
pub mod crb;
pub mod eol_mirror;
pub mod epel;
pub mod unsupported;

pub use backports::BackportsCheck;
pub use broken::BrokenReposCheck;
pub use config_manager::ConfigManagerCheck;
pub use crb::{CrbCheck, CrbVariant};
pub use eol_mirror::EolMirrorCheck;
pub use epel::EpelCheck;
pub use unsupported::UnsupportedReposCheck;

/// The package manager state could not be read at all.
pub(crate) fn adapter_unavailable(err: &AdapterError) -> CheckOutcome {
    CheckOutcome::Fatal(Finding::new(
        ErrorKind::AdapterUnavailable,
        None,
        format!(
            "Could not query the package manager ({}). Make sure it works and retry.",
            err
        ),
    ))
}
