use super::{PolicyCheck, checks::*};
use crate::common::distro::PlatformInfo;
use std::collections::HashMap;

pub type PolicyFactory = fn() -> Vec<Box<dyn PolicyCheck>>;

/// A resolved policy: its registry key and fresh check instances.
pub struct PolicyEntry {
    pub key: &'static str,
    pub checks: Vec<Box<dyn PolicyCheck>>,
}

const CENTOS_VAULT: EolMirrorCheck = EolMirrorCheck::new("mirror.centos.org", "vault.centos.org");

const CENTOS8_CRB: &[CrbVariant] = &[
    CrbVariant::Repo("PowerTools"),
    CrbVariant::Repo("powertools"),
];
const CENTOS_CRB: &[CrbVariant] = &[
    CrbVariant::Repo("crb"),
    CrbVariant::Repo("powertools"),
    CrbVariant::Repo("PowerTools"),
];
const RHEL_CRB: &[CrbVariant] = &[
    CrbVariant::Subscription("codeready-builder-for-rhel-{major}-{machine}-rpms"),
    CrbVariant::Repo("codeready-builder-for-rhel-{major}-rhui-rpms"),
    CrbVariant::Repo("crb"),
];
const EL8_CRB: &[CrbVariant] = &[
    CrbVariant::Repo("powertools"),
    CrbVariant::Repo("PowerTools"),
];
const EL_CRB: &[CrbVariant] = &[CrbVariant::Repo("crb")];
const OL_CRB: &[CrbVariant] = &[CrbVariant::Repo("ol{major}_codeready_builder")];

fn centos7() -> Vec<Box<dyn PolicyCheck>> {
    vec![
        Box::new(CENTOS_VAULT),
        Box::new(ConfigManagerCheck),
        Box::new(EpelCheck::STANDARD),
        Box::new(BrokenReposCheck),
    ]
}

fn centos8() -> Vec<Box<dyn PolicyCheck>> {
    vec![
        Box::new(CENTOS_VAULT),
        Box::new(ConfigManagerCheck),
        Box::new(EpelCheck::STANDARD),
        Box::new(CrbCheck::new(CENTOS8_CRB)),
        Box::new(BrokenReposCheck),
    ]
}

fn centos() -> Vec<Box<dyn PolicyCheck>> {
    el_with_crb(CENTOS_CRB)
}

fn rhel7() -> Vec<Box<dyn PolicyCheck>> {
    vec![
        Box::new(ConfigManagerCheck),
        Box::new(EpelCheck::STANDARD),
        Box::new(BrokenReposCheck),
    ]
}

fn rhel() -> Vec<Box<dyn PolicyCheck>> {
    el_with_crb(RHEL_CRB)
}

fn el8() -> Vec<Box<dyn PolicyCheck>> {
    el_with_crb(EL8_CRB)
}

fn el() -> Vec<Box<dyn PolicyCheck>> {
    el_with_crb(EL_CRB)
}

fn el_with_crb(variants: &'static [CrbVariant]) -> Vec<Box<dyn PolicyCheck>> {
    vec![
        Box::new(ConfigManagerCheck),
        Box::new(EpelCheck::STANDARD),
        Box::new(CrbCheck::new(variants)),
        Box::new(BrokenReposCheck),
    ]
}

fn oracle() -> Vec<Box<dyn PolicyCheck>> {
    vec![
        Box::new(ConfigManagerCheck),
        Box::new(EpelCheck::ORACLE),
        Box::new(CrbCheck::new(OL_CRB)),
        Box::new(BrokenReposCheck),
    ]
}

fn amazon2() -> Vec<Box<dyn PolicyCheck>> {
    vec![Box::new(ConfigManagerCheck), Box::new(BrokenReposCheck)]
}

fn fedora() -> Vec<Box<dyn PolicyCheck>> {
    vec![Box::new(BrokenReposCheck)]
}

fn debian() -> Vec<Box<dyn PolicyCheck>> {
    vec![
        Box::new(BackportsCheck),
        Box::new(UnsupportedReposCheck),
        Box::new(BrokenReposCheck),
    ]
}

fn ubuntu() -> Vec<Box<dyn PolicyCheck>> {
    vec![Box::new(UnsupportedReposCheck), Box::new(BrokenReposCheck)]
}

/// Policies keyed by `{distro}{major}` (exact) or `{distro}` (family).
pub struct PolicyRegistry {
    policies: HashMap<&'static str, PolicyFactory>,
}

impl PolicyRegistry {
    pub fn new() -> Self {
        let mut registry = PolicyRegistry {
            policies: HashMap::new(),
        };

        registry.register("centos7", centos7);
        registry.register("centos8", centos8);
        registry.register("centos", centos);
        registry.register("rhel7", rhel7);
        registry.register("rhel", rhel);
        registry.register("rocky8", el8);
        registry.register("rocky", el);
        registry.register("almalinux8", el8);
        registry.register("almalinux", el);
        registry.register("ol", oracle);
        registry.register("amzn2", amazon2);
        registry.register("fedora", fedora);
        registry.register("debian", debian);
        registry.register("ubuntu", ubuntu);

        registry
    }

    fn register(&mut self, key: &'static str, factory: PolicyFactory) {
        self.policies.insert(key, factory);
    }

    /// Resolve a key to a policy, if registered.
    pub fn get(&self, key: &str) -> Option<PolicyEntry> {
        self.policies
            .get_key_value(key)
            .map(|(key, factory)| PolicyEntry {
                key: *key,
                checks: factory(),
            })
    }

    /// Exact `{distro}{major}` key first, then the `{distro}` family key.
    pub fn lookup(&self, platform: &PlatformInfo) -> Option<PolicyEntry> {
        self.get(&platform.policy_key())
            .or_else(|| self.get(platform.family_key()))
    }

    /// Registered keys in sorted order.
    pub fn keys(&self) -> Vec<&'static str> {
        let mut keys: Vec<&'static str> = self.policies.keys().copied().collect();
        keys.sort_unstable();
        keys
    }
}

impl Default for PolicyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// Global registry instance
lazy_static::lazy_static! {
    pub static ref REGISTRY: PolicyRegistry = PolicyRegistry::new();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::distro::OperatingSystem;
    use crate::policy::checks::testing::platform;

    fn ids(entry: &PolicyEntry) -> Vec<&'static str> {
        entry.checks.iter().map(|c| c.id()).collect()
    }

    #[test]
    fn exact_key_wins_over_family() {
        let entry = REGISTRY
            .lookup(&platform(OperatingSystem::CentOS, 7, None))
            .unwrap();
        assert_eq!(entry.key, "centos7");
        assert_eq!(ids(&entry), ["eol-mirror", "config-manager", "epel", "broken-repos"]);
    }

    #[test]
    fn family_key_is_the_fallback() {
        let entry = REGISTRY
            .lookup(&platform(OperatingSystem::Rocky, 9, None))
            .unwrap();
        assert_eq!(entry.key, "rocky");
        assert_eq!(ids(&entry), ["config-manager", "epel", "crb", "broken-repos"]);

        let entry = REGISTRY
            .lookup(&platform(OperatingSystem::Debian, 12, Some("bookworm")))
            .unwrap();
        assert_eq!(entry.key, "debian");
        assert_eq!(ids(&entry), ["backports", "unsupported-repos", "broken-repos"]);
    }

    #[test]
    fn unregistered_platform_has_no_policy() {
        assert!(REGISTRY
            .lookup(&platform(OperatingSystem::Unknown("eurolinux".into()), 9, None))
            .is_none());
        // amzn2 exists, later Amazon releases have no family policy
        assert!(REGISTRY
            .lookup(&platform(OperatingSystem::Amazon, 2023, None))
            .is_none());
    }

    #[test]
    fn config_manager_is_the_only_gate() {
        for key in REGISTRY.keys() {
            let entry = REGISTRY.get(key).unwrap();
            for check in &entry.checks {
                assert_eq!(check.is_gate(), check.id() == "config-manager");
            }
        }
    }

    #[test]
    fn keys_are_sorted() {
        let keys = REGISTRY.keys();
        assert_eq!(keys.first(), Some(&"almalinux"));
        assert_eq!(keys.len(), 14);
    }
}
