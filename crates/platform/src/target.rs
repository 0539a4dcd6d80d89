//! Targets and the per-run target cache.

use crate::detect::detect_facts;
use crate::error::{Error, Result};
use crate::types::{ExtendedFacts, Facts, parse_key_values};
use remote::{RunOptions, Shell, is_localhost};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

/// How to load extended facts: a command printing `KEY=VALUE` lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendedProbe {
    pub command: String,
    pub privileged: bool,
}

impl ExtendedProbe {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            privileged: false,
        }
    }

    fn load(&self, sh: &Shell) -> Result<ExtendedFacts> {
        let opts = RunOptions::strict().quiet();
        let output = if self.privileged {
            sh.privileged_with(&self.command, opts)
        } else {
            sh.run_with(&self.command, opts)
        }
        .map_err(|e| Error::Extended {
            host: sh.host().to_string(),
            message: e.to_string(),
        })?;

        Ok(parse_key_values(&output.stdout_str()).into())
    }
}

/// One machine that actions run against.
#[derive(Debug)]
pub struct Target {
    host: String,
    facts: Facts,
    extended: OnceLock<ExtendedFacts>,
}

impl Target {
    /// Wrap already-known facts (detection, fixtures).
    pub fn new(host: impl Into<String>, facts: Facts) -> Self {
        Self {
            host: host.into(),
            facts,
            extended: OnceLock::new(),
        }
    }

    /// Detect a target through its shell.
    pub fn detect(sh: &Shell) -> Result<Self> {
        Ok(Self::new(sh.host(), detect_facts(sh)?))
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Whether this target is the controller itself.
    pub fn is_local(&self) -> bool {
        is_localhost(&self.host)
    }

    pub fn facts(&self) -> &Facts {
        &self.facts
    }

    /// Extended facts, loaded on first successful access.
    ///
    /// Nothing else on `Target` ever triggers this load. A failure is
    /// returned to the caller and not remembered, so the next access tries
    /// again (the application may simply not be installed yet).
    pub fn extended(&self, sh: &Shell, probe: &ExtendedProbe) -> Result<&ExtendedFacts> {
        if let Some(facts) = self.extended.get() {
            return Ok(facts);
        }
        let loaded = probe.load(sh)?;
        log::debug!("[{}] loaded {} extended facts", self.host, loaded.len());
        Ok(self.extended.get_or_init(|| loaded))
    }

    /// Extended facts if some earlier call already loaded them.
    pub fn extended_if_loaded(&self) -> Option<&ExtendedFacts> {
        self.extended.get()
    }

    /// One-line summary for logs.
    pub fn describe(&self) -> String {
        let facts = &self.facts;
        let vm = facts
            .hypervisor
            .map(|hv| format!("{hv:?} VM, "))
            .unwrap_or_default();
        format!(
            "{} {} ({}{}), {} in {}",
            facts.family,
            self.host,
            vm,
            if facts.arch().is_empty() {
                "unknown arch"
            } else {
                facts.arch()
            },
            facts.user,
            facts.home
        )
    }
}

/// Detected targets for one run, keyed by host.
///
/// Read-mostly: each host is detected on first access and reused for the
/// rest of the run. Switching between hosts in a batch never re-detects a
/// host already seen; call [`TargetCache::invalidate`] when a host changed
/// underneath (reinstall, distribution upgrade).
#[derive(Debug, Default)]
pub struct TargetCache {
    targets: RwLock<HashMap<String, Arc<Target>>>,
}

impl TargetCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached target for `sh`'s host, detecting it if needed.
    pub fn get_or_detect(&self, sh: &Shell) -> Result<Arc<Target>> {
        if let Some(target) = self.get(sh.host()) {
            return Ok(target);
        }

        // Detect without holding the lock: detection is several round trips.
        let detected = Arc::new(Target::detect(sh)?);
        log::info!("Target {}", detected.describe());

        let mut targets = self
            .targets
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(
            targets.entry(sh.host().to_string()).or_insert(detected),
        ))
    }

    pub fn get(&self, host: &str) -> Option<Arc<Target>> {
        self.targets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(host)
            .cloned()
    }

    /// Seed the cache with a known target.
    pub fn insert(&self, target: Target) -> Arc<Target> {
        let target = Arc::new(target);
        self.targets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(target.host().to_string(), Arc::clone(&target));
        target
    }

    /// Forget one host; returns whether it was cached.
    pub fn invalidate(&self, host: &str) -> bool {
        self.targets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(host)
            .is_some()
    }

    pub fn clear(&self) {
        self.targets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.targets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PlatformFamily;
    use remote::mock::MockExecutor;

    fn linux_mock() -> MockExecutor {
        MockExecutor::new()
            .respond("echo \"${USER},${HOME}\"", "deploy,/home/deploy\n")
            .respond("cat /etc/os-release", "ID=debian\nVERSION_ID=\"12\"\n")
            .respond("uname -s -n -r -m", "Linux h 6.1.0 aarch64\n")
    }

    #[test]
    fn test_cache_detects_once_per_host() {
        let mock = linux_mock();
        let cache = TargetCache::new();

        let a = cache.get_or_detect(&Shell::new(&mock, "web1")).unwrap();
        let b = cache.get_or_detect(&Shell::new(&mock, "web1")).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(mock.count("os-release"), 1);

        // Switching hosts detects the new one, switching back reuses.
        cache.get_or_detect(&Shell::new(&mock, "web2")).unwrap();
        cache.get_or_detect(&Shell::new(&mock, "web1")).unwrap();
        assert_eq!(mock.count("os-release"), 2);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_invalidate_forces_redetection() {
        let mock = linux_mock();
        let cache = TargetCache::new();
        cache.get_or_detect(&Shell::new(&mock, "web1")).unwrap();
        assert!(cache.invalidate("web1"));
        assert!(!cache.invalidate("web1"));
        cache.get_or_detect(&Shell::new(&mock, "web1")).unwrap();
        assert_eq!(mock.count("os-release"), 2);
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_extended_facts_are_lazy_and_memoized() {
        let mock = linux_mock().respond("diffsettings", "DEBUG = False\nSITE_ID = 1\n");
        let cache = TargetCache::new();
        let sh = Shell::new(&mock, "web1");
        let target = cache.get_or_detect(&sh).unwrap();

        // Core facts don't touch the probe.
        assert_eq!(target.facts().arch(), "aarch64");
        assert!(target.extended_if_loaded().is_none());
        assert_eq!(mock.count("diffsettings"), 0);

        let probe = ExtendedProbe::new("./manage.py diffsettings");
        let ext = target.extended(&sh, &probe).unwrap();
        assert_eq!(ext.get("DEBUG"), Some("False"));
        target.extended(&sh, &probe).unwrap();
        assert_eq!(mock.count("diffsettings"), 1);
    }

    #[test]
    fn test_extended_failure_is_retried() {
        let mock = MockExecutor::new().fail_on("diffsettings", 1, "No such file");
        let target = Target::new(
            "web1",
            Facts::with_family(PlatformFamily::Darwin {
                version: "14".into(),
            }),
        );
        let sh = Shell::new(&mock, "web1");
        let probe = ExtendedProbe::new("./manage.py diffsettings");

        assert!(matches!(
            target.extended(&sh, &probe),
            Err(Error::Extended { .. })
        ));
        assert!(target.extended(&sh, &probe).is_err());
        assert_eq!(mock.count("diffsettings"), 2);
        assert!(target.extended_if_loaded().is_none());
    }

    #[test]
    fn test_describe() {
        let mut facts = Facts::with_family(PlatformFamily::Darwin {
            version: "14.2".into(),
        });
        facts.user = "olive".into();
        facts.home = "/Users/olive".into();
        facts.kernel.machine = "arm64".into();
        let target = Target::new("localhost", facts);
        assert!(target.is_local());
        assert_eq!(
            target.describe(),
            "macOS 14.2 localhost (arm64), olive in /Users/olive"
        );
    }
}
