//! The rigger config file.
//!
//! ```toml
//! project = "shop"
//! environment = "staging"
//!
//! [roles]
//! dsh_groups = "~/.dsh/group"
//! web = ["web1", "web2"]
//! worker = ["jobs1"]
//!
//! [services]
//! templates_dir = "~/deploy/templates"
//! supervisor = "supervisord"
//!
//! [services.env]
//! DJANGO_SETTINGS_MODULE = "shop.settings"
//!
//! [packages]
//! fail_fast = false
//! aliases = { "lang/python" = ["python3"] }
//!
//! [dispatch]
//! jobs = 4
//! ```
//!
//! Every key is optional; a missing file means all defaults.

use crate::paths;
use anyhow::{Context, Result};
use fleet::{CompanionRule, MAX_POOL_SIZE, RoleMap};
use pkgkit::{Aliases, BackendKind, BatchOptions, Registry};
use platform::ExtendedProbe;
use serde::{Deserialize, Serialize};
use servicekit::{NameComponent, NamingPolicy, SupervisorKind};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub project: String,
    pub environment: String,
    pub roles: RolesConfig,
    pub companions: Vec<CompanionRule>,
    pub services: ServicesConfig,
    pub packages: PackagesConfig,
    pub dispatch: DispatchConfig,
    pub facts: FactsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project: "app".to_string(),
            environment: "production".to_string(),
            roles: RolesConfig::default(),
            companions: CompanionRule::defaults(),
            services: ServicesConfig::default(),
            packages: PackagesConfig::default(),
            dispatch: DispatchConfig::default(),
            facts: FactsConfig::default(),
        }
    }
}

/// `[roles]`: role name to hosts, plus where dsh groups live.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RolesConfig {
    /// Directory of dsh group files; `~/.dsh/group` when unset
    pub dsh_groups: Option<String>,
    #[serde(flatten)]
    pub hosts: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServicesConfig {
    pub templates_dir: Option<String>,
    /// Deploy launch scripts here on each target
    pub launcher_dir: Option<String>,
    /// Skip supervisor detection
    pub supervisor: Option<SupervisorKind>,
    pub env: BTreeMap<String, String>,
    pub naming: NamingPolicy,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackagesConfig {
    pub aliases: Aliases,
    pub fail_fast: bool,
    pub disabled: Vec<BackendKind>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub jobs: usize,
    pub pinned_host: Option<String>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            jobs: 1,
            pinned_host: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FactsConfig {
    /// Command printing `KEY=VALUE` lines, run on first use only
    pub extended_command: Option<String>,
    pub extended_privileged: bool,
}

impl Config {
    /// Load from the default location.
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_file()?)
    }

    /// Load from `path`; a missing file gives the defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Check everything that can be checked before a remote command runs.
    pub fn validate(&self, roles: &RoleMap) -> Result<()> {
        let naming = &self.services.naming;
        naming.validate()?;
        naming.validate_component(NameComponent::Project, &self.project)?;
        naming.validate_component(NameComponent::Environment, &self.environment)?;
        for role in roles.roles() {
            naming
                .validate_component(NameComponent::Role, role)
                .with_context(|| format!("role {role} cannot name a service"))?;
        }
        roles.check_companions(&self.companions)?;
        Ok(())
    }

    /// dsh groups merged with `[roles]`, which win on conflicts.
    pub fn role_map(&self) -> Result<RoleMap> {
        let dsh = self
            .roles
            .dsh_groups
            .as_deref()
            .unwrap_or(paths::DEFAULT_DSH_GROUPS);
        let mut roles = RoleMap::from_dsh_groups(&paths::expand(dsh))?;
        roles.merge(RoleMap::from(self.roles.hosts.clone()));
        Ok(roles)
    }

    pub fn registry(&self) -> Registry {
        self.packages
            .disabled
            .iter()
            .fold(Registry::with_aliases(self.packages.aliases.clone()), |registry, kind| {
                registry.without(*kind)
            })
    }

    pub fn batch_options(&self) -> BatchOptions {
        BatchOptions {
            fail_fast: self.packages.fail_fast,
        }
    }

    pub fn templates_dir(&self) -> Option<PathBuf> {
        self.services.templates_dir.as_deref().map(paths::expand)
    }

    pub fn extended_probe(&self) -> Option<ExtendedProbe> {
        self.facts.extended_command.as_ref().map(|command| ExtendedProbe {
            command: command.clone(),
            privileged: self.facts.extended_privileged,
        })
    }

    /// Configured job count, clamped to the pool limit.
    pub fn jobs(&self) -> usize {
        self.dispatch.jobs.clamp(1, MAX_POOL_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.project, "app");
        assert_eq!(config.environment, "production");
        assert_eq!(config.jobs(), 1);
        assert_eq!(config.companions, CompanionRule::defaults());
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_full_file() {
        let config = Config::parse(
            r#"
project = "shop"
environment = "staging"

[roles]
dsh_groups = "/nonexistent"
web = ["web1", "web2"]
worker = []

[[companions]]
role_prefix = "celery_"
requires = "broker"

[services]
templates_dir = "/srv/templates"
supervisor = "upstart"
env = { DEBUG = "0" }
naming = { separator = "_", order = ["project", "role", "variant", "environment"] }

[packages]
fail_fast = true
disabled = ["ports"]
aliases = { "lang/python" = ["python3"] }

[dispatch]
jobs = 64
pinned_host = "web1"

[facts]
extended_command = "cat /srv/app/.env"
"#,
        )
        .unwrap();

        assert_eq!(config.project, "shop");
        assert_eq!(config.roles.hosts["web"], vec!["web1", "web2"]);
        assert_eq!(config.roles.dsh_groups.as_deref(), Some("/nonexistent"));
        assert_eq!(config.companions, vec![CompanionRule::new("celery_", "broker")]);
        assert_eq!(config.services.supervisor, Some(SupervisorKind::Upstart));
        assert_eq!(config.services.env["DEBUG"], "0");
        assert_eq!(config.services.naming.separator, "_");
        assert_eq!(config.services.naming.order[0], NameComponent::Project);
        assert!(config.batch_options().fail_fast);
        assert!(!config.registry().kinds().contains(&BackendKind::BsdPorts));
        assert_eq!(config.jobs(), MAX_POOL_SIZE);
        assert_eq!(config.dispatch.pinned_host.as_deref(), Some("web1"));
        assert_eq!(config.templates_dir(), Some(PathBuf::from("/srv/templates")));
        assert_eq!(
            config.extended_probe().map(|p| p.command),
            Some("cat /srv/app/.env".to_string())
        );

        let roles = config.role_map().unwrap();
        assert_eq!(roles.hosts("web"), vec!["web1", "web2"]);
        assert!(roles.hosts("worker").is_empty());
    }

    #[test]
    fn test_toml_roles_override_dsh() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("web"), "old1 old2\n").unwrap();
        fs::write(dir.path().join("db"), "db1\n").unwrap();

        let mut config = Config::default();
        config.roles.dsh_groups = Some(dir.path().display().to_string());
        config.roles.hosts.insert("web".into(), vec!["new1".into()]);

        let roles = config.role_map().unwrap();
        assert_eq!(roles.hosts("web"), vec!["new1"]);
        assert_eq!(roles.hosts("db"), vec!["db1"]);
    }

    #[test]
    fn test_validate() {
        let config = Config::default();
        assert!(config.validate(&RoleMap::new().with_role("web", &["w1"])).is_ok());

        let orphan = RoleMap::new().with_role("worker_low", &["j1"]);
        assert!(config.validate(&orphan).is_err());

        let mut bad = Config::default();
        bad.project = "my-shop".to_string();
        assert!(bad.validate(&RoleMap::new()).is_err());

        let bad_role = RoleMap::new().with_role("web-1", &["w1"]);
        assert!(config.validate(&bad_role).is_err());
    }

    #[test]
    fn test_unknown_backend_rejected() {
        assert!(Config::parse("[packages]\ndisabled = [\"yum\"]\n").is_err());
    }
}
