//! Role to host mapping.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

/// The synthetic role covering every host of every role.
pub const ANY_ROLE: &str = "any";

/// "Hosts of roles starting with `role_prefix` need a `requires` role too."
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanionRule {
    pub role_prefix: String,
    pub requires: String,
}

impl CompanionRule {
    pub fn new(role_prefix: &str, requires: &str) -> Self {
        Self {
            role_prefix: role_prefix.to_string(),
            requires: requires.to_string(),
        }
    }

    /// Rules applied when the configuration names none: prioritized workers
    /// need the plain worker role.
    pub fn defaults() -> Vec<Self> {
        vec![Self::new("worker_", "worker")]
    }
}

/// Role name to hosts for one invocation.
///
/// Host lists keep their order and may contain duplicates or be empty.
/// A role that isn't defined resolves to no hosts, never an error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleMap {
    roles: BTreeMap<String, Vec<String>>,
}

impl From<BTreeMap<String, Vec<String>>> for RoleMap {
    fn from(roles: BTreeMap<String, Vec<String>>) -> Self {
        Self { roles }
    }
}

impl RoleMap {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_role<S: AsRef<str>>(mut self, role: &str, hosts: &[S]) -> Self {
        self.insert(role, hosts);
        self
    }

    pub fn insert<S: AsRef<str>>(&mut self, role: &str, hosts: &[S]) {
        self.roles.insert(
            role.to_string(),
            hosts.iter().map(|h| h.as_ref().to_string()).collect(),
        );
    }

    /// Hosts playing `role`. [`ANY_ROLE`] is the union of every role, each
    /// host once, unless a role actually named `any` was defined.
    pub fn hosts(&self, role: &str) -> Vec<String> {
        if let Some(hosts) = self.roles.get(role) {
            return hosts.clone();
        }
        if role == ANY_ROLE {
            let mut seen = BTreeSet::new();
            return self
                .roles
                .values()
                .flatten()
                .filter(|h| seen.insert(h.as_str()))
                .cloned()
                .collect();
        }
        Vec::new()
    }

    /// Defined role names (without the synthetic `any`).
    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.roles.keys().map(String::as_str)
    }

    /// Roles a host plays.
    pub fn roles_of(&self, host: &str) -> Vec<&str> {
        self.roles
            .iter()
            .filter(|(_, hosts)| hosts.iter().any(|h| h == host))
            .map(|(role, _)| role.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    /// Keep only the listed roles.
    ///
    /// Operator-invoked, for re-running a recipe against part of a fleet.
    /// Takes `&mut self`, so it cannot overlap a dispatch borrowing the map.
    pub fn narrow<S: AsRef<str>>(&mut self, keep: &[S]) {
        let keep: BTreeSet<&str> = keep.iter().map(|s| s.as_ref()).collect();
        self.roles.retain(|role, _| keep.contains(role.as_str()));
    }

    /// Add `other`'s roles, replacing roles defined in both.
    pub fn merge(&mut self, other: Self) {
        self.roles.extend(other.roles);
    }

    /// Load dsh groups: one file per role, named after it, listing hosts
    /// separated by whitespace. Dot-files and `#` comments are ignored; a
    /// missing directory yields an empty map.
    pub fn from_dsh_groups(dir: &Path) -> Result<Self> {
        let io_err = |source| Error::Io {
            path: dir.to_path_buf(),
            source,
        };
        if !dir.is_dir() {
            log::debug!("no dsh groups at {}", dir.display());
            return Ok(Self::new());
        }

        let mut roles = BTreeMap::new();
        for entry in fs::read_dir(dir).map_err(io_err)? {
            let entry = entry.map_err(io_err)?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let path = entry.path();
            if name.starts_with('.') || !path.is_file() {
                continue;
            }
            let text = fs::read_to_string(&path).map_err(|source| Error::Io {
                path: path.clone(),
                source,
            })?;
            let hosts = text
                .lines()
                .map(|l| l.split('#').next().unwrap_or_default())
                .flat_map(str::split_whitespace)
                .map(ToString::to_string)
                .collect();
            roles.insert(name, hosts);
        }
        Ok(Self { roles })
    }

    /// Check structural rules: a role matching a rule's prefix that has
    /// hosts requires the companion role to have hosts too.
    pub fn check_companions(&self, rules: &[CompanionRule]) -> Result<()> {
        for rule in rules {
            for (role, hosts) in &self.roles {
                if role == &rule.requires || !role.starts_with(&rule.role_prefix) || hosts.is_empty() {
                    continue;
                }
                if self.hosts(&rule.requires).is_empty() {
                    return Err(Error::MissingCompanion {
                        role: role.clone(),
                        requires: rule.requires.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}
