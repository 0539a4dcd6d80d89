//! BSD ports through portmaster.
//!
//! A port's origin (`devel/ruby-gems`) often differs from the name of the
//! package it installs (`ruby19-gems-1.8.29`), and the origin does not
//! always show up in `portmaster --list-origins` either. Checking only the
//! nominal name would reinstall such ports on every run, so the installed
//! check tries several candidate identifiers.

use super::{Backend, BackendKind, run_for};
use crate::error::Result;
use platform::Facts;
use remote::{RunOptions, Shell, shell_quote};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Alternate installed identifiers per nominal port name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Aliases(BTreeMap<String, Vec<String>>);

impl Aliases {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, port: &str, installed_as: &[&str]) -> Self {
        self.0
            .entry(port.to_string())
            .or_default()
            .extend(installed_as.iter().map(ToString::to_string));
        self
    }

    pub fn get(&self, port: &str) -> &[String] {
        self.0.get(port).map(Vec::as_slice).unwrap_or_default()
    }
}

impl From<BTreeMap<String, Vec<String>>> for Aliases {
    fn from(map: BTreeMap<String, Vec<String>>) -> Self {
        Self(map)
    }
}

/// Identifiers that all mean "this port": the origin, its basename and
/// any configured aliases, in that order, without duplicates.
pub fn candidates(port: &str, aliases: &Aliases) -> Vec<String> {
    let base = port.rsplit('/').next().unwrap_or(port);
    let mut seen = BTreeSet::new();
    [port, base]
        .into_iter()
        .map(ToString::to_string)
        .chain(aliases.get(port).iter().cloned())
        .chain(aliases.get(base).iter().cloned())
        .filter(|c| !c.is_empty() && seen.insert(c.clone()))
        .collect()
}

/// `ruby19-gems-1.8.29` -> `ruby19-gems`; names without a version pass through.
pub fn strip_version(package: &str) -> &str {
    match package.rsplit_once('-') {
        Some((name, version)) if version.starts_with(|c: char| c.is_ascii_digit()) => name,
        _ => package,
    }
}

#[derive(Debug, Clone, Default)]
pub struct BsdPorts {
    aliases: Aliases,
}

impl BsdPorts {
    pub fn new(aliases: Aliases) -> Self {
        Self { aliases }
    }

    fn listing(sh: &Shell, command: &str) -> Result<Vec<String>> {
        let output = sh.run_with(command, RunOptions::probe())?;
        if !output.succeeded() {
            return Ok(Vec::new());
        }
        Ok(output
            .stdout_str()
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(ToString::to_string)
            .collect())
    }
}

impl Backend for BsdPorts {
    fn kind(&self) -> BackendKind {
        BackendKind::BsdPorts
    }

    fn usable(&self, facts: &Facts) -> bool {
        facts.bsd().is_some()
    }

    fn is_installed(&self, sh: &Shell, name: &str) -> Result<bool> {
        let wanted = candidates(name, &self.aliases);
        let origins = Self::listing(sh, "portmaster --list-origins")?;
        if origins.iter().any(|o| wanted.contains(o)) {
            return Ok(true);
        }
        let packages = Self::listing(sh, "pkg info -q")?;
        Ok(packages
            .iter()
            .map(|p| strip_version(p))
            .any(|p| wanted.iter().any(|w| w == p)))
    }

    fn install(&self, sh: &Shell, name: &str) -> Result<()> {
        let cmd = format!("portmaster {}", shell_quote(name));
        run_for(sh, self.kind(), &cmd, true, name).map(drop)
    }

    fn uninstall(&self, sh: &Shell, name: &str) -> Result<()> {
        let cmd = format!("pkg_delete -rf {}", shell_quote(name));
        run_for(sh, self.kind(), &cmd, true, name).map(drop)
    }

    fn update(&self, sh: &Shell) -> Result<()> {
        run_for(sh, self.kind(), "portsnap update", true, "update").map(drop)
    }

    fn upgrade(&self, sh: &Shell) -> Result<()> {
        run_for(sh, self.kind(), "portmaster -Da", true, "upgrade").map(drop)
    }

    fn search(&self, sh: &Shell, term: &str) -> Result<Vec<String>> {
        let cmd = format!(
            "find /usr/ports -maxdepth 2 -type d -name {}",
            shell_quote(&format!("*{term}*"))
        );
        let out = run_for(sh, self.kind(), &cmd, false, term)?;
        Ok(out
            .lines()
            .filter_map(|l| l.trim().strip_prefix("/usr/ports/"))
            .map(ToString::to_string)
            .collect())
    }
}
