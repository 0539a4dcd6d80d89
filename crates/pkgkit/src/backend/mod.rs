//! Backend abstraction for package managers.
//!
//! The [`Backend`] trait is the uniform surface every package manager
//! implements. A [`Registry`] holds the backends in a fixed priority order
//! and selects exactly one per target from its facts.

pub mod apt;
pub mod brew;
pub mod lang;
pub mod pacman;
pub mod pkgng;
pub mod ports;

use crate::error::{Error, Result};
use platform::{BsdVariant, Facts, PlatformFamily};
use remote::Shell;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The package managers we know how to drive.
///
/// The first five are system package managers, selected per target. The
/// language managers are only used when asked for explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Homebrew,
    Pacman,
    Apt,
    Pkgng,
    #[serde(rename = "ports")]
    BsdPorts,
    Pip2,
    Pip3,
    Npm,
    Gem,
}

impl BackendKind {
    /// Selection priority, highest first.
    pub const PRIORITY: [Self; 5] = [
        Self::Homebrew,
        Self::Pacman,
        Self::Apt,
        Self::Pkgng,
        Self::BsdPorts,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Homebrew => "homebrew",
            Self::Pacman => "pacman",
            Self::Apt => "apt",
            Self::Pkgng => "pkgng",
            Self::BsdPorts => "ports",
            Self::Pip2 => "pip2",
            Self::Pip3 => "pip3",
            Self::Npm => "npm",
            Self::Gem => "gem",
        }
    }

    /// pip, npm or gem rather than the system package manager.
    pub fn is_language(&self) -> bool {
        matches!(self, Self::Pip2 | Self::Pip3 | Self::Npm | Self::Gem)
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "homebrew" | "brew" => Ok(Self::Homebrew),
            "pacman" | "arch" => Ok(Self::Pacman),
            "apt" => Ok(Self::Apt),
            "pkgng" | "pkg" => Ok(Self::Pkgng),
            "ports" | "bsd-ports" | "bsdports" => Ok(Self::BsdPorts),
            "pip" | "pip2" => Ok(Self::Pip2),
            "pip3" => Ok(Self::Pip3),
            "npm" => Ok(Self::Npm),
            "gem" => Ok(Self::Gem),
            other => Err(format!("unknown package backend: {other}")),
        }
    }
}

/// The backend a platform family maps to when nothing is disabled, or
/// `None` for Linux distributions outside the Arch and Debian families.
///
/// Pure function of the facts: the same family always yields the same kind.
pub fn preferred_kind(family: &PlatformFamily) -> Option<BackendKind> {
    match family {
        PlatformFamily::Darwin { .. } => Some(BackendKind::Homebrew),
        PlatformFamily::Linux(distro) if distro.is_arch_family() => Some(BackendKind::Pacman),
        PlatformFamily::Linux(distro) if distro.is_debian_family() => Some(BackendKind::Apt),
        PlatformFamily::Linux(_) => None,
        PlatformFamily::Bsd {
            variant: BsdVariant::FreeBsd | BsdVariant::DragonFly,
            ..
        } => Some(BackendKind::Pkgng),
        PlatformFamily::Bsd { .. } => Some(BackendKind::BsdPorts),
    }
}

/// One package manager.
///
/// Implementations only issue commands; the skip-if-already-in-state
/// logic lives in [`crate::PackageManager`].
pub trait Backend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Whether this backend can drive a target with these facts.
    fn usable(&self, facts: &Facts) -> bool;

    /// Check if a package is installed.
    fn is_installed(&self, sh: &Shell, name: &str) -> Result<bool>;

    /// Install one package non-interactively.
    fn install(&self, sh: &Shell, name: &str) -> Result<()>;

    /// Remove one package non-interactively.
    fn uninstall(&self, sh: &Shell, name: &str) -> Result<()>;

    /// Refresh the package lists.
    fn update(&self, sh: &Shell) -> Result<()>;

    /// Upgrade everything outdated.
    fn upgrade(&self, sh: &Shell) -> Result<()>;

    /// Search the repositories, one result per line.
    fn search(&self, sh: &Shell, term: &str) -> Result<Vec<String>>;

    /// Run once after a batch installed something.
    fn after_install(&self, _sh: &Shell) -> Result<()> {
        Ok(())
    }
}

impl fmt::Debug for dyn Backend + '_ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.kind(), f)
    }
}

/// Run a package command, mapping non-zero exits to categorized errors.
pub(crate) fn run_for(
    sh: &Shell,
    kind: BackendKind,
    command: &str,
    privileged: bool,
    package: &str,
) -> Result<String> {
    let output = if privileged {
        sh.privileged(command)
    } else {
        sh.run(command)
    }
    .map_err(|e| Error::from_remote(e, kind, package))?;
    Ok(output.stdout_str())
}

/// Non-empty trimmed lines of command output.
pub(crate) fn lines(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Backends in priority order; the first usable one wins.
pub struct Registry {
    backends: Vec<Box<dyn Backend>>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.backends.iter().map(|b| b.kind()))
            .finish()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_aliases(ports::Aliases::default())
    }
}

impl Registry {
    /// All built-in backends, with port aliases for installed-checks.
    pub fn with_aliases(aliases: ports::Aliases) -> Self {
        Self {
            backends: vec![
                Box::new(brew::Homebrew),
                Box::new(pacman::Pacman),
                Box::new(apt::Apt),
                Box::new(pkgng::Pkgng),
                Box::new(ports::BsdPorts::new(aliases)),
            ],
        }
    }

    /// Drop one backend (e.g. disable pkgng to force ports).
    #[must_use]
    pub fn without(mut self, kind: BackendKind) -> Self {
        self.backends.retain(|b| b.kind() != kind);
        self
    }

    pub fn kinds(&self) -> Vec<BackendKind> {
        self.backends.iter().map(|b| b.kind()).collect()
    }

    /// First usable backend for these facts, if any.
    pub fn find(&self, facts: &Facts) -> Option<&dyn Backend> {
        self.backends
            .iter()
            .find(|b| b.usable(facts))
            .map(AsRef::as_ref)
    }

    /// Select the backend for a host.
    pub fn select(&self, host: &str, facts: &Facts) -> Result<&dyn Backend> {
        self.find(facts).ok_or_else(|| Error::NoBackend {
            host: host.to_string(),
            platform: facts.family.to_string(),
        })
    }
}
