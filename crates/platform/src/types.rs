//! Platform facts.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// BSD flavours we know how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BsdVariant {
    FreeBsd,
    OpenBsd,
    NetBsd,
    DragonFly,
}

impl BsdVariant {
    /// Map a `uname -s` value to a variant.
    pub fn from_sysname(sysname: &str) -> Option<Self> {
        match sysname.trim() {
            "FreeBSD" => Some(Self::FreeBsd),
            "OpenBSD" => Some(Self::OpenBsd),
            "NetBSD" => Some(Self::NetBsd),
            "DragonFly" => Some(Self::DragonFly),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FreeBsd => "FreeBSD",
            Self::OpenBsd => "OpenBSD",
            Self::NetBsd => "NetBSD",
            Self::DragonFly => "DragonFly",
        }
    }
}

/// Linux distribution facts, from `/etc/os-release` or `lsb_release`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinuxDistro {
    /// Lowercase distribution id (`ubuntu`, `debian`, `arch`, ...)
    pub id: String,
    pub version: String,
    pub codename: Option<String>,
    /// Parent distributions from `ID_LIKE`
    pub like: Vec<String>,
    /// Human readable name
    pub description: String,
}

impl LinuxDistro {
    pub fn new(id: &str, version: &str) -> Self {
        Self {
            id: id.to_lowercase(),
            version: version.to_string(),
            codename: None,
            like: Vec::new(),
            description: format!("{id} {version}"),
        }
    }

    /// Whether this is Arch or an Arch derivative.
    pub fn is_arch_family(&self) -> bool {
        self.id == "arch" || self.like.iter().any(|l| l == "arch")
    }

    /// Whether this is Debian or a Debian derivative.
    pub fn is_debian_family(&self) -> bool {
        matches!(self.id.as_str(), "debian" | "ubuntu")
            || self.like.iter().any(|l| l == "debian" || l == "ubuntu")
    }
}

/// Operating system family of a target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum PlatformFamily {
    Linux(LinuxDistro),
    Darwin { version: String },
    Bsd { variant: BsdVariant, version: String },
}

impl PlatformFamily {
    pub fn name(&self) -> &str {
        match self {
            Self::Linux(_) => "linux",
            Self::Darwin { .. } => "darwin",
            Self::Bsd { .. } => "bsd",
        }
    }

    pub fn is_darwin(&self) -> bool {
        matches!(self, Self::Darwin { .. })
    }
}

impl fmt::Display for PlatformFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Linux(distro) => write!(f, "{}", distro.description),
            Self::Darwin { version } => write!(f, "macOS {version}"),
            Self::Bsd { variant, version } => write!(f, "{} {version}", variant.as_str()),
        }
    }
}

/// Kernel facts from `uname`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Uname {
    pub sysname: String,
    pub nodename: String,
    pub release: String,
    pub machine: String,
}

/// Hypervisors recognised from their shared-folder mounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Hypervisor {
    Parallels,
    VMware,
    VirtualBox,
}

impl Hypervisor {
    /// Mount types that give each hypervisor away.
    pub const MOUNT_MARKERS: &'static [(&'static str, Hypervisor)] = &[
        ("prl_fs", Hypervisor::Parallels),
        ("vmhgfs", Hypervisor::VMware),
        ("vmware", Hypervisor::VMware),
        ("vboxsf", Hypervisor::VirtualBox),
    ];

    /// Best-effort guess from `mount` output. No marker means "not a VM",
    /// which is wrong for guests without shared folders.
    pub fn from_mounts(mounts: &str) -> Option<Self> {
        Self::MOUNT_MARKERS
            .iter()
            .find(|(marker, _)| mounts.contains(marker))
            .map(|(_, hv)| *hv)
    }
}

/// Everything detection learns about a target up front.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Facts {
    pub user: String,
    pub home: String,
    pub family: PlatformFamily,
    pub kernel: Uname,
    pub hypervisor: Option<Hypervisor>,
}

impl Facts {
    /// Facts with only the platform family filled in; handy for tests and
    /// for reasoning about backends without a live host.
    pub fn with_family(family: PlatformFamily) -> Self {
        Self {
            user: String::new(),
            home: String::new(),
            family,
            kernel: Uname::default(),
            hypervisor: None,
        }
    }

    pub fn is_vm(&self) -> bool {
        self.hypervisor.is_some()
    }

    pub fn arch(&self) -> &str {
        &self.kernel.machine
    }

    pub fn is_darwin(&self) -> bool {
        self.family.is_darwin()
    }

    pub fn linux(&self) -> Option<&LinuxDistro> {
        match &self.family {
            PlatformFamily::Linux(distro) => Some(distro),
            _ => None,
        }
    }

    pub fn bsd(&self) -> Option<BsdVariant> {
        match &self.family {
            PlatformFamily::Bsd { variant, .. } => Some(*variant),
            _ => None,
        }
    }
}

/// Facts that need extra round trips and may not exist yet, such as an
/// installed application's runtime settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtendedFacts {
    values: BTreeMap<String, String>,
}

impl ExtendedFacts {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl From<BTreeMap<String, String>> for ExtendedFacts {
    fn from(values: BTreeMap<String, String>) -> Self {
        Self { values }
    }
}

/// Parse `KEY=VALUE` / `KEY = VALUE` lines, skipping blanks and `#` comments.
/// Surrounding single or double quotes are stripped from values.
pub fn parse_key_values(text: &str) -> BTreeMap<String, String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .filter_map(|l| l.split_once('='))
        .map(|(k, v)| {
            let v = v.trim();
            let v = v
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .or_else(|| v.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
                .unwrap_or(v);
            (k.trim().to_string(), v.to_string())
        })
        .collect()
}
