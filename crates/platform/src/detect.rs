//! Platform detection over a [`Shell`].
//!
//! Detection runs a handful of cheap commands, in this order:
//!
//! | Step | Command                              | Fills                    |
//! |------|--------------------------------------|--------------------------|
//! | 1    | `echo "${USER},${HOME}"`             | user, home               |
//! | 2    | `cat /etc/os-release`, `lsb_release` | Linux distribution       |
//! | 2'   | `sw_vers -productVersion`            | Darwin version           |
//! | 2''  | `uname -s`, `uname -r`               | BSD variant and release  |
//! | 3    | `uname -s -n -r -m`                  | kernel, node name, arch  |
//! | 4    | `mount`                              | hypervisor (best effort) |
//!
//! Local and remote targets go through the same commands; only the
//! transport differs.

use crate::error::{Error, Result};
use crate::types::{
    BsdVariant, Facts, Hypervisor, LinuxDistro, PlatformFamily, Uname, parse_key_values,
};
use remote::Shell;

/// Detect the facts of the host behind `sh`.
///
/// # Errors
///
/// Returns [`Error::Undetectable`] when no platform probe answers, and
/// propagates transport failures.
pub fn detect_facts(sh: &Shell) -> Result<Facts> {
    let host = sh.host();

    let (user, home) = user_and_home(sh)?;
    let family = detect_family(sh)?.ok_or_else(|| Error::Undetectable {
        host: host.to_string(),
    })?;
    let kernel = uname(sh)?;
    let hypervisor = hypervisor(sh);

    log::debug!("[{host}] detected {family} ({})", kernel.machine);

    Ok(Facts {
        user,
        home,
        family,
        kernel,
        hypervisor,
    })
}

fn user_and_home(sh: &Shell) -> Result<(String, String)> {
    let out = sh.capture(r#"echo "${USER},${HOME}""#)?;
    match out.split_once(',') {
        Some((user, home)) if !home.is_empty() => Ok((user.to_string(), home.to_string())),
        _ => Err(Error::Malformed {
            host: sh.host().to_string(),
            what: "user/home",
            output: out,
        }),
    }
}

fn detect_family(sh: &Shell) -> Result<Option<PlatformFamily>> {
    if let Some(distro) = linux_distro(sh)? {
        return Ok(Some(PlatformFamily::Linux(distro)));
    }

    // No distribution facts: assume Darwin or BSD.
    let sw_vers = sh.run_with("sw_vers -productVersion", remote::RunOptions::probe())?;
    if sw_vers.succeeded() {
        let version = sw_vers.stdout_str().trim().to_string();
        if !version.is_empty() {
            return Ok(Some(PlatformFamily::Darwin { version }));
        }
    }

    let sysname = sh.run_with("uname -s", remote::RunOptions::probe())?;
    if let Some(variant) = BsdVariant::from_sysname(&sysname.stdout_str()) {
        let version = sh.capture("uname -r")?;
        return Ok(Some(PlatformFamily::Bsd { variant, version }));
    }

    Ok(None)
}

fn linux_distro(sh: &Shell) -> Result<Option<LinuxDistro>> {
    let os_release = sh.run_with("cat /etc/os-release", remote::RunOptions::probe())?;
    if os_release.succeeded() {
        if let Some(distro) = parse_os_release(&os_release.stdout_str()) {
            return Ok(Some(distro));
        }
    }

    let lsb = sh.run_with("lsb_release -a", remote::RunOptions::probe())?;
    if lsb.succeeded() {
        return Ok(parse_lsb_release(&lsb.stdout_str()));
    }

    Ok(None)
}

/// Parse `/etc/os-release` contents.
pub fn parse_os_release(text: &str) -> Option<LinuxDistro> {
    let map = parse_key_values(text);
    let id = map.get("ID")?.to_lowercase();
    let version = map
        .get("VERSION_ID")
        .cloned()
        .unwrap_or_else(|| "rolling".to_string());

    Some(LinuxDistro {
        description: map
            .get("PRETTY_NAME")
            .cloned()
            .unwrap_or_else(|| format!("{id} {version}")),
        codename: map.get("VERSION_CODENAME").cloned(),
        like: map
            .get("ID_LIKE")
            .map(|l| l.split_whitespace().map(str::to_lowercase).collect())
            .unwrap_or_default(),
        id,
        version,
    })
}

/// Parse `lsb_release -a` output (`Key:\tvalue` lines).
pub fn parse_lsb_release(text: &str) -> Option<LinuxDistro> {
    let field = |name: &str| {
        text.lines()
            .filter_map(|l| l.split_once(':'))
            .find(|(k, _)| k.trim() == name)
            .map(|(_, v)| v.trim().to_string())
            .filter(|v| !v.is_empty() && v != "n/a")
    };

    let id = field("Distributor ID")?;
    let version = field("Release").unwrap_or_else(|| "rolling".to_string());
    let mut distro = LinuxDistro::new(&id, &version);
    distro.codename = field("Codename");
    if let Some(description) = field("Description") {
        distro.description = description;
    }
    Some(distro)
}

fn uname(sh: &Shell) -> Result<Uname> {
    let out = sh.capture("uname -s -n -r -m")?;
    parse_uname(&out).ok_or_else(|| Error::Malformed {
        host: sh.host().to_string(),
        what: "uname",
        output: out,
    })
}

/// Parse `uname -s -n -r -m` output.
pub fn parse_uname(text: &str) -> Option<Uname> {
    let mut parts = text.split_whitespace();
    Some(Uname {
        sysname: parts.next()?.to_string(),
        nodename: parts.next()?.to_string(),
        release: parts.next()?.to_string(),
        machine: parts.next()?.to_string(),
    })
}

fn hypervisor(sh: &Shell) -> Option<Hypervisor> {
    match sh.run_with("mount", remote::RunOptions::probe()) {
        Ok(out) if out.succeeded() => Hypervisor::from_mounts(&out.stdout_str()),
        Ok(_) => None,
        Err(e) => {
            log::debug!("[{}] virtualization probe failed: {e}", sh.host());
            None
        }
    }
}
