//! Debian and derivatives, through apt-get and dpkg.

use super::{Backend, BackendKind, lines, run_for};
use crate::error::Result;
use platform::Facts;
use remote::{RunOptions, Shell, shell_quote};

/// Non-interactive apt-get that keeps locally modified config files.
pub const APT_GET: &str = "DEBIAN_PRIORITY=critical DEBIAN_FRONTEND=noninteractive \
                           apt-get -o Dpkg::Options::='--force-confold'";

/// Package that provides `add-apt-repository`.
const PPA_TOOL_PACKAGE: &str = "software-properties-common";

#[derive(Debug, Clone, Copy, Default)]
pub struct Apt;

impl Backend for Apt {
    fn kind(&self) -> BackendKind {
        BackendKind::Apt
    }

    fn usable(&self, facts: &Facts) -> bool {
        facts.linux().is_some_and(platform::LinuxDistro::is_debian_family)
    }

    fn is_installed(&self, sh: &Shell, name: &str) -> Result<bool> {
        // `dpkg -l` lists removed packages too; only "install ok installed" counts.
        let output = sh.run_with(
            &format!(
                "dpkg-query -W -f='${{Status}}' {} 2>/dev/null",
                shell_quote(name)
            ),
            RunOptions::probe(),
        )?;
        Ok(output.succeeded() && output.stdout_str().trim() == "install ok installed")
    }

    fn install(&self, sh: &Shell, name: &str) -> Result<()> {
        let cmd = format!("{APT_GET} -q install --yes {}", shell_quote(name));
        run_for(sh, self.kind(), &cmd, true, name).map(drop)
    }

    fn uninstall(&self, sh: &Shell, name: &str) -> Result<()> {
        let cmd = format!("{APT_GET} -q remove --purge --yes {}", shell_quote(name));
        run_for(sh, self.kind(), &cmd, true, name).map(drop)
    }

    fn update(&self, sh: &Shell) -> Result<()> {
        run_for(sh, self.kind(), "apt-get -qq update", true, "update").map(drop)
    }

    fn upgrade(&self, sh: &Shell) -> Result<()> {
        let cmd = format!("{APT_GET} -q -u dist-upgrade --yes");
        run_for(sh, self.kind(), &cmd, true, "upgrade").map(drop)
    }

    fn search(&self, sh: &Shell, term: &str) -> Result<Vec<String>> {
        let cmd = format!("apt-cache search {}", shell_quote(term));
        run_for(sh, self.kind(), &cmd, false, term).map(|out| lines(&out))
    }
}

/// Add an APT source (`ppa:owner/name` or a full `deb ...` line) unless
/// it is already configured, then refresh the package lists.
///
/// Returns whether anything was added.
pub fn add_ppa(sh: &Shell, source: &str) -> Result<bool> {
    let needle = match source.strip_prefix("ppa:") {
        Some(ppa) => format!("ppa.launchpad.net/{ppa}"),
        None => source.trim().to_string(),
    };
    let configured = sh.probe(&format!(
        "grep -rqsF {} /etc/apt/sources.list /etc/apt/sources.list.d",
        shell_quote(&needle)
    ))?;
    if configured {
        log::debug!("[{}] apt source already configured: {source}", sh.host());
        return Ok(false);
    }

    if !Apt.is_installed(sh, PPA_TOOL_PACKAGE)? {
        Apt.install(sh, PPA_TOOL_PACKAGE)?;
    }
    let cmd = format!("add-apt-repository -y {}", shell_quote(source));
    run_for(sh, BackendKind::Apt, &cmd, true, source)?;
    Apt.update(sh)?;
    Ok(true)
}

/// Import a repository signing key from `url` unless `key_id` is already
/// in the keyring. Returns whether the key was imported.
pub fn add_key(sh: &Shell, url: &str, key_id: &str) -> Result<bool> {
    let known = sh.privileged_probe(&format!(
        "apt-key list 2>/dev/null | tr -d ' ' | grep -qi {}",
        shell_quote(&key_id.replace(' ', ""))
    ))?;
    if known {
        return Ok(false);
    }
    let cmd = format!("wget -q -O - {} | apt-key add -", shell_quote(url));
    run_for(sh, BackendKind::Apt, &cmd, true, url)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use remote::CommandOutput;
    use remote::mock::MockExecutor;

    #[test]
    fn test_is_installed_requires_installed_status() {
        let mock = MockExecutor::new()
            .respond("dpkg-query -W -f='${Status}' htop", "install ok installed")
            .respond("dpkg-query -W -f='${Status}' vim", "deinstall ok config-files");
        let sh = Shell::new(&mock, "web1");
        assert!(Apt.is_installed(&sh, "htop").unwrap());
        assert!(!Apt.is_installed(&sh, "vim").unwrap());
    }

    #[test]
    fn test_install_is_privileged_and_noninteractive() {
        let mock = MockExecutor::new();
        let sh = Shell::new(&mock, "web1");
        Apt.install(&sh, "htop").unwrap();
        let call = &mock.calls()[0];
        assert!(call.privileged);
        assert!(call.command.contains("DEBIAN_FRONTEND=noninteractive"));
        assert!(call.command.ends_with("-q install --yes htop"));
    }

    #[test]
    fn test_add_ppa_skips_configured_source() {
        let mock = MockExecutor::new().with_handler(|_, inv| {
            inv.command
                .starts_with("grep -rqsF ppa.launchpad.net/chris-lea/redis-server")
                .then(CommandOutput::default)
        });
        let sh = Shell::new(&mock, "web1");
        assert!(!add_ppa(&sh, "ppa:chris-lea/redis-server").unwrap());
        assert_eq!(mock.count("add-apt-repository"), 0);
    }

    #[test]
    fn test_add_ppa_adds_and_refreshes() {
        let mock = MockExecutor::new()
            .fail_on("grep -rqsF", 1, "")
            .respond(
                "dpkg-query -W -f='${Status}' software-properties-common",
                "install ok installed",
            );
        let sh = Shell::new(&mock, "web1");
        assert!(add_ppa(&sh, "ppa:chris-lea/redis-server").unwrap());
        assert_eq!(mock.count("add-apt-repository -y ppa:chris-lea/redis-server"), 1);
        assert_eq!(mock.count("apt-get -qq update"), 1);
        assert_eq!(mock.count("install --yes"), 0);
    }

    #[test]
    fn test_add_key_is_idempotent() {
        let mock = MockExecutor::new().fail_on("apt-key list", 1, "");
        let sh = Shell::new(&mock, "web1");
        assert!(add_key(&sh, "https://example.org/key.asc", "ABCD 1234").unwrap());
        assert_eq!(mock.count("apt-key add -"), 1);

        let mock = MockExecutor::new();
        let sh = Shell::new(&mock, "web1");
        assert!(!add_key(&sh, "https://example.org/key.asc", "ABCD1234").unwrap());
        assert_eq!(mock.count("apt-key add -"), 0);
    }
}
