//! Arch Linux and derivatives.

use super::{Backend, BackendKind, lines, run_for};
use crate::error::Result;
use platform::Facts;
use remote::{Shell, shell_quote};

#[derive(Debug, Clone, Copy, Default)]
pub struct Pacman;

impl Backend for Pacman {
    fn kind(&self) -> BackendKind {
        BackendKind::Pacman
    }

    fn usable(&self, facts: &Facts) -> bool {
        facts.linux().is_some_and(platform::LinuxDistro::is_arch_family)
    }

    fn is_installed(&self, sh: &Shell, name: &str) -> Result<bool> {
        // Exact local database lookup; `-Qs` would also match descriptions.
        Ok(sh.probe(&format!("pacman -Q {} >/dev/null 2>&1", shell_quote(name)))?)
    }

    fn install(&self, sh: &Shell, name: &str) -> Result<()> {
        let cmd = format!("pacman -S --noconfirm --noprogressbar {}", shell_quote(name));
        run_for(sh, self.kind(), &cmd, true, name).map(drop)
    }

    fn uninstall(&self, sh: &Shell, name: &str) -> Result<()> {
        let cmd = format!("pacman -Rs --noconfirm {}", shell_quote(name));
        run_for(sh, self.kind(), &cmd, true, name).map(drop)
    }

    fn update(&self, sh: &Shell) -> Result<()> {
        run_for(sh, self.kind(), "pacman -Sy", true, "update").map(drop)
    }

    fn upgrade(&self, sh: &Shell) -> Result<()> {
        let cmd = "pacman -Su --noconfirm --noprogressbar";
        run_for(sh, self.kind(), cmd, true, "upgrade").map(drop)
    }

    fn search(&self, sh: &Shell, term: &str) -> Result<Vec<String>> {
        let cmd = format!("pacman -Ss {}", shell_quote(term));
        let out = run_for(sh, self.kind(), &cmd, false, term)?;
        // Results come in pairs: "repo/name version" then an indented description.
        let headers: String = out
            .lines()
            .filter(|l| !l.starts_with(char::is_whitespace))
            .collect::<Vec<_>>()
            .join("\n");
        Ok(lines(&headers))
    }
}
