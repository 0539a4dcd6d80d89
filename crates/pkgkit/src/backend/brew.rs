//! Homebrew on macOS. Runs as the connecting user, never through sudo.

use super::{Backend, BackendKind, lines, run_for};
use crate::error::Result;
use platform::Facts;
use remote::{Shell, shell_quote};

#[derive(Debug, Clone, Copy, Default)]
pub struct Homebrew;

impl Backend for Homebrew {
    fn kind(&self) -> BackendKind {
        BackendKind::Homebrew
    }

    fn usable(&self, facts: &Facts) -> bool {
        facts.is_darwin()
    }

    fn is_installed(&self, sh: &Shell, name: &str) -> Result<bool> {
        Ok(sh.probe(&format!("brew list {} >/dev/null 2>&1", shell_quote(name)))?)
    }

    fn install(&self, sh: &Shell, name: &str) -> Result<()> {
        // Some formulae refuse to configure when they think they run as root.
        let cmd = format!("FORCE_UNSAFE_CONFIGURE=1 brew install {}", shell_quote(name));
        run_for(sh, self.kind(), &cmd, false, name).map(drop)
    }

    fn uninstall(&self, sh: &Shell, name: &str) -> Result<()> {
        let cmd = format!("brew remove {}", shell_quote(name));
        run_for(sh, self.kind(), &cmd, false, name).map(drop)
    }

    fn update(&self, sh: &Shell) -> Result<()> {
        run_for(sh, self.kind(), "brew update", false, "update").map(drop)
    }

    fn upgrade(&self, sh: &Shell) -> Result<()> {
        run_for(sh, self.kind(), "brew upgrade", false, "upgrade").map(drop)
    }

    fn search(&self, sh: &Shell, term: &str) -> Result<Vec<String>> {
        let cmd = format!("brew search {}", shell_quote(term));
        let out = run_for(sh, self.kind(), &cmd, false, term)?;
        // Section headers ("==> Formulae") aren't results.
        Ok(lines(&out)
            .into_iter()
            .filter(|l| !l.starts_with("==>"))
            .collect())
    }
}
