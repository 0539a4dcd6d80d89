//! FreeBSD binary packages through `pkg`.

use super::{Backend, BackendKind, lines, run_for};
use crate::error::Result;
use platform::{BsdVariant, Facts};
use remote::{Shell, shell_quote};

#[derive(Debug, Clone, Copy, Default)]
pub struct Pkgng;

impl Backend for Pkgng {
    fn kind(&self) -> BackendKind {
        BackendKind::Pkgng
    }

    fn usable(&self, facts: &Facts) -> bool {
        matches!(
            facts.bsd(),
            Some(BsdVariant::FreeBsd | BsdVariant::DragonFly)
        )
    }

    fn is_installed(&self, sh: &Shell, name: &str) -> Result<bool> {
        Ok(sh.probe(&format!("pkg info {} >/dev/null 2>&1", shell_quote(name)))?)
    }

    fn install(&self, sh: &Shell, name: &str) -> Result<()> {
        // -U: don't refresh the catalogue on every install.
        let cmd = format!("pkg install -Uy {}", shell_quote(name));
        run_for(sh, self.kind(), &cmd, true, name).map(drop)
    }

    fn uninstall(&self, sh: &Shell, name: &str) -> Result<()> {
        let cmd = format!("pkg delete -Ryf {}", shell_quote(name));
        run_for(sh, self.kind(), &cmd, true, name).map(drop)
    }

    fn update(&self, sh: &Shell) -> Result<()> {
        run_for(sh, self.kind(), "pkg update", true, "update").map(drop)
    }

    fn upgrade(&self, sh: &Shell) -> Result<()> {
        run_for(sh, self.kind(), "pkg upgrade -Uy", true, "upgrade").map(drop)
    }

    fn search(&self, sh: &Shell, term: &str) -> Result<Vec<String>> {
        let cmd = format!("pkg search -L name {}", shell_quote(term));
        run_for(sh, self.kind(), &cmd, false, term).map(|out| lines(&out))
    }
}
