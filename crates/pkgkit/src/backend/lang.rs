//! Language package managers: pip, npm and gem.
//!
//! These never take part in per-target selection. A caller asks for one by
//! kind with [`locate`], which finds the executable on the target, and
//! drives it through the same [`crate::PackageManager`] as a system backend.

use super::{Backend, BackendKind, lines, run_for};
use crate::error::{Error, Result};
use platform::Facts;
use remote::{Shell, shell_quote};

/// pip executables tried in order, per Python generation.
const PIP2_NAMES: &[&str] = &["pip", "pip-2.7", "pip-2"];
const PIP3_NAMES: &[&str] = &["pip3", "pip-3.5", "pip-3.4", "pip-3.3", "pip-3.2"];

/// pip builds in the working directory, so installs run from here.
const PIP_WORKDIR: &str = "/var/tmp";

/// Find the executable for a language manager on the target.
pub fn locate(sh: &Shell, kind: BackendKind) -> Result<Box<dyn Backend>> {
    let candidates: &[&str] = match kind {
        BackendKind::Pip2 => PIP2_NAMES,
        BackendKind::Pip3 => PIP3_NAMES,
        BackendKind::Npm => &["npm"],
        BackendKind::Gem => &["gem"],
        other => {
            return Err(Error::Unsupported {
                backend: other,
                operation: "act as a language package manager",
            });
        }
    };

    for name in candidates {
        if sh.has_binary(name)? {
            log::debug!("[{}] {kind}: using {name}", sh.host());
            return Ok(match kind {
                BackendKind::Npm => Box::new(Npm),
                BackendKind::Gem => Box::new(Gem),
                _ => Box::new(Pip::new(kind, name)),
            });
        }
    }
    Err(Error::MissingTool {
        host: sh.host().to_string(),
        backend: kind,
        tried: candidates.join(", "),
    })
}

/// Restore read permissions under `/usr/local/lib` after pip installed
/// files with a restrictive umask.
pub fn pip_perms(sh: &Shell) -> Result<()> {
    for (kind, mode) in [("f", "u+rw,g+r,o+r"), ("d", "u+rwx,g+rx,o+rx")] {
        let cmd = format!("find /usr/local/lib -type {kind} -print0 | xargs -0 -n 1024 chmod {mode}");
        run_for(sh, BackendKind::Pip2, &cmd, true, "permissions")?;
    }
    Ok(())
}

/// pip for one Python generation.
#[derive(Debug, Clone)]
pub struct Pip {
    kind: BackendKind,
    executable: String,
}

impl Pip {
    pub fn new(kind: BackendKind, executable: &str) -> Self {
        Self {
            kind,
            executable: executable.to_string(),
        }
    }
}

impl Backend for Pip {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn usable(&self, _facts: &Facts) -> bool {
        true
    }

    fn is_installed(&self, sh: &Shell, name: &str) -> Result<bool> {
        let pattern = shell_quote(&format!("^{name}=="));
        Ok(sh.probe(&format!("{} freeze 2>/dev/null | grep -qi {pattern}", self.executable))?)
    }

    fn install(&self, sh: &Shell, name: &str) -> Result<()> {
        let cmd = format!(
            "cd {PIP_WORKDIR} && {} install -U {}",
            self.executable,
            shell_quote(name)
        );
        run_for(sh, self.kind, &cmd, true, name).map(drop)
    }

    fn uninstall(&self, sh: &Shell, name: &str) -> Result<()> {
        let cmd = format!("{} uninstall -y {}", self.executable, shell_quote(name));
        run_for(sh, self.kind, &cmd, true, name).map(drop)
    }

    fn update(&self, _sh: &Shell) -> Result<()> {
        Err(Error::Unsupported {
            backend: self.kind,
            operation: "refresh package lists",
        })
    }

    fn upgrade(&self, _sh: &Shell) -> Result<()> {
        Err(Error::Unsupported {
            backend: self.kind,
            operation: "upgrade everything",
        })
    }

    fn search(&self, sh: &Shell, term: &str) -> Result<Vec<String>> {
        let cmd = format!("{} search {}", self.executable, shell_quote(term));
        run_for(sh, self.kind, &cmd, false, term).map(|out| lines(&out))
    }

    fn after_install(&self, sh: &Shell) -> Result<()> {
        run_for(sh, self.kind, &format!("rm -rf {PIP_WORKDIR}/build"), true, "cleanup")?;
        pip_perms(sh)
    }
}

/// Global Node.js packages.
#[derive(Debug, Clone, Copy, Default)]
pub struct Npm;

impl Backend for Npm {
    fn kind(&self) -> BackendKind {
        BackendKind::Npm
    }

    fn usable(&self, _facts: &Facts) -> bool {
        true
    }

    fn is_installed(&self, sh: &Shell, name: &str) -> Result<bool> {
        let quoted = shell_quote(name);
        let needle = shell_quote(&format!(" {name}@"));
        Ok(sh.probe(&format!("npm list -g {quoted} 2>/dev/null | grep -qF {needle}"))?)
    }

    fn install(&self, sh: &Shell, name: &str) -> Result<()> {
        let cmd = format!("npm install -g {}", shell_quote(name));
        run_for(sh, self.kind(), &cmd, true, name).map(drop)
    }

    fn uninstall(&self, sh: &Shell, name: &str) -> Result<()> {
        let cmd = format!("npm uninstall -g {}", shell_quote(name));
        run_for(sh, self.kind(), &cmd, true, name).map(drop)
    }

    fn update(&self, _sh: &Shell) -> Result<()> {
        Err(Error::Unsupported {
            backend: self.kind(),
            operation: "refresh package lists",
        })
    }

    fn upgrade(&self, sh: &Shell) -> Result<()> {
        run_for(sh, self.kind(), "npm update -g", true, "upgrade").map(drop)
    }

    fn search(&self, sh: &Shell, term: &str) -> Result<Vec<String>> {
        // Names and headers land on stderr.
        let cmd = format!(
            "npm search {} 2>&1 | grep -vE '^(npm |NAME|No match)' | sed -e 's/ =.*$//'",
            shell_quote(term)
        );
        run_for(sh, self.kind(), &cmd, false, term).map(|out| lines(&out))
    }
}

/// Ruby gems, installed as the connecting user.
#[derive(Debug, Clone, Copy, Default)]
pub struct Gem;

impl Backend for Gem {
    fn kind(&self) -> BackendKind {
        BackendKind::Gem
    }

    fn usable(&self, _facts: &Facts) -> bool {
        true
    }

    fn is_installed(&self, sh: &Shell, name: &str) -> Result<bool> {
        Ok(sh.probe(&format!("gem list -i {} >/dev/null", shell_quote(name)))?)
    }

    fn install(&self, sh: &Shell, name: &str) -> Result<()> {
        let cmd = format!("gem install --no-document {}", shell_quote(name));
        run_for(sh, self.kind(), &cmd, false, name).map(drop)
    }

    fn uninstall(&self, sh: &Shell, name: &str) -> Result<()> {
        let cmd = format!("gem uninstall -x -a {}", shell_quote(name));
        run_for(sh, self.kind(), &cmd, false, name).map(drop)
    }

    fn update(&self, _sh: &Shell) -> Result<()> {
        Err(Error::Unsupported {
            backend: self.kind(),
            operation: "refresh package lists",
        })
    }

    fn upgrade(&self, sh: &Shell) -> Result<()> {
        run_for(sh, self.kind(), "gem update --no-document", false, "upgrade").map(drop)
    }

    fn search(&self, sh: &Shell, term: &str) -> Result<Vec<String>> {
        let cmd = format!(
            "gem search -r {} 2>&1 | grep -vE '^(\\*\\*\\*|$)'",
            shell_quote(term)
        );
        run_for(sh, self.kind(), &cmd, false, term).map(|out| lines(&out))
    }
}
