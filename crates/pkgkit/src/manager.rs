//! Idempotent package operations on one target.

use crate::backend::{Backend, BackendKind, Registry};
use crate::error::{ErrorCategory, Result};
use platform::Target;
use remote::Shell;
use serde::Serialize;

/// Split whitespace-separated package lists: `["htop vim", "git"]` ->
/// `["htop", "vim", "git"]`.
pub fn split_names<S: AsRef<str>>(names: &[S]) -> Vec<String> {
    names
        .iter()
        .flat_map(|n| n.as_ref().split_whitespace())
        .map(ToString::to_string)
        .collect()
}

/// Batch behaviour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOptions {
    /// Stop at the first failing package instead of collecting failures.
    pub fail_fast: bool,
}

impl BatchOptions {
    pub fn fail_fast() -> Self {
        Self { fail_fast: true }
    }
}

/// One package that could not be brought to the desired state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageFailure {
    pub name: String,
    pub category: ErrorCategory,
    pub message: String,
}

/// What a batch `add`/`remove` did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    /// Packages that were installed or removed
    pub changed: Vec<String>,
    /// Packages already in the desired state
    pub unchanged: Vec<String>,
    pub failed: Vec<PackageFailure>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} changed, {} unchanged, {} failed",
            self.changed.len(),
            self.unchanged.len(),
            self.failed.len()
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Desired {
    Present,
    Absent,
}

/// The selected backend for one target, bound to that target's shell.
pub struct PackageManager<'a> {
    sh: Shell<'a>,
    backend: &'a dyn Backend,
}

impl std::fmt::Debug for PackageManager<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackageManager")
            .field("host", &self.sh.host())
            .field("backend", &self.backend.kind())
            .finish()
    }
}

impl<'a> PackageManager<'a> {
    pub fn new(sh: Shell<'a>, backend: &'a dyn Backend) -> Self {
        Self { sh, backend }
    }

    /// Select the backend for a detected target.
    pub fn for_target(sh: Shell<'a>, registry: &'a Registry, target: &Target) -> Result<Self> {
        let backend = registry.select(target.host(), target.facts())?;
        log::debug!("[{}] package backend: {}", target.host(), backend.kind());
        Ok(Self::new(sh, backend))
    }

    pub fn kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn is_installed(&self, name: &str) -> Result<bool> {
        self.backend.is_installed(&self.sh, name)
    }

    /// Install every package that is not installed yet.
    pub fn add<S: AsRef<str>>(&self, names: &[S], options: BatchOptions) -> Result<BatchReport> {
        self.converge(names, Desired::Present, options)
    }

    /// Remove every package that is currently installed.
    pub fn remove<S: AsRef<str>>(&self, names: &[S], options: BatchOptions) -> Result<BatchReport> {
        self.converge(names, Desired::Absent, options)
    }

    /// Refresh package lists. Always runs.
    pub fn update(&self) -> Result<()> {
        self.backend.update(&self.sh)
    }

    /// Upgrade outdated packages. Always runs.
    pub fn upgrade(&self) -> Result<()> {
        self.backend.upgrade(&self.sh)
    }

    /// Search for each term, concatenating results in term order.
    pub fn search<S: AsRef<str>>(&self, terms: &[S]) -> Result<Vec<String>> {
        let mut found = Vec::new();
        for term in split_names(terms) {
            found.extend(self.backend.search(&self.sh, &term)?);
        }
        Ok(found)
    }

    fn converge<S: AsRef<str>>(
        &self,
        names: &[S],
        desired: Desired,
        options: BatchOptions,
    ) -> Result<BatchReport> {
        let mut report = BatchReport::default();

        for name in split_names(names) {
            match self.converge_one(&name, desired) {
                Ok(true) => report.changed.push(name),
                Ok(false) => report.unchanged.push(name),
                Err(e) if options.fail_fast => return Err(e),
                Err(e) => {
                    let category = e.category();
                    log::warn!(
                        "[{}] {} {name}: {e} ({})",
                        self.sh.host(),
                        match desired {
                            Desired::Present => "add",
                            Desired::Absent => "remove",
                        },
                        category.advice()
                    );
                    report.failed.push(PackageFailure {
                        name,
                        category,
                        message: e.to_string(),
                    });
                }
            }
        }

        if desired == Desired::Present
            && !report.changed.is_empty()
            && let Err(e) = self.backend.after_install(&self.sh)
        {
            log::warn!("[{}] {} post-install step failed: {e}", self.sh.host(), self.kind());
        }

        log::info!("[{}] {}: {}", self.sh.host(), self.kind(), report.summary());
        Ok(report)
    }

    fn converge_one(&self, name: &str, desired: Desired) -> Result<bool> {
        let installed = self.backend.is_installed(&self.sh, name)?;
        match (desired, installed) {
            (Desired::Present, false) => self.backend.install(&self.sh, name)?,
            (Desired::Absent, true) => self.backend.uninstall(&self.sh, name)?,
            _ => return Ok(false),
        }
        Ok(true)
    }
}
