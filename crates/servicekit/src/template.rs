//! Locating and rendering service templates.
//!
//! Templates are plain text with `{{ key }}` placeholders. Rendering is pure
//! substitution; anything conditional belongs in a role hook.

use crate::context::RenderContext;
use crate::error::{Error, Result};
use crate::naming::{ProgramName, base_role};
use regex::Regex;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("placeholder pattern is valid")
});

/// The kinds of artifact a service definition is made of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateKind {
    /// supervisord `[program:x]` file
    Supervisor,
    /// upstart job file
    Upstart,
    /// Process launch script
    Launcher,
}

impl TemplateKind {
    /// Subdirectory of the templates directory.
    pub fn dir(&self) -> &'static str {
        match self {
            Self::Supervisor => "supervisor",
            Self::Upstart => "upstart",
            Self::Launcher => "launcher",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Supervisor | Self::Upstart => "conf",
            Self::Launcher => "sh",
        }
    }
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir())
    }
}

/// Templates shipped with the binary, keyed `kind/base_role`.
const BUNDLED: &[(&str, &str)] = &[
    (
        "supervisor/web",
        include_str!("../templates/supervisor/web.conf"),
    ),
    (
        "supervisor/worker",
        include_str!("../templates/supervisor/worker.conf"),
    ),
    (
        "supervisor/flower",
        include_str!("../templates/supervisor/flower.conf"),
    ),
    ("upstart/web", include_str!("../templates/upstart/web.conf")),
    (
        "upstart/worker",
        include_str!("../templates/upstart/worker.conf"),
    ),
    (
        "upstart/flower",
        include_str!("../templates/upstart/flower.conf"),
    ),
];

fn bundled(key: &str) -> Option<&'static str> {
    BUNDLED.iter().find(|(k, _)| *k == key).map(|(_, t)| *t)
}

/// One place a template may come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Candidate {
    File(PathBuf),
    Bundled(String),
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Bundled(key) => write!(f, "<bundled>/{key}"),
        }
    }
}

/// A template and where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub origin: String,
    pub text: String,
}

/// Finds templates on the controller, falling back to the bundled set.
#[derive(Debug, Clone, Default)]
pub struct TemplateLocator {
    dir: Option<PathBuf>,
}

impl TemplateLocator {
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Candidates, most specific first: the program name, the role, the base
    /// role, then the bundled template for the base role.
    pub fn candidates(&self, kind: TemplateKind, program: &ProgramName, role: &str) -> Vec<Candidate> {
        let base = base_role(role);
        let mut names = vec![program.as_str(), role, base];
        names.dedup();

        let mut candidates: Vec<Candidate> = self
            .dir
            .iter()
            .flat_map(|dir| {
                names.iter().map(move |name| {
                    Candidate::File(
                        dir.join(kind.dir())
                            .join(format!("{name}.{}", kind.extension())),
                    )
                })
            })
            .collect();
        candidates.push(Candidate::Bundled(format!("{}/{base}", kind.dir())));
        candidates
    }

    /// First existing candidate, or `None`.
    pub fn find(&self, kind: TemplateKind, program: &ProgramName, role: &str) -> Result<Option<Template>> {
        for candidate in self.candidates(kind, program, role) {
            match &candidate {
                Candidate::File(path) => {
                    if !path.is_file() {
                        continue;
                    }
                    let text = std::fs::read_to_string(path).map_err(|source| Error::Template {
                        path: path.clone(),
                        source,
                    })?;
                    return Ok(Some(Template {
                        origin: candidate.to_string(),
                        text,
                    }));
                }
                Candidate::Bundled(key) => {
                    if let Some(text) = bundled(key) {
                        return Ok(Some(Template {
                            origin: candidate.to_string(),
                            text: text.to_string(),
                        }));
                    }
                }
            }
        }
        Ok(None)
    }

    /// Like [`TemplateLocator::find`], but a missing template is an error.
    pub fn locate(&self, kind: TemplateKind, program: &ProgramName, role: &str) -> Result<Template> {
        self.find(kind, program, role)?
            .ok_or_else(|| Error::TemplateNotFound {
                program: program.to_string(),
                kind: kind.to_string(),
                tried: self
                    .candidates(kind, program, role)
                    .iter()
                    .map(ToString::to_string)
                    .collect(),
            })
    }
}

/// Substitute every `{{ key }}` in the template from the context.
pub fn render(template: &Template, context: &RenderContext) -> Result<String> {
    let text = &template.text;
    let mut out = String::with_capacity(text.len());
    let mut last = 0;

    for caps in PLACEHOLDER.captures_iter(text) {
        let (Some(whole), Some(key)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let value = context
            .get(key.as_str())
            .ok_or_else(|| Error::UnknownPlaceholder {
                template: template.origin.clone(),
                key: key.as_str().to_string(),
            })?;
        out.push_str(&text[last..whole.start()]);
        out.push_str(value);
        last = whole.end();
    }
    out.push_str(&text[last..]);
    Ok(out)
}
