//! Program names: the key that identifies one deployed service definition.
//!
//! A program name is composed from the role, project, optional variant and
//! environment. Components may not contain any separator character, so the
//! composition is injective: two distinct tuples never produce the same name
//! under one policy.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The parts a program name can be composed of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NameComponent {
    Role,
    Project,
    Variant,
    Environment,
}

impl NameComponent {
    pub const ALL: [Self; 4] = [Self::Role, Self::Project, Self::Variant, Self::Environment];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Role => "role",
            Self::Project => "project",
            Self::Variant => "variant",
            Self::Environment => "environment",
        }
    }
}

/// What a service is: one role of one project in one environment,
/// optionally one of several co-resident variants.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ServiceIdentity {
    pub role: String,
    pub project: String,
    pub environment: String,
    pub variant: Option<String>,
}

impl ServiceIdentity {
    pub fn new(role: &str, project: &str, environment: &str) -> Self {
        Self {
            role: role.to_string(),
            project: project.to_string(),
            environment: environment.to_string(),
            variant: None,
        }
    }

    #[must_use]
    pub fn with_variant(mut self, variant: Option<&str>) -> Self {
        self.variant = variant.map(ToString::to_string);
        self
    }

    /// `worker_low` -> `worker`; roles without a suffix are their own base.
    pub fn base_role(&self) -> &str {
        base_role(&self.role)
    }

    fn component(&self, component: NameComponent) -> Option<&str> {
        match component {
            NameComponent::Role => Some(&self.role),
            NameComponent::Project => Some(&self.project),
            NameComponent::Variant => self.variant.as_deref(),
            NameComponent::Environment => Some(&self.environment),
        }
    }
}

/// Strip a `_suffix` from a role name.
pub fn base_role(role: &str) -> &str {
    role.split_once('_').map_or(role, |(base, _)| base)
}

/// A validated program name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ProgramName(String);

impl ProgramName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProgramName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ProgramName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// How program names are composed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamingPolicy {
    pub separator: String,
    pub order: Vec<NameComponent>,
}

impl Default for NamingPolicy {
    fn default() -> Self {
        Self {
            separator: "-".to_string(),
            order: NameComponent::ALL.to_vec(),
        }
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')
}

impl NamingPolicy {
    /// Check the policy: a non-empty separator of file-name-safe characters,
    /// and every component exactly once.
    pub fn validate(&self) -> Result<()> {
        if self.separator.is_empty() || !self.separator.chars().all(is_name_char) {
            return Err(Error::InvalidPolicy(format!(
                "separator {:?} must be non-empty and use only [A-Za-z0-9_.-]",
                self.separator
            )));
        }
        for component in NameComponent::ALL {
            let count = self.order.iter().filter(|c| **c == component).count();
            if count != 1 {
                return Err(Error::InvalidPolicy(format!(
                    "{} must appear exactly once in the order (found {count})",
                    component.as_str()
                )));
            }
        }
        Ok(())
    }

    /// Check one component value against this policy.
    pub fn validate_component(&self, component: NameComponent, value: &str) -> Result<()> {
        let invalid = |reason: String| Error::InvalidName {
            component: component.as_str(),
            value: value.to_string(),
            reason,
        };
        if value.is_empty() {
            return Err(invalid("must not be empty".into()));
        }
        if let Some(c) = value.chars().find(|c| !is_name_char(*c)) {
            return Err(invalid(format!("character {c:?} is not allowed")));
        }
        if let Some(c) = value.chars().find(|c| self.separator.contains(*c)) {
            return Err(invalid(format!(
                "contains {c:?} from the separator {:?}",
                self.separator
            )));
        }
        Ok(())
    }

    /// Compose the program name for a service. An absent variant is omitted.
    pub fn program_name(&self, identity: &ServiceIdentity) -> Result<ProgramName> {
        self.validate()?;
        let mut parts = Vec::with_capacity(self.order.len());
        for component in &self.order {
            if let Some(value) = identity.component(*component) {
                self.validate_component(*component, value)?;
                parts.push(value);
            }
        }
        Ok(ProgramName(parts.join(&self.separator)))
    }
}
