//! # servicekit
//!
//! Converges per-role service definitions on a target.
//!
//! A [`ServiceDefinition`] names one role's service through a
//! [`NamingPolicy`]. The [`Controller`] locates its template (most specific
//! first, bundled fallback last), renders it against the target's facts and
//! hook-contributed fragments, compares the bytes with what is deployed, and
//! only then involves the [`Supervisor`]:
//!
//! | deployed file | action                         | supervisor        |
//! |---------------|--------------------------------|-------------------|
//! | missing       | write                          | reload (apply)    |
//! | identical     | nothing                        | restart unless fast |
//! | different     | stage `.new`, stop, swap       | stop + start      |

pub mod context;
pub mod controller;
pub mod error;
pub mod naming;
pub mod supervisor;
pub mod template;

pub use context::{Fragments, Hooks, RenderContext, RoleHook, WorkerHook};
pub use controller::{
    ArtifactState, Controller, Convergence, ConvergenceResult, RestartAction, ServiceDefinition,
};
pub use error::{Error, Result};
pub use naming::{NameComponent, NamingPolicy, ProgramName, ServiceIdentity, base_role};
pub use supervisor::{
    ServiceStatus, Supervisor, SupervisorKind, Supervisord, Upstart, detect_supervisor,
};
pub use template::{Template, TemplateKind, TemplateLocator, render};
