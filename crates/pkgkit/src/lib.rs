//! # pkgkit
//!
//! Idempotent package management across heterogeneous targets.
//!
//! - [`Registry`] holds the system backends (Homebrew, pacman, apt, pkgng,
//!   BSD ports) in a fixed priority order and picks exactly one per target
//! - [`PackageManager`] binds that backend to a target's shell: `add` and
//!   `remove` skip packages already in the desired state and collect
//!   per-package failures into a [`BatchReport`]; `update` and `upgrade`
//!   always run
//! - [`lang::locate`] finds pip, npm or gem on a target for callers that
//!   want a language package manager instead of the system one
//! - [`search_hosts`] searches many independent hosts in a bounded pool
//!
//! ## Example
//!
//! ```ignore
//! use pkgkit::{BatchOptions, PackageManager, Registry};
//!
//! let registry = Registry::default();
//! let target = cache.get_or_detect(&sh)?;
//! let pm = PackageManager::for_target(sh, &registry, &target)?;
//! let report = pm.add(&["htop git"], BatchOptions::default())?;
//! println!("{}", report.summary());
//! ```

pub mod backend;
pub mod error;
pub mod manager;
pub mod search;

pub use backend::apt::{add_key, add_ppa};
pub use backend::lang::{self, pip_perms};
pub use backend::ports::Aliases;
pub use backend::{Backend, BackendKind, Registry, preferred_kind};
pub use error::{Error, ErrorCategory, Result};
pub use manager::{BatchOptions, BatchReport, PackageFailure, PackageManager, split_names};
pub use search::{MAX_SEARCH_JOBS, search_hosts};
