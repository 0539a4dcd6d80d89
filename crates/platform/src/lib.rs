//! # Platform
//!
//! Detects what a target is before anything touches it: operating system
//! family and version, architecture, user and home directory, and whether
//! it runs under a hypervisor.
//!
//! - [`detect_facts`] runs the probes over a [`remote::Shell`]
//! - [`Target`] pairs a host with its [`Facts`] and lazily loaded
//!   [`ExtendedFacts`]
//! - [`TargetCache`] keeps one `Target` per host for the duration of a run

pub mod detect;
pub mod error;
pub mod target;
pub mod types;

pub use detect::{detect_facts, parse_os_release, parse_uname};
pub use error::{Error, Result};
pub use target::{ExtendedProbe, Target, TargetCache};
pub use types::{
    BsdVariant, ExtendedFacts, Facts, Hypervisor, LinuxDistro, PlatformFamily, Uname,
    parse_key_values,
};
