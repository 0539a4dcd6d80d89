//! # Remote
//!
//! The command-execution channel everything else is built on.
//!
//! - [`Executor`]: a transport (local shell, SSH, or the recording
//!   [`mock::MockExecutor`]) that runs an [`Invocation`] on a host
//! - [`Shell`]: an executor bound to one host, with the `run` / `privileged`
//!   / `local` flavours and the failure policy from [`RunOptions`]
//!
//! ## Example
//!
//! ```ignore
//! use remote::{Shell, SystemExecutor};
//!
//! let exec = SystemExecutor::new();
//! let sh = Shell::new(&exec, "web1.example.org");
//! let kernel = sh.capture("uname -sr")?;
//! sh.privileged("apt-get -qq update")?;
//! ```

pub mod error;
pub mod executor;
pub mod mock;
pub mod system;
pub mod types;

pub use error::{Error, Result};
pub use executor::{Executor, Shell};
pub use system::SystemExecutor;
pub use types::{CommandOutput, Invocation, RunOptions, is_localhost, shell_quote};
