//! Fleet roles and role-based dispatch.
//!
//! A [`RoleMap`] says which hosts play which role. A [`Dispatcher`] runs an
//! [`Operation`] on the hosts of the requested roles, either the whole fleet
//! with bounded parallelism or one pinned host. Operations whose roles have
//! no hosts are skipped. With no roles defined at all, operations run on
//! the pinned host or on localhost.
//!
//! ```
//! use fleet::{Dispatcher, Operation, RoleMap};
//!
//! let roles = RoleMap::new().with_role("web", &["web1", "web2"]);
//! let op = Operation::new("uptime", |call: &fleet::HostCall| Ok(call.host.clone()));
//! let dispatch = Dispatcher::new(&roles).jobs(2).execute_or_not(&op, &["web"]).unwrap();
//! assert_eq!(dispatch.results().unwrap().len(), 2);
//! ```

pub mod dispatch;
pub mod error;
pub mod roles;

pub use dispatch::{
    Dispatch, Dispatcher, HostCall, HostResult, LOCALHOST, MAX_POOL_SIZE, NoProgress, Operation,
    ProgressCallback,
};
pub use error::{Error, Result};
pub use roles::{ANY_ROLE, CompanionRule, RoleMap};
