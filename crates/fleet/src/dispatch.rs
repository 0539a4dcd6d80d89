//! Role-based dispatch.
//!
//! An [`Operation`] runs once per selected host. The [`Dispatcher`] picks
//! the hosts from the requested roles: all of them (fleet mode) or just a
//! pinned host if it plays one of those roles. Roles that resolve to no
//! hosts make the operation skip, never fail. Without any roles defined
//! the dispatcher works ad hoc on the pinned host, or on [`LOCALHOST`].

use crate::error::Result;
use crate::roles::RoleMap;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};

/// Upper bound on dispatch worker threads.
pub const MAX_POOL_SIZE: usize = 16;

/// Where an ad-hoc dispatch runs when no host is pinned.
pub const LOCALHOST: &str = "localhost";

/// Per-host outcome of an operation.
pub type HostResult<T> = anyhow::Result<T>;

/// What an operation is told about the host it runs on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostCall {
    pub host: String,
    /// The requested role that selected this host. Program names depend on
    /// it, so it is always the first requested role the host plays.
    pub role: String,
}

type OperationFn<'f, T> = dyn Fn(&HostCall) -> HostResult<T> + Send + Sync + 'f;

/// A named unit of work run once per selected host.
pub struct Operation<'f, T> {
    name: String,
    serial: bool,
    run: Box<OperationFn<'f, T>>,
}

impl<T> fmt::Debug for Operation<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("name", &self.name)
            .field("serial", &self.serial)
            .finish_non_exhaustive()
    }
}

impl<'f, T> Operation<'f, T> {
    pub fn new<F>(name: impl Into<String>, run: F) -> Self
    where
        F: Fn(&HostCall) -> HostResult<T> + Send + Sync + 'f,
    {
        Self {
            name: name.into(),
            serial: false,
            run: Box::new(run),
        }
    }

    /// Never run this operation on two hosts at once, whatever the job
    /// count. For operations writing to one shared resource.
    #[must_use]
    pub fn serial(mut self) -> Self {
        self.serial = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_serial(&self) -> bool {
        self.serial
    }
}

/// Outcome of a dispatch.
#[derive(Debug)]
pub enum Dispatch<T> {
    /// Nothing ran.
    Skipped { reason: String },
    /// Ran on these hosts.
    Ran(BTreeMap<String, HostResult<T>>),
}

impl<T> Dispatch<T> {
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }

    /// Per-host results; `None` when skipped.
    pub fn results(&self) -> Option<&BTreeMap<String, HostResult<T>>> {
        match self {
            Self::Ran(results) => Some(results),
            Self::Skipped { .. } => None,
        }
    }

    /// Hosts whose operation failed.
    pub fn failures(&self) -> Vec<(&str, &anyhow::Error)> {
        self.results()
            .into_iter()
            .flatten()
            .filter_map(|(host, r)| r.as_ref().err().map(|e| (host.as_str(), e)))
            .collect()
    }
}

/// Dispatch progress notifications.
pub trait ProgressCallback: Send {
    /// Called once the host list is known.
    fn on_start(&mut self, total: usize);

    /// Called as each host finishes.
    fn on_host_done(&mut self, host: &str, ok: bool);

    fn on_finish(&mut self);
}

/// Progress callback that does nothing.
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_start(&mut self, _total: usize) {}
    fn on_host_done(&mut self, _host: &str, _ok: bool) {}
    fn on_finish(&mut self) {}
}

struct Skip {
    reason: String,
    expected: bool,
}

/// Runs operations against the hosts of requested roles.
#[derive(Debug, Clone)]
pub struct Dispatcher<'a> {
    roles: &'a RoleMap,
    pinned: Option<String>,
    jobs: usize,
}

impl<'a> Dispatcher<'a> {
    pub fn new(roles: &'a RoleMap) -> Self {
        Self {
            roles,
            pinned: None,
            jobs: 1,
        }
    }

    /// Single-host mode: only ever run on `host`.
    #[must_use]
    pub fn pinned(mut self, host: Option<String>) -> Self {
        self.pinned = host;
        self
    }

    /// Parallelism for fleet mode, clamped to `1..=MAX_POOL_SIZE`.
    #[must_use]
    pub fn jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.clamp(1, MAX_POOL_SIZE);
        self
    }

    pub fn job_count(&self) -> usize {
        self.jobs
    }

    pub fn roles(&self) -> &RoleMap {
        self.roles
    }

    /// The host calls a dispatch would make, or why it would skip.
    pub fn plan<S: AsRef<str>>(&self, requested: &[S]) -> std::result::Result<Vec<HostCall>, String> {
        self.select(requested).map_err(|skip| skip.reason)
    }

    fn select<S: AsRef<str>>(&self, requested: &[S]) -> std::result::Result<Vec<HostCall>, Skip> {
        if self.roles.is_empty() {
            return Ok(vec![self.ad_hoc(requested)]);
        }

        let matching: Vec<(&str, Vec<String>)> = requested
            .iter()
            .map(|r| (r.as_ref(), self.roles.hosts(r.as_ref())))
            .filter(|(_, hosts)| !hosts.is_empty())
            .collect();

        let names = requested.iter().map(AsRef::as_ref).collect::<Vec<&str>>().join(", ");
        if matching.is_empty() {
            return Err(Skip {
                reason: format!("no hosts for role(s) {names}"),
                expected: false,
            });
        }

        if let Some(pinned) = &self.pinned {
            return matching
                .iter()
                .find(|(_, hosts)| hosts.contains(pinned))
                .map(|(role, _)| {
                    vec![HostCall {
                        host: pinned.clone(),
                        role: (*role).to_string(),
                    }]
                })
                .ok_or_else(|| Skip {
                    reason: format!("{pinned} does not play role(s) {names}"),
                    expected: true,
                });
        }

        let mut calls: Vec<HostCall> = Vec::new();
        for (role, hosts) in &matching {
            for host in hosts {
                if !calls.iter().any(|c| &c.host == host) {
                    calls.push(HostCall {
                        host: host.clone(),
                        role: (*role).to_string(),
                    });
                }
            }
        }
        Ok(calls)
    }

    /// No roles at all: the pinned host, else localhost, stands in for
    /// every requested role.
    fn ad_hoc<S: AsRef<str>>(&self, requested: &[S]) -> HostCall {
        let host = self.pinned.clone().unwrap_or_else(|| LOCALHOST.to_string());
        let role = requested
            .first()
            .map_or(crate::roles::ANY_ROLE, |r| r.as_ref())
            .to_string();
        log::debug!("No roles defined, running ad hoc on {host}");
        HostCall { host, role }
    }

    /// Run `operation` on the hosts of `requested`, or skip.
    pub fn execute_or_not<T: Send, S: AsRef<str>>(
        &self,
        operation: &Operation<'_, T>,
        requested: &[S],
    ) -> Result<Dispatch<T>> {
        self.execute_with_progress(operation, requested, &mut NoProgress)
    }

    pub fn execute_with_progress<T: Send, S: AsRef<str>, P: ProgressCallback>(
        &self,
        operation: &Operation<'_, T>,
        requested: &[S],
        progress: &mut P,
    ) -> Result<Dispatch<T>> {
        let calls = match self.select(requested) {
            Ok(calls) => calls,
            Err(Skip { reason, expected }) => {
                // A pinned host outside the roles is routine; empty roles are not.
                if expected {
                    log::info!("{}: skipped, {reason}", operation.name);
                } else {
                    log::warn!("{}: skipped, {reason}", operation.name);
                }
                return Ok(Dispatch::Skipped { reason });
            }
        };

        progress.on_start(calls.len());
        let results = if operation.serial || self.jobs == 1 || calls.len() == 1 {
            let mut results = BTreeMap::new();
            for call in &calls {
                let result = run_one(operation, call);
                progress.on_host_done(&call.host, result.is_ok());
                results.insert(call.host.clone(), result);
            }
            results
        } else {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.jobs)
                .build()?;
            let progress = Mutex::new(&mut *progress);
            pool.install(|| {
                calls
                    .par_iter()
                    .map(|call| {
                        let result = run_one(operation, call);
                        progress
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .on_host_done(&call.host, result.is_ok());
                        (call.host.clone(), result)
                    })
                    .collect()
            })
        };
        progress.on_finish();

        Ok(Dispatch::Ran(results))
    }

    /// Dispatch each requested role on its own, so a host playing several
    /// requested roles runs the operation once per role.
    pub fn execute_each_role<T: Send, S: AsRef<str>>(
        &self,
        operation: &Operation<'_, T>,
        requested: &[S],
    ) -> Result<BTreeMap<String, Dispatch<T>>> {
        requested
            .iter()
            .map(|role| {
                let role = role.as_ref();
                Ok((role.to_string(), self.execute_or_not(operation, &[role])?))
            })
            .collect()
    }
}

fn run_one<T>(operation: &Operation<'_, T>, call: &HostCall) -> HostResult<T> {
    log::debug!("{}: [{}] as {}", operation.name, call.host, call.role);
    let result = (operation.run)(call);
    if let Err(e) = &result {
        log::warn!(
            "{}: [{}] (role {}) failed: {e:#}",
            operation.name,
            call.host,
            call.role
        );
    }
    result
}
