//! Per-invocation state shared by every command.

use crate::config::Config;
use crate::progress::BarProgress;
use anyhow::{Context as _, Result};
use fleet::{Dispatch, Dispatcher, HostCall, Operation, RoleMap};
use pkgkit::Registry;
use platform::{Target, TargetCache};
use remote::{Executor, Shell};
use servicekit::Controller;
use std::sync::Arc;

/// Flags that apply to every command.
#[derive(Debug, Clone, Default)]
pub struct GlobalOptions {
    pub quiet: bool,
    /// Skip fleet-wide confirmation prompts
    pub yes: bool,
    /// Overrides `[dispatch] jobs`
    pub jobs: Option<usize>,
    /// Overrides `[dispatch] pinned_host`
    pub host: Option<String>,
}

/// Everything a command needs: config, roles, the executor and the caches
/// that live for one run.
pub struct RunContext {
    pub config: Config,
    pub roles: RoleMap,
    pub options: GlobalOptions,
    executor: Arc<dyn Executor>,
    cache: TargetCache,
    registry: Registry,
}

impl RunContext {
    /// Build a context, validating the config against the roles first so
    /// misconfiguration fails before any host is contacted.
    pub fn new(
        config: Config,
        roles: RoleMap,
        options: GlobalOptions,
        executor: Arc<dyn Executor>,
    ) -> Result<Self> {
        config.validate(&roles).context("Invalid configuration")?;
        let registry = config.registry();
        Ok(Self {
            config,
            roles,
            options,
            executor,
            cache: TargetCache::new(),
            registry,
        })
    }

    pub fn shell<'a>(&'a self, host: &'a str) -> Shell<'a> {
        Shell::new(self.executor.as_ref(), host)
    }

    pub fn executor(&self) -> &dyn Executor {
        self.executor.as_ref()
    }

    /// The host's target, detected on first use in this run.
    pub fn target(&self, host: &str) -> Result<Arc<Target>> {
        let sh = self.shell(host);
        self.cache
            .get_or_detect(&sh)
            .with_context(|| format!("Could not detect platform of {host}"))
    }

    pub fn cache(&self) -> &TargetCache {
        &self.cache
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn pinned_host(&self) -> Option<&str> {
        self.options
            .host
            .as_deref()
            .or(self.config.dispatch.pinned_host.as_deref())
    }

    pub fn jobs(&self) -> usize {
        self.options
            .jobs
            .map_or_else(|| self.config.jobs(), |j| j.clamp(1, fleet::MAX_POOL_SIZE))
    }

    pub fn dispatcher(&self) -> Dispatcher<'_> {
        Dispatcher::new(&self.roles)
            .pinned(self.pinned_host().map(ToString::to_string))
            .jobs(self.jobs())
    }

    /// Service controller for one host: forced supervisor or detected.
    pub fn controller(&self, sh: &Shell) -> Result<Controller> {
        let services = &self.config.services;
        let mut controller = match services.supervisor {
            Some(kind) => Controller::new(kind),
            None => Controller::detect(sh)?,
        };
        if let Some(dir) = self.config.templates_dir() {
            controller = controller.with_templates(dir);
        }
        if let Some(dir) = &services.launcher_dir {
            controller = controller.with_launcher_dir(dir.clone());
        }
        Ok(controller.with_env(services.env.clone()))
    }

    /// Run an operation on the hosts of `requested`, asking first when it
    /// would touch more than one host.
    pub fn run<T: Send, S: AsRef<str>>(
        &self,
        operation: &Operation<'_, T>,
        requested: &[S],
    ) -> Result<Dispatch<T>> {
        let dispatcher = self.dispatcher();
        if let Ok(calls) = dispatcher.plan(requested)
            && !self.confirm(operation.name(), &calls)?
        {
            return Ok(Dispatch::Skipped {
                reason: "declined".to_string(),
            });
        }

        if self.options.quiet {
            return Ok(dispatcher.execute_or_not(operation, requested)?);
        }
        let mut progress = BarProgress::new(operation.name());
        Ok(dispatcher.execute_with_progress(operation, requested, &mut progress)?)
    }

    fn confirm(&self, name: &str, calls: &[HostCall]) -> Result<bool> {
        if self.options.yes || calls.len() < 2 {
            return Ok(true);
        }
        let hosts: Vec<&str> = calls.iter().map(|c| c.host.as_str()).collect();
        let confirmed = dialoguer::Confirm::new()
            .with_prompt(format!("{name} on {} hosts ({})?", hosts.len(), hosts.join(", ")))
            .default(false)
            .interact()?;
        Ok(confirmed)
    }
}
