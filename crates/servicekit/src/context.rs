//! Render contexts and role hooks.

use crate::naming::{ProgramName, ServiceIdentity, base_role};
use platform::Target;
use std::collections::BTreeMap;

/// Key/value pairs a template is rendered against.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderContext {
    values: BTreeMap<String, String>,
}

impl RenderContext {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: &str, value: impl Into<String>) {
        self.values.insert(key.to_string(), value.into());
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Build the full context for one service on one target.
    ///
    /// Caller extras are applied last and may override anything.
    pub fn build(
        identity: &ServiceIdentity,
        program: &ProgramName,
        target: &Target,
        env: &BTreeMap<String, String>,
        fragments: &Fragments,
        extras: &BTreeMap<String, String>,
    ) -> Self {
        let facts = target.facts();
        let mut ctx = Self::default();
        ctx.insert("role", &identity.role);
        ctx.insert("program", program.as_str());
        ctx.insert("project", &identity.project);
        ctx.insert("environment", &identity.environment);
        ctx.insert("variant", identity.variant.clone().unwrap_or_default());
        ctx.insert("host", target.host());
        ctx.insert("user", &facts.user);
        ctx.insert("home", &facts.home);
        ctx.insert("arch", facts.arch());
        ctx.insert("os", facts.family.to_string());

        let mut env = env.clone();
        env.entry("ENVIRONMENT".to_string())
            .or_insert_with(|| identity.environment.clone());
        ctx.insert("env", supervisor_env(&env));
        ctx.insert("env_lines", env_lines(&env));

        ctx.insert("pre_command", fragments.pre_command.join("\n"));
        ctx.insert("post_command", fragments.post_command.join("\n"));
        ctx.insert("command_args", fragments.command_args.join(" "));
        ctx.insert("launcher", fragments.launcher.clone().unwrap_or_default());

        for (key, value) in extras {
            ctx.insert(key, value.clone());
        }
        ctx
    }

    #[cfg(test)]
    pub(crate) fn sample() -> Self {
        use platform::{Facts, LinuxDistro, PlatformFamily};

        let mut facts = Facts::with_family(PlatformFamily::Linux(LinuxDistro::new("ubuntu", "22.04")));
        facts.user = "deploy".into();
        facts.home = "/home/deploy".into();
        let target = Target::new("web1", facts);
        let identity = ServiceIdentity::new("worker_low", "shop", "production");
        let program = crate::naming::NamingPolicy::default()
            .program_name(&identity)
            .unwrap_or_else(|e| panic!("{e}"));
        let mut fragments = Fragments::default();
        Hooks::default().apply(&identity.role, &mut fragments);
        Self::build(
            &identity,
            &program,
            &target,
            &BTreeMap::new(),
            &fragments,
            &BTreeMap::new(),
        )
    }
}

/// supervisord `environment=` syntax: `KEY="value",KEY2="value2"`.
///
/// `%` is doubled since supervisord expands `%(name)s` in its config.
pub fn supervisor_env(env: &BTreeMap<String, String>) -> String {
    env.iter()
        .map(|(k, v)| format!("{k}={}", double_quoted(&v.replace('%', "%%"))))
        .collect::<Vec<_>>()
        .join(",")
}

/// upstart `env` stanzas, one per line.
pub fn env_lines(env: &BTreeMap<String, String>) -> String {
    env.iter()
        .map(|(k, v)| format!("env {k}={}", double_quoted(v)))
        .collect::<Vec<_>>()
        .join("\n")
}

fn double_quoted(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Command fragments contributed by role hooks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fragments {
    /// Lines run before the main command
    pub pre_command: Vec<String>,
    /// Lines run after it
    pub post_command: Vec<String>,
    /// Extra arguments for the main command
    pub command_args: Vec<String>,
    /// Path of the deployed launch script, when there is one
    pub launcher: Option<String>,
}

/// Role-specific additions to a service's render context.
pub trait RoleHook: Send + Sync {
    /// Whether this hook cares about `role`.
    fn applies(&self, role: &str) -> bool;

    fn contribute(&self, role: &str, fragments: &mut Fragments);
}

/// Celery-style workers: concurrency and queue routing.
///
/// `worker_low` consumes the `low` queue; a bare `worker` consumes the
/// default queue and gets no `-Q`.
#[derive(Debug, Clone)]
pub struct WorkerHook {
    pub concurrency: usize,
}

impl Default for WorkerHook {
    fn default() -> Self {
        Self { concurrency: 4 }
    }
}

impl RoleHook for WorkerHook {
    fn applies(&self, role: &str) -> bool {
        base_role(role) == "worker"
    }

    fn contribute(&self, role: &str, fragments: &mut Fragments) {
        fragments
            .command_args
            .push(format!("--concurrency {}", self.concurrency));
        if let Some((_, queue)) = role.split_once('_') {
            fragments.command_args.push(format!("-Q {queue}"));
        }
    }
}

/// Registered role hooks, applied in registration order.
pub struct Hooks {
    hooks: Vec<Box<dyn RoleHook>>,
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks").field("count", &self.hooks.len()).finish()
    }
}

impl Default for Hooks {
    fn default() -> Self {
        Self::empty().with(WorkerHook::default())
    }
}

impl Hooks {
    pub fn empty() -> Self {
        Self { hooks: Vec::new() }
    }

    #[must_use]
    pub fn with(mut self, hook: impl RoleHook + 'static) -> Self {
        self.hooks.push(Box::new(hook));
        self
    }

    /// Collect fragments from every hook that applies to `role`.
    pub fn apply(&self, role: &str, fragments: &mut Fragments) {
        for hook in self.hooks.iter().filter(|h| h.applies(role)) {
            hook.contribute(role, fragments);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_hook_routes_queue() {
        let hooks = Hooks::default();

        let mut fragments = Fragments::default();
        hooks.apply("worker_high", &mut fragments);
        assert_eq!(fragments.command_args, vec!["--concurrency 4", "-Q high"]);

        let mut fragments = Fragments::default();
        hooks.apply("worker", &mut fragments);
        assert_eq!(fragments.command_args, vec!["--concurrency 4"]);

        let mut fragments = Fragments::default();
        hooks.apply("web", &mut fragments);
        assert!(fragments.command_args.is_empty());
    }

    struct Migrate;

    impl RoleHook for Migrate {
        fn applies(&self, role: &str) -> bool {
            role == "web"
        }

        fn contribute(&self, _role: &str, fragments: &mut Fragments) {
            fragments.pre_command.push("./manage.py migrate --noinput".into());
        }
    }

    #[test]
    fn test_custom_hook_and_context_keys() {
        let hooks = Hooks::empty().with(Migrate);
        let mut fragments = Fragments::default();
        hooks.apply("web", &mut fragments);
        assert_eq!(fragments.pre_command, vec!["./manage.py migrate --noinput"]);

        let ctx = RenderContext::sample();
        assert_eq!(ctx.get("program"), Some("worker_low-shop-production"));
        assert_eq!(ctx.get("env"), Some("ENVIRONMENT=\"production\""));
        assert_eq!(ctx.get("env_lines"), Some("env ENVIRONMENT=\"production\""));
        assert_eq!(ctx.get("command_args"), Some("--concurrency 4 -Q low"));
        assert_eq!(ctx.get("variant"), Some(""));
        assert_eq!(ctx.get("os"), Some("ubuntu 22.04"));
    }

    #[test]
    fn test_env_values_are_quoted_and_escaped() {
        let env = BTreeMap::from([
            ("DB_URL".to_string(), "pa%ss word".to_string()),
            ("GREETING".to_string(), r#"say "hi""#.to_string()),
        ]);
        assert_eq!(
            supervisor_env(&env),
            r#"DB_URL="pa%%ss word",GREETING="say \"hi\"""#
        );
        assert_eq!(
            env_lines(&env),
            "env DB_URL=\"pa%ss word\"\nenv GREETING=\"say \\\"hi\\\"\""
        );
    }

    #[test]
    fn test_extras_override() {
        let mut facts = platform::Facts::with_family(platform::PlatformFamily::Darwin {
            version: "14".into(),
        });
        facts.user = "olive".into();
        let target = Target::new("localhost", facts);
        let identity = ServiceIdentity::new("web", "shop", "dev");
        let program = crate::naming::NamingPolicy::default()
            .program_name(&identity)
            .unwrap();
        let extras = BTreeMap::from([("user".to_string(), "www".to_string())]);
        let ctx = RenderContext::build(
            &identity,
            &program,
            &target,
            &BTreeMap::new(),
            &Fragments::default(),
            &extras,
        );
        assert_eq!(ctx.get("user"), Some("www"));
        assert_eq!(ctx.get("host"), Some("localhost"));
    }
}
