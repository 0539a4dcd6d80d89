//! Service convergence: render, diff against what's deployed, and touch
//! the supervisor only when something changed.

use crate::context::{Fragments, Hooks, RenderContext};
use crate::error::Result;
use crate::naming::{NamingPolicy, ProgramName, ServiceIdentity};
use crate::supervisor::{ServiceStatus, Supervisor, SupervisorKind, detect_supervisor};
use crate::template::{Candidate, TemplateKind, TemplateLocator, render};
use platform::Target;
use remote::{Shell, shell_quote};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// One role's service on one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDefinition {
    pub identity: ServiceIdentity,
    pub program: ProgramName,
}

impl ServiceDefinition {
    pub fn new(identity: ServiceIdentity, policy: &NamingPolicy) -> Result<Self> {
        let program = policy.program_name(&identity)?;
        Ok(Self { identity, program })
    }

    pub fn role(&self) -> &str {
        &self.identity.role
    }

    /// Where this definition's template of `kind` may come from.
    pub fn candidates(&self, locator: &TemplateLocator, kind: TemplateKind) -> Vec<Candidate> {
        locator.candidates(kind, &self.program, self.role())
    }
}

/// What happened to one deployed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ArtifactState {
    /// Didn't exist, written directly
    Created,
    /// Deployed bytes match the rendering
    Unchanged,
    /// Differed; service stopped and file swapped
    Replaced,
}

/// Outcome of one `configure`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConvergenceResult {
    /// Some artifact was written
    pub changed: bool,
    /// An existing artifact was replaced, so the running service is stale
    pub restarted: bool,
}

impl ConvergenceResult {
    fn record(&mut self, state: ArtifactState) {
        match state {
            ArtifactState::Created => self.changed = true,
            ArtifactState::Replaced => {
                self.changed = true;
                self.restarted = true;
            }
            ArtifactState::Unchanged => {}
        }
    }
}

/// What `restart_or_reload` did to the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RestartAction {
    None,
    Reload,
    Restart,
}

impl RestartAction {
    /// New definitions only need the supervisor to pick them up; replaced
    /// ones need a restart; an unchanged service is still restarted unless
    /// the caller asked for a fast run, so new application code gets loaded.
    pub fn decide(result: ConvergenceResult, fast: bool) -> Self {
        match (result.changed, result.restarted) {
            (true, false) => Self::Reload,
            (true, true) => Self::Restart,
            (false, _) if !fast => Self::Restart,
            (false, _) => Self::None,
        }
    }
}

/// `configure` followed by `restart_or_reload`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Convergence {
    pub result: ConvergenceResult,
    pub action: RestartAction,
}

/// Converges service definitions under one supervisor.
pub struct Controller {
    supervisor: Box<dyn Supervisor>,
    templates: TemplateLocator,
    launcher_dir: Option<String>,
    hooks: Hooks,
    env: BTreeMap<String, String>,
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("supervisor", &self.supervisor.kind())
            .field("templates", &self.templates)
            .field("launcher_dir", &self.launcher_dir)
            .finish_non_exhaustive()
    }
}

impl Controller {
    pub fn new(kind: SupervisorKind) -> Self {
        Self {
            supervisor: kind.driver(),
            templates: TemplateLocator::default(),
            launcher_dir: None,
            hooks: Hooks::default(),
            env: BTreeMap::new(),
        }
    }

    /// Controller for whatever supervisor the target runs.
    pub fn detect(sh: &Shell) -> Result<Self> {
        let kind = detect_supervisor(sh)?;
        log::debug!("[{}] supervisor: {kind}", sh.host());
        Ok(Self::new(kind))
    }

    #[must_use]
    pub fn with_templates(mut self, dir: PathBuf) -> Self {
        self.templates = TemplateLocator::new(Some(dir));
        self
    }

    /// Deploy launch scripts to this directory on the target.
    #[must_use]
    pub fn with_launcher_dir(mut self, dir: impl Into<String>) -> Self {
        self.launcher_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn with_hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Environment variables injected into every definition.
    #[must_use]
    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn supervisor(&self) -> SupervisorKind {
        self.supervisor.kind()
    }

    pub fn config_path(&self, definition: &ServiceDefinition) -> String {
        self.supervisor.config_path(&definition.program)
    }

    fn launcher_path(&self, definition: &ServiceDefinition) -> Option<String> {
        self.launcher_dir
            .as_ref()
            .map(|dir| format!("{}/{}.sh", dir.trim_end_matches('/'), definition.program))
    }

    /// Render and deploy a definition, replacing deployed files only when
    /// their bytes differ.
    ///
    /// Templates are located and rendered before anything on the target is
    /// touched, so a missing template fails without side effects.
    pub fn configure(
        &self,
        sh: &Shell,
        target: &Target,
        definition: &ServiceDefinition,
        extras: &BTreeMap<String, String>,
    ) -> Result<ConvergenceResult> {
        let program = &definition.program;
        let role = definition.role();

        let mut fragments = Fragments::default();
        self.hooks.apply(role, &mut fragments);

        let launcher = match self.launcher_path(definition) {
            Some(path) => self
                .templates
                .find(TemplateKind::Launcher, program, role)?
                .map(|template| (path, template)),
            None => None,
        };
        fragments.launcher = launcher.as_ref().map(|(path, _)| path.clone());

        let ctx = RenderContext::build(
            &definition.identity,
            program,
            target,
            &self.env,
            &fragments,
            extras,
        );

        let primary = self
            .templates
            .locate(self.supervisor.template_kind(), program, role)?;
        log::debug!("[{}] {program}: template {}", sh.host(), primary.origin);
        let rendered = render(&primary, &ctx)?;
        let launcher = launcher
            .map(|(path, template)| render(&template, &ctx).map(|text| (path, text)))
            .transpose()?;

        let mut result = ConvergenceResult::default();
        let mut stopped = false;

        let state = self.deploy(sh, program, &self.config_path(definition), &rendered, &mut stopped)?;
        result.record(state);

        if let Some((path, text)) = launcher {
            let state = self.deploy(sh, program, &path, &text, &mut stopped)?;
            if state != ArtifactState::Unchanged {
                sh.privileged(&format!("chmod 755 {}", shell_quote(&path)))?;
            }
            result.record(state);
        }

        log::info!(
            "[{}] {program}: {}",
            sh.host(),
            match (result.changed, result.restarted) {
                (false, _) => "unchanged",
                (true, false) => "created",
                (true, true) => "changed",
            }
        );
        Ok(result)
    }

    fn deploy(
        &self,
        sh: &Shell,
        program: &ProgramName,
        path: &str,
        rendered: &str,
        stopped: &mut bool,
    ) -> Result<ArtifactState> {
        let Some(deployed) = sh.get(path, true)? else {
            sh.put(path, rendered.as_bytes(), true)?;
            return Ok(ArtifactState::Created);
        };

        if deployed == rendered.as_bytes() {
            return Ok(ArtifactState::Unchanged);
        }

        log_diff(sh.host(), path, &deployed, rendered);
        let staged = format!("{path}.new");
        sh.put(&staged, rendered.as_bytes(), true)?;
        if let Err(e) = self.swap(sh, program, &staged, path, stopped) {
            if let Err(cleanup) = sh.remove(&staged, true) {
                log::warn!("[{}] could not remove {staged}: {cleanup}", sh.host());
            }
            return Err(e);
        }
        Ok(ArtifactState::Replaced)
    }

    /// Stop the service once per `configure`, then move the staged file in.
    fn swap(
        &self,
        sh: &Shell,
        program: &ProgramName,
        staged: &str,
        path: &str,
        stopped: &mut bool,
    ) -> Result<()> {
        if !*stopped {
            self.supervisor.stop(sh, program)?;
            *stopped = true;
        }
        sh.rename(staged, path, true)?;
        Ok(())
    }

    /// Make the supervisor act on a `configure` result.
    pub fn restart_or_reload(
        &self,
        sh: &Shell,
        definition: &ServiceDefinition,
        result: ConvergenceResult,
        fast: bool,
    ) -> Result<RestartAction> {
        let program = &definition.program;
        let action = RestartAction::decide(result, fast);
        match action {
            RestartAction::None => {}
            RestartAction::Reload => self.supervisor.reload(sh, program)?,
            RestartAction::Restart => {
                self.supervisor.stop(sh, program)?;
                self.supervisor.start(sh, program)?;
            }
        }
        Ok(action)
    }

    /// `configure` then `restart_or_reload`.
    pub fn converge(
        &self,
        sh: &Shell,
        target: &Target,
        definition: &ServiceDefinition,
        extras: &BTreeMap<String, String>,
        fast: bool,
    ) -> Result<Convergence> {
        let result = self.configure(sh, target, definition, extras)?;
        let action = self.restart_or_reload(sh, definition, result, fast)?;
        Ok(Convergence { result, action })
    }

    pub fn status(&self, sh: &Shell, definition: &ServiceDefinition) -> Result<ServiceStatus> {
        self.supervisor.status(sh, &definition.program)
    }

    /// Stop the service, delete its artifacts and let the supervisor forget
    /// it. Returns whether anything was deployed.
    pub fn remove(&self, sh: &Shell, definition: &ServiceDefinition) -> Result<bool> {
        let program = &definition.program;
        let paths: Vec<String> = std::iter::once(self.config_path(definition))
            .chain(self.launcher_path(definition))
            .collect();

        let mut existing = Vec::new();
        for path in paths {
            if sh.exists(&path)? {
                existing.push(path);
            }
        }
        if existing.is_empty() {
            log::info!("[{}] {program}: not deployed", sh.host());
            return Ok(false);
        }

        self.supervisor.stop(sh, program)?;
        for path in &existing {
            sh.remove(path, true)?;
        }
        self.supervisor.remove(sh, program)?;
        log::info!("[{}] {program}: removed", sh.host());
        Ok(true)
    }
}

fn log_diff(host: &str, path: &str, deployed: &[u8], rendered: &str) {
    if !log::log_enabled!(log::Level::Debug) {
        return;
    }
    let deployed = String::from_utf8_lossy(deployed);
    let diff = similar::TextDiff::from_lines(&*deployed, rendered);
    let staged = format!("{path}.new");
    let mut unified = diff.unified_diff();
    unified.context_radius(3).header(path, &staged);
    log::debug!("[{host}] {path} differs:\n{unified}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use platform::{Facts, LinuxDistro, PlatformFamily};
    use remote::mock::MockExecutor;
    use std::fs;
    use tempfile::TempDir;

    const CONF: &str = "/etc/supervisor/conf.d/web-shop-production.conf";

    fn target() -> Target {
        let mut facts =
            Facts::with_family(PlatformFamily::Linux(LinuxDistro::new("ubuntu", "22.04")));
        facts.user = "deploy".into();
        facts.home = "/home/deploy".into();
        Target::new("web1", facts)
    }

    fn definition(role: &str) -> ServiceDefinition {
        ServiceDefinition::new(
            ServiceIdentity::new(role, "shop", "production"),
            &NamingPolicy::default(),
        )
        .unwrap()
    }

    fn templates(files: &[(&str, &str)]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for (name, text) in files {
            let path = dir.path().join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, text).unwrap();
        }
        dir
    }

    #[test]
    fn test_changed_template_restarts_once() {
        let dir = templates(&[("supervisor/web.conf", "[program:{{ program }}]\nv=1\n")]);
        let controller = Controller::new(SupervisorKind::Supervisord)
            .with_templates(dir.path().to_path_buf());
        let mock = MockExecutor::new();
        let sh = Shell::new(&mock, "web1");
        let def = definition("web");
        let extras = BTreeMap::new();

        // Run 1: nothing deployed yet, written directly and picked up by update.
        let run = controller.converge(&sh, &target(), &def, &extras, true).unwrap();
        assert_eq!(run.result, ConvergenceResult { changed: true, restarted: false });
        assert_eq!(run.action, RestartAction::Reload);
        assert_eq!(mock.file("web1", CONF).unwrap(), b"[program:web-shop-production]\nv=1\n");
        assert_eq!(mock.count("supervisorctl stop"), 0);

        // Run 2: the template changed.
        fs::write(dir.path().join("supervisor/web.conf"), "[program:{{ program }}]\nv=2\n").unwrap();
        mock.clear_calls();
        let run = controller.converge(&sh, &target(), &def, &extras, true).unwrap();
        assert_eq!(run.result, ConvergenceResult { changed: true, restarted: true });
        assert_eq!(run.action, RestartAction::Restart);
        assert_eq!(mock.file("web1", CONF).unwrap(), b"[program:web-shop-production]\nv=2\n");
        assert_eq!(mock.count("supervisorctl start web-shop-production"), 1);
        assert_eq!(mock.count(&format!("cat > {CONF}.new")), 1);
        assert_eq!(mock.files_on("web1"), vec![CONF]);

        // Run 3: no further change.
        mock.clear_calls();
        let run = controller.converge(&sh, &target(), &def, &extras, true).unwrap();
        assert_eq!(run.result, ConvergenceResult::default());
        assert_eq!(run.action, RestartAction::None);
        assert_eq!(mock.count("supervisorctl"), 0);
        assert_eq!(mock.count("cat >"), 0);
    }

    #[test]
    fn test_failed_swap_leaves_no_staged_file() {
        let mock = MockExecutor::new()
            .with_file("web1", CONF, "[program:old]\n")
            .fail_on(&format!("mv -f {CONF}.new"), 1, "read-only file system");
        let sh = Shell::new(&mock, "web1");
        let controller = Controller::new(SupervisorKind::Supervisord);

        let err = controller.configure(&sh, &target(), &definition("web"), &BTreeMap::new());
        assert!(err.is_err());
        assert_eq!(mock.files_on("web1"), vec![CONF]);
        assert_eq!(mock.file("web1", CONF).unwrap(), b"[program:old]\n");
        assert_eq!(mock.count(&format!("rm -f {CONF}.new")), 1);
    }

    #[test]
    fn test_unchanged_full_refresh_still_restarts() {
        let mock = MockExecutor::new();
        let sh = Shell::new(&mock, "web1");
        let controller = Controller::new(SupervisorKind::Supervisord);
        let def = definition("web");
        controller.configure(&sh, &target(), &def, &BTreeMap::new()).unwrap();

        mock.clear_calls();
        let run = controller
            .converge(&sh, &target(), &def, &BTreeMap::new(), false)
            .unwrap();
        assert!(!run.result.changed);
        assert_eq!(run.action, RestartAction::Restart);
        assert_eq!(mock.count("supervisorctl stop"), 1);
        assert_eq!(mock.count("supervisorctl start"), 1);
    }

    #[test]
    fn test_rendering_is_stable() {
        let mock = MockExecutor::new();
        let sh = Shell::new(&mock, "web1");
        let controller = Controller::new(SupervisorKind::Upstart);
        let def = definition("flower");
        let first = controller.configure(&sh, &target(), &def, &BTreeMap::new()).unwrap();
        assert!(first.changed);
        let second = controller.configure(&sh, &target(), &def, &BTreeMap::new()).unwrap();
        assert_eq!(second, ConvergenceResult::default());
    }

    #[test]
    fn test_worker_variants_do_not_collide() {
        let mock = MockExecutor::new();
        let sh = Shell::new(&mock, "web1");
        let controller = Controller::new(SupervisorKind::Supervisord);
        let low = definition("worker_low");
        let high = definition("worker_high");
        assert_ne!(low.program, high.program);

        for def in [&low, &high] {
            let run = controller
                .converge(&sh, &target(), def, &BTreeMap::new(), true)
                .unwrap();
            assert_eq!(run.action, RestartAction::Reload);
        }

        let files = mock.files_on("web1");
        assert_eq!(files.len(), 2);
        let low_conf = String::from_utf8(
            mock.file("web1", &controller.config_path(&low)).unwrap(),
        )
        .unwrap();
        let high_conf = String::from_utf8(
            mock.file("web1", &controller.config_path(&high)).unwrap(),
        )
        .unwrap();
        assert!(low_conf.contains("[program:worker_low-shop-production]"));
        assert!(low_conf.contains("-Q low"));
        assert!(high_conf.contains("-Q high"));
    }

    #[test]
    fn test_missing_template_touches_nothing() {
        let mock = MockExecutor::new();
        let sh = Shell::new(&mock, "web1");
        let controller = Controller::new(SupervisorKind::Supervisord);
        let err = controller
            .converge(&sh, &target(), &definition("cache"), &BTreeMap::new(), false)
            .unwrap_err();
        assert!(matches!(err, Error::TemplateNotFound { .. }));
        assert!(mock.calls().is_empty());
    }

    #[test]
    fn test_launcher_follows_the_same_diff_logic() {
        let dir = templates(&[
            ("supervisor/web.conf", "command={{ launcher }}\n"),
            ("launcher/web.sh", "#!/bin/sh\n{{ pre_command }}\nexec {{ home }}/bin/serve\n"),
        ]);
        let controller = Controller::new(SupervisorKind::Supervisord)
            .with_templates(dir.path().to_path_buf())
            .with_launcher_dir("/srv/bin/");
        let mock = MockExecutor::new();
        let sh = Shell::new(&mock, "web1");
        let def = definition("web");

        controller.configure(&sh, &target(), &def, &BTreeMap::new()).unwrap();
        assert_eq!(
            mock.file("web1", CONF).unwrap(),
            b"command=/srv/bin/web-shop-production.sh\n"
        );
        assert_eq!(
            mock.file("web1", "/srv/bin/web-shop-production.sh").unwrap(),
            b"#!/bin/sh\n\nexec /home/deploy/bin/serve\n"
        );
        assert_eq!(mock.count("chmod 755 /srv/bin/web-shop-production.sh"), 1);

        // Only the launcher changes: still a restart.
        fs::write(dir.path().join("launcher/web.sh"), "#!/bin/sh\nexec serve --v2\n").unwrap();
        let result = controller.configure(&sh, &target(), &def, &BTreeMap::new()).unwrap();
        assert!(result.restarted);
    }

    #[test]
    fn test_remove() {
        let mock = MockExecutor::new().with_file("web1", CONF, "x");
        let sh = Shell::new(&mock, "web1");
        let controller = Controller::new(SupervisorKind::Supervisord);
        let def = definition("web");

        assert!(controller.remove(&sh, &def).unwrap());
        assert!(mock.file("web1", CONF).is_none());
        assert_eq!(mock.count("supervisorctl stop web-shop-production"), 1);
        assert_eq!(mock.count("supervisorctl update"), 1);

        mock.clear_calls();
        assert!(!controller.remove(&sh, &def).unwrap());
        assert_eq!(mock.count("supervisorctl"), 0);
    }

    #[test]
    fn test_decide() {
        let unchanged = ConvergenceResult::default();
        assert_eq!(RestartAction::decide(unchanged, true), RestartAction::None);
        assert_eq!(RestartAction::decide(unchanged, false), RestartAction::Restart);
    }
}
