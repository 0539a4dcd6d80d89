//! Service supervisors.
//!
//! Two styles sit behind [`Supervisor`]: supervisord (one control utility
//! with sub-verbs) and upstart (per-job verbs and a well-known config
//! directory). Stopping is best-effort everywhere; start and reload
//! failures propagate.

use crate::error::{Error, Result};
use crate::naming::ProgramName;
use crate::template::TemplateKind;
use remote::{CommandOutput, RunOptions, Shell, shell_quote};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which supervisor a target runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SupervisorKind {
    Supervisord,
    Upstart,
}

impl SupervisorKind {
    pub fn driver(&self) -> Box<dyn Supervisor> {
        match self {
            Self::Supervisord => Box::new(Supervisord),
            Self::Upstart => Box::new(Upstart),
        }
    }
}

impl fmt::Display for SupervisorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Supervisord => "supervisord",
            Self::Upstart => "upstart",
        })
    }
}

impl FromStr for SupervisorKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "supervisord" | "supervisor" => Ok(Self::Supervisord),
            "upstart" => Ok(Self::Upstart),
            other => Err(format!("unknown supervisor: {other}")),
        }
    }
}

/// Runtime state of one program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ServiceStatus {
    Running,
    Stopped,
    /// Anything else, with the supervisor's own words
    Unknown(String),
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => f.write_str("running"),
            Self::Stopped => f.write_str("stopped"),
            Self::Unknown(raw) => write!(f, "unknown ({raw})"),
        }
    }
}

/// One supervisor style.
pub trait Supervisor: Send + Sync {
    fn kind(&self) -> SupervisorKind;

    /// Template kind for this supervisor's definition files.
    fn template_kind(&self) -> TemplateKind;

    /// Where a program's definition lives on the target.
    fn config_path(&self, program: &ProgramName) -> String;

    /// Whether this supervisor is present on the target.
    fn installed(&self, sh: &Shell) -> Result<bool>;

    /// Stop a program. Never fails on a program that isn't running.
    fn stop(&self, sh: &Shell, program: &ProgramName) -> Result<()>;

    fn start(&self, sh: &Shell, program: &ProgramName) -> Result<()>;

    /// Apply new or changed definitions without a full restart.
    fn reload(&self, sh: &Shell, program: &ProgramName) -> Result<()>;

    fn status(&self, sh: &Shell, program: &ProgramName) -> Result<ServiceStatus>;

    /// Forget a program whose definition was just deleted.
    fn remove(&self, sh: &Shell, program: &ProgramName) -> Result<()>;
}

/// Find the supervisor on a target: supervisorctl first, then upstart.
pub fn detect_supervisor(sh: &Shell) -> Result<SupervisorKind> {
    if Supervisord.installed(sh)? {
        Ok(SupervisorKind::Supervisord)
    } else if Upstart.installed(sh)? {
        Ok(SupervisorKind::Upstart)
    } else {
        Err(Error::NoSupervisor {
            host: sh.host().to_string(),
        })
    }
}

fn combined(output: &CommandOutput) -> String {
    format!("{}{}", output.stdout_str(), output.stderr_str())
        .trim()
        .to_string()
}

/// Run a verb that may legitimately report "already in that state".
fn tolerant(
    sh: &Shell,
    command: &str,
    action: &'static str,
    program: &ProgramName,
    already: &[&str],
) -> Result<()> {
    let output = sh.privileged_with(command, RunOptions::strict().warn_only())?;
    let text = combined(&output);
    let lower = text.to_lowercase();
    // supervisorctl 3.x exits 0 even on "ERROR (...)".
    let errored = output.failed_status() || lower.contains("error (");
    if errored && !already.iter().any(|a| lower.contains(a)) {
        return Err(Error::Supervisor {
            host: sh.host().to_string(),
            action,
            program: program.to_string(),
            output: text,
        });
    }
    Ok(())
}

/// supervisord, driven through `supervisorctl`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Supervisord;

impl Supervisord {
    pub const CONFIG_DIR: &'static str = "/etc/supervisor/conf.d";

    fn update(sh: &Shell, program: &ProgramName) -> Result<()> {
        tolerant(sh, "supervisorctl update", "update", program, &[])
    }
}

impl Supervisor for Supervisord {
    fn kind(&self) -> SupervisorKind {
        SupervisorKind::Supervisord
    }

    fn template_kind(&self) -> TemplateKind {
        TemplateKind::Supervisor
    }

    fn config_path(&self, program: &ProgramName) -> String {
        format!("{}/{program}.conf", Self::CONFIG_DIR)
    }

    fn installed(&self, sh: &Shell) -> Result<bool> {
        Ok(sh.has_binary("supervisorctl")?)
    }

    fn stop(&self, sh: &Shell, program: &ProgramName) -> Result<()> {
        let cmd = format!("supervisorctl stop {}", shell_quote(program.as_str()));
        sh.privileged_with(&cmd, RunOptions::strict().warn_only())?;
        Ok(())
    }

    fn start(&self, sh: &Shell, program: &ProgramName) -> Result<()> {
        // `update` first so a just-written definition is known.
        Self::update(sh, program)?;
        let cmd = format!("supervisorctl start {}", shell_quote(program.as_str()));
        tolerant(sh, &cmd, "start", program, &["already started"])
    }

    fn reload(&self, sh: &Shell, program: &ProgramName) -> Result<()> {
        Self::update(sh, program)
    }

    fn status(&self, sh: &Shell, program: &ProgramName) -> Result<ServiceStatus> {
        // Exits non-zero for anything but RUNNING on recent versions.
        let cmd = format!("supervisorctl status {}", shell_quote(program.as_str()));
        let output = sh.privileged_with(&cmd, RunOptions::probe())?;
        Ok(parse_supervisorctl_status(&output.stdout_str()))
    }

    fn remove(&self, sh: &Shell, program: &ProgramName) -> Result<()> {
        Self::update(sh, program)
    }
}

/// Parse `name   RUNNING   pid 123, uptime 0:01:02`.
pub fn parse_supervisorctl_status(output: &str) -> ServiceStatus {
    let line = output.lines().find(|l| !l.trim().is_empty()).unwrap_or("").trim();
    match line.split_whitespace().nth(1) {
        Some("RUNNING") => ServiceStatus::Running,
        Some("STOPPED" | "EXITED" | "FATAL") => ServiceStatus::Stopped,
        _ => ServiceStatus::Unknown(line.to_string()),
    }
}

/// upstart jobs under `/etc/init`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Upstart;

impl Upstart {
    pub const CONFIG_DIR: &'static str = "/etc/init";
}

impl Supervisor for Upstart {
    fn kind(&self) -> SupervisorKind {
        SupervisorKind::Upstart
    }

    fn template_kind(&self) -> TemplateKind {
        TemplateKind::Upstart
    }

    fn config_path(&self, program: &ProgramName) -> String {
        format!("{}/{program}.conf", Self::CONFIG_DIR)
    }

    fn installed(&self, sh: &Shell) -> Result<bool> {
        Ok(sh.exists(Self::CONFIG_DIR)?)
    }

    fn stop(&self, sh: &Shell, program: &ProgramName) -> Result<()> {
        let cmd = format!("stop {}", shell_quote(program.as_str()));
        sh.privileged_with(&cmd, RunOptions::strict().warn_only())?;
        Ok(())
    }

    fn start(&self, sh: &Shell, program: &ProgramName) -> Result<()> {
        let cmd = format!("start {}", shell_quote(program.as_str()));
        tolerant(sh, &cmd, "start", program, &["already running"])
    }

    fn reload(&self, sh: &Shell, program: &ProgramName) -> Result<()> {
        // Upstart doesn't start new jobs on its own.
        tolerant(sh, "initctl reload-configuration", "reload", program, &[])?;
        self.start(sh, program)
    }

    fn status(&self, sh: &Shell, program: &ProgramName) -> Result<ServiceStatus> {
        let cmd = format!("status {}", shell_quote(program.as_str()));
        let output = sh.privileged_with(&cmd, RunOptions::probe())?;
        Ok(parse_upstart_status(&combined(&output)))
    }

    fn remove(&self, sh: &Shell, program: &ProgramName) -> Result<()> {
        tolerant(sh, "initctl reload-configuration", "remove", program, &[])
    }
}

/// Parse `app-web start/running, process 1234`.
pub fn parse_upstart_status(output: &str) -> ServiceStatus {
    let line = output.lines().next().unwrap_or("").trim();
    if line.contains("start/running") {
        ServiceStatus::Running
    } else if line.contains("stop/waiting") {
        ServiceStatus::Stopped
    } else {
        ServiceStatus::Unknown(line.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::naming::{NamingPolicy, ServiceIdentity};
    use remote::mock::MockExecutor;

    fn program() -> ProgramName {
        NamingPolicy::default()
            .program_name(&ServiceIdentity::new("web", "shop", "production"))
            .unwrap()
    }

    #[test]
    fn test_detect_prefers_supervisorctl() {
        let mock = MockExecutor::new();
        assert_eq!(
            detect_supervisor(&Shell::new(&mock, "h")).unwrap(),
            SupervisorKind::Supervisord
        );

        let mock = MockExecutor::new()
            .fail_on("command -v supervisorctl", 1, "")
            .with_file("h", "/etc/init/ssh.conf", "");
        assert_eq!(
            detect_supervisor(&Shell::new(&mock, "h")).unwrap(),
            SupervisorKind::Upstart
        );

        let mock = MockExecutor::new().fail_on("command -v supervisorctl", 1, "");
        assert!(matches!(
            detect_supervisor(&Shell::new(&mock, "h")),
            Err(Error::NoSupervisor { .. })
        ));
    }

    #[test]
    fn test_stop_is_best_effort() {
        let mock = MockExecutor::new().fail_on("supervisorctl stop", 1, "no such process");
        Supervisord.stop(&Shell::new(&mock, "h"), &program()).unwrap();

        let mock = MockExecutor::new().fail_on("stop web", 1, "stop: Unknown instance:");
        Upstart.stop(&Shell::new(&mock, "h"), &program()).unwrap();
    }

    #[test]
    fn test_start_tolerates_already_started() {
        let mock = MockExecutor::new().respond(
            "supervisorctl start",
            "web-shop-production: ERROR (already started)\n",
        );
        let sh = Shell::new(&mock, "h");
        Supervisord.start(&sh, &program()).unwrap();
        assert_eq!(mock.commands(), vec![
            "supervisorctl update",
            "supervisorctl start web-shop-production",
        ]);

        let mock = MockExecutor::new().respond(
            "supervisorctl start",
            "web-shop-production: ERROR (spawn error)\n",
        );
        let err = Supervisord.start(&Shell::new(&mock, "h"), &program()).unwrap_err();
        assert!(matches!(err, Error::Supervisor { action: "start", .. }));
    }

    #[test]
    fn test_upstart_reload_starts_new_jobs() {
        let mock = MockExecutor::new().fail_on("start web", 1, "start: Job is already running");
        Upstart.reload(&Shell::new(&mock, "h"), &program()).unwrap();
        assert_eq!(mock.count("initctl reload-configuration"), 1);
        assert_eq!(mock.count("start web-shop-production"), 1);
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!(
            parse_supervisorctl_status("web-shop-production   RUNNING   pid 42, uptime 1:00:00\n"),
            ServiceStatus::Running
        );
        assert_eq!(
            parse_supervisorctl_status("web-shop-production   STOPPED   Not started"),
            ServiceStatus::Stopped
        );
        assert!(matches!(
            parse_supervisorctl_status("web-shop-production: ERROR (no such process)"),
            ServiceStatus::Unknown(_)
        ));
        assert_eq!(
            parse_upstart_status("web-shop-production start/running, process 1234"),
            ServiceStatus::Running
        );
        assert_eq!(
            parse_upstart_status("web-shop-production stop/waiting"),
            ServiceStatus::Stopped
        );
    }

    #[test]
    fn test_config_paths() {
        assert_eq!(
            Supervisord.config_path(&program()),
            "/etc/supervisor/conf.d/web-shop-production.conf"
        );
        assert_eq!(Upstart.config_path(&program()), "/etc/init/web-shop-production.conf");
    }
}
