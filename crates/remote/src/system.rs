//! Real transport: local `sh -c` for the controller, `ssh` for everything else.

use crate::error::{Error, Result};
use crate::executor::Executor;
use crate::types::{CommandOutput, Invocation, is_localhost, shell_quote};
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

/// Executor backed by real processes.
///
/// Localhost names run through a local shell, so the controller can be
/// provisioned without an SSH server; other hosts go through the `ssh`
/// client in batch mode (keys/agent only, never an interactive prompt).
#[derive(Debug, Clone)]
pub struct SystemExecutor {
    ssh_program: Option<PathBuf>,
    ssh_options: Vec<String>,
}

impl Default for SystemExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemExecutor {
    pub fn new() -> Self {
        Self {
            ssh_program: which::which("ssh").ok(),
            ssh_options: vec!["-o".to_string(), "BatchMode=yes".to_string()],
        }
    }

    /// Add a raw `ssh` option (e.g. `-p`, `2222`).
    pub fn with_ssh_option(mut self, option: impl Into<String>) -> Self {
        self.ssh_options.push(option.into());
        self
    }

    fn build(&self, host: &str, invocation: &Invocation) -> Result<Command> {
        if invocation.local || is_localhost(host) {
            let mut cmd = if invocation.privileged {
                let mut c = Command::new("sudo");
                c.args(["-n", "sh", "-c", &invocation.command]);
                c
            } else {
                let mut c = Command::new("sh");
                c.args(["-c", &invocation.command]);
                c
            };
            cmd.env("LC_ALL", "C");
            return Ok(cmd);
        }

        let ssh = self.ssh_program.as_ref().ok_or_else(|| Error::Spawn {
            host: host.to_string(),
            message: "ssh client not found in PATH".to_string(),
        })?;

        let remote_line = if invocation.privileged {
            format!("sudo -n sh -c {}", shell_quote(&invocation.command))
        } else {
            format!("sh -c {}", shell_quote(&invocation.command))
        };

        let mut cmd = Command::new(ssh);
        cmd.args(&self.ssh_options).arg(host).arg("--").arg(remote_line);
        Ok(cmd)
    }
}

impl Executor for SystemExecutor {
    fn execute(&self, host: &str, invocation: &Invocation) -> Result<CommandOutput> {
        let mut cmd = self.build(host, invocation)?;
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        cmd.stdin(if invocation.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });

        let mut child = cmd.spawn().map_err(|e| Error::Spawn {
            host: host.to_string(),
            message: e.to_string(),
        })?;

        // Feed stdin from a scoped thread so a chatty child can't deadlock
        // against a full stdout pipe.
        let output = std::thread::scope(|scope| {
            if let (Some(input), Some(mut stdin)) = (invocation.stdin.as_deref(), child.stdin.take())
            {
                scope.spawn(move || {
                    if let Err(e) = stdin.write_all(input) {
                        log::debug!("[{host}] stdin write failed: {e}");
                    }
                });
            }
            child.wait_with_output()
        })?;

        Ok(output.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::Shell;

    fn program_and_args(cmd: &Command) -> (String, Vec<String>) {
        (
            cmd.get_program().to_string_lossy().to_string(),
            cmd.get_args()
                .map(|a| a.to_string_lossy().to_string())
                .collect(),
        )
    }

    #[test]
    fn test_localhost_uses_shell() {
        let exec = SystemExecutor::new();
        let cmd = exec
            .build("localhost", &Invocation::new("uname -m"))
            .unwrap();
        let (program, args) = program_and_args(&cmd);
        assert_eq!(program, "sh");
        assert_eq!(args, vec!["-c", "uname -m"]);
    }

    #[test]
    fn test_localhost_privileged_uses_sudo() {
        let exec = SystemExecutor::new();
        let cmd = exec
            .build(
                "127.0.0.1",
                &Invocation::new("apt-get -qq update").privileged(true),
            )
            .unwrap();
        let (program, args) = program_and_args(&cmd);
        assert_eq!(program, "sudo");
        assert_eq!(args, vec!["-n", "sh", "-c", "apt-get -qq update"]);
    }

    #[test]
    fn test_remote_without_ssh_is_spawn_error() {
        let exec = SystemExecutor {
            ssh_program: None,
            ssh_options: Vec::new(),
        };
        let err = exec
            .build("web1", &Invocation::new("true"))
            .unwrap_err();
        assert!(matches!(err, Error::Spawn { .. }));
    }

    #[test]
    fn test_remote_line_is_quoted() {
        let exec = SystemExecutor {
            ssh_program: Some(PathBuf::from("/usr/bin/ssh")),
            ssh_options: vec!["-o".into(), "BatchMode=yes".into()],
        };
        let cmd = exec
            .build("web1", &Invocation::new("echo $HOME").privileged(true))
            .unwrap();
        let (program, args) = program_and_args(&cmd);
        assert_eq!(program, "/usr/bin/ssh");
        assert_eq!(
            args,
            vec!["-o", "BatchMode=yes", "web1", "--", "sudo -n sh -c 'echo $HOME'"]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_local_execution_roundtrip() {
        let exec = SystemExecutor::new();
        let sh = Shell::new(&exec, "localhost");
        let out = sh.run_with("printf abc", crate::RunOptions::probe()).unwrap();
        assert_eq!(out.stdout_str(), "abc");

        let out = sh
            .run_with("exit 4", crate::RunOptions::probe())
            .unwrap();
        assert_eq!(out.status, 4);
    }

    #[cfg(unix)]
    #[test]
    fn test_local_file_primitives() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("svc.conf");
        let path = path.to_string_lossy().to_string();
        let exec = SystemExecutor::new();
        let sh = Shell::new(&exec, "localhost");

        assert_eq!(sh.get(&path, false).unwrap(), None);
        sh.put(&path, b"[program:x]\n", false).unwrap();
        assert_eq!(sh.get(&path, false).unwrap(), Some(b"[program:x]\n".to_vec()));
        assert!(sh.exists(&path).unwrap());
        sh.remove(&path, false).unwrap();
        assert!(!sh.exists(&path).unwrap());
    }
}
