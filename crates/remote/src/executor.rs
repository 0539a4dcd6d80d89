//! The executor trait and the per-host [`Shell`] handle built on top of it.

use crate::error::{Error, Result};
use crate::types::{CommandOutput, Invocation, RunOptions, is_localhost, shell_quote};

/// Exit status used by the default `read_file` to signal a missing file.
const MISSING_FILE_STATUS: i32 = 3;

/// Transport that runs commands on a host.
///
/// Implementations only move bytes: they never turn a non-zero exit into an
/// error. That policy (and command logging) lives in [`Shell`], so every
/// transport behaves the same.
///
/// The file primitives have shell-based defaults; transports with a better
/// channel (or an in-memory one, see [`crate::mock::MockExecutor`]) can
/// override them.
pub trait Executor: Send + Sync {
    /// Run one invocation on `host` and return its raw output.
    fn execute(&self, host: &str, invocation: &Invocation) -> Result<CommandOutput>;

    /// Read a file, returning `None` when it does not exist.
    fn read_file(&self, host: &str, path: &str, privileged: bool) -> Result<Option<Vec<u8>>> {
        let quoted = shell_quote(path);
        let command =
            format!("if [ -f {quoted} ]; then cat {quoted}; else exit {MISSING_FILE_STATUS}; fi");
        let output = self.execute(
            host,
            &Invocation::new(command)
                .privileged(privileged)
                .options(RunOptions::probe()),
        )?;

        match output.status {
            0 => Ok(Some(output.stdout)),
            MISSING_FILE_STATUS => Ok(None),
            _ => Err(Error::File {
                host: host.to_string(),
                path: path.to_string(),
                message: output.stderr_str().trim().to_string(),
            }),
        }
    }

    /// Write (create or truncate) a file with the given contents.
    fn write_file(&self, host: &str, path: &str, contents: &[u8], privileged: bool) -> Result<()> {
        let output = self.execute(
            host,
            &Invocation::new(format!("cat > {}", shell_quote(path)))
                .privileged(privileged)
                .stdin(contents)
                .options(RunOptions::probe()),
        )?;
        file_result(host, path, &output)
    }

    /// Move a file into place, replacing the destination.
    fn rename(&self, host: &str, from: &str, to: &str, privileged: bool) -> Result<()> {
        let output = self.execute(
            host,
            &Invocation::new(format!("mv -f {} {}", shell_quote(from), shell_quote(to)))
                .privileged(privileged)
                .options(RunOptions::probe()),
        )?;
        file_result(host, to, &output)
    }

    /// Delete a file. Deleting a missing file is not an error.
    fn remove_file(&self, host: &str, path: &str, privileged: bool) -> Result<()> {
        let output = self.execute(
            host,
            &Invocation::new(format!("rm -f {}", shell_quote(path)))
                .privileged(privileged)
                .options(RunOptions::probe()),
        )?;
        file_result(host, path, &output)
    }

    /// Whether a path exists on the host.
    fn exists(&self, host: &str, path: &str) -> Result<bool> {
        let output = self.execute(
            host,
            &Invocation::new(format!("test -e {}", shell_quote(path)))
                .options(RunOptions::probe()),
        )?;
        Ok(output.succeeded())
    }
}

fn file_result(host: &str, path: &str, output: &CommandOutput) -> Result<()> {
    if output.succeeded() {
        Ok(())
    } else {
        Err(Error::File {
            host: host.to_string(),
            path: path.to_string(),
            message: output.stderr_str().trim().to_string(),
        })
    }
}

/// An executor bound to one host.
///
/// This is what the rest of the system talks to: `run`, `privileged` and
/// `local` mirror the three execution flavours, and every call goes through
/// the same failure and logging policy.
#[derive(Clone, Copy)]
pub struct Shell<'a> {
    executor: &'a dyn Executor,
    host: &'a str,
}

impl std::fmt::Debug for Shell<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shell").field("host", &self.host).finish()
    }
}

impl<'a> Shell<'a> {
    pub fn new(executor: &'a dyn Executor, host: &'a str) -> Self {
        Self { executor, host }
    }

    pub fn host(&self) -> &'a str {
        self.host
    }

    /// Whether commands end up on the controller itself.
    pub fn is_local(&self) -> bool {
        is_localhost(self.host)
    }

    pub fn executor(&self) -> &'a dyn Executor {
        self.executor
    }

    /// Run an invocation, applying the warn-only and logging policy.
    pub fn invoke(&self, invocation: &Invocation) -> Result<CommandOutput> {
        let opts = invocation.options;
        if !opts.quiet {
            log::info!(
                "[{}] {} {}",
                self.host,
                if invocation.privileged { "#" } else { "$" },
                invocation.command
            );
        }

        let output = self.executor.execute(self.host, invocation)?;

        if !opts.quiet {
            let stdout = output.stdout_str();
            if !stdout.trim().is_empty() {
                log::debug!("[{}] {}", self.host, stdout.trim_end());
            }
        }

        if output.failed_status() {
            if !opts.warn_only {
                return Err(Error::CommandFailed {
                    host: self.host.to_string(),
                    command: invocation.command.clone(),
                    status: output.status,
                    stderr: output.stderr_str().trim().to_string(),
                });
            }
            if !opts.quiet {
                log::warn!(
                    "[{}] command exited with status {} (ignored): {}",
                    self.host,
                    output.status,
                    invocation.command
                );
            }
        }

        Ok(output)
    }

    /// Run a command as the connecting user.
    pub fn run(&self, command: &str) -> Result<CommandOutput> {
        self.run_with(command, RunOptions::strict())
    }

    pub fn run_with(&self, command: &str, options: RunOptions) -> Result<CommandOutput> {
        self.invoke(&Invocation::new(command).options(options))
    }

    /// Run a command through sudo.
    pub fn privileged(&self, command: &str) -> Result<CommandOutput> {
        self.privileged_with(command, RunOptions::strict())
    }

    pub fn privileged_with(&self, command: &str, options: RunOptions) -> Result<CommandOutput> {
        self.invoke(&Invocation::new(command).privileged(true).options(options))
    }

    /// Run a command on the controller.
    pub fn local(&self, command: &str) -> Result<CommandOutput> {
        self.local_with(command, RunOptions::strict())
    }

    pub fn local_with(&self, command: &str, options: RunOptions) -> Result<CommandOutput> {
        self.invoke(&Invocation::new(command).local().options(options))
    }

    /// Run a quiet, failure-tolerant check and report whether it succeeded.
    pub fn probe(&self, command: &str) -> Result<bool> {
        Ok(self.run_with(command, RunOptions::probe())?.succeeded())
    }

    /// Like [`Shell::probe`], through sudo.
    pub fn privileged_probe(&self, command: &str) -> Result<bool> {
        Ok(self
            .privileged_with(command, RunOptions::probe())?
            .succeeded())
    }

    /// Run quietly and return trimmed stdout, failing on non-zero exit.
    pub fn capture(&self, command: &str) -> Result<String> {
        let output = self.run_with(command, RunOptions::strict().quiet())?;
        Ok(output.stdout_str().trim().to_string())
    }

    /// Whether an executable is on the host's PATH.
    pub fn has_binary(&self, name: &str) -> Result<bool> {
        self.probe(&format!("command -v {} >/dev/null 2>&1", shell_quote(name)))
    }

    pub fn exists(&self, path: &str) -> Result<bool> {
        self.executor.exists(self.host, path)
    }

    /// Read a file, `None` if missing.
    pub fn get(&self, path: &str, privileged: bool) -> Result<Option<Vec<u8>>> {
        self.executor.read_file(self.host, path, privileged)
    }

    /// Upload contents to a path.
    pub fn put(&self, path: &str, contents: &[u8], privileged: bool) -> Result<()> {
        log::debug!("[{}] upload {} ({} bytes)", self.host, path, contents.len());
        self.executor
            .write_file(self.host, path, contents, privileged)
    }

    pub fn rename(&self, from: &str, to: &str, privileged: bool) -> Result<()> {
        log::debug!("[{}] mv {} {}", self.host, from, to);
        self.executor.rename(self.host, from, to, privileged)
    }

    pub fn remove(&self, path: &str, privileged: bool) -> Result<()> {
        log::debug!("[{}] rm {}", self.host, path);
        self.executor.remove_file(self.host, path, privileged)
    }
}
