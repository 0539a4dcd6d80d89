//! Recording executor for tests.
//!
//! `MockExecutor` records every invocation, answers commands from scripted
//! rules, and keeps a per-host in-memory filesystem for the file primitives.
//! Renames are recorded as `mv -f from to` and fail when a rule answers that
//! line with a non-zero status.

use crate::error::{Error, Result};
use crate::executor::Executor;
use crate::types::{CommandOutput, Invocation};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// One recorded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub host: String,
    pub command: String,
    pub privileged: bool,
    pub local: bool,
}

type Handler = Box<dyn Fn(&str, &Invocation) -> Option<CommandOutput> + Send + Sync>;

/// Test double for [`Executor`].
///
/// Rules are checked in registration order; the first one returning
/// `Some` answers the command. Unmatched commands succeed with empty output.
#[derive(Default)]
pub struct MockExecutor {
    handlers: Vec<Handler>,
    calls: Mutex<Vec<Call>>,
    files: Mutex<BTreeMap<(String, String), Vec<u8>>>,
}

impl std::fmt::Debug for MockExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockExecutor")
            .field("handlers", &self.handlers.len())
            .field("calls", &lock(&self.calls).len())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer with a closure. It sees the host and the full invocation.
    pub fn with_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&str, &Invocation) -> Option<CommandOutput> + Send + Sync + 'static,
    {
        self.handlers.push(Box::new(handler));
        self
    }

    /// Commands containing `needle` succeed with `stdout`.
    pub fn respond(self, needle: &str, stdout: &str) -> Self {
        let needle = needle.to_string();
        let stdout = stdout.to_string();
        self.with_handler(move |_, inv| {
            inv.command
                .contains(&needle)
                .then(|| CommandOutput::ok(stdout.clone()))
        })
    }

    /// Commands containing `needle` fail with `status` and `stderr`.
    pub fn fail_on(self, needle: &str, status: i32, stderr: &str) -> Self {
        let needle = needle.to_string();
        let stderr = stderr.to_string();
        self.with_handler(move |_, inv| {
            inv.command
                .contains(&needle)
                .then(|| CommandOutput::failed(status, stderr.clone()))
        })
    }

    /// Like [`MockExecutor::respond`], restricted to one host.
    pub fn respond_on(self, host: &str, needle: &str, stdout: &str) -> Self {
        let host = host.to_string();
        let needle = needle.to_string();
        let stdout = stdout.to_string();
        self.with_handler(move |h, inv| {
            (h == host && inv.command.contains(&needle)).then(|| CommandOutput::ok(stdout.clone()))
        })
    }

    /// Seed a file in the in-memory filesystem.
    pub fn with_file(self, host: &str, path: &str, contents: impl Into<Vec<u8>>) -> Self {
        lock(&self.files).insert((host.to_string(), path.to_string()), contents.into());
        self
    }

    /// All recorded calls, in order.
    pub fn calls(&self) -> Vec<Call> {
        lock(&self.calls).clone()
    }

    /// Recorded command lines, in order.
    pub fn commands(&self) -> Vec<String> {
        lock(&self.calls).iter().map(|c| c.command.clone()).collect()
    }

    /// Number of recorded commands containing `needle`.
    pub fn count(&self, needle: &str) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|c| c.command.contains(needle))
            .count()
    }

    /// Number of recorded commands on `host` containing `needle`.
    pub fn count_on(&self, host: &str, needle: &str) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|c| c.host == host && c.command.contains(needle))
            .count()
    }

    /// Hosts that received at least one command.
    pub fn touched_hosts(&self) -> Vec<String> {
        let mut hosts: Vec<String> = lock(&self.calls).iter().map(|c| c.host.clone()).collect();
        hosts.sort();
        hosts.dedup();
        hosts
    }

    pub fn clear_calls(&self) {
        lock(&self.calls).clear();
    }

    /// Current contents of a file in the in-memory filesystem.
    pub fn file(&self, host: &str, path: &str) -> Option<Vec<u8>> {
        lock(&self.files)
            .get(&(host.to_string(), path.to_string()))
            .cloned()
    }

    /// Paths present on a host.
    pub fn files_on(&self, host: &str) -> Vec<String> {
        lock(&self.files)
            .keys()
            .filter(|(h, _)| h == host)
            .map(|(_, p)| p.clone())
            .collect()
    }

    fn record(&self, host: &str, command: String, privileged: bool, local: bool) {
        lock(&self.calls).push(Call {
            host: host.to_string(),
            command,
            privileged,
            local,
        });
    }
}

impl Executor for MockExecutor {
    fn execute(&self, host: &str, invocation: &Invocation) -> Result<CommandOutput> {
        self.record(
            host,
            invocation.command.clone(),
            invocation.privileged,
            invocation.local,
        );
        Ok(self
            .handlers
            .iter()
            .find_map(|h| h(host, invocation))
            .unwrap_or_default())
    }

    fn read_file(&self, host: &str, path: &str, privileged: bool) -> Result<Option<Vec<u8>>> {
        self.record(host, format!("cat {path}"), privileged, false);
        Ok(self.file(host, path))
    }

    fn write_file(&self, host: &str, path: &str, contents: &[u8], privileged: bool) -> Result<()> {
        self.record(host, format!("cat > {path}"), privileged, false);
        lock(&self.files).insert((host.to_string(), path.to_string()), contents.to_vec());
        Ok(())
    }

    fn rename(&self, host: &str, from: &str, to: &str, privileged: bool) -> Result<()> {
        let command = format!("mv -f {from} {to}");
        self.record(host, command.clone(), privileged, false);
        let invocation = Invocation::new(command).privileged(privileged);
        if let Some(output) = self.handlers.iter().find_map(|h| h(host, &invocation))
            && output.failed_status()
        {
            return Err(Error::File {
                host: host.to_string(),
                path: from.to_string(),
                message: output.stderr_str(),
            });
        }
        let mut files = lock(&self.files);
        if let Some(contents) = files.remove(&(host.to_string(), from.to_string())) {
            files.insert((host.to_string(), to.to_string()), contents);
        }
        Ok(())
    }

    fn remove_file(&self, host: &str, path: &str, privileged: bool) -> Result<()> {
        self.record(host, format!("rm -f {path}"), privileged, false);
        lock(&self.files).remove(&(host.to_string(), path.to_string()));
        Ok(())
    }

    fn exists(&self, host: &str, path: &str) -> Result<bool> {
        self.record(host, format!("test -e {path}"), false, false);
        let files = lock(&self.files);
        let prefix = format!("{}/", path.trim_end_matches('/'));
        Ok(files
            .keys()
            .any(|(h, p)| h == host && (p == path || p.starts_with(&prefix))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::Shell;

    #[test]
    fn test_first_matching_rule_wins() {
        let mock = MockExecutor::new()
            .respond("uname", "Linux")
            .respond("uname -m", "x86_64");
        let sh = Shell::new(&mock, "web1");
        assert_eq!(sh.capture("uname -m").unwrap(), "Linux");
    }

    #[test]
    fn test_rename_can_be_made_to_fail() {
        let mock = MockExecutor::new()
            .with_file("web1", "/etc/a.new", "x")
            .fail_on("mv -f /etc/a.new", 1, "read-only file system");
        let sh = Shell::new(&mock, "web1");
        let err = sh.rename("/etc/a.new", "/etc/a", true).unwrap_err();
        assert!(err.to_string().contains("read-only"));
        assert!(mock.file("web1", "/etc/a.new").is_some());
        assert!(mock.file("web1", "/etc/a").is_none());
    }

    #[test]
    fn test_host_scoped_rule() {
        let mock = MockExecutor::new().respond_on("db1", "hostname", "db1");
        assert_eq!(Shell::new(&mock, "db1").capture("hostname").unwrap(), "db1");
        assert_eq!(Shell::new(&mock, "web1").capture("hostname").unwrap(), "");
    }

    #[test]
    fn test_counts_and_touched_hosts() {
        let mock = MockExecutor::new();
        Shell::new(&mock, "web2").run("brew update").unwrap();
        Shell::new(&mock, "web1").run("brew update").unwrap();
        Shell::new(&mock, "web1").run("brew upgrade").unwrap();
        assert_eq!(mock.count("brew update"), 2);
        assert_eq!(mock.count_on("web1", "brew"), 2);
        assert_eq!(mock.touched_hosts(), vec!["web1", "web2"]);
        mock.clear_calls();
        assert!(mock.calls().is_empty());
    }

    #[test]
    fn test_exists_sees_directories() {
        let mock = MockExecutor::new().with_file("web1", "/etc/init/app.conf", "x");
        let sh = Shell::new(&mock, "web1");
        assert!(sh.exists("/etc/init").unwrap());
        assert!(sh.exists("/etc/init/").unwrap());
        assert!(!sh.exists("/etc/supervisor").unwrap());
        assert_eq!(mock.files_on("web1"), vec!["/etc/init/app.conf"]);
    }
}
