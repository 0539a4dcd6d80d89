//! Core types shared by every executor.

/// Per-command behaviour flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Return the output instead of an error when the command exits non-zero
    pub warn_only: bool,
    /// Don't echo the command or its output to the log
    pub quiet: bool,
}

impl RunOptions {
    /// Failures are errors, output is logged.
    pub const fn strict() -> Self {
        Self {
            warn_only: false,
            quiet: false,
        }
    }

    /// Failures are returned as output, nothing is logged.
    ///
    /// Used for probes (`test -e`, `dpkg-query`, ...) where a non-zero exit
    /// is an answer, not a problem.
    pub const fn probe() -> Self {
        Self {
            warn_only: true,
            quiet: true,
        }
    }

    pub fn warn_only(mut self) -> Self {
        self.warn_only = true;
        self
    }

    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }
}

/// A single command to run on a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Shell command line
    pub command: String,
    /// Run through sudo on the target
    pub privileged: bool,
    /// Run on the controller, whatever the target is
    pub local: bool,
    /// Bytes fed to the command's stdin
    pub stdin: Option<Vec<u8>>,
    pub options: RunOptions,
}

impl Invocation {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            privileged: false,
            local: false,
            stdin: None,
            options: RunOptions::default(),
        }
    }

    pub fn privileged(mut self, privileged: bool) -> Self {
        self.privileged = privileged;
        self
    }

    pub fn local(mut self) -> Self {
        self.local = true;
        self
    }

    pub fn stdin(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }
}

/// Output of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// Exit status, -1 when the process was killed by a signal
    pub status: i32,
}

impl CommandOutput {
    /// Successful output with the given stdout.
    pub fn ok(stdout: impl Into<Vec<u8>>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: Vec::new(),
            status: 0,
        }
    }

    /// Failed output with the given status and stderr.
    pub fn failed(status: i32, stderr: impl Into<Vec<u8>>) -> Self {
        Self {
            stdout: Vec::new(),
            stderr: stderr.into(),
            status,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status == 0
    }

    pub fn failed_status(&self) -> bool {
        !self.succeeded()
    }

    /// Get stdout as a string
    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    /// Get stderr as a string
    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }
}

impl From<std::process::Output> for CommandOutput {
    fn from(output: std::process::Output) -> Self {
        Self {
            stdout: output.stdout,
            stderr: output.stderr,
            status: output.status.code().unwrap_or(-1),
        }
    }
}

/// Names that always resolve to the controller itself.
const LOCALHOST_NAMES: &[&str] = &[
    "localhost",
    "localhost.localdomain",
    "127.0.0.1",
    "127.0.1.1",
    "::1",
];

/// Whether a host string designates the controller.
pub fn is_localhost(host: &str) -> bool {
    LOCALHOST_NAMES.contains(&host)
}

/// Quote a string for safe inclusion in a POSIX shell command line.
pub fn shell_quote(s: &str) -> String {
    if !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,@%+".contains(c))
    {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_localhost() {
        assert!(is_localhost("localhost"));
        assert!(is_localhost("127.0.1.1"));
        assert!(is_localhost("::1"));
        assert!(!is_localhost("web1.example.org"));
        assert!(!is_localhost(""));
    }

    #[test]
    fn test_shell_quote_plain() {
        assert_eq!(shell_quote("/etc/init/app.conf"), "/etc/init/app.conf");
        assert_eq!(shell_quote("htop"), "htop");
    }

    #[test]
    fn test_shell_quote_special() {
        assert_eq!(shell_quote("a b"), "'a b'");
        assert_eq!(shell_quote(""), "''");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote("$HOME"), "'$HOME'");
    }

    #[test]
    fn test_output_helpers() {
        let out = CommandOutput::ok("hello\n");
        assert!(out.succeeded());
        assert_eq!(out.stdout_str(), "hello\n");

        let out = CommandOutput::failed(2, "boom");
        assert!(out.failed_status());
        assert_eq!(out.stderr_str(), "boom");
    }

    #[test]
    fn test_run_options_builders() {
        assert_eq!(RunOptions::default(), RunOptions::strict());
        let opts = RunOptions::strict().warn_only().quiet();
        assert_eq!(opts, RunOptions::probe());
    }
}
