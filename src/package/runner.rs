//! Process execution for package manager commands.

use std::thread;
use std::time::{Duration, Instant};

use duct::cmd;

use super::AdapterError;

/// Captured result of one package manager invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Short failure description for error messages.
    pub fn reason(&self) -> String {
        let stderr = self.stderr.trim();
        let detail = stderr.lines().last().unwrap_or("");
        match self.code {
            Some(code) if detail.is_empty() => format!("exit status {}", code),
            Some(code) => format!("exit status {}: {}", code, detail),
            None => "terminated by signal".to_string(),
        }
    }
}

impl From<std::process::Output> for CommandOutput {
    fn from(output: std::process::Output) -> Self {
        Self {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        }
    }
}

pub(crate) fn command_line(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Seam between adapters and real processes.
pub trait CommandRunner {
    /// Run a command to completion. A non-zero exit is not an error here.
    fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, AdapterError>;

    fn has_program(&self, program: &str) -> bool;
}

/// Runs commands through duct with the C locale so output parsing is stable.
#[derive(Debug, Clone, Default)]
pub struct DuctRunner {
    timeout: Option<Duration>,
}

const POLL_INTERVAL: Duration = Duration::from_millis(100);

impl DuctRunner {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

impl CommandRunner for DuctRunner {
    fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, AdapterError> {
        let line = command_line(program, args);
        let expression = cmd(program, args)
            .env("LC_ALL", "C")
            .stdout_capture()
            .stderr_capture()
            .unchecked();

        let spawn_err = |source| AdapterError::Spawn {
            command: line.clone(),
            source,
        };

        let Some(timeout) = self.timeout else {
            return expression.run().map(CommandOutput::from).map_err(spawn_err);
        };

        let handle = expression.start().map_err(spawn_err)?;
        let started = Instant::now();
        loop {
            if handle.try_wait().map_err(spawn_err)?.is_some() {
                return handle.into_output().map(CommandOutput::from).map_err(spawn_err);
            }
            if started.elapsed() >= timeout {
                let _ = handle.kill();
                return Err(AdapterError::Timeout(line));
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    fn has_program(&self, program: &str) -> bool {
        which::which(program).is_ok()
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_prefers_last_stderr_line() {
        let output = CommandOutput {
            code: Some(1),
            stdout: String::new(),
            stderr: "Loaded plugins: fastestmirror\nError: Cannot find a valid baseurl\n".into(),
        };
        assert_eq!(
            output.reason(),
            "exit status 1: Error: Cannot find a valid baseurl"
        );
        assert!(!output.success());
    }

    #[test]
    fn command_line_joins_args() {
        let args = vec!["-q".to_string(), "repolist".to_string()];
        assert_eq!(command_line("dnf", &args), "dnf -q repolist");
    }

    #[test]
    fn fake_runner_repeats_last_reply() {
        let fake = fake::FakeRunner::new();
        fake.ok("yum repolist", "a").ok("yum repolist", "b");
        let args = vec!["repolist".to_string()];
        assert_eq!(fake.run("yum", &args).unwrap().stdout, "a");
        assert_eq!(fake.run("yum", &args).unwrap().stdout, "b");
        assert_eq!(fake.run("yum", &args).unwrap().stdout, "b");
        assert_eq!(fake.call_count("yum repolist"), 3);
    }

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|a| a.to_string()).collect()
    }

    #[cfg(unix)]
    #[test]
    fn duct_runner_captures_output_and_exit_code() {
        let runner = DuctRunner::new(None);
        let out = runner
            .run("sh", &strings(&["-c", "echo out; echo err >&2; exit 3"]))
            .unwrap();
        assert_eq!(out.code, Some(3));
        assert_eq!(out.stdout, "out\n");
        assert_eq!(out.reason(), "exit status 3: err");
    }

    #[cfg(unix)]
    #[test]
    fn duct_runner_sets_c_locale() {
        let out = DuctRunner::new(Some(Duration::from_secs(10)))
            .run("sh", &strings(&["-c", "printf %s \"$LC_ALL\""]))
            .unwrap();
        assert!(out.success());
        assert_eq!(out.stdout, "C");
    }

    #[cfg(unix)]
    #[test]
    fn duct_runner_kills_hung_commands() {
        let runner = DuctRunner::new(Some(Duration::from_millis(200)));
        let started = Instant::now();
        let result = runner.run("sleep", &strings(&["5"]));
        assert!(
            matches!(result, Err(AdapterError::Timeout(ref line)) if line == "sleep 5"),
            "{:?}",
            result
        );
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn duct_runner_reports_missing_program() {
        for timeout in [None, Some(Duration::from_secs(1))] {
            let result = DuctRunner::new(timeout).run("repocheck-no-such-tool", &[]);
            assert!(
                matches!(result, Err(AdapterError::Spawn { .. })),
                "{:?}",
                result
            );
        }
    }
}
