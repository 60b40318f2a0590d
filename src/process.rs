//! External command values and their execution.
//!
//! Builders elsewhere in the crate only ever produce [`Cmd`] values.
//! Running them, attaching stdio and turning exit codes into errors
//! happens here.

use std::{
    borrow::Cow,
    io::{self, Write},
    process::{Command, ExitStatus, Stdio},
};

/// Errors from running an external tool.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("failed to run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("{command} failed ({status}), output: {output}")]
    Failed {
        command: String,
        status: ExitStatus,
        output: String,
    },
}

pub type Result<T> = core::result::Result<T, CommandError>;

/// A program plus its argument list.
///
/// Arguments marked secret are masked in [`Cmd::printable`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cmd {
    program: String,
    args: Vec<String>,
    secret: Vec<usize>,
}

impl Cmd {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            secret: Vec::new(),
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Append an argument that must never appear in logs.
    #[must_use]
    pub fn secret_arg(mut self, arg: impl Into<String>) -> Self {
        self.secret.push(self.args.len());
        self.args.push(arg.into());
        self
    }

    /// The full argv, program first.
    #[cfg(test)]
    pub fn argv(&self) -> Vec<&str> {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect()
    }

    /// Shell-quoted form for logs, with secret arguments masked.
    pub fn printable(&self) -> String {
        let masked = self.args.iter().enumerate().map(|(i, arg)| {
            if self.secret.contains(&i) {
                Cow::Borrowed("***")
            } else {
                shell_words::quote(arg)
            }
        });
        std::iter::once(shell_words::quote(&self.program))
            .chain(masked)
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Run with stdout/stderr inherited so output is visible live.
    ///
    /// `stdin` is written to the child when given (used to answer prompts).
    pub fn run_streaming(&self, stdin: Option<&str>) -> Result<()> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        let status = self.spawn_and_wait(&mut command, stdin)?;
        if status.success() {
            Ok(())
        } else {
            Err(CommandError::Failed {
                command: self.printable(),
                status,
                output: String::new(),
            })
        }
    }

    /// Run with stdout and stderr captured; returns their trimmed combination.
    pub fn run_captured(&self, stdin: Option<&str>) -> Result<String> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command.spawn().map_err(|e| self.spawn_error(e))?;
        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            // A child that exits without reading its stdin is not an error.
            let _ = pipe.write_all(input.as_bytes());
        }
        let output = child.wait_with_output().map_err(|e| self.spawn_error(e))?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        let combined = combined.trim().to_string();

        if output.status.success() {
            Ok(combined)
        } else {
            Err(CommandError::Failed {
                command: self.printable(),
                status: output.status,
                output: combined,
            })
        }
    }

    fn spawn_and_wait(&self, command: &mut Command, stdin: Option<&str>) -> Result<ExitStatus> {
        command.stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::inherit()
        });

        let mut child = command.spawn().map_err(|e| self.spawn_error(e))?;
        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            let _ = pipe.write_all(input.as_bytes());
        }
        child.wait().map_err(|e| self.spawn_error(e))
    }

    fn spawn_error(&self, source: io::Error) -> CommandError {
        CommandError::Spawn {
            command: self.printable(),
            source,
        }
    }
}

/// Executes commands.
///
/// The step runs every external tool through one of these.
pub trait Runner {
    fn run_streaming(&mut self, cmd: &Cmd, stdin: Option<&str>) -> Result<()>;

    fn run_captured(&mut self, cmd: &Cmd, stdin: Option<&str>) -> Result<String>;
}

/// Spawns real processes.
#[derive(Debug, Default)]
pub struct System;

impl Runner for System {
    fn run_streaming(&mut self, cmd: &Cmd, stdin: Option<&str>) -> Result<()> {
        cmd.run_streaming(stdin)
    }

    fn run_captured(&mut self, cmd: &Cmd, stdin: Option<&str>) -> Result<String> {
        cmd.run_captured(stdin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argv_starts_with_program() {
        let cmd = Cmd::new("npm").args(["install", "-g"]).arg("cordova@latest");
        assert_eq!(cmd.argv(), ["npm", "install", "-g", "cordova@latest"]);
    }

    #[test]
    fn printable_masks_secrets() {
        let cmd = Cmd::new("ionic")
            .arg("login")
            .secret_arg("me@example.com")
            .secret_arg("hunter2");
        assert_eq!(cmd.printable(), "ionic login *** ***");
        assert_eq!(cmd.argv(), ["ionic", "login", "me@example.com", "hunter2"]);
    }

    #[test]
    fn printable_quotes_spaces() {
        let cmd = Cmd::new("ionic").args(["build", "--buildConfig", "/my dir/build.json"]);
        assert_eq!(
            cmd.printable(),
            "ionic build --buildConfig '/my dir/build.json'"
        );
    }

    // ── Execution ──

    #[test]
    fn captured_output_combines_streams() {
        let cmd = Cmd::new("sh").args(["-c", "echo out; echo err >&2"]);
        assert_eq!(cmd.run_captured(None).unwrap(), "out\nerr");
    }

    #[test]
    fn captured_feeds_stdin() {
        let cmd = Cmd::new("sh").args(["-c", "read answer; echo got $answer"]);
        assert_eq!(cmd.run_captured(Some("Y\n")).unwrap(), "got Y");
    }

    #[test]
    fn captured_failure_carries_output() {
        let cmd = Cmd::new("sh").args(["-c", "echo boom; exit 3"]);
        let err = cmd.run_captured(None).unwrap_err();
        assert!(matches!(err, CommandError::Failed { ref output, .. } if output == "boom"));
    }

    #[test]
    fn streaming_reports_exit_status() {
        assert!(Cmd::new("true").run_streaming(None).is_ok());
        assert!(matches!(
            Cmd::new("false").run_streaming(Some("y")),
            Err(CommandError::Failed { .. })
        ));
    }

    #[test]
    fn system_runner_spawns_processes() {
        let mut runner = System;
        let cmd = Cmd::new("sh").args(["-c", "read answer; echo $answer"]);
        assert_eq!(runner.run_captured(&cmd, Some("y\n")).unwrap(), "y");
        assert!(runner.run_streaming(&Cmd::new("true"), None).is_ok());
    }

    #[test]
    fn missing_program_is_spawn_error() {
        let err = Cmd::new("definitely-not-a-real-binary-xyz")
            .run_captured(None)
            .unwrap_err();
        assert!(matches!(err, CommandError::Spawn { .. }));
    }
}
