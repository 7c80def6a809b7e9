use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};
use std::thread;
use std::time::Duration;

use tracing::{debug, trace};
use wait_timeout::ChildExt;

use crate::error::{Error, Result};
use crate::spinner;

/// A builder for executing external tools with unified error handling
pub struct Cmd {
    program: String,
    args: Vec<String>,
    workdir: Option<PathBuf>,
    envs: Vec<(String, String)>,
    timeout: Option<Duration>,
}

impl Cmd {
    /// Create a new command builder
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            workdir: None,
            envs: Vec::new(),
            timeout: None,
        }
    }

    /// Add a single argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the working directory for the command
    pub fn workdir(mut self, path: &Path) -> Self {
        self.workdir = Some(path.to_path_buf());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Kill the child and fail if it runs longer than `limit`.
    /// Only applies to captured runs.
    pub fn timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    /// Execute the command and return the output
    /// Returns an error if the command fails (non-zero exit code)
    pub fn run(self) -> Result<Output> {
        trace!(command = %self.program, args = ?self.args, workdir = ?self.workdir, "cmd:run start");

        let output = match self.timeout {
            Some(limit) => self.output_with_timeout(limit)?,
            None => self
                .command()
                .output()
                .map_err(|e| spawn_error(&self.program, e))?,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!(
                command = %self.program,
                args = ?self.args,
                status = ?output.status.code(),
                stderr = %stderr.trim(),
                "cmd:run failure"
            );
            return Err(self.failure(output.status.code(), stderr.trim()));
        }
        trace!(command = %self.program, "cmd:run success");
        Ok(output)
    }

    /// Execute the command and return stdout as a trimmed string
    pub fn run_and_capture_stdout(self) -> Result<String> {
        let output = self.run()?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Execute the command, returning Ok(true) if it succeeds, Ok(false) if it fails
    pub fn run_as_check(self) -> Result<bool> {
        trace!(command = %self.program, args = ?self.args, "cmd:check start");
        let output = self
            .command()
            .output()
            .map_err(|e| spawn_error(&self.program, e))?;
        let success = output.status.success();
        trace!(command = %self.program, success, "cmd:check result");
        Ok(success)
    }

    /// Execute the command with the terminal attached to the child.
    /// Nothing is captured; the child owns stdin/stdout/stderr until it exits.
    pub fn run_attached(self) -> Result<()> {
        debug!(command = %self.program, args = ?self.args, "cmd:attached start");
        let status = self
            .command()
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .map_err(|e| spawn_error(&self.program, e))?;

        if !status.success() {
            debug!(command = %self.program, status = ?status.code(), "cmd:attached failure");
            return Err(self.failure(status.code(), ""));
        }
        Ok(())
    }

    /// Execute a long-running command under a spinner, printing its output
    /// above the spinner line.
    pub fn run_streaming(self, msg: &str) -> Result<()> {
        debug!(command = %self.program, args = ?self.args, "cmd:streaming start");
        let streamed = spinner::with_streaming_command(msg, self.command())
            .map_err(|e| spawn_error(&self.program, e))?;

        if !streamed.status.success() {
            debug!(
                command = %self.program,
                status = ?streamed.status.code(),
                "cmd:streaming failure"
            );
            return Err(self.failure(streamed.status.code(), streamed.stderr.trim()));
        }
        Ok(())
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(dir) = &self.workdir {
            cmd.current_dir(dir);
        }
        for (key, value) in &self.envs {
            cmd.env(key, value);
        }
        cmd
    }

    fn output_with_timeout(&self, limit: Duration) -> Result<Output> {
        let mut child = self
            .command()
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| spawn_error(&self.program, e))?;

        // Drain both pipes so a chatty child cannot block on a full buffer
        let stdout = drain(&mut child, true);
        let stderr = drain(&mut child, false);

        let status = match child
            .wait_timeout(limit)
            .map_err(|e| spawn_error(&self.program, e))?
        {
            Some(status) => status,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                debug!(command = %self.program, args = ?self.args, "cmd:run timed out");
                return Err(Error::Timeout {
                    what: format!("{} {}", self.program, self.args.join(" ")),
                    after: limit,
                });
            }
        };

        Ok(Output {
            status,
            stdout: stdout.join().unwrap_or_default(),
            stderr: stderr.join().unwrap_or_default(),
        })
    }

    fn failure(&self, status: Option<i32>, stderr: &str) -> Error {
        Error::ExternalTool {
            program: self.program.clone(),
            args: self.args.join(" "),
            status,
            stderr: stderr.to_string(),
        }
    }
}

fn drain(child: &mut Child, stdout: bool) -> thread::JoinHandle<Vec<u8>> {
    let pipe: Option<Box<dyn Read + Send>> = if stdout {
        child.stdout.take().map(|p| Box::new(p) as Box<dyn Read + Send>)
    } else {
        child.stderr.take().map(|p| Box::new(p) as Box<dyn Read + Send>)
    };
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

fn spawn_error(program: &str, err: std::io::Error) -> Error {
    if err.kind() == std::io::ErrorKind::NotFound {
        Error::BackendUnavailable {
            program: program.to_string(),
        }
    } else {
        Error::Spawn {
            program: program.to_string(),
            source: err,
        }
    }
}

/// Resolve an external tool on PATH.
pub fn locate(program: &str) -> Result<PathBuf> {
    which::which(program).map_err(|_| {
        debug!(program, "cmd:locate missing");
        Error::BackendUnavailable {
            program: program.to_string(),
        }
    })
}
