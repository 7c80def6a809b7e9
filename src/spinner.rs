use indicatif::{ProgressBar, ProgressStyle};
use std::io::{BufRead, BufReader};
use std::process::{Command, ExitStatus, Stdio};
use std::time::Duration;

/// Number of stderr lines kept for the error message of a failed command.
const STDERR_TAIL: usize = 20;

/// Create a spinner with consistent styling.
fn create_spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.enable_steady_tick(Duration::from_millis(120));
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
            .template("{spinner:.blue} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(msg.to_string());
    pb
}

/// Run an operation with a spinner, showing success/failure.
pub fn with_spinner<T, E, F>(msg: &str, op: F) -> Result<T, E>
where
    F: FnOnce() -> Result<T, E>,
{
    let pb = create_spinner(msg);
    let result = op();
    match &result {
        Ok(_) => pb.finish_with_message(format!("✔ {}", msg)),
        Err(_) => pb.finish_with_message(format!("✘ {}", msg)),
    }
    result
}

/// Exit status and trailing stderr of a streamed command.
pub struct Streamed {
    pub status: ExitStatus,
    pub stderr: String,
}

/// Run a command with a spinner, streaming its output above the spinner line.
///
/// Lines from the command's stdout and stderr are printed above the spinner in
/// real time. The last stderr lines are returned so a failure can report them.
pub fn with_streaming_command(msg: &str, mut cmd: Command) -> std::io::Result<Streamed> {
    let pb = create_spinner(msg);

    let mut child = match cmd.stdout(Stdio::piped()).stderr(Stdio::piped()).spawn() {
        Ok(child) => child,
        Err(e) => {
            pb.finish_with_message(format!("✘ {}", msg));
            return Err(e);
        }
    };

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let pb_out = pb.clone();
    let pb_err = pb.clone();

    let stdout_thread = std::thread::spawn(move || {
        if let Some(stdout) = stdout {
            for line in BufReader::new(stdout).lines() {
                if let Ok(line) = line
                    && !line.trim().is_empty()
                {
                    pb_out.println(&line);
                }
            }
        }
    });

    let stderr_thread = std::thread::spawn(move || {
        let mut tail: Vec<String> = Vec::new();
        if let Some(stderr) = stderr {
            for line in BufReader::new(stderr).lines() {
                if let Ok(line) = line
                    && !line.trim().is_empty()
                {
                    pb_err.println(&line);
                    if tail.len() == STDERR_TAIL {
                        tail.remove(0);
                    }
                    tail.push(line);
                }
            }
        }
        tail.join("\n")
    });

    stdout_thread.join().ok();
    let stderr = stderr_thread.join().unwrap_or_default();

    let status = match child.wait() {
        Ok(status) => status,
        Err(e) => {
            pb.finish_with_message(format!("✘ {}", msg));
            return Err(e);
        }
    };

    if status.success() {
        pb.finish_with_message(format!("✔ {}", msg));
    } else {
        pb.finish_with_message(format!("✘ {}", msg));
    }
    Ok(Streamed { status, stderr })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn streaming_keeps_stderr_tail() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo out; echo err1 >&2; echo err2 >&2; exit 4"]);
        let streamed = with_streaming_command("testing", cmd).unwrap();
        assert_eq!(streamed.status.code(), Some(4));
        assert_eq!(streamed.stderr, "err1\nerr2");
    }

    #[test]
    fn with_spinner_passes_result_through() {
        let ok: Result<u32, String> = with_spinner("ok", || Ok(7));
        assert_eq!(ok, Ok(7));
        let err: Result<u32, String> = with_spinner("err", || Err("nope".to_string()));
        assert_eq!(err, Err("nope".to_string()));
    }
}
