//! Error kinds surfaced by the backend orchestration layer.

use std::time::Duration;

use crate::backend::InstanceKind;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The operation targets an instance the backend does not know about.
    #[error("{kind} '{name}' does not exist. Run 'agentvm{} launch' to create it", .kind.cli_flag())]
    NotFound { kind: InstanceKind, name: String },

    /// The instance exists but has no address assigned yet.
    #[error("No address assigned to {kind} '{name}' yet")]
    AddressNotFound { kind: InstanceKind, name: String },

    /// The operation requires a running instance.
    #[error("{kind} '{name}' is not running. Run 'agentvm{} start' to start it", .kind.cli_flag())]
    NotRunning { kind: InstanceKind, name: String },

    /// The external tool binary cannot be located.
    #[error("{program} is not installed.{}", install_hint(.program))]
    BackendUnavailable { program: String },

    /// Could not spawn the external tool for a reason other than it being missing.
    #[error("Failed to execute command: {program}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// A delegated operation exited non-zero.
    #[error("Command failed: {program} {args}{}", diagnostic(.status, .stderr))]
    ExternalTool {
        program: String,
        args: String,
        status: Option<i32>,
        stderr: String,
    },

    #[error("{what} timed out after {}s", .after.as_secs())]
    Timeout { what: String, after: Duration },

    /// The guest reported a bootstrap failure.
    #[error("cloud-init failed: {0}")]
    GuestBootstrap(String),

    #[error("{0}")]
    Validation(String),

    /// A generated guest asset could not be rendered.
    #[error("Failed to render {0}")]
    Asset(String),

    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{kind} backend does not support {op}: {reason}")]
    Unsupported {
        kind: InstanceKind,
        op: &'static str,
        reason: String,
    },
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. } | Error::AddressNotFound { .. })
    }
}

fn install_hint(program: &str) -> &'static str {
    match program {
        "multipass" => " Please install it from https://multipass.run",
        "docker" => " Please install Docker from https://www.docker.com/products/docker-desktop/",
        _ => "",
    }
}

fn diagnostic(status: &Option<i32>, stderr: &str) -> String {
    let mut out = match status {
        Some(code) => format!(" (exit code {})", code),
        None => String::new(),
    };
    if !stderr.is_empty() {
        out.push('\n');
        out.push_str(stderr);
    }
    out
}
