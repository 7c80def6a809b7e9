//! Backend abstraction over the external tools that host agent instances.
//!
//! Every lifecycle verb talks to a `Backend`, so the VM (multipass) and
//! container (docker) variants, as well as the test double, are interchangeable.

pub mod docker;
#[cfg(test)]
pub mod mock;
pub mod multipass;

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use docker::DockerBackend;
pub use multipass::MultipassBackend;

use crate::cmd;
use crate::config::{Config, LifecycleConfig};
use crate::error::{Error, Result};
use crate::mount::MountBinding;
use crate::remote::TerminalEnv;

/// Which kind of isolation an instance uses.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum InstanceKind {
    /// Multipass virtual machine
    #[default]
    Vm,
    /// Docker container
    #[serde(rename = "docker", alias = "container")]
    #[value(name = "docker", alias = "container")]
    Container,
}

impl InstanceKind {
    /// Global flag needed to address this kind from the CLI.
    pub fn cli_flag(&self) -> &'static str {
        match self {
            InstanceKind::Vm => "",
            InstanceKind::Container => " --backend docker",
        }
    }
}

impl fmt::Display for InstanceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceKind::Vm => write!(f, "VM"),
            InstanceKind::Container => write!(f, "Container"),
        }
    }
}

/// Existence and run state of an instance, recomputed on every query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    Absent,
    Stopped,
    Running,
}

/// An interactive or one-shot program to run inside an instance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    /// Program and arguments. Empty means a login shell.
    pub program: Vec<String>,
    pub workdir: Option<PathBuf>,
    pub tty: bool,
    pub terminal: Option<TerminalEnv>,
}

impl Session {
    pub fn interactive(program: Vec<String>, workdir: Option<PathBuf>) -> Self {
        Self {
            program,
            workdir,
            tty: true,
            terminal: Some(TerminalEnv::from_env()),
        }
    }

    pub fn command(program: Vec<String>) -> Self {
        Self {
            program,
            workdir: None,
            tty: false,
            terminal: None,
        }
    }
}

/// Lifecycle contract shared by all backends.
///
/// Non-zero exits of the underlying tool surface as `Error::ExternalTool` with
/// stderr attached verbatim. Listing-based queries never fail for unknown names.
pub trait Backend {
    fn kind(&self) -> InstanceKind;

    /// Name of the external tool binary.
    fn binary(&self) -> &'static str;

    /// Home directory of the unprivileged user inside the guest.
    fn guest_home(&self) -> &'static str;

    fn ensure_installed(&self) -> Result<()> {
        cmd::locate(self.binary()).map(|_| ())
    }

    /// Exact-name match against the inventory listing.
    fn exists(&self, name: &str) -> Result<bool>;

    /// `false` for unknown names as well as stopped instances.
    fn running(&self, name: &str) -> Result<bool>;

    fn state(&self, name: &str) -> Result<InstanceState> {
        if !self.exists(name)? {
            return Ok(InstanceState::Absent);
        }
        if self.running(name)? {
            Ok(InstanceState::Running)
        } else {
            Ok(InstanceState::Stopped)
        }
    }

    fn create(&self, name: &str, config: &LifecycleConfig) -> Result<()>;

    fn start(&self, name: &str) -> Result<()>;

    fn stop(&self, name: &str) -> Result<()>;

    /// Remove the instance; `purge` also reclaims storage left behind.
    fn delete(&self, name: &str, purge: bool) -> Result<()>;

    /// Run a command in the guest and capture its stdout.
    fn exec(&self, name: &str, argv: &[&str]) -> Result<String>;

    /// `exec` killed with `Error::Timeout` once `limit` elapses.
    fn exec_within(&self, name: &str, argv: &[&str], limit: Duration) -> Result<String>;

    /// Run a command in the guest with the terminal attached.
    fn exec_interactive(&self, name: &str, argv: &[&str]) -> Result<()>;

    fn mount(&self, name: &str, host: &Path, guest: &Path) -> Result<()>;

    fn unmount(&self, name: &str, guest: &Path) -> Result<()>;

    /// Whether `host` is already shared into the instance.
    fn mounted(&self, name: &str, host: &Path) -> Result<bool>;

    /// Network address (VM) or addressable name (container).
    fn address(&self, name: &str) -> Result<String>;

    fn attach(&self, name: &str, session: &Session) -> Result<()>;

    /// Run `session` in a throwaway guest that shares the instance's state and
    /// adds `bind`, for backends whose instances cannot take new mounts.
    fn attach_with_bind(
        &self,
        _name: &str,
        _session: &Session,
        _config: &LifecycleConfig,
        _bind: &MountBinding,
    ) -> Result<()> {
        Err(Error::Unsupported {
            kind: self.kind(),
            op: "attach_with_bind",
            reason: "mounts can be added to running instances".to_string(),
        })
    }

    /// Copy a single host file into the guest.
    fn copy_in(&self, name: &str, host: &Path, guest: &Path) -> Result<()>;

    /// Human-readable status dump.
    fn info(&self, name: &str) -> Result<String>;

    /// Last `lines` lines of the bootstrap log.
    fn logs(&self, name: &str, lines: usize) -> Result<String>;

    fn follow_logs(&self, name: &str) -> Result<()>;
}

/// Backend implementation for a kind.
pub fn for_kind(kind: InstanceKind, config: &Config) -> Box<dyn Backend> {
    match kind {
        InstanceKind::Vm => Box::new(MultipassBackend::new()),
        InstanceKind::Container => Box::new(DockerBackend::new(config.docker.image())),
    }
}

/// Exact, whitespace-trimmed match of `name` in a one-name-per-line listing.
pub fn listing_contains(listing: &str, name: &str) -> bool {
    listing.lines().any(|line| line.trim() == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_display_and_flag() {
        assert_eq!(InstanceKind::Vm.to_string(), "VM");
        assert_eq!(InstanceKind::Container.to_string(), "Container");
        assert_eq!(InstanceKind::Vm.cli_flag(), "");
        assert_eq!(InstanceKind::Container.cli_flag(), " --backend docker");
    }

    #[test]
    fn kind_deserializes_docker_and_container() {
        #[derive(Deserialize)]
        struct Wrap {
            backend: InstanceKind,
        }
        let w: Wrap = toml::from_str("backend = \"docker\"").unwrap();
        assert_eq!(w.backend, InstanceKind::Container);
        let w: Wrap = toml::from_str("backend = \"container\"").unwrap();
        assert_eq!(w.backend, InstanceKind::Container);
        let w: Wrap = toml::from_str("backend = \"vm\"").unwrap();
        assert_eq!(w.backend, InstanceKind::Vm);
    }

    #[test]
    fn listing_match_is_exact() {
        let listing = "coding-agent-docker\nother\n\n";
        assert!(listing_contains(listing, "coding-agent-docker"));
        assert!(!listing_contains(listing, "coding-agent"));
        assert!(!listing_contains("", "coding-agent"));
    }
}
