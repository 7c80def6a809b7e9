//! Multipass VM backend.

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use tracing::{debug, info};

use super::{Backend, InstanceKind, Session};
use crate::assets::{self, CLOUD_INIT_LOG, CLOUD_INIT_OUTPUT_LOG};
use crate::cmd::Cmd;
use crate::config::LifecycleConfig;
use crate::error::{Error, Result};
use crate::remote::RemoteCommand;

const BINARY: &str = "multipass";

/// Default user in Ubuntu cloud images.
pub const GUEST_USER: &str = "ubuntu";
const GUEST_HOME: &str = "/home/ubuntu";

/// Upper bound for inventory and info queries.
const QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// State token multipass prints for a booted instance.
const RUNNING: &str = "Running";
const NO_ADDRESS: &str = "--";

/// One row of `multipass list --format csv`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    pub name: String,
    pub state: String,
    pub ipv4: Option<String>,
}

/// Parse `multipass list --format csv`.
///
/// A leading header row, blank lines and rows without a name are skipped.
/// Missing trailing fields become empty values.
pub fn parse_list(csv: &str) -> Vec<ListEntry> {
    let mut rows = csv.lines().filter(|line| !line.trim().is_empty()).peekable();
    if rows.peek().is_some_and(|line| is_list_header(line)) {
        rows.next();
    }
    rows.filter_map(|line| {
        let mut fields = line.split(',').map(str::trim);
        let name = fields.next().filter(|n| !n.is_empty())?;
        let state = fields.next().unwrap_or_default().to_string();
        let ipv4 = fields
            .next()
            .filter(|ip| !ip.is_empty() && *ip != NO_ADDRESS)
            .map(str::to_string);
        Some(ListEntry {
            name: name.to_string(),
            state,
            ipv4,
        })
    })
    .collect()
}

fn is_list_header(line: &str) -> bool {
    let mut fields = line.split(',').map(str::trim);
    fields.next() == Some("Name") && fields.next() == Some("State")
}

/// Whether `multipass info --format json` reports `host` as a mount source.
///
/// Any unexpected document shape counts as not mounted.
pub fn info_has_mount(info_json: &str, name: &str, host: &Path) -> bool {
    let Ok(doc) = serde_json::from_str::<serde_json::Value>(info_json) else {
        return false;
    };
    let Some(mounts) = doc
        .get("info")
        .and_then(|i| i.get(name))
        .and_then(|vm| vm.get("mounts"))
        .and_then(|m| m.as_object())
    else {
        return false;
    };
    let host = host.to_string_lossy();
    mounts.values().any(|mount| {
        mount
            .get("source_path")
            .and_then(|s| s.as_str())
            .is_some_and(|source| source.trim_end_matches('/') == host.trim_end_matches('/'))
    })
}

#[derive(Default)]
pub struct MultipassBackend;

impl MultipassBackend {
    pub fn new() -> Self {
        Self
    }

    fn list(&self) -> Result<Vec<ListEntry>> {
        let out = Cmd::new(BINARY)
            .args(["list", "--format", "csv"])
            .timeout(QUERY_TIMEOUT)
            .run_and_capture_stdout()?;
        Ok(parse_list(&out))
    }

    fn entry(&self, name: &str) -> Result<Option<ListEntry>> {
        Ok(self.list()?.into_iter().find(|e| e.name == name))
    }

    fn guest_target(name: &str, guest: &Path) -> String {
        format!("{}:{}", name, guest.display())
    }
}

impl Backend for MultipassBackend {
    fn kind(&self) -> InstanceKind {
        InstanceKind::Vm
    }

    fn binary(&self) -> &'static str {
        BINARY
    }

    fn guest_home(&self) -> &'static str {
        GUEST_HOME
    }

    fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.entry(name)?.is_some())
    }

    fn running(&self, name: &str) -> Result<bool> {
        Ok(self.entry(name)?.is_some_and(|e| e.state == RUNNING))
    }

    fn create(&self, name: &str, config: &LifecycleConfig) -> Result<()> {
        let user_data = assets::cloud_init()?;
        let mut file = tempfile::Builder::new()
            .prefix("agentvm-cloud-init-")
            .suffix(".yaml")
            .tempfile()
            .map_err(|e| Error::Io {
                context: "Failed to create cloud-init file".to_string(),
                source: e,
            })?;
        file.write_all(user_data.as_bytes())
            .map_err(|e| Error::Io {
                context: format!("Failed to write {}", file.path().display()),
                source: e,
            })?;

        let mut cmd = Cmd::new(BINARY)
            .args(["launch", "--name", name])
            .args(["--cpus", config.cpus.as_str()])
            .args(["--memory", config.memory.as_str()]);
        if let Some(disk) = &config.disk {
            cmd = cmd.args(["--disk", disk.as_str()]);
        }
        cmd = cmd
            .arg("--cloud-init")
            .arg(file.path().to_string_lossy());
        if let Some(image) = &config.image {
            cmd = cmd.arg(image.as_str());
        }

        info!(name, cpus = %config.cpus, memory = %config.memory, "multipass:launch");
        cmd.run_streaming(&format!("Launching VM '{}'", name))
    }

    fn start(&self, name: &str) -> Result<()> {
        Cmd::new(BINARY)
            .args(["start", name])
            .run_streaming(&format!("Starting VM '{}'", name))
    }

    fn stop(&self, name: &str) -> Result<()> {
        Cmd::new(BINARY)
            .args(["stop", name])
            .run_streaming(&format!("Stopping VM '{}'", name))
    }

    fn delete(&self, name: &str, purge: bool) -> Result<()> {
        Cmd::new(BINARY).args(["delete", name]).run()?;
        if purge {
            Cmd::new(BINARY).arg("purge").run()?;
        }
        Ok(())
    }

    fn exec(&self, name: &str, argv: &[&str]) -> Result<String> {
        Cmd::new(BINARY)
            .args(["exec", name, "--"])
            .args(argv.iter().copied())
            .run_and_capture_stdout()
    }

    fn exec_within(&self, name: &str, argv: &[&str], limit: Duration) -> Result<String> {
        Cmd::new(BINARY)
            .args(["exec", name, "--"])
            .args(argv.iter().copied())
            .timeout(limit)
            .run_and_capture_stdout()
    }

    fn exec_interactive(&self, name: &str, argv: &[&str]) -> Result<()> {
        Cmd::new(BINARY)
            .args(["exec", name, "--"])
            .args(argv.iter().copied())
            .run_attached()
    }

    fn mount(&self, name: &str, host: &Path, guest: &Path) -> Result<()> {
        Cmd::new(BINARY)
            .arg("mount")
            .arg(host.to_string_lossy())
            .arg(Self::guest_target(name, guest))
            .run()
            .map(|_| ())
    }

    fn unmount(&self, name: &str, guest: &Path) -> Result<()> {
        Cmd::new(BINARY)
            .arg("umount")
            .arg(Self::guest_target(name, guest))
            .run()
            .map(|_| ())
    }

    fn mounted(&self, name: &str, host: &Path) -> Result<bool> {
        let info = Cmd::new(BINARY)
            .args(["info", name, "--format", "json"])
            .timeout(QUERY_TIMEOUT)
            .run_and_capture_stdout()?;
        let mounted = info_has_mount(&info, name, host);
        debug!(name, host = %host.display(), mounted, "multipass:mounted");
        Ok(mounted)
    }

    fn address(&self, name: &str) -> Result<String> {
        let entry = self.entry(name)?.ok_or_else(|| Error::NotFound {
            kind: InstanceKind::Vm,
            name: name.to_string(),
        })?;
        entry.ipv4.ok_or_else(|| Error::AddressNotFound {
            kind: InstanceKind::Vm,
            name: name.to_string(),
        })
    }

    fn attach(&self, name: &str, session: &Session) -> Result<()> {
        let ip = self.address(name)?;
        let ssh = RemoteCommand::new(GUEST_USER, ip)
            .tty(session.tty)
            .workdir(session.workdir.as_deref())
            .terminal(session.terminal.clone())
            .program(&session.program);
        debug!(name, remote = %ssh.remote_command(), "multipass:attach");
        Cmd::new("ssh").args(ssh.ssh_args()).run_attached()
    }

    fn copy_in(&self, name: &str, host: &Path, guest: &Path) -> Result<()> {
        Cmd::new(BINARY)
            .arg("transfer")
            .arg(host.to_string_lossy())
            .arg(Self::guest_target(name, guest))
            .run()
            .map(|_| ())
    }

    fn info(&self, name: &str) -> Result<String> {
        Cmd::new(BINARY)
            .args(["info", name])
            .timeout(QUERY_TIMEOUT)
            .run_and_capture_stdout()
    }

    fn logs(&self, name: &str, lines: usize) -> Result<String> {
        let lines = lines.to_string();
        let lines = lines.as_str();
        match self.exec(name, &["tail", "-n", lines, CLOUD_INIT_OUTPUT_LOG]) {
            Ok(out) => Ok(out),
            Err(e) => {
                debug!(name, error = %e, "multipass:logs falling back to cloud-init.log");
                self.exec(name, &["tail", "-n", lines, CLOUD_INIT_LOG])
            }
        }
    }

    fn follow_logs(&self, name: &str) -> Result<()> {
        let script = format!(
            "tail -f {} 2>/dev/null || tail -f {}",
            CLOUD_INIT_OUTPUT_LOG, CLOUD_INIT_LOG
        );
        self.exec_interactive(name, &["bash", "-c", script.as_str()])
    }
}
