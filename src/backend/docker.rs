//! Docker container backend.
//!
//! Containers are long-lived (`tail -f /dev/null` as PID 1) so they behave like
//! the VM backend: created once, started and stopped, and entered with
//! `docker exec`. Bind mounts are fixed when the container is created.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info};

use super::{Backend, InstanceKind, Session, listing_contains};
use crate::assets::AGENT_DOCKERFILE;
use crate::cmd::Cmd;
use crate::config::LifecycleConfig;
use crate::error::{Error, Result};
use crate::mount::MountBinding;
use crate::remote::TerminalEnv;
use crate::spinner;

const BINARY: &str = "docker";

/// Upper bound for inventory queries.
const QUERY_TIMEOUT: Duration = Duration::from_secs(30);
const GUEST_HOME: &str = "/home/agent";

/// Where the forwarded ssh-agent socket appears inside the container.
const AGENT_SOCKET: &str = "/ssh-agent.sock";

/// Docker Desktop exposes the host agent at this fixed path on macOS.
#[cfg(target_os = "macos")]
const DESKTOP_AGENT_SOCKET: &str = "/run/host-services/ssh-auth.sock";

/// Host directories shared read-only when present.
const READONLY_HOME_DIRS: &[&str] = &[".gemini", ".aws"];

const INSPECT_FORMAT: &str = "Container: {{.Name}}\n\
State: {{.State.Status}}\n\
Created: {{.Created}}\n\
Image: {{.Config.Image}}";

const MOUNT_SOURCES_FORMAT: &str = "{{range .Mounts}}{{println .Source}}{{end}}";

/// Named volume holding agent state across container re-creation.
pub fn data_volume(container: &str) -> String {
    format!("{}-claude-data", container)
}

/// Host resources forwarded into a new container.
#[derive(Debug, Clone, Default)]
pub struct HostShares {
    pub ssh_agent_socket: Option<PathBuf>,
    /// `(host dir, name under the guest home)`
    pub readonly_dirs: Vec<(PathBuf, String)>,
    pub terminal: Option<TerminalEnv>,
}

impl HostShares {
    pub fn detect() -> Self {
        let readonly_dirs = home::home_dir()
            .map(|home| {
                READONLY_HOME_DIRS
                    .iter()
                    .map(|dir| (home.join(dir), dir.to_string()))
                    .filter(|(path, _)| path.is_dir())
                    .collect()
            })
            .unwrap_or_default();

        Self {
            ssh_agent_socket: detect_agent_socket(),
            readonly_dirs,
            terminal: Some(TerminalEnv::from_env()),
        }
    }
}

#[cfg(target_os = "macos")]
fn detect_agent_socket() -> Option<PathBuf> {
    let sock = PathBuf::from(DESKTOP_AGENT_SOCKET);
    sock.exists().then_some(sock)
}

#[cfg(not(target_os = "macos"))]
fn detect_agent_socket() -> Option<PathBuf> {
    std::env::var_os("SSH_AUTH_SOCK")
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .filter(|p| p.exists())
}

/// `-v` specs shared by every container of an instance: the data volume,
/// `binds`, the agent socket and the read-only home directories.
fn shared_volumes(name: &str, binds: &[MountBinding], shares: &HostShares) -> Vec<String> {
    let mut volumes = vec![format!("{}:{}/.claude", data_volume(name), GUEST_HOME)];
    volumes.extend(binds.iter().map(|b| b.volume_spec()));
    if let Some(sock) = &shares.ssh_agent_socket {
        volumes.push(format!("{}:{}", sock.display(), AGENT_SOCKET));
    }
    for (host, dir) in &shares.readonly_dirs {
        volumes.push(format!("{}:{}/{}:ro", host.display(), GUEST_HOME, dir));
    }
    volumes
}

fn shared_env(
    config: &LifecycleConfig,
    terminal: Option<&TerminalEnv>,
    shares: &HostShares,
) -> Vec<(&'static str, String)> {
    let mut env = Vec::new();
    if let Some(terminal) = terminal {
        env.extend(terminal.assignments());
    }
    if let Some(user) = &config.identity.git_user_name {
        env.push(("GIT_USER_NAME", user.clone()));
    }
    if let Some(email) = &config.identity.git_user_email {
        env.push(("GIT_USER_EMAIL", email.clone()));
    }
    if shares.ssh_agent_socket.is_some() {
        env.push(("SSH_AUTH_SOCK", AGENT_SOCKET.to_string()));
    }
    env
}

fn push_volumes_and_env(args: &mut Vec<String>, volumes: Vec<String>, env: Vec<(&str, String)>) {
    for volume in volumes {
        args.extend(["-v".into(), volume]);
    }
    for (key, value) in env {
        args.extend(["-e".into(), format!("{}={}", key, value)]);
    }
}

fn push_program(args: &mut Vec<String>, session: &Session) {
    if session.program.is_empty() {
        args.extend(["bash".to_string(), "-l".to_string()]);
    } else {
        args.extend(session.program.iter().cloned());
    }
}

/// Arguments for `docker create`.
pub fn create_args(
    name: &str,
    image: &str,
    config: &LifecycleConfig,
    shares: &HostShares,
) -> Vec<String> {
    let mut args: Vec<String> = vec!["create".into(), "--name".into(), name.into()];
    args.extend(["--hostname".into(), config.hostname.clone()]);
    args.extend(["--cpus".into(), config.cpus.clone()]);
    args.extend(["--memory".into(), config.memory.clone()]);

    push_volumes_and_env(
        &mut args,
        shared_volumes(name, &config.binds, shares),
        shared_env(config, shares.terminal.as_ref(), shares),
    );

    args.extend([
        "-it".into(),
        image.into(),
        "tail".into(),
        "-f".into(),
        "/dev/null".into(),
    ]);
    args
}

/// Arguments for a throwaway `docker run --rm` that shares the instance's
/// data volume and agent socket and binds `bind` as the working directory.
pub fn ephemeral_run_args(
    name: &str,
    image: &str,
    config: &LifecycleConfig,
    shares: &HostShares,
    bind: &MountBinding,
    session: &Session,
) -> Vec<String> {
    let mut args: Vec<String> = vec!["run".into(), "--rm".into(), "-i".into()];
    if session.tty {
        args.push("-t".into());
    }
    args.extend(["--hostname".into(), config.hostname.clone()]);

    let terminal = session.terminal.as_ref().or(shares.terminal.as_ref());
    push_volumes_and_env(
        &mut args,
        shared_volumes(name, std::slice::from_ref(bind), shares),
        shared_env(config, terminal, shares),
    );

    let workdir = session.workdir.as_deref().unwrap_or(bind.guest_path.as_path());
    args.extend(["-w".into(), workdir.to_string_lossy().into_owned()]);
    args.push(image.into());
    push_program(&mut args, session);
    args
}

/// Arguments for `docker exec` running a session.
pub fn exec_session_args(name: &str, session: &Session) -> Vec<String> {
    let mut args = vec!["exec".to_string(), "-i".to_string()];
    if session.tty {
        args.push("-t".to_string());
    }
    if let Some(terminal) = &session.terminal {
        for (key, value) in terminal.assignments() {
            args.extend(["-e".to_string(), format!("{}={}", key, value)]);
        }
    }
    if let Some(dir) = &session.workdir {
        args.extend(["-w".to_string(), dir.to_string_lossy().into_owned()]);
    }
    args.push(name.to_string());
    push_program(&mut args, session);
    args
}

pub struct DockerBackend {
    image: String,
}

impl DockerBackend {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
        }
    }

    fn names(&self, all: bool) -> Result<String> {
        let mut cmd = Cmd::new(BINARY).arg("ps");
        if all {
            cmd = cmd.arg("-a");
        }
        cmd.args(["--format", "{{.Names}}"])
            .timeout(QUERY_TIMEOUT)
            .run_and_capture_stdout()
    }

    fn image_exists(&self, image: &str) -> Result<bool> {
        Cmd::new(BINARY)
            .args(["image", "inspect", image])
            .run_as_check()
    }

    fn build_image(&self, image: &str) -> Result<()> {
        let context = tempfile::Builder::new()
            .prefix("agentvm-image-build-")
            .tempdir()
            .map_err(|e| Error::Io {
                context: "Failed to create temporary build directory".to_string(),
                source: e,
            })?;
        let dockerfile = context.path().join("Dockerfile");
        std::fs::write(&dockerfile, AGENT_DOCKERFILE).map_err(|e| Error::Io {
            context: format!("Failed to write {}", dockerfile.display()),
            source: e,
        })?;

        let uid = unsafe { libc::getuid() };
        let gid = unsafe { libc::getgid() };

        info!(image, uid, gid, "docker:build");
        Cmd::new(BINARY)
            .args(["build", "-t", image])
            .arg("--build-arg")
            .arg(format!("USER_ID={}", uid))
            .arg("--build-arg")
            .arg(format!("GROUP_ID={}", gid))
            .arg(".")
            .workdir(context.path())
            .env("DOCKER_BUILDKIT", "1")
            .run_streaming(&format!("Building image '{}'", image))
    }
}

impl Backend for DockerBackend {
    fn kind(&self) -> InstanceKind {
        InstanceKind::Container
    }

    fn binary(&self) -> &'static str {
        BINARY
    }

    fn guest_home(&self) -> &'static str {
        GUEST_HOME
    }

    fn exists(&self, name: &str) -> Result<bool> {
        Ok(listing_contains(&self.names(true)?, name))
    }

    fn running(&self, name: &str) -> Result<bool> {
        Ok(listing_contains(&self.names(false)?, name))
    }

    fn create(&self, name: &str, config: &LifecycleConfig) -> Result<()> {
        let image = config.image.as_deref().unwrap_or(&self.image);
        if self.image_exists(image)? {
            debug!(image, "docker:image present");
        } else {
            self.build_image(image)?;
        }

        Cmd::new(BINARY)
            .args(["volume", "create"])
            .arg(data_volume(name))
            .run()?;

        let shares = HostShares::detect();
        debug!(name, agent = shares.ssh_agent_socket.is_some(), "docker:create");
        Cmd::new(BINARY)
            .args(create_args(name, image, config, &shares))
            .run()?;
        self.start(name)
    }

    fn start(&self, name: &str) -> Result<()> {
        spinner::with_spinner(&format!("Starting container '{}'", name), || {
            Cmd::new(BINARY).args(["start", name]).run().map(|_| ())
        })
    }

    fn stop(&self, name: &str) -> Result<()> {
        spinner::with_spinner(&format!("Stopping container '{}'", name), || {
            Cmd::new(BINARY).args(["stop", name]).run().map(|_| ())
        })
    }

    fn delete(&self, name: &str, purge: bool) -> Result<()> {
        spinner::with_spinner(&format!("Removing container '{}'", name), || {
            Cmd::new(BINARY).args(["rm", "-f", name]).run()?;
            if purge {
                Cmd::new(BINARY)
                    .args(["volume", "rm", "-f"])
                    .arg(data_volume(name))
                    .run()?;
            }
            Ok(())
        })
    }

    fn exec(&self, name: &str, argv: &[&str]) -> Result<String> {
        Cmd::new(BINARY)
            .args(["exec", name])
            .args(argv.iter().copied())
            .run_and_capture_stdout()
    }

    fn exec_within(&self, name: &str, argv: &[&str], limit: Duration) -> Result<String> {
        Cmd::new(BINARY)
            .args(["exec", name])
            .args(argv.iter().copied())
            .timeout(limit)
            .run_and_capture_stdout()
    }

    fn exec_interactive(&self, name: &str, argv: &[&str]) -> Result<()> {
        Cmd::new(BINARY)
            .args(["exec", "-it", name])
            .args(argv.iter().copied())
            .run_attached()
    }

    fn mount(&self, _name: &str, _host: &Path, _guest: &Path) -> Result<()> {
        Err(Error::Unsupported {
            kind: InstanceKind::Container,
            op: "mount",
            reason: "bind mounts are fixed when the container is created".to_string(),
        })
    }

    fn unmount(&self, _name: &str, _guest: &Path) -> Result<()> {
        Err(Error::Unsupported {
            kind: InstanceKind::Container,
            op: "unmount",
            reason: "bind mounts are fixed when the container is created".to_string(),
        })
    }

    fn mounted(&self, name: &str, host: &Path) -> Result<bool> {
        let sources = Cmd::new(BINARY)
            .args(["inspect", "--format", MOUNT_SOURCES_FORMAT, name])
            .run_and_capture_stdout()?;
        Ok(listing_contains(&sources, &host.to_string_lossy()))
    }

    fn address(&self, name: &str) -> Result<String> {
        if self.exists(name)? {
            Ok(name.to_string())
        } else {
            Err(Error::NotFound {
                kind: InstanceKind::Container,
                name: name.to_string(),
            })
        }
    }

    fn attach(&self, name: &str, session: &Session) -> Result<()> {
        Cmd::new(BINARY)
            .args(exec_session_args(name, session))
            .run_attached()
    }

    fn attach_with_bind(
        &self,
        name: &str,
        session: &Session,
        config: &LifecycleConfig,
        bind: &MountBinding,
    ) -> Result<()> {
        let image = config.image.as_deref().unwrap_or(&self.image);
        let shares = HostShares::detect();
        info!(name, host = %bind.host_path.display(), "docker:ephemeral session");
        Cmd::new(BINARY)
            .args(ephemeral_run_args(name, image, config, &shares, bind, session))
            .run_attached()
    }

    fn copy_in(&self, name: &str, host: &Path, guest: &Path) -> Result<()> {
        Cmd::new(BINARY)
            .arg("cp")
            .arg(host.to_string_lossy())
            .arg(format!("{}:{}", name, guest.display()))
            .run()
            .map(|_| ())
    }

    fn info(&self, name: &str) -> Result<String> {
        Cmd::new(BINARY)
            .args(["inspect", "--format", INSPECT_FORMAT, name])
            .run_and_capture_stdout()
    }

    fn logs(&self, name: &str, lines: usize) -> Result<String> {
        let lines = lines.to_string();
        Cmd::new(BINARY)
            .args(["logs", "--tail", lines.as_str(), name])
            .run_and_capture_stdout()
    }

    fn follow_logs(&self, name: &str) -> Result<()> {
        Cmd::new(BINARY)
            .args(["logs", "-f", name])
            .run_attached()
    }
}
