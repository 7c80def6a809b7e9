use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::backend::InstanceKind;
use crate::mount::MountBinding;
use crate::output;
use crate::readiness;

const APP_DIR: &str = "agentvm";
const CONFIG_FILE: &str = "config.toml";

/// Environment override for the backend, checked after the CLI flag.
pub const BACKEND_ENV: &str = "AGENTVM_BACKEND";

/// Host public keys tried, in order, for VM `authorized_keys`.
const SSH_PUBLIC_KEYS: &[&str] = &["id_ed25519.pub", "id_rsa.pub"];

/// Hostname given to containers.
const CONTAINER_HOSTNAME: &str = "coding-agent";

/// Multipass VM settings
#[derive(Debug, Deserialize, Serialize, Default, Clone, PartialEq)]
pub struct VmConfig {
    /// Instance name. Default: "coding-agent"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Number of CPUs. Default: 2
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpus: Option<u32>,

    /// Memory size (e.g. "4G"). Default: "4G"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,

    /// Disk size (e.g. "20G"). Default: "20G"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk: Option<String>,

    /// Ubuntu image passed to `multipass launch`. Default: multipass default LTS
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// How long to wait for cloud-init after creation. Default: 600
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready_timeout_secs: Option<u64>,
}

impl VmConfig {
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or("coding-agent")
    }

    pub fn cpus(&self) -> u32 {
        self.cpus.unwrap_or(2)
    }

    pub fn memory(&self) -> &str {
        self.memory.as_deref().unwrap_or("4G")
    }

    pub fn disk(&self) -> &str {
        self.disk.as_deref().unwrap_or("20G")
    }

    pub fn ready_timeout(&self) -> Duration {
        self.ready_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(readiness::DEFAULT_TIMEOUT)
    }
}

/// Docker container settings
#[derive(Debug, Deserialize, Serialize, Default, Clone, PartialEq)]
pub struct DockerConfig {
    /// Container name. Default: "coding-agent-docker"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_name: Option<String>,

    /// Image tag, built from the embedded Dockerfile when missing.
    /// Default: "coding-agent:latest"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// CPU limit passed to `docker create --cpus`. Default: "2"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpus: Option<String>,

    /// Memory limit passed to `docker create --memory`. Default: "4g"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
}

impl DockerConfig {
    pub fn container_name(&self) -> &str {
        self.container_name.as_deref().unwrap_or("coding-agent-docker")
    }

    pub fn image(&self) -> &str {
        self.image.as_deref().unwrap_or("coding-agent:latest")
    }

    pub fn cpus(&self) -> &str {
        self.cpus.as_deref().unwrap_or("2")
    }

    pub fn memory(&self) -> &str {
        self.memory.as_deref().unwrap_or("4g")
    }
}

/// Git identity applied inside guests
#[derive(Debug, Deserialize, Serialize, Default, Clone, PartialEq)]
pub struct GitConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
}

/// SSH settings
#[derive(Debug, Deserialize, Serialize, Default, Clone, PartialEq)]
pub struct SshConfig {
    /// Public key used for commit signing inside the guest.
    /// Default: "~/.ssh/id_ed25519.pub"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signing_key: Option<String>,
}

impl SshConfig {
    pub fn signing_key(&self) -> &str {
        self.signing_key.as_deref().unwrap_or("~/.ssh/id_ed25519.pub")
    }
}

#[derive(Debug, Deserialize, Serialize, Default, Clone, PartialEq)]
pub struct Config {
    /// Default backend when `--backend` is not given. Default: vm
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<InstanceKind>,

    #[serde(default)]
    pub vm: VmConfig,

    #[serde(default)]
    pub docker: DockerConfig,

    #[serde(default)]
    pub git: GitConfig,

    #[serde(default)]
    pub ssh: SshConfig,
}

/// Identity material applied to a guest after provisioning.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub git_user_name: Option<String>,
    pub git_user_email: Option<String>,
    /// Host path of the SSH signing public key: the configured path, or the
    /// default key when it exists.
    pub signing_key: Option<PathBuf>,
    /// Host SSH public key authorized for login into VMs.
    pub ssh_public_key: Option<PathBuf>,
}

/// Per-invocation settings handed to the backend and orchestrator.
/// Built once from `Config` and never mutated.
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    pub cpus: String,
    pub memory: String,
    pub disk: Option<String>,
    pub image: Option<String>,
    pub hostname: String,
    /// Host directories bound at creation (containers only).
    pub binds: Vec<MountBinding>,
    pub ready_timeout: Duration,
    pub ready_interval: Duration,
    pub identity: Identity,
}

impl Config {
    /// Load configuration from `path`, or from the default location.
    ///
    /// An explicit path must exist; a missing default file yields defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::load_from_path(path)?
                .ok_or_else(|| anyhow::anyhow!("Config file not found: {}", path.display())),
            None => Ok(Self::load_from_path(&default_path()?)?.unwrap_or_default()),
        }
    }

    fn load_from_path(path: &Path) -> anyhow::Result<Option<Self>> {
        if !path.exists() {
            debug!(path = %path.display(), "config:not found");
            return Ok(None);
        }
        debug!(path = %path.display(), "config:reading file");
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)
            .map_err(|e| anyhow::anyhow!("Failed to parse config at {}: {}", path.display(), e))?;
        Ok(Some(config))
    }

    /// Write the config as TOML, creating parent directories.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                anyhow::anyhow!("Failed to create config directory {}: {}", parent.display(), e)
            })?;
        }
        fs::write(path, self.to_toml()?)
            .map_err(|e| anyhow::anyhow!("Failed to write config {}: {}", path.display(), e))?;
        Ok(())
    }

    pub fn to_toml(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Every field populated with its effective value.
    pub fn resolved(&self) -> Self {
        Self {
            backend: Some(self.backend.unwrap_or_default()),
            vm: VmConfig {
                name: Some(self.vm.name().to_string()),
                cpus: Some(self.vm.cpus()),
                memory: Some(self.vm.memory().to_string()),
                disk: Some(self.vm.disk().to_string()),
                image: self.vm.image.clone(),
                ready_timeout_secs: Some(self.vm.ready_timeout().as_secs()),
            },
            docker: DockerConfig {
                container_name: Some(self.docker.container_name().to_string()),
                image: Some(self.docker.image().to_string()),
                cpus: Some(self.docker.cpus().to_string()),
                memory: Some(self.docker.memory().to_string()),
            },
            git: self.git.clone(),
            // The default key stays implicit so a host without it is not an error
            ssh: self.ssh.clone(),
        }
    }

    /// Backend selection: CLI flag, then `AGENTVM_BACKEND`, then config, then VM.
    pub fn backend_kind(&self, cli: Option<InstanceKind>) -> InstanceKind {
        if let Some(kind) = cli {
            return kind;
        }
        if let Some(kind) = std::env::var(BACKEND_ENV)
            .ok()
            .and_then(|value| backend_from_env(&value))
        {
            return kind;
        }
        self.backend.unwrap_or_default()
    }

    pub fn instance_name(&self, kind: InstanceKind) -> &str {
        match kind {
            InstanceKind::Vm => self.vm.name(),
            InstanceKind::Container => self.docker.container_name(),
        }
    }

    /// Identity from the `[git]` and `[ssh]` sections plus host key discovery.
    pub fn identity(&self) -> Identity {
        // An explicit key is kept even when missing so signing setup reports it
        let signing_key = match &self.ssh.signing_key {
            Some(path) => Some(expand_tilde(path)),
            None => Some(expand_tilde(self.ssh.signing_key())).filter(|p| p.is_file()),
        };
        let ssh_public_key = home::home_dir().and_then(|home| {
            SSH_PUBLIC_KEYS
                .iter()
                .map(|key| home.join(".ssh").join(key))
                .find(|p| p.is_file())
        });
        Identity {
            git_user_name: self.git.user_name.clone().filter(|s| !s.is_empty()),
            git_user_email: self.git.user_email.clone().filter(|s| !s.is_empty()),
            signing_key,
            ssh_public_key,
        }
    }

    /// Sizing and identity for `kind`. Binds start empty; launch adds them.
    pub fn lifecycle(&self, kind: InstanceKind) -> LifecycleConfig {
        let identity = self.identity();
        match kind {
            InstanceKind::Vm => LifecycleConfig {
                cpus: self.vm.cpus().to_string(),
                memory: self.vm.memory().to_string(),
                disk: Some(self.vm.disk().to_string()),
                image: self.vm.image.clone(),
                hostname: self.vm.name().to_string(),
                binds: Vec::new(),
                ready_timeout: self.vm.ready_timeout(),
                ready_interval: readiness::DEFAULT_INTERVAL,
                identity,
            },
            InstanceKind::Container => LifecycleConfig {
                cpus: self.docker.cpus().to_string(),
                memory: self.docker.memory().to_string(),
                disk: None,
                image: Some(self.docker.image().to_string()),
                hostname: CONTAINER_HOSTNAME.to_string(),
                binds: Vec::new(),
                ready_timeout: self.vm.ready_timeout(),
                ready_interval: readiness::DEFAULT_INTERVAL,
                identity,
            },
        }
    }
}

/// Parse an `AGENTVM_BACKEND` value, warning about and ignoring unknown ones.
fn backend_from_env(value: &str) -> Option<InstanceKind> {
    match value.to_lowercase().as_str() {
        "vm" | "multipass" => Some(InstanceKind::Vm),
        "docker" | "container" => Some(InstanceKind::Container),
        other => {
            output::warn(format!(
                "Unknown backend '{}' in {}, ignoring",
                other, BACKEND_ENV
            ));
            None
        }
    }
}

/// `$XDG_CONFIG_HOME/agentvm/config.toml`, falling back to `~/.config`.
pub fn default_path() -> anyhow::Result<PathBuf> {
    if let Ok(config_home) = std::env::var("XDG_CONFIG_HOME")
        && !config_home.is_empty()
    {
        return Ok(PathBuf::from(config_home).join(APP_DIR).join(CONFIG_FILE));
    }
    let home = home::home_dir().ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))?;
    Ok(home.join(".config").join(APP_DIR).join(CONFIG_FILE))
}

/// Expand a leading `~/` to the home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" {
        return home::home_dir().unwrap_or_else(|| PathBuf::from(path));
    }
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = home::home_dir()
    {
        return home.join(rest);
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.vm.name(), "coding-agent");
        assert_eq!(config.vm.cpus(), 2);
        assert_eq!(config.vm.memory(), "4G");
        assert_eq!(config.vm.disk(), "20G");
        assert_eq!(config.vm.ready_timeout(), Duration::from_secs(600));
        assert_eq!(config.docker.container_name(), "coding-agent-docker");
        assert_eq!(config.docker.image(), "coding-agent:latest");
        assert_eq!(config.docker.cpus(), "2");
        assert_eq!(config.docker.memory(), "4g");
        assert_eq!(config.ssh.signing_key(), "~/.ssh/id_ed25519.pub");
    }

    #[test]
    fn parses_partial_toml() {
        let config: Config = toml::from_str(
            r#"
backend = "docker"

[vm]
cpus = 4
memory = "8G"

[git]
user_name = "Ada"
user_email = "ada@example.com"
"#,
        )
        .unwrap();
        assert_eq!(config.backend, Some(InstanceKind::Container));
        assert_eq!(config.vm.cpus(), 4);
        assert_eq!(config.vm.memory(), "8G");
        assert_eq!(config.vm.disk(), "20G");
        assert_eq!(config.git.user_name.as_deref(), Some("Ada"));
    }

    #[test]
    fn load_explicit_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[docker]\ncontainer_name = \"box\"").unwrap();
        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.instance_name(InstanceKind::Container), "box");
        assert_eq!(config.instance_name(InstanceKind::Vm), "coding-agent");
    }

    #[test]
    fn load_missing_explicit_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load(Some(&dir.path().join("nope.toml"))).is_err());
    }

    #[test]
    fn load_rejects_invalid_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[vm\ncpus = ").unwrap();
        let err = Config::load(Some(file.path())).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config"));
    }

    #[test]
    fn save_then_load_resolved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let resolved = Config::default().resolved();
        resolved.save(&path).unwrap();
        let loaded = Config::load(Some(&path)).unwrap();
        assert_eq!(loaded, resolved);
        assert_eq!(loaded.backend, Some(InstanceKind::Vm));
        assert_eq!(loaded.ssh.signing_key, None);
    }

    #[test]
    fn cli_backend_wins() {
        let config = Config {
            backend: Some(InstanceKind::Vm),
            ..Config::default()
        };
        assert_eq!(
            config.backend_kind(Some(InstanceKind::Container)),
            InstanceKind::Container
        );
    }

    #[test]
    fn backend_env_values() {
        assert_eq!(backend_from_env("Multipass"), Some(InstanceKind::Vm));
        assert_eq!(backend_from_env("container"), Some(InstanceKind::Container));
        assert_eq!(backend_from_env("podman"), None);
    }

    #[test]
    fn lifecycle_per_kind() {
        let config = Config::default();
        let vm = config.lifecycle(InstanceKind::Vm);
        assert_eq!(vm.cpus, "2");
        assert_eq!(vm.disk.as_deref(), Some("20G"));
        assert_eq!(vm.image, None);
        assert!(vm.binds.is_empty());

        let container = config.lifecycle(InstanceKind::Container);
        assert_eq!(container.memory, "4g");
        assert_eq!(container.disk, None);
        assert_eq!(container.image.as_deref(), Some("coding-agent:latest"));
        assert_eq!(container.hostname, "coding-agent");
    }

    #[test]
    fn empty_git_values_are_ignored() {
        let config = Config {
            git: GitConfig {
                user_name: Some(String::new()),
                user_email: Some("a@b".to_string()),
            },
            ..Config::default()
        };
        let identity = config.identity();
        assert_eq!(identity.git_user_name, None);
        assert_eq!(identity.git_user_email.as_deref(), Some("a@b"));
    }

    #[test]
    fn explicit_signing_key_is_kept_when_missing() {
        let config = Config {
            ssh: SshConfig {
                signing_key: Some("/nonexistent/agentvm/signing.pub".to_string()),
            },
            ..Config::default()
        };
        assert_eq!(
            config.identity().signing_key,
            Some(PathBuf::from("/nonexistent/agentvm/signing.pub"))
        );
    }

    #[test]
    fn tilde_expansion() {
        assert_eq!(expand_tilde("/abs/key.pub"), PathBuf::from("/abs/key.pub"));
        if let Some(home) = home::home_dir() {
            assert_eq!(expand_tilde("~/.ssh/k.pub"), home.join(".ssh/k.pub"));
        }
    }
}
