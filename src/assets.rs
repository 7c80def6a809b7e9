//! Guest bootstrap assets: cloud-init user-data, the container image
//! definition, and the agent settings written into new guests.

use serde_yaml::{Mapping, Value};

use crate::error::{Error, Result};

/// Log written by cloud-init while running user-data.
pub const CLOUD_INIT_OUTPUT_LOG: &str = "/var/log/cloud-init-output.log";
/// Fallback when the output log is missing.
pub const CLOUD_INIT_LOG: &str = "/var/log/cloud-init.log";

const GUEST_PACKAGES: &[&str] = &[
    "build-essential",
    "ca-certificates",
    "curl",
    "git",
    "jq",
    "ripgrep",
    "tmux",
    "unzip",
];

const AGENT_CLIS: &[&str] = &["@anthropic-ai/claude-code", "@google/gemini-cli"];

/// Image definition for the container backend.
/// `USER_ID`/`GROUP_ID` let the `agent` user own bind-mounted host files.
pub const AGENT_DOCKERFILE: &str = r#"FROM ubuntu:24.04

ARG USER_ID=1000
ARG GROUP_ID=1000

RUN apt-get update && apt-get install -y --no-install-recommends \
    build-essential \
    ca-certificates \
    curl \
    git \
    jq \
    openssh-client \
    ripgrep \
    sudo \
    tmux \
    unzip \
    && rm -rf /var/lib/apt/lists/*

RUN curl -fsSL https://deb.nodesource.com/setup_22.x | bash - \
    && apt-get install -y --no-install-recommends nodejs \
    && rm -rf /var/lib/apt/lists/*

RUN npm install -g @anthropic-ai/claude-code @google/gemini-cli

# ubuntu images ship a uid 1000 user that would clash with the host ids
RUN userdel -r ubuntu 2>/dev/null || true \
    && (getent group ${GROUP_ID} || groupadd -g ${GROUP_ID} agent) \
    && useradd -m -s /bin/bash -u ${USER_ID} -g ${GROUP_ID} agent \
    && echo 'agent ALL=(ALL) NOPASSWD:ALL' > /etc/sudoers.d/agent \
    && mkdir -p /home/agent/.claude \
    && chown -R ${USER_ID}:${GROUP_ID} /home/agent

USER agent
WORKDIR /home/agent
"#;

/// cloud-init user-data for new VMs.
pub fn cloud_init() -> Result<String> {
    let mut config = Mapping::new();

    config.insert("package_update".into(), true.into());
    config.insert("package_upgrade".into(), false.into());
    config.insert(
        "packages".into(),
        GUEST_PACKAGES
            .iter()
            .map(|p| Value::from(*p))
            .collect::<Vec<_>>()
            .into(),
    );

    let runcmd: Vec<Value> = vec![
        "curl -fsSL https://deb.nodesource.com/setup_22.x | bash -".into(),
        "apt-get install -y nodejs".into(),
        format!("npm install -g {}", AGENT_CLIS.join(" ")).into(),
        "mkdir -p /home/ubuntu/.claude".into(),
        "chown -R ubuntu:ubuntu /home/ubuntu/.claude".into(),
    ];
    config.insert("runcmd".into(), runcmd.into());

    config.insert(
        "final_message".into(),
        "agent environment ready after $UPTIME seconds".into(),
    );

    let body = serde_yaml::to_string(&config)
        .map_err(|e| Error::Asset(format!("cloud-init: {}", e)))?;
    Ok(format!("#cloud-config\n{}", body))
}

/// Agent settings written to `~/.claude/settings.json` in the guest.
pub fn agent_settings() -> Result<String> {
    let settings = serde_json::json!({
        "permissions": {
            "defaultMode": "bypassPermissions"
        },
        "env": {
            "DISABLE_AUTOUPDATER": "1"
        }
    });
    serde_json::to_string_pretty(&settings)
        .map_err(|e| Error::Asset(format!("agent settings: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cloud_init_has_header_and_packages() {
        let yaml = cloud_init().unwrap();
        assert!(yaml.starts_with("#cloud-config\n"));

        let parsed: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();
        let packages = parsed["packages"].as_sequence().unwrap();
        assert!(packages.iter().any(|p| p.as_str() == Some("git")));
        assert_eq!(parsed["package_update"].as_bool(), Some(true));
    }

    #[test]
    fn cloud_init_installs_agent_clis() {
        let yaml = cloud_init().unwrap();
        assert!(yaml.contains("@anthropic-ai/claude-code"));
        assert!(yaml.contains("@google/gemini-cli"));
    }

    #[test]
    fn dockerfile_takes_host_ids() {
        assert!(AGENT_DOCKERFILE.contains("ARG USER_ID"));
        assert!(AGENT_DOCKERFILE.contains("ARG GROUP_ID"));
        assert!(AGENT_DOCKERFILE.contains("USER agent"));
    }

    #[test]
    fn settings_are_valid_json() {
        let raw = agent_settings().unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["permissions"]["defaultMode"], "bypassPermissions");
    }
}
