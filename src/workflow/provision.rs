//! Post-provision steps applied to a running guest: login key, git identity,
//! commit signing, agent settings.

use std::fs;
use std::path::Path;

use tracing::{debug, info};

use super::context::Context;
use crate::assets;
use crate::backend::InstanceKind;
use crate::error::{Error, Result};
use crate::output;

/// How a step failure is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Abort the verb.
    Fatal,
    /// Log a warning and continue.
    Advisory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    AuthorizedKey,
    GitIdentity,
    SigningKey,
    AgentSettings,
}

/// What a step did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    Done,
    Skipped(&'static str),
    /// Advisory failure, already reported.
    Failed(String),
}

/// After launch: everything is advisory.
pub fn launch_plan() -> Vec<(Step, Severity)> {
    [
        Step::AuthorizedKey,
        Step::GitIdentity,
        Step::SigningKey,
        Step::AgentSettings,
    ]
    .into_iter()
    .map(|step| (step, Severity::Advisory))
    .collect()
}

/// `configure-git`: the identity steps are the whole point, so they are fatal.
pub fn identity_plan() -> Vec<(Step, Severity)> {
    vec![
        (Step::GitIdentity, Severity::Fatal),
        (Step::SigningKey, Severity::Fatal),
    ]
}

impl Step {
    pub fn label(&self) -> &'static str {
        match self {
            Step::AuthorizedKey => "SSH key setup",
            Step::GitIdentity => "Git configuration",
            Step::SigningKey => "Commit signing setup",
            Step::AgentSettings => "Claude settings",
        }
    }

    fn run(&self, ctx: &Context) -> Result<Applied> {
        match self {
            Step::AuthorizedKey => authorize_host_key(ctx),
            Step::GitIdentity => configure_git_identity(ctx),
            Step::SigningKey => configure_signing(ctx),
            Step::AgentSettings => write_agent_settings(ctx),
        }
    }
}

/// Run a plan in order. A fatal failure stops at that step.
pub fn run_plan(ctx: &Context, plan: &[(Step, Severity)]) -> Result<Vec<(Step, Applied)>> {
    let mut report = Vec::with_capacity(plan.len());
    for &(step, severity) in plan {
        let applied = match step.run(ctx) {
            Ok(applied) => applied,
            Err(e) if severity == Severity::Advisory => {
                output::warn(format!("{} failed: {}", step.label(), e));
                Applied::Failed(e.to_string())
            }
            Err(e) => return Err(e),
        };
        debug!(?step, ?applied, "provision:step");
        report.push((step, applied));
    }
    Ok(report)
}

fn read_key(path: &Path) -> Result<String> {
    let key = fs::read_to_string(path).map_err(|e| Error::Io {
        context: format!("Failed to read {}", path.display()),
        source: e,
    })?;
    Ok(key.trim().to_string())
}

fn authorize_host_key(ctx: &Context) -> Result<Applied> {
    // Containers are entered with `docker exec`, not ssh
    if ctx.kind() != InstanceKind::Vm {
        return Ok(Applied::Skipped("not needed for containers"));
    }
    let Some(path) = &ctx.lifecycle.identity.ssh_public_key else {
        output::warn("No SSH public key found in ~/.ssh/");
        return Ok(Applied::Skipped("no SSH public key found"));
    };
    let key = read_key(path)?;
    output::info(format!("Copying SSH key: {}", path.display()));

    let script = format!(
        "mkdir -p ~/.ssh && chmod 700 ~/.ssh && touch ~/.ssh/authorized_keys && \
         (grep -qxF '{key}' ~/.ssh/authorized_keys || echo '{key}' >> ~/.ssh/authorized_keys) && \
         chmod 600 ~/.ssh/authorized_keys"
    );
    ctx.backend.exec(&ctx.name, &["bash", "-c", script.as_str()])?;
    Ok(Applied::Done)
}

fn configure_git_identity(ctx: &Context) -> Result<Applied> {
    let identity = &ctx.lifecycle.identity;
    if identity.git_user_name.is_none() && identity.git_user_email.is_none() {
        return Ok(Applied::Skipped("no git identity configured"));
    }
    output::info("Configuring git...");
    if let Some(name) = &identity.git_user_name {
        git_config(ctx, "user.name", name)?;
        info!(name, "provision:git user.name");
    }
    if let Some(email) = &identity.git_user_email {
        git_config(ctx, "user.email", email)?;
        info!(email, "provision:git user.email");
    }
    Ok(Applied::Done)
}

fn configure_signing(ctx: &Context) -> Result<Applied> {
    let identity = &ctx.lifecycle.identity;
    let Some(key_path) = &identity.signing_key else {
        return Ok(Applied::Skipped("no signing key configured"));
    };
    if !key_path.is_file() {
        return Err(Error::Validation(format!(
            "SSH signing key not found: {}",
            key_path.display()
        )));
    }
    let Some(email) = &identity.git_user_email else {
        return Ok(Applied::Skipped("signing needs git user_email"));
    };
    let key = read_key(key_path)?;

    let ssh_dir = format!("{}/.ssh", ctx.backend.guest_home());
    let guest_key = format!("{}/signing_key.pub", ssh_dir);
    let allowed_signers = format!("{}/allowed_signers", ssh_dir);

    ctx.backend.exec(&ctx.name, &["mkdir", "-p", ssh_dir.as_str()])?;
    ctx.backend
        .copy_in(&ctx.name, key_path, Path::new(&guest_key))?;
    git_config(ctx, "gpg.format", "ssh")?;
    git_config(ctx, "user.signingkey", &guest_key)?;

    let script = format!("echo '{} {}' > {}", email, key, allowed_signers);
    ctx.backend
        .exec(&ctx.name, &["bash", "-c", script.as_str()])?;
    git_config(ctx, "gpg.ssh.allowedSignersFile", &allowed_signers)?;

    output::info(format!("Commit signing configured with {}", key_path.display()));
    Ok(Applied::Done)
}

fn write_agent_settings(ctx: &Context) -> Result<Applied> {
    let settings = assets::agent_settings()?;
    let dir = format!("{}/.claude", ctx.backend.guest_home());
    let path = format!("{}/settings.json", dir);

    // Existing settings belong to the user
    let script = format!(
        "mkdir -p {dir}\nif [ ! -f {path} ]; then\ncat > {path} << 'EOF'\n{settings}\nEOF\nfi"
    );
    ctx.backend
        .exec(&ctx.name, &["bash", "-c", script.as_str()])?;
    Ok(Applied::Done)
}

fn git_config(ctx: &Context, key: &str, value: &str) -> Result<()> {
    ctx.backend
        .exec(&ctx.name, &["git", "config", "--global", key, value])
        .map(|_| ())
}
