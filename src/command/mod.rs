pub mod config;
pub mod delete;
pub mod launch;
pub mod lifecycle;
pub mod mount;
pub mod session;
pub mod status;

use std::path::PathBuf;

use anyhow::Result;
use tracing::debug;

use crate::backend::{self, InstanceKind};
use crate::config::Config;
use crate::workflow::Context;

/// Instance selection shared by every verb. Given before the verb so the
/// pass-through verbs hand everything after it to the guest program.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct Target {
    /// Backend to use (defaults to the config file, then `vm`)
    #[arg(short = 'b', long, value_enum)]
    pub backend: Option<InstanceKind>,

    /// Instance name (defaults to the configured VM or container name)
    #[arg(short = 'n', long)]
    pub name: Option<String>,

    /// Path to an alternative config file
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,
}

impl Target {
    pub fn load_config(&self) -> Result<Config> {
        Config::load(self.config.as_deref())
    }

    /// Build the per-invocation context. Fails with `BackendUnavailable`
    /// before any instance is queried.
    pub fn context(&self) -> Result<Context> {
        let config = self.load_config()?;
        let kind = config.backend_kind(self.backend);
        let name = self
            .name
            .clone()
            .unwrap_or_else(|| config.instance_name(kind).to_string());
        debug!(%kind, name = %name, "command:target resolved");

        let ctx = Context::new(
            backend::for_kind(kind, &config),
            name,
            config.lifecycle(kind),
        );
        ctx.preflight()?;
        Ok(ctx)
    }
}
