use std::env;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::context::Context;
use super::types::MountOutcome;
use crate::error::{Error, Result};
use crate::mount::MountBinding;
use crate::output;

/// Canonical host directory for a mount verb; the current directory when
/// no path is given.
pub fn resolve_host_path(path: Option<&Path>) -> Result<PathBuf> {
    let raw = match path {
        Some(path) => path.to_path_buf(),
        None => env::current_dir().map_err(|e| Error::Io {
            context: "Failed to determine current directory".to_string(),
            source: e,
        })?,
    };
    let canonical = raw
        .canonicalize()
        .map_err(|_| Error::Validation(format!("Path does not exist: {}", raw.display())))?;
    if !canonical.is_dir() {
        return Err(Error::Validation(format!(
            "Not a directory: {}",
            canonical.display()
        )));
    }
    Ok(canonical)
}

/// Mount `host` at its derived guest path unless an equivalent binding exists.
pub fn ensure_mounted(ctx: &Context, host: &Path) -> Result<(MountBinding, MountOutcome)> {
    ctx.require_running()?;
    let binding = MountBinding::derive(&ctx.name, host);

    if ctx.backend.mounted(&ctx.name, &binding.host_path)? {
        debug!(host = %binding.host_path.display(), "mount:already mounted");
        return Ok((binding, MountOutcome::AlreadyMounted));
    }

    output::info(format!(
        "Mounting {} to {}",
        binding.host_path.display(),
        binding.target()
    ));
    ctx.backend
        .mount(&ctx.name, &binding.host_path, &binding.guest_path)?;
    info!(host = %binding.host_path.display(), guest = %binding.guest_path.display(), "mount:done");
    Ok((binding, MountOutcome::Mounted))
}

pub fn unmount(ctx: &Context, host: &Path) -> Result<MountBinding> {
    ctx.require_running()?;
    let binding = MountBinding::derive(&ctx.name, host);
    output::info(format!("Unmounting {}", binding.target()));
    ctx.backend.unmount(&ctx.name, &binding.guest_path)?;
    info!(guest = %binding.guest_path.display(), "unmount:done");
    Ok(binding)
}
