use std::path::Path;

use anyhow::Result;

use super::Target;
use crate::output;
use crate::workflow::{self, resolve_host_path, types::MountOutcome};

pub fn mount(target: &Target, path: Option<&Path>) -> Result<()> {
    let host = resolve_host_path(path)?;
    let ctx = target.context()?;
    let (binding, outcome) = workflow::ensure_mounted(&ctx, &host)?;
    match outcome {
        MountOutcome::Mounted => output::success(format!(
            "Mounted {} at {}",
            binding.host_path.display(),
            binding.guest_path.display()
        )),
        MountOutcome::AlreadyMounted => output::info(format!(
            "{} is already mounted at {}",
            binding.host_path.display(),
            binding.guest_path.display()
        )),
    }
    Ok(())
}

pub fn unmount(target: &Target, path: Option<&Path>) -> Result<()> {
    let host = resolve_host_path(path)?;
    let ctx = target.context()?;
    let binding = workflow::unmount(&ctx, &host)?;
    output::success(format!("Unmounted {}", binding.guest_path.display()));
    Ok(())
}
