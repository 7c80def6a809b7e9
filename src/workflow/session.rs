use std::path::Path;

use tracing::{debug, info};

use super::context::Context;
use super::mounts;
use crate::backend::Session;
use crate::error::{Error, Result};
use crate::mount::MountBinding;
use crate::output;

/// Attach an interactive program (a login shell when `program` is empty)
/// inside the instance, starting in the guest mount of `cwd`.
///
/// When the instance cannot take a new mount, the session runs in a
/// throwaway guest that shares the instance's state and binds `cwd`.
pub fn interactive_session(ctx: &Context, program: Vec<String>, cwd: &Path) -> Result<()> {
    ctx.require_running()?;

    match mounts::ensure_mounted(ctx, cwd) {
        Ok((binding, _)) => {
            let session = Session::interactive(program, Some(binding.guest_path));
            info!(name = %ctx.name, program = ?session.program, workdir = ?session.workdir, "session:attach");
            ctx.backend.attach(&ctx.name, &session)
        }
        Err(Error::Unsupported { .. }) => {
            let binding = MountBinding::derive(&ctx.name, cwd);
            output::info(format!(
                "{} is not shared with {} '{}'; starting a one-off session with it at {}",
                cwd.display(),
                ctx.kind(),
                ctx.name,
                binding.guest_path.display()
            ));
            let session = Session::interactive(program, Some(binding.guest_path.clone()));
            info!(name = %ctx.name, program = ?session.program, workdir = ?session.workdir, "session:attach_with_bind");
            ctx.backend
                .attach_with_bind(&ctx.name, &session, &ctx.lifecycle, &binding)
        }
        Err(e) => Err(e),
    }
}

/// Run a one-off command without a TTY. A leading `--` is dropped.
pub fn exec(ctx: &Context, argv: &[String]) -> Result<()> {
    let argv = match argv.split_first() {
        Some((first, rest)) if first == "--" => rest,
        _ => argv,
    };
    if argv.is_empty() {
        return Err(Error::Validation("No command specified".to_string()));
    }
    ctx.require_running()?;

    debug!(name = %ctx.name, ?argv, "exec:start");
    ctx.backend
        .attach(&ctx.name, &Session::command(argv.to_vec()))
}
