use tracing::info;

use super::context::Context;
use super::provision::{self, Applied, Step};
use super::types::Status;
use crate::backend::InstanceState;
use crate::error::Result;

pub fn status(ctx: &Context) -> Result<Status> {
    match ctx.state()? {
        InstanceState::Absent => Ok(Status::Absent),
        state => Ok(Status::Present {
            running: state == InstanceState::Running,
            details: ctx.backend.info(&ctx.name)?,
        }),
    }
}

/// Last `lines` lines of the bootstrap log.
pub fn logs(ctx: &Context, lines: usize) -> Result<String> {
    ctx.require_running()?;
    ctx.backend.logs(&ctx.name, lines)
}

/// Stream the bootstrap log until interrupted.
pub fn follow_logs(ctx: &Context) -> Result<()> {
    ctx.require_running()?;
    ctx.backend.follow_logs(&ctx.name)
}

/// Re-apply git identity and commit signing on a running instance.
pub fn configure_git(ctx: &Context) -> Result<Vec<(Step, Applied)>> {
    ctx.require_running()?;
    let report = provision::run_plan(ctx, &provision::identity_plan())?;
    info!(name = %ctx.name, ?report, "configure_git:done");
    Ok(report)
}
