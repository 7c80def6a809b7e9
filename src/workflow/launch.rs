use tracing::{info, warn};

use super::context::Context;
use super::provision;
use super::types::{LaunchOutcome, Transition};
use crate::backend::{InstanceKind, InstanceState};
use crate::error::{Error, Result};
use crate::output;
use crate::readiness::{PollState, ReadinessPoll};

/// Bring the instance up from whatever state it is in, then apply the
/// post-provision steps.
pub fn launch(ctx: &Context) -> Result<LaunchOutcome> {
    let state = ctx.state()?;
    info!(name = %ctx.name, kind = %ctx.kind(), ?state, "launch:start");

    let outcome = match state {
        InstanceState::Absent => {
            output::info(format!("Creating {} '{}'...", ctx.kind(), ctx.name));
            ctx.backend.create(&ctx.name, &ctx.lifecycle)?;
            LaunchOutcome::Created(wait_until_ready(ctx))
        }
        InstanceState::Stopped => {
            output::info(format!(
                "{} '{}' exists but is stopped, starting it...",
                ctx.kind(),
                ctx.name
            ));
            ctx.backend.start(&ctx.name)?;
            LaunchOutcome::Started
        }
        InstanceState::Running => {
            output::info(format!("{} '{}' is already running", ctx.kind(), ctx.name));
            LaunchOutcome::AlreadyRunning
        }
    };

    provision::run_plan(ctx, &provision::launch_plan())?;
    info!(name = %ctx.name, ?outcome, "launch:done");
    Ok(outcome)
}

/// Wait for cloud-init on a freshly created VM. Containers are ready once
/// started. Failure and timeout are reported, not raised.
fn wait_until_ready(ctx: &Context) -> PollState {
    if ctx.kind() != InstanceKind::Vm {
        return PollState::Ready;
    }

    output::info("Waiting for cloud-init to complete (this may take several minutes)...");
    let poll = ReadinessPoll::with_interval(ctx.lifecycle.ready_timeout, ctx.lifecycle.ready_interval);
    let outcome = poll.run(
        |remaining| {
            ctx.backend
                .exec_within(&ctx.name, &["cloud-init", "status"], remaining)
        },
        |progress| output::info(progress.to_string()),
    );

    match &outcome.state {
        PollState::Ready => output::success("VM is ready!"),
        PollState::Failed(detail) => {
            output::warn(Error::GuestBootstrap(detail.clone()).to_string());
            output::warn(format!(
                "Check logs with 'agentvm{} logs'",
                ctx.kind().cli_flag()
            ));
        }
        PollState::TimedOut => {
            warn!(attempts = outcome.attempts, "launch:readiness timed out");
            output::warn(format!(
                "Timed out waiting for cloud-init after {}s; the VM may still be booting",
                outcome.elapsed.as_secs()
            ));
        }
        PollState::Polling => {}
    }
    outcome.state
}

pub fn start(ctx: &Context) -> Result<Transition> {
    if ctx.require_exists()? == InstanceState::Running {
        output::info(format!("{} '{}' is already running", ctx.kind(), ctx.name));
        return Ok(Transition::Unchanged);
    }
    ctx.backend.start(&ctx.name)?;
    info!(name = %ctx.name, "start:done");
    Ok(Transition::Changed)
}

pub fn stop(ctx: &Context) -> Result<Transition> {
    if ctx.require_exists()? != InstanceState::Running {
        output::info(format!("{} '{}' is already stopped", ctx.kind(), ctx.name));
        return Ok(Transition::Unchanged);
    }
    ctx.backend.stop(&ctx.name)?;
    info!(name = %ctx.name, "stop:done");
    Ok(Transition::Changed)
}
