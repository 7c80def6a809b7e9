use anyhow::Result;

use super::Target;
use crate::output;
use crate::workflow::{self, types::Transition};

pub fn start(target: &Target) -> Result<()> {
    let ctx = target.context()?;
    if workflow::start(&ctx)? == Transition::Changed {
        output::success(format!("{} '{}' started", ctx.kind(), ctx.name));
    }
    Ok(())
}

pub fn stop(target: &Target) -> Result<()> {
    let ctx = target.context()?;
    if workflow::stop(&ctx)? == Transition::Changed {
        output::success(format!("{} '{}' stopped", ctx.kind(), ctx.name));
    }
    Ok(())
}
