use anyhow::Result;

use super::Target;
use crate::output;
use crate::workflow::{self, types::DeleteOutcome};

pub fn run(target: &Target, force: bool) -> Result<()> {
    let ctx = target.context()?;
    if workflow::delete(&ctx, force, output::confirm)? == DeleteOutcome::Deleted {
        output::success(format!("{} '{}' deleted", ctx.kind(), ctx.name));
    }
    Ok(())
}
