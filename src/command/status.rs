use anyhow::Result;

use super::Target;
use crate::output;
use crate::workflow::{self, Applied, types::Status};

pub fn status(target: &Target) -> Result<()> {
    let ctx = target.context()?;
    match workflow::status(&ctx)? {
        Status::Absent => output::info(format!(
            "{} '{}' does not exist. Run 'agentvm{} launch' to create it",
            ctx.kind(),
            ctx.name,
            ctx.kind().cli_flag()
        )),
        Status::Present { details, .. } => println!("{}", details.trim_end()),
    }
    Ok(())
}

pub fn logs(target: &Target, lines: usize, follow: bool) -> Result<()> {
    let ctx = target.context()?;
    if follow {
        workflow::follow_logs(&ctx)?;
    } else {
        print!("{}", workflow::logs(&ctx, lines)?);
    }
    Ok(())
}

pub fn configure_git(target: &Target) -> Result<()> {
    let ctx = target.context()?;
    let report = workflow::configure_git(&ctx)?;
    for (step, applied) in &report {
        if let Applied::Skipped(reason) = applied {
            output::info(format!("{} skipped: {}", step.label(), reason));
        }
    }
    if report.iter().any(|(_, applied)| *applied == Applied::Done) {
        output::success("Git configuration applied");
    } else {
        output::warn("Nothing to configure; set [git] user_name and user_email in the config file");
    }
    Ok(())
}
