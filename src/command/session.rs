use anyhow::Result;

use super::Target;
use crate::workflow::{self, resolve_host_path};

/// `ssh`, `claude` and `gemini`: an interactive program started in the guest
/// mount of the current directory. An empty `program` opens a login shell.
pub fn interactive(target: &Target, program: Vec<String>) -> Result<()> {
    let cwd = resolve_host_path(None)?;
    let ctx = target.context()?;
    workflow::interactive_session(&ctx, program, &cwd)?;
    Ok(())
}

/// Prefix `args` with the agent binary.
pub fn agent(target: &Target, binary: &str, args: Vec<String>) -> Result<()> {
    let mut program = Vec::with_capacity(args.len() + 1);
    program.push(binary.to_string());
    program.extend(args);
    interactive(target, program)
}

pub fn exec(target: &Target, command: &[String]) -> Result<()> {
    let ctx = target.context()?;
    workflow::exec(&ctx, command)?;
    Ok(())
}
