use anyhow::Result;

use super::Target;
use crate::backend::InstanceKind;
use crate::mount::MountBinding;
use crate::output;
use crate::workflow::{self, Context, resolve_host_path};

pub fn run(target: &Target) -> Result<()> {
    let mut ctx = target.context()?;
    // Containers cannot gain binds later, so the current directory is bound now
    if ctx.kind() == InstanceKind::Container {
        let cwd = resolve_host_path(None)?;
        ctx.lifecycle.binds.push(MountBinding::derive(&ctx.name, &cwd));
    }

    workflow::launch(&ctx)?;
    print_connection_hints(&ctx)
}

fn print_connection_hints(ctx: &Context) -> Result<()> {
    let flag = ctx.kind().cli_flag();
    println!();
    output::success(format!("{} '{}' is ready!", ctx.kind(), ctx.name));

    if ctx.kind() == InstanceKind::Vm {
        match ctx.backend.address(&ctx.name) {
            Ok(ip) => {
                output::success(format!("IP Address: {}", ip));
                println!();
                println!("Connect with:");
                println!("  ssh -A ubuntu@{}", ip);
            }
            Err(e) if e.is_not_found() => output::warn(e.to_string()),
            Err(e) => return Err(e.into()),
        }
    }

    println!();
    println!("Or use:");
    println!("  agentvm{} ssh      # Interactive shell", flag);
    println!("  agentvm{} claude   # Run Claude Code", flag);
    println!("  agentvm{} gemini   # Run Gemini CLI", flag);
    Ok(())
}
