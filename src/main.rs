mod assets;
mod backend;
mod cli;
mod cmd;
mod command;
mod config;
mod error;
mod logger;
mod mount;
mod output;
mod readiness;
mod remote;
mod spinner;
mod workflow;

use anyhow::Result;
use tracing::{error, info};

fn main() -> Result<()> {
    logger::init()?;
    info!(args = ?std::env::args().collect::<Vec<_>>(), "agentvm start");

    match cli::run() {
        Ok(result) => {
            info!("agentvm finished successfully");
            Ok(result)
        }
        Err(err) => {
            error!(error = ?err, "agentvm failed");
            Err(err)
        }
    }
}
