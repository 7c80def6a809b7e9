use anyhow::{Context, Result};

use super::Target;
use crate::config::{self, Config};
use crate::output;

#[derive(clap::Subcommand, Debug)]
pub enum ConfigCommands {
    /// Create a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
    /// Show the configuration file path
    Path,
    /// Show the effective configuration
    Show,
}

pub fn run(target: &Target, command: ConfigCommands) -> Result<()> {
    let path = match &target.config {
        Some(path) => path.clone(),
        None => config::default_path()?,
    };

    match command {
        ConfigCommands::Init { force } => {
            if path.exists() && !force {
                output::warn(format!(
                    "Configuration file already exists at {}",
                    path.display()
                ));
                return Ok(());
            }

            let mut cfg = Config::default();
            let name = output::prompt("Enter your git user name:", None)
                .context("Failed to read git user name")?;
            let email = output::prompt("Enter your git user email:", None)
                .context("Failed to read git user email")?;
            cfg.git.user_name = Some(name).filter(|s| !s.is_empty());
            cfg.git.user_email = Some(email).filter(|s| !s.is_empty());

            cfg.resolved().save(&path)?;
            output::success(format!("Configuration file created at {}", path.display()));
        }
        ConfigCommands::Path => println!("{}", path.display()),
        ConfigCommands::Show => {
            let cfg = target.load_config()?;
            println!("# Configuration file: {}\n", path.display());
            print!("{}", cfg.resolved().to_toml()?);
        }
    }
    Ok(())
}
