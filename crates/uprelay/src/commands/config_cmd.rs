//! Config subcommand handlers.

use std::io::Write;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::error::CliError;

pub fn handle(args: &ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let mut out = std::io::stdout().lock();
    match args.command {
        ConfigCommand::Path => {
            let path = global
                .config
                .clone()
                .unwrap_or_else(uprelay_config::config_path);
            writeln!(out, "{}", path.display())?;
        }
        ConfigCommand::Show => {
            let config = uprelay_config::load_config(global.config.as_deref())?;
            write!(out, "{}", config.redacted().to_toml()?)?;
        }
    }
    Ok(())
}
