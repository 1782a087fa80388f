//! `bodyscan config`: print the effective configuration.

use std::path::Path;

use bodyscan::config::{config_file_path, ConfigFile};

use crate::error::CliError;

pub fn run(config: &ConfigFile, explicit: Option<&Path>, path_only: bool) -> Result<(), CliError> {
    let path = explicit.map(Path::to_path_buf).or_else(config_file_path);

    if path_only {
        match path {
            Some(path) => println!("{}", path.display()),
            None => return Err(CliError::Config("no configuration directory on this platform".into())),
        }
        return Ok(());
    }

    if let Some(path) = &path {
        let note = if path.exists() { "" } else { " (not present, showing defaults)" };
        println!("# {}{}", path.display(), note);
    }
    print!("{}", config.to_ini_string()?);
    Ok(())
}
