//! Configuration CLI commands.
//!
//! Provides `config check`, `config show` and `config path`.

use std::path::{Path, PathBuf};

use adaptload::config::default_config_path;
use adaptload::ConfigFile;
use clap::Subcommand;

use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Validate the configuration file
    Check,

    /// Print the effective configuration, defaults included, as INI
    Show,

    /// Show the configuration file path
    Path,
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands, path: Option<&Path>) -> Result<(), CliError> {
    match command {
        ConfigCommands::Check => run_check(path),
        ConfigCommands::Show => run_show(path),
        ConfigCommands::Path => run_path(path),
    }
}

fn resolve_path(path: Option<&Path>) -> Option<PathBuf> {
    path.map(Path::to_path_buf).or_else(default_config_path)
}

/// Validate the configuration file.
fn run_check(path: Option<&Path>) -> Result<(), CliError> {
    let Some(path) = resolve_path(path) else {
        println!("No configuration directory on this platform; defaults in use.");
        return Ok(());
    };
    if !path.exists() {
        println!("{} does not exist; defaults in use.", path.display());
        return Ok(());
    }

    let config = ConfigFile::load_from(&path)?;
    let defaults = ConfigFile::default();
    println!("{}: OK", path.display());
    if config == defaults {
        println!("  (all settings at their defaults)");
    } else {
        let overrides = changed_keys(&config, &defaults);
        println!("  {} setting(s) differ from the defaults:", overrides.len());
        for key in overrides {
            println!("    {}", key);
        }
    }
    Ok(())
}

/// Print the effective configuration.
fn run_show(path: Option<&Path>) -> Result<(), CliError> {
    let config = super::common::load_config(path)?;
    let mut stdout = std::io::stdout().lock();
    config.to_ini().write_to(&mut stdout)?;
    Ok(())
}

/// Show the configuration file path.
fn run_path(path: Option<&Path>) -> Result<(), CliError> {
    match resolve_path(path) {
        Some(path) => println!("{}", path.display()),
        None => println!("(no configuration directory on this platform)"),
    }
    Ok(())
}

/// `section.key` of every rendered setting whose value differs.
fn changed_keys(config: &ConfigFile, defaults: &ConfigFile) -> Vec<String> {
    let current = config.to_ini();
    let baseline = defaults.to_ini();

    let mut changed = Vec::new();
    for (section, props) in current.iter() {
        for (key, value) in props.iter() {
            let default = baseline.get_from(section, key);
            if default != Some(value) {
                match section {
                    Some(section) => changed.push(format!("{}.{}", section, key)),
                    None => changed.push(key.to_string()),
                }
            }
        }
    }
    changed
}
