mod cli;
mod display;
mod error;

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use clap::Parser;
use cli::{Cli, RunCommand};
use itertools::Itertools;
use log::debug;
use transrisk::config::Config;

const DEFAULT_LOGGING_LEVEL: &str = "warn";
const LOCAL_CONFIG_FILE: &str = "transrisk.toml";

fn main() -> Result<()> {
    // Set RUST_LOG to `DEFAULT_LOGGING_LEVEL` if not set
    let _ =
        std::env::var("RUST_LOG").map_err(|_| std::env::set_var("RUST_LOG", DEFAULT_LOGGING_LEVEL));
    pretty_env_logger::init_timed();
    let args = Cli::parse();
    debug!("args: {args:?}");

    if let Some(command) = args.command {
        let config = Config::read(&find_config(args.config.as_deref())?)?;
        command.run(config)?;
    }
    Ok(())
}

/// Places searched for a config file when `--config` is not given.
fn config_candidates() -> Vec<PathBuf> {
    let mut candidates = vec![PathBuf::from(LOCAL_CONFIG_FILE)];
    // macOS: ~/Library/Application Support/transrisk/config.toml
    if let Some(dir) = dirs::config_dir() {
        candidates.push(dir.join("transrisk").join("config.toml"));
    }
    candidates
}

fn find_config(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    let candidates = config_candidates();
    match candidates.iter().find(|path| path.exists()) {
        Some(path) => Ok(path.clone()),
        None => bail!(
            "No config file found. Pass `--config` or create one of: {}",
            candidates.iter().map(|path| path.display()).join(", ")
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_config_wins() {
        let path = find_config(Some(Path::new("elsewhere/transrisk.toml"))).unwrap();
        assert_eq!(path, PathBuf::from("elsewhere/transrisk.toml"));
    }

    #[test]
    fn local_config_is_searched_first() {
        assert_eq!(config_candidates()[0], PathBuf::from(LOCAL_CONFIG_FILE));
    }
}
