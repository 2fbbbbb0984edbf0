//! Init command: scaffold the project config and create the store.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::Config;
use crate::error::Result;
use crate::store::Store;

#[derive(Debug, Clone, Serialize)]
pub struct InitReport {
    pub config_file: PathBuf,
    pub db_file: PathBuf,
    pub created_config: bool,
}

pub fn cmd_init(project_root: &Path, force: bool) -> Result<InitReport> {
    let config = Config::load(project_root)?;

    let created_config = if config.paths.config_file.exists() && !force {
        false
    } else {
        config.save()?;
        true
    };

    // Opening the store creates the file and applies migrations.
    Store::open(&config.paths.db_file)?;

    Ok(InitReport {
        config_file: config.paths.config_file.clone(),
        db_file: config.paths.db_file.clone(),
        created_config,
    })
}
