//! Load a project `.env` file and apply it to the process environment with
//! priority: **existing env > .env**.
//!
//! The server binary calls [`load_and_apply`] at startup before reading its
//! typed configuration from the environment.

mod dotenv;

use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("read .env: {0}")]
    DotenvRead(std::io::Error),
}

/// Loads `.env` from `override_dir` (or the current directory) and sets each
/// key that is **not** already present in the process environment.
///
/// A missing `.env` file is not an error.
pub fn load_and_apply(override_dir: Option<&Path>) -> Result<(), LoadError> {
    let map = dotenv::load_env_map(override_dir).map_err(LoadError::DotenvRead)?;
    for (key, value) in map {
        if std::env::var(&key).is_err() {
            std::env::set_var(&key, value);
        }
    }
    Ok(())
}
