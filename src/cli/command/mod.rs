pub mod run;

use std::path::PathBuf;

pub use run::{run, RunArgs};

/// Default root of the run folders: `~/raindays`, or the current folder
/// when there is no home directory.
pub fn default_workdir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join("raindays"))
        .unwrap_or_else(|| PathBuf::from("."))
}
