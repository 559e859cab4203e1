//! Directories and pool sizes of a run.

use std::{
    fs,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Local};
use log::{debug, info};

use crate::error::RainError;

#[derive(Debug, Clone)]
pub struct RunContext {
    /// Raw rasters as downloaded.
    pub downloads_dir: PathBuf,
    /// Rasters clipped to the AOI.
    pub masked_dir: PathBuf,
    /// Monthly rasters of this run, named after its start time.
    pub run_dir: PathBuf,
    pub fetch_workers: usize,
    pub clip_workers: usize,
}

impl RunContext {
    pub fn new(
        workdir: &Path,
        started: DateTime<Local>,
        fetch_workers: usize,
        clip_workers: usize,
    ) -> Self {
        RunContext {
            downloads_dir: workdir.join(".tmp").join("downloads"),
            masked_dir: workdir.join(".tmp").join("masked"),
            run_dir: workdir.join("stacked").join(run_dir_name(started)),
            fetch_workers,
            clip_workers,
        }
    }

    /// Creates every directory of the run.
    pub fn create_dirs(&self) -> Result<(), RainError> {
        for dir in [&self.downloads_dir, &self.masked_dir, &self.run_dir] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// Deletes the clipped rasters left by an earlier run, so that only the
    /// rasters clipped by this run reach the aggregation.
    pub fn clear_masked(&self) -> Result<usize, RainError> {
        let removed = remove_files(&self.masked_dir)?;
        debug!("Removed {} stale clipped rasters", removed);
        Ok(removed)
    }

    /// Deletes the downloaded and clipped rasters, keeping the directories.
    pub fn clean_intermediates(&self) -> Result<usize, RainError> {
        let removed = remove_files(&self.downloads_dir)? + remove_files(&self.masked_dir)?;
        info!("Removed {} intermediate files", removed);
        Ok(removed)
    }
}

fn remove_files(dir: &Path) -> Result<usize, RainError> {
    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() {
            fs::remove_file(&path)?;
            removed += 1;
        }
    }
    Ok(removed)
}

// ISO timestamp with `:` replaced so it is a valid folder name everywhere.
fn run_dir_name(started: DateTime<Local>) -> String {
    started.format("%Y-%m-%dT%H_%M_%S").to_string()
}

// -- Tests -------------------------------------------------------------------
