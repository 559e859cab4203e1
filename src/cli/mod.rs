//! Command line interface.

pub mod command;

use std::{path::PathBuf, time::Duration};

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use crate::catalog::DEFAULT_BASE_URL;

#[derive(Parser)]
#[command(version, about, long_about = None)]
/// Contains the commands
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Download, clip and stack rasters into monthly rain-day averages
    Run {
        /// GeoJSON file with the area of interest
        #[arg(long)]
        aoi: PathBuf,
        /// Years to average over, e.g. 2010,2011
        #[arg(long, value_delimiter = ',', num_args = 1.., required = true)]
        years: Vec<i32>,
        /// Archive folder listing the rasters
        #[arg(long, default_value = DEFAULT_BASE_URL)]
        base_url: String,
        /// Root of the download, masked and stacked folders [default: ~/raindays]
        #[arg(long)]
        workdir: Option<PathBuf>,
        /// Rasters clipped in parallel
        #[arg(long, default_value_t = 10)]
        clip_workers: usize,
        /// Delete downloaded and clipped rasters once the run is done
        #[arg(long)]
        clean: bool,
    },
}

/// Creates a spinner.
pub fn create_spinner(message: String) -> ProgressBar {
    let bar = ProgressBar::new_spinner().with_message(message);
    bar.enable_steady_tick(Duration::from_millis(100));

    bar
}

/// Creates a progress bar.
pub fn create_progress_bar(size: u64, message: String) -> ProgressBar {
    ProgressBar::new(size).with_message(message).with_style(
        ProgressStyle::with_template("[{eta_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("##-"),
    )
}

// -- Tests -------------------------------------------------------------------
