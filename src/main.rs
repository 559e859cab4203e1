mod aggregate;
mod aoi;
mod catalog;
mod cli;
mod clip;
mod context;
mod download;
mod error;
mod raster;
mod reading;

use anyhow::{Error, Result};
use clap::Parser;
use cli::{command, Cli, Commands};
use env_logger::{Builder, Env};

#[tokio::main]
async fn main() -> Result<(), Error> {
    Builder::from_env(Env::default().default_filter_or("warn"))
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            aoi,
            years,
            base_url,
            workdir,
            clip_workers,
            clean,
        } => {
            let args = command::RunArgs {
                aoi,
                years,
                base_url,
                workdir,
                clip_workers,
                clean,
            };
            let dir = command::run(args).await?;
            println!("Your stacked files are available in `{}`", dir);
        }
    }

    Ok(())
}
