//! Monthly rain-day averages from the clipped daily rasters.

pub mod series;

use std::{
    fs,
    path::{Path, PathBuf},
};

use chrono::Month;
use log::{debug, error, info};

use crate::{
    catalog::YearSet,
    cli::create_progress_bar,
    error::RainError,
    raster::{Raster, RasterMeta},
    reading::{is_raster, FileDate},
};

use series::{MonthlyAggregate, PixelTimeSeries};

/// Reads the clipped rasters of `years` into a pixel time series.
///
/// Every raster must cover the same grid as the first one read; the shared
/// metadata is returned alongside the series. Unreadable files are logged and
/// contribute nothing.
pub fn build_series(
    masked_dir: &Path,
    years: &YearSet,
) -> Result<(RasterMeta, PixelTimeSeries), RainError> {
    let inputs = select_inputs(masked_dir, years)?;
    let pb = create_progress_bar(inputs.len() as u64, "Reading clipped rasters".to_string());
    let mut stack: Option<(RasterMeta, PixelTimeSeries)> = None;

    for (path, date) in inputs {
        pb.inc(1);
        let raster = match Raster::read(&path) {
            Ok(raster) => raster,
            Err(e) => {
                error!("Failed to read {:?}: {}", path, e);
                continue;
            }
        };

        let (meta, series) = stack.get_or_insert_with(|| {
            let pixels = raster.meta.width * raster.meta.height;
            (raster.meta.clone(), PixelTimeSeries::new(pixels))
        });
        if !meta.same_grid(&raster.meta) {
            return Err(RainError::ShapeMismatch {
                path,
                expected: meta.describe(),
                found: raster.meta.describe(),
            });
        }
        series.insert(date, raster.data.view())?;
    }
    pb.finish_with_message("Clipped rasters read");

    let (meta, series) = stack.ok_or(RainError::NoInputs)?;
    info!(
        "Series of {} dates over {} pixels (EPSG {:?}), {} non zero values",
        series.len(),
        meta.width * meta.height,
        meta.crs.epsg(),
        series.stored_values()
    );
    Ok((meta, series))
}

/// Writes one raster per month into `out_dir`, returning their paths.
pub fn write_monthly(
    aggregates: &[MonthlyAggregate],
    meta: &RasterMeta,
    out_dir: &Path,
) -> Result<Vec<PathBuf>, RainError> {
    let mut written = Vec::with_capacity(aggregates.len());

    for aggregate in aggregates {
        let path = out_dir.join(aggregate.file_name());
        Raster::new(meta.clone(), aggregate.grid.clone())?.write(&path)?;
        written.push(path);
    }

    Ok(written)
}

/// Computes and writes the average number of rain days per month over
/// `years` for the rasters of `masked_dir`.
pub fn stack_rasters(
    masked_dir: &Path,
    years: &YearSet,
    out_dir: &Path,
) -> Result<Vec<PathBuf>, RainError> {
    let (meta, series) = build_series(masked_dir, years)?;
    let counts = series.monthly_rain_days();
    for month in (1..=12u8).filter_map(|m| Month::try_from(m).ok()) {
        let wettest = counts.month(month).iter().max().copied().unwrap_or(0);
        debug!("{}: at most {} rain days at one pixel", month.name(), wettest);
    }
    let aggregates = counts.average(years.len(), (meta.height, meta.width))?;

    write_monthly(&aggregates, &meta, out_dir)
}

// Clipped rasters of the selected years, sorted by name.
fn select_inputs(dir: &Path, years: &YearSet) -> Result<Vec<(PathBuf, FileDate)>, RainError> {
    let mut inputs = Vec::new();

    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        if !path.is_file() || !is_raster(&name) {
            continue;
        }

        let date = FileDate::from_file(&name)?;
        if years.contains(date.year) {
            inputs.push((path, date));
        }
    }

    inputs.sort();
    Ok(inputs)
}

// -- Tests -------------------------------------------------------------------
