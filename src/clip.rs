//! Clipping of downloaded rasters to the area of interest.
//!
//! Each raster is cropped to the window covering the AOI bounding box and
//! every pixel whose centre lies outside the AOI polygons is set to the
//! source nodata value (0 when the source declares none).

use std::{
    fs,
    path::{Path, PathBuf},
};

use geo::Rect;
use log::{debug, error, warn};
use ndarray::{s, Array2};
use rayon::{prelude::*, ThreadPoolBuilder};

use crate::{
    aoi::Aoi,
    catalog::YearSet,
    cli::create_progress_bar,
    error::RainError,
    raster::{Raster, RasterMeta},
    reading::{is_raster, masked_name, FileDate},
};

// Offsets this close to a pixel edge are treated as on the edge.
const PIXEL_PRECISION: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Pixel window of a raster: top left corner and size.
pub struct Window {
    pub col: usize,
    pub row: usize,
    pub width: usize,
    pub height: usize,
}

impl Window {
    /// Smallest window of `meta` covering `bounds`, limited to the raster.
    pub fn covering(meta: &RasterMeta, bounds: Rect<f64>) -> Result<Self, RainError> {
        let t = meta.transform.0;
        if !meta.transform.is_north_up() {
            return Err(RainError::Unsupported(
                "rotated rasters cannot be clipped".to_string(),
            ));
        }

        let cols = span(
            (bounds.min().x - t[0]) / t[1],
            (bounds.max().x - t[0]) / t[1],
            meta.width,
        );
        let rows = span(
            (bounds.max().y - t[3]) / t[5],
            (bounds.min().y - t[3]) / t[5],
            meta.height,
        );

        match (cols, rows) {
            (Some((col, width)), Some((row, height))) => Ok(Window {
                col,
                row,
                width,
                height,
            }),
            _ => Err(RainError::NoOverlap),
        }
    }
}

// Pixel range [floor(lo), ceil(hi)) clamped to [0, size), as (start, length).
fn span(a: f64, b: f64, size: usize) -> Option<(usize, usize)> {
    let (lo, hi) = (snap(a.min(b)).floor(), snap(a.max(b)).ceil());
    let start = lo.max(0.0);
    let end = hi.min(size as f64);
    if end <= start {
        return None;
    }
    Some((start as usize, (end - start) as usize))
}

fn snap(v: f64) -> f64 {
    if (v - v.round()).abs() < PIXEL_PRECISION {
        v.round()
    } else {
        v
    }
}

/// Crops `raster` to the AOI and masks the pixels outside its polygons.
pub fn clip_raster(raster: &Raster, aoi: &Aoi) -> Result<Raster, RainError> {
    let window = Window::covering(&raster.meta, aoi.bounds())?;
    let fill = raster.meta.nodata.unwrap_or(0.0);
    let transform = raster.meta.transform.shifted(window.col, window.row);

    let source = raster.data.slice(s![
        window.row..window.row + window.height,
        window.col..window.col + window.width
    ]);
    let data = Array2::from_shape_fn((window.height, window.width), |(row, col)| {
        let (x, y) = transform.pixel_center(col, row);
        if aoi.contains(x, y) {
            source[[row, col]]
        } else {
            fill
        }
    });

    let meta = RasterMeta {
        width: window.width,
        height: window.height,
        transform,
        ..raster.meta.clone()
    };
    Raster::new(meta, data)
}

/// Clips one raster file into `dest_dir`, returning the written path.
pub fn clip_file(source: &Path, dest_dir: &Path, aoi: &Aoi) -> Result<PathBuf, RainError> {
    let file_name = file_name(source);
    let raster = Raster::read(source)?;
    let clipped = clip_raster(&raster, aoi)?;

    let dest = dest_dir.join(masked_name(&file_name));
    clipped.write(&dest)?;
    debug!("Clipped {} to {}", file_name, clipped.meta.describe());

    Ok(dest)
}

#[derive(Debug, Default)]
/// Outcome of a clipping pass.
pub struct ClipReport {
    pub clipped: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, RainError)>,
}

/// Clips every raster of `source_dir` belonging to one of `years`, with at
/// most `workers` files in progress. A file that fails is logged and left out.
pub fn clip_all(
    source_dir: &Path,
    dest_dir: &Path,
    aoi: &Aoi,
    years: &YearSet,
    workers: usize,
) -> Result<ClipReport, RainError> {
    let candidates = select_rasters(source_dir, years)?;
    let pb = create_progress_bar(candidates.len() as u64, "Masking rasters".to_string());

    let results = on_pool(&candidates, workers, |path| {
        let result = clip_file(path, dest_dir, aoi);
        pb.inc(1);
        (path.clone(), result)
    })?;
    pb.finish_with_message("Rasters masked");

    let mut report = ClipReport::default();
    for (path, result) in results {
        match result {
            Ok(dest) => report.clipped.push(dest),
            Err(e) => {
                error!("Failed to mask {:?}: {}", path, e);
                report.failed.push((path, e));
            }
        }
    }

    Ok(report)
}

// Maps `f` over `items` on a dedicated pool of `workers` threads, keeping
// the input order.
fn on_pool<T, R, F>(items: &[T], workers: usize, f: F) -> Result<Vec<R>, RainError>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync,
{
    let pool = ThreadPoolBuilder::new().num_threads(workers.max(1)).build()?;
    debug!("Clipping on {} threads", pool.current_num_threads());

    Ok(pool.install(|| items.par_iter().map(&f).collect()))
}

// Rasters of the selected years, sorted by name.
fn select_rasters(dir: &Path, years: &YearSet) -> Result<Vec<PathBuf>, RainError> {
    let mut selected = Vec::new();

    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let name = file_name(&path);
        if !path.is_file() || !is_raster(&name) {
            continue;
        }
        match FileDate::from_file(&name) {
            Ok(date) if years.contains(date.year) => selected.push(path),
            Ok(_) => {}
            Err(e) => warn!("Skipping {:?}: {}", path, e),
        }
    }

    selected.sort();
    Ok(selected)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default()
}

// -- Tests -------------------------------------------------------------------
