//! Errors raised by the pipeline stages.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum RainError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error("Shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
    #[error("The year(s) {0:?} are not part of the available data")]
    InvalidSelection(Vec<i32>),
    #[error("Malformed file name `{name}`: {reason}")]
    MalformedFileName { name: String, reason: String },
    #[error("Raster does not overlap the AOI")]
    NoOverlap,
    #[error("AOI contains no polygons")]
    EmptyAoi,
    #[error("Unsupported raster: {0}")]
    Unsupported(String),
    #[error("Raster {path:?} has shape {found}, expected {expected}")]
    ShapeMismatch {
        path: PathBuf,
        expected: String,
        found: String,
    },
    #[error("More than one raster for date {0}")]
    DuplicateDate(String),
    #[error("No clipped rasters found for the selected years")]
    NoInputs,
}

impl RainError {
    pub fn malformed(name: &str, reason: impl Into<String>) -> Self {
        RainError::MalformedFileName {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}
