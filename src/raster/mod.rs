//! Single band georeferenced rasters.

pub mod geotiff;

use std::path::Path;

use ndarray::Array2;

use crate::error::RainError;

#[derive(Debug, Clone, Copy, PartialEq)]
/// Affine pixel to world transform in GDAL order `[x0, dx, rx, y0, ry, dy]`.
pub struct GeoTransform(pub [f64; 6]);

impl GeoTransform {
    pub fn new(x0: f64, dx: f64, y0: f64, dy: f64) -> Self {
        GeoTransform([x0, dx, 0.0, y0, 0.0, dy])
    }

    pub fn is_north_up(&self) -> bool {
        self.0[2] == 0.0 && self.0[4] == 0.0
    }

    /// World coordinates of the centre of pixel (`col`, `row`).
    pub fn pixel_center(&self, col: usize, row: usize) -> (f64, f64) {
        let (col, row) = (col as f64 + 0.5, row as f64 + 0.5);
        let t = &self.0;
        (
            t[0] + col * t[1] + row * t[2],
            t[3] + col * t[4] + row * t[5],
        )
    }

    /// Transform of the window whose top left pixel is (`col`, `row`).
    pub fn shifted(&self, col: usize, row: usize) -> Self {
        let (col, row) = (col as f64, row as f64);
        let t = &self.0;
        let mut out = *t;
        out[0] = t[0] + col * t[1] + row * t[2];
        out[3] = t[3] + col * t[4] + row * t[5];
        GeoTransform(out)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
/// GeoTIFF key directory and its parameter tags, carried through unchanged.
pub struct GeoKeys {
    pub directory: Vec<u16>,
    pub doubles: Vec<f64>,
    pub ascii: Option<String>,
}

impl GeoKeys {
    const GEOGRAPHIC_TYPE: u16 = 2048;
    const PROJECTED_CS_TYPE: u16 = 3072;

    /// EPSG code of the coordinate reference system, when declared inline.
    pub fn epsg(&self) -> Option<u16> {
        // header is 4 shorts, then one (key, location, count, value) entry per key
        self.directory
            .get(4..)?
            .chunks_exact(4)
            .find(|entry| {
                entry[1] == 0
                    && (entry[0] == Self::GEOGRAPHIC_TYPE || entry[0] == Self::PROJECTED_CS_TYPE)
            })
            .map(|entry| entry[3])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RasterMeta {
    pub width: usize,
    pub height: usize,
    pub transform: GeoTransform,
    pub crs: GeoKeys,
    pub nodata: Option<f32>,
}

impl RasterMeta {
    /// True when both rasters cover the same grid cells.
    pub fn same_grid(&self, other: &RasterMeta) -> bool {
        self.width == other.width
            && self.height == other.height
            && self.transform == other.transform
    }

    pub fn describe(&self) -> String {
        format!("{}x{} at {:?}", self.width, self.height, self.transform.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
/// A raster band as a (rows, cols) array plus its metadata.
pub struct Raster {
    pub meta: RasterMeta,
    pub data: Array2<f32>,
}

impl Raster {
    pub fn new(meta: RasterMeta, data: Array2<f32>) -> Result<Self, RainError> {
        if data.dim() != (meta.height, meta.width) {
            return Err(RainError::Unsupported(format!(
                "data is {:?}, metadata declares {}x{}",
                data.dim(),
                meta.width,
                meta.height
            )));
        }
        Ok(Raster { meta, data })
    }

    pub fn read(path: &Path) -> Result<Self, RainError> {
        geotiff::read(path)
    }

    pub fn write(&self, path: &Path) -> Result<(), RainError> {
        geotiff::write(self, path)
    }
}

// -- Tests -------------------------------------------------------------------
