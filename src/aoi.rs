//! Area of interest loaded from a GeoJSON file.

use std::{fs, path::Path};

use geo::{BoundingRect, Contains, MultiPolygon, Point, Polygon, Rect};
use geojson::GeoJson;
use log::{info, warn};

use crate::error::RainError;

#[derive(Debug, Clone)]
/// The union of every polygon of the AOI file. Immutable once loaded.
pub struct Aoi {
    shapes: MultiPolygon<f64>,
    bounds: Rect<f64>,
}

impl Aoi {
    pub fn new(polygons: Vec<Polygon<f64>>) -> Result<Self, RainError> {
        let shapes = MultiPolygon::new(polygons);
        let bounds = shapes.bounding_rect().ok_or(RainError::EmptyAoi)?;
        Ok(Aoi { shapes, bounds })
    }

    /// Reads a GeoJSON geometry, feature or feature collection.
    pub fn from_file(path: &Path) -> Result<Self, RainError> {
        let geojson: GeoJson = fs::read_to_string(path)?.parse()?;

        let geometries = match geojson {
            GeoJson::Geometry(geometry) => vec![geometry],
            GeoJson::Feature(feature) => feature.geometry.into_iter().collect(),
            GeoJson::FeatureCollection(collection) => collection
                .features
                .into_iter()
                .filter_map(|feature| feature.geometry)
                .collect(),
        };

        let mut polygons = Vec::new();
        for geometry in geometries {
            match geo::Geometry::<f64>::try_from(geometry)? {
                geo::Geometry::Polygon(polygon) => polygons.push(polygon),
                geo::Geometry::MultiPolygon(multi) => polygons.extend(multi.0),
                other => warn!("Ignoring non polygon AOI geometry {:?}", other),
            }
        }

        let aoi = Aoi::new(polygons)?;
        info!(
            "Loaded {} AOI polygon(s) from {:?}, bounds {:?}",
            aoi.shapes.0.len(),
            path,
            aoi.bounds
        );
        Ok(aoi)
    }

    pub fn bounds(&self) -> Rect<f64> {
        self.bounds
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        self.shapes.contains(&Point::new(x, y))
    }
}

// -- Tests -------------------------------------------------------------------
