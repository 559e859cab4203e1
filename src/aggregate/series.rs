//! Per pixel time series of daily rasters and their monthly rain-day counts.

use std::collections::BTreeMap;

use chrono::Month;
use ndarray::{Array1, Array2, ArrayView2};

use crate::{error::RainError, reading::FileDate};

/// 1 when rain fell, 0 otherwise. Nodata sentinels are negative and NaN
/// compares false, so neither counts as rain.
pub fn rained(value: f32) -> u32 {
    u32::from(value > 0.0)
}

#[derive(Debug, Clone, Default, PartialEq)]
/// Non zero cells of one raster, as (scan order index, value) pairs.
struct SparseColumn {
    rows: Vec<u32>,
    values: Vec<f32>,
}

impl SparseColumn {
    fn from_grid(grid: ArrayView2<f32>) -> Self {
        let mut column = SparseColumn::default();
        for (index, &value) in grid.iter().enumerate() {
            if value != 0.0 {
                column.rows.push(index as u32);
                column.values.push(value);
            }
        }
        column
    }

    fn iter(&self) -> impl Iterator<Item = (usize, f32)> + '_ {
        self.rows
            .iter()
            .zip(&self.values)
            .map(|(&row, &value)| (row as usize, value))
    }
}

#[derive(Debug, Clone)]
/// Pixels by dates matrix. Rows are pixels in scan order, columns are dates.
pub struct PixelTimeSeries {
    pixels: usize,
    columns: BTreeMap<FileDate, SparseColumn>,
}

impl PixelTimeSeries {
    pub fn new(pixels: usize) -> Self {
        PixelTimeSeries {
            pixels,
            columns: BTreeMap::new(),
        }
    }

    /// Adds the grid of `date` as a new column.
    pub fn insert(&mut self, date: FileDate, grid: ArrayView2<f32>) -> Result<(), RainError> {
        if grid.len() != self.pixels {
            return Err(RainError::Unsupported(format!(
                "grid of {} has {} pixels, series holds {}",
                date,
                grid.len(),
                self.pixels
            )));
        }
        if self.columns.contains_key(&date) {
            return Err(RainError::DuplicateDate(date.to_string()));
        }

        self.columns.insert(date, SparseColumn::from_grid(grid));
        Ok(())
    }

    /// Number of dates.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Number of non zero cells held across all dates.
    pub fn stored_values(&self) -> usize {
        self.columns.values().map(|column| column.rows.len()).sum()
    }

    /// Counts, per calendar month and pixel, the dates on which rain fell.
    /// Years are pooled: every January of every year adds to January.
    pub fn monthly_rain_days(&self) -> MonthlyCounts {
        let mut counts = MonthlyCounts::zeros(self.pixels);

        for (date, column) in &self.columns {
            let month = &mut counts.0[date.month as usize - 1];
            for (row, value) in column.iter() {
                month[row] += rained(value);
            }
        }

        counts
    }
}

#[derive(Debug, Clone, PartialEq)]
/// Rain-day sums for January through December, one value per pixel.
pub struct MonthlyCounts(Vec<Array1<u32>>);

impl MonthlyCounts {
    fn zeros(pixels: usize) -> Self {
        MonthlyCounts((0..12).map(|_| Array1::zeros(pixels)).collect())
    }

    pub fn month(&self, month: Month) -> &Array1<u32> {
        &self.0[month.number_from_month() as usize - 1]
    }

    /// Averages the sums over `years` and reshapes them to (rows, cols).
    ///
    /// Values are rounded half to even, so 0.5 becomes 0 and 1.5 becomes 2.
    pub fn average(
        &self,
        years: usize,
        shape: (usize, usize),
    ) -> Result<Vec<MonthlyAggregate>, RainError> {
        let mut month = Month::January;
        let mut aggregates = Vec::with_capacity(12);

        for sums in &self.0 {
            let averages: Vec<f32> = sums
                .iter()
                .map(|&sum| (sum as f64 / years as f64).round_ties_even() as f32)
                .collect();
            aggregates.push(MonthlyAggregate {
                month,
                grid: Array2::from_shape_vec(shape, averages)?,
            });
            month = month.succ();
        }

        Ok(aggregates)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonthlyAggregate {
    pub month: Month,
    pub grid: Array2<f32>,
}

impl MonthlyAggregate {
    /// `Jan.tif` through `Dec.tif`.
    pub fn file_name(&self) -> String {
        format!("{}.tif", &self.month.name()[..3])
    }
}

// -- Tests -------------------------------------------------------------------
