use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Local;
use log::info;

use crate::{
    aggregate::stack_rasters,
    aoi::Aoi,
    catalog::{self, YearSet},
    cli::create_spinner,
    clip::clip_all,
    context::RunContext,
    download::{download_all, fetch_workers},
    error::RainError,
};

use super::default_workdir;

#[derive(Debug, Clone)]
pub struct RunArgs {
    pub aoi: PathBuf,
    pub years: Vec<i32>,
    pub base_url: String,
    pub workdir: Option<PathBuf>,
    pub clip_workers: usize,
    pub clean: bool,
}

/// Runs the whole pipeline and returns the folder holding the monthly rasters.
///
/// The year selection and the AOI are checked before any folder is created
/// or any request is sent.
pub async fn run(args: RunArgs) -> Result<String> {
    let years = YearSet::new(&args.years)?;
    let aoi = Aoi::from_file(&args.aoi)
        .with_context(|| format!("Failed to load AOI from {:?}", args.aoi))?;

    let workdir = args.workdir.clone().unwrap_or_else(default_workdir);
    let ctx = RunContext::new(&workdir, Local::now(), fetch_workers(), args.clip_workers);
    ctx.create_dirs()?;
    info!("Run context: {:?}", ctx);

    println!("1/5- Collecting raster links from {}", args.base_url);
    let bar = create_spinner("Listing archive...".to_string());
    let files = catalog::resolve(&args.base_url, &years, ctx.fetch_workers).await?;
    let total: usize = files.values().map(Vec::len).sum();
    bar.finish_with_message(format!("{} rasters listed", total));

    println!("2/5- Downloading the rasters");
    let fetched = download_all(&files, &ctx.downloads_dir, ctx.fetch_workers).await;
    println!("{} rasters downloaded", fetched.fetched.len());
    if !fetched.failed.is_empty() {
        eprintln!("{} of {} downloads failed, see the log", fetched.failed.len(), total);
    }

    let stage_ctx = ctx.clone();
    let outputs =
        tokio::task::spawn_blocking(move || mask_and_stack(&stage_ctx, &aoi, &years)).await??;

    println!("5/5- Generated {} monthly rasters in {:?}", outputs.len(), ctx.run_dir);
    if args.clean {
        let bar = create_spinner("Deleting intermediate rasters...".to_string());
        let removed = ctx.clean_intermediates()?;
        bar.finish_with_message(format!("{} intermediate rasters deleted", removed));
    }

    Ok(ctx.run_dir.to_string_lossy().to_string())
}

/// Clips the downloaded rasters and writes the monthly averages.
///
/// Clipped rasters of earlier runs are deleted first: only the rasters this
/// run manages to clip are aggregated.
fn mask_and_stack(
    ctx: &RunContext,
    aoi: &Aoi,
    years: &YearSet,
) -> Result<Vec<PathBuf>, RainError> {
    println!("3/5- Masking the rasters with the AOI polygon");
    ctx.clear_masked()?;
    let clipped = clip_all(&ctx.downloads_dir, &ctx.masked_dir, aoi, years, ctx.clip_workers)?;
    println!("{} rasters masked", clipped.clipped.len());
    if !clipped.failed.is_empty() {
        eprintln!("{} rasters could not be masked, see the log", clipped.failed.len());
    }

    println!("4/5- Calculating the rainy days monthly averages");
    stack_rasters(&ctx.masked_dir, years, &ctx.run_dir)
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod test {
    use std::{fs, path::Path};

    use chrono::TimeZone;
    use geo::{polygon, Polygon};
    use ndarray::Array2;
    use tempfile::TempDir;

    use super::*;
    use crate::{
        catalog::DEFAULT_BASE_URL,
        raster::{GeoKeys, GeoTransform, Raster, RasterMeta},
    };

    fn args(workdir: &TempDir, aoi: PathBuf, years: Vec<i32>) -> RunArgs {
        RunArgs {
            aoi,
            years,
            base_url: DEFAULT_BASE_URL.to_string(),
            workdir: Some(workdir.path().to_path_buf()),
            clip_workers: 2,
            clean: false,
        }
    }

    #[tokio::test]
    async fn should_stop_before_any_work_on_invalid_selection() {
        let workdir = TempDir::new().unwrap();

        let err = run(args(&workdir, PathBuf::from("missing.geojson"), vec![1900]))
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<RainError>(),
            Some(RainError::InvalidSelection(years)) if years == &vec![1900]
        ));
        assert_eq!(fs::read_dir(workdir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn should_stop_before_any_work_on_unreadable_aoi() {
        let workdir = TempDir::new().unwrap();
        let aoi = workdir.path().join("missing.geojson");

        let err = run(args(&workdir, aoi, vec![2010])).await.unwrap_err();

        assert!(err.to_string().starts_with("Failed to load AOI"));
        assert_eq!(fs::read_dir(workdir.path()).unwrap().count(), 0);
    }

    // Context of a run started at `hour` on a fixed day.
    fn context(workdir: &TempDir, hour: u32) -> RunContext {
        let started = Local.with_ymd_and_hms(2021, 3, 4, hour, 0, 0).unwrap();
        let ctx = RunContext::new(workdir.path(), started, 2, 2);
        ctx.create_dirs().unwrap();
        ctx
    }

    // 20x20 grid of 1 degree cells, top left at (0, 20).
    fn write_day(dir: &Path, date: &str, value: f32) {
        let meta = RasterMeta {
            width: 20,
            height: 20,
            transform: GeoTransform::new(0.0, 1.0, 20.0, -1.0),
            crs: GeoKeys::default(),
            nodata: Some(-9999.0),
        };
        Raster::new(meta, Array2::from_elem((20, 20), value))
            .unwrap()
            .write(&dir.join(format!("chirps-v2.0.{}.tif", date)))
            .unwrap();
    }

    fn square(x0: f64, y0: f64, x1: f64, y1: f64) -> Aoi {
        let square: Polygon<f64> =
            polygon![(x: x0, y: y0), (x: x1, y: y0), (x: x1, y: y1), (x: x0, y: y1), (x: x0, y: y0)];
        Aoi::new(vec![square]).unwrap()
    }

    fn january(ctx: &RunContext) -> Array2<f32> {
        Raster::read(&ctx.run_dir.join("Jan.tif")).unwrap().data
    }

    #[test]
    fn should_not_count_a_day_clipped_by_an_earlier_run() {
        let workdir = TempDir::new().unwrap();
        let years = YearSet::new(&[2010]).unwrap();
        let aoi = square(2.0, 8.0, 12.0, 18.0);
        let first = context(&workdir, 5);
        write_day(&first.downloads_dir, "2010.01.01", 5.0);
        write_day(&first.downloads_dir, "2010.01.02", 0.0);
        mask_and_stack(&first, &aoi, &years).unwrap();
        assert_eq!(january(&first).sum(), 100.0);

        // the rainy day can no longer be clipped
        fs::write(first.downloads_dir.join("chirps-v2.0.2010.01.01.tif"), b"corrupt").unwrap();
        let second = context(&workdir, 6);
        mask_and_stack(&second, &aoi, &years).unwrap();

        assert_eq!(january(&second).sum(), 0.0);
        assert!(!second
            .masked_dir
            .join("chirps-v2.0.2010.01.01.masked.tif")
            .exists());
    }

    #[test]
    fn should_only_stack_rasters_clipped_with_the_current_aoi() {
        let workdir = TempDir::new().unwrap();
        let years = YearSet::new(&[2010]).unwrap();
        let first = context(&workdir, 5);
        write_day(&first.downloads_dir, "2010.01.01", 1.0);
        write_day(&first.downloads_dir, "2010.01.02", 1.0);
        mask_and_stack(&first, &square(2.0, 8.0, 12.0, 18.0), &years).unwrap();

        fs::remove_file(first.downloads_dir.join("chirps-v2.0.2010.01.02.tif")).unwrap();
        let second = context(&workdir, 6);
        mask_and_stack(&second, &square(0.0, 18.0, 2.0, 20.0), &years).unwrap();

        let jan = january(&second);
        assert_eq!(jan.dim(), (2, 2));
        assert_eq!(jan.sum(), 4.0);
    }
}
