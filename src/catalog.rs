//! Years available upstream and discovery of the files to download.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::LazyLock,
};

use futures::{stream, StreamExt};
use log::{debug, error, warn};
use regex::Regex;

use crate::{error::RainError, reading::FileDate};

/// First and last year published by the archive.
pub const FIRST_YEAR: i32 = 1981;
pub const LAST_YEAR: i32 = 2020;

pub const DEFAULT_BASE_URL: &str =
    "https://data.chc.ucsb.edu/products/CHIRPS-2.0/global_daily/tifs/p25/";

static HREF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"href\s*=\s*"([^"]+)""#).expect("valid href pattern"));

#[derive(Debug, Clone, PartialEq, Eq)]
/// The distinct years selected for a run, all known to the archive.
pub struct YearSet(BTreeSet<i32>);

impl YearSet {
    pub fn new(years: &[i32]) -> Result<Self, RainError> {
        if years.is_empty() {
            return Err(RainError::InvalidSelection(vec![]));
        }

        let unknown: Vec<i32> = years
            .iter()
            .copied()
            .filter(|year| !(FIRST_YEAR..=LAST_YEAR).contains(year))
            .collect();
        if !unknown.is_empty() {
            return Err(RainError::InvalidSelection(unknown));
        }

        Ok(YearSet(years.iter().copied().collect()))
    }

    pub fn contains(&self, year: i32) -> bool {
        self.0.contains(&year)
    }

    /// Number of distinct years, the divisor of the monthly averages.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = i32> + '_ {
        self.0.iter().copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// How the archive folders are organised.
pub enum Cadence {
    /// One sub folder per year: `<base>/<year>/`.
    Daily,
    /// A single folder holding every year.
    Monthly,
}

impl Cadence {
    /// Reads the cadence from the `_daily` / `_monthly` suffix of the
    /// dataset folder, e.g. `.../global_daily/tifs/p25/`.
    pub fn from_base_url(base_url: &str) -> Option<Self> {
        let folder = base_url.rsplit('_').next()?.split('/').next()?;
        match folder {
            "daily" => Some(Cadence::Daily),
            "monthly" => Some(Cadence::Monthly),
            _ => None,
        }
    }

    fn index_url(&self, base_url: &str, year: i32) -> String {
        let base = base_url.trim_end_matches('/');
        match self {
            Cadence::Daily => format!("{}/{}", base, year),
            Cadence::Monthly => base.to_string(),
        }
    }
}

/// Lists the downloadable files of every selected year.
///
/// Index pages are fetched with at most `workers` requests in flight. A page
/// that cannot be fetched is logged and leaves its year with no files.
pub async fn resolve(
    base_url: &str,
    years: &YearSet,
    workers: usize,
) -> Result<BTreeMap<i32, Vec<String>>, RainError> {
    let cadence = Cadence::from_base_url(base_url).ok_or_else(|| {
        RainError::Unsupported(format!("cannot infer cadence from `{}`", base_url))
    })?;
    let client = reqwest::Client::new();

    let pages = stream::iter(years.iter())
        .map(|year| {
            let client = &client;
            let url = cadence.index_url(base_url, year);
            async move {
                let page = fetch_index(client, &url).await;
                (year, url, page)
            }
        })
        .buffer_unordered(workers.max(1))
        .collect::<Vec<_>>()
        .await;

    let mut files = BTreeMap::new();
    for (year, url, page) in pages {
        let links = match page {
            Ok(html) => links_for_year(&url, &html, year),
            Err(e) => {
                error!("Failed to list {}: {}", url, e);
                vec![]
            }
        };
        debug!("{} files listed for {}", links.len(), year);
        files.insert(year, links);
    }

    Ok(files)
}

async fn fetch_index(client: &reqwest::Client, url: &str) -> Result<String, RainError> {
    let response = client.get(url).send().await?.error_for_status()?;
    Ok(response.text().await?)
}

/// Extracts the `.tif` / `.gz` links of an index page that belong to `year`.
pub fn links_for_year(page_url: &str, html: &str, year: i32) -> Vec<String> {
    let page_url = page_url.trim_end_matches('/');

    HREF.captures_iter(html)
        .map(|caps| caps[1].to_string())
        .filter(|link| link.ends_with("tif") || link.ends_with("gz"))
        .filter(|link| {
            let name = link.rsplit('/').next().unwrap_or(link);
            match FileDate::from_file(name) {
                Ok(date) => date.year == year,
                Err(e) => {
                    warn!("Skipping link: {}", e);
                    false
                }
            }
        })
        .map(|link| format!("{}/{}", page_url, link))
        .collect()
}

// -- Tests -------------------------------------------------------------------
