//! Downloads the archive rasters with a bounded number of concurrent requests.

use std::{
    collections::BTreeMap,
    fs::{self, File},
    io::{Read, Write},
    path::{Path, PathBuf},
};

use flate2::read::GzDecoder;
use futures::{stream, StreamExt};
use log::{debug, error, warn};

use crate::{cli::create_progress_bar, error::RainError};

const GZIP_SUFFIX: &str = ".gz";

/// Number of concurrent downloads: all cores but two, and never less than two.
pub fn fetch_workers() -> usize {
    num_cpus::get().saturating_sub(2).max(2)
}

#[derive(Debug, Default)]
/// Outcome of a download pass.
pub struct FetchReport {
    pub fetched: Vec<PathBuf>,
    pub failed: Vec<(String, RainError)>,
}

/// Downloads every url of `files` into `dir`, at most `workers` at a time.
///
/// A failed download is logged and recorded in the report; the others carry on.
/// Whatever an earlier run saved for a failed url is removed, so that date is
/// absent from the later stages.
pub async fn download_all(
    files: &BTreeMap<i32, Vec<String>>,
    dir: &Path,
    workers: usize,
) -> FetchReport {
    let urls: Vec<&String> = files.values().flatten().collect();
    let pb = create_progress_bar(urls.len() as u64, "Downloading rasters".to_string());
    let client = reqwest::Client::new();

    let results = stream::iter(urls)
        .map(|url| {
            let (client, pb) = (&client, &pb);
            async move {
                let result = download_file(client, url, dir).await;
                pb.inc(1);
                (url.clone(), result)
            }
        })
        .buffer_unordered(workers.max(1))
        .collect::<Vec<_>>()
        .await;
    pb.finish_with_message("Rasters downloaded");

    let mut report = FetchReport::default();
    for (url, result) in results {
        match result {
            Ok(path) => report.fetched.push(path),
            Err(e) => {
                error!("Failed to download {}: {}", url, e);
                discard(&url, dir);
                report.failed.push((url, e));
            }
        }
    }
    report.fetched.sort();

    report
}

/// Downloads `url` and saves it into `dir`, gunzipping `.gz` payloads.
pub async fn download_file(
    client: &reqwest::Client,
    url: &str,
    dir: &Path,
) -> Result<PathBuf, RainError> {
    let response = client.get(url).send().await?.error_for_status()?;
    let content = response.bytes().await?;

    save(url, &content, dir)
}

/// Writes the downloaded `content` of `url` into `dir`.
pub fn save(url: &str, content: &[u8], dir: &Path) -> Result<PathBuf, RainError> {
    let file_path = target_path(url, dir)?;
    let bytes = if url.ends_with(GZIP_SUFFIX) {
        let mut decompressed = Vec::new();
        GzDecoder::new(content).read_to_end(&mut decompressed)?;
        decompressed
    } else {
        content.to_vec()
    };

    let mut file = File::create(&file_path)?;
    file.write_all(&bytes)?;
    file.sync_all()?;
    debug!("Saved {} bytes to {:?}", bytes.len(), file_path);

    Ok(file_path)
}

// Where the content of `url` is saved: its file name without `.gz`.
fn target_path(url: &str, dir: &Path) -> Result<PathBuf, RainError> {
    let name = url.rsplit('/').next().unwrap_or_default();
    if name.is_empty() {
        return Err(RainError::malformed(url, "url has no file name"));
    }

    Ok(dir.join(name.strip_suffix(GZIP_SUFFIX).unwrap_or(name)))
}

fn discard(url: &str, dir: &Path) {
    let Ok(path) = target_path(url, dir) else {
        return;
    };
    if path.is_file() {
        match fs::remove_file(&path) {
            Ok(()) => debug!("Removed stale {:?}", path),
            Err(e) => warn!("Failed to remove stale {:?}: {}", path, e),
        }
    }
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        fs,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        time::Duration,
    };

    use flate2::{write::GzEncoder, Compression};
    use tempfile::TempDir;
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
    };

    use super::*;

    fn gzip(bytes: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(bytes).unwrap();
        encoder.finish().unwrap()
    }

    #[derive(Default)]
    struct InFlight {
        now: AtomicUsize,
        peak: AtomicUsize,
    }

    // Minimal HTTP/1.1 responder: known paths get 200 with their body, others 404.
    // Each request is held for a few milliseconds and the highest number of
    // requests held at once is recorded.
    async fn serve(routes: HashMap<String, Vec<u8>>) -> (String, Arc<InFlight>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let routes = Arc::new(routes);
        let in_flight = Arc::new(InFlight::default());
        let counter = Arc::clone(&in_flight);

        tokio::spawn(async move {
            loop {
                let (mut socket, _) = listener.accept().await.unwrap();
                let routes = Arc::clone(&routes);
                let counter = Arc::clone(&counter);
                tokio::spawn(async move {
                    let mut request = Vec::new();
                    let mut buf = [0u8; 1024];
                    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                        let n = socket.read(&mut buf).await.unwrap();
                        if n == 0 {
                            return;
                        }
                        request.extend_from_slice(&buf[..n]);
                    }
                    let request = String::from_utf8_lossy(&request);
                    let path = request.split_whitespace().nth(1).unwrap_or("/");

                    let now = counter.now.fetch_add(1, Ordering::SeqCst) + 1;
                    counter.peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    // released before answering, so the client cannot start
                    // its next request while this one still counts
                    counter.now.fetch_sub(1, Ordering::SeqCst);

                    let (status, body) = match routes.get(path) {
                        Some(body) => ("200 OK", body.clone()),
                        None => ("404 Not Found", Vec::new()),
                    };
                    let head = format!(
                        "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                        status,
                        body.len()
                    );
                    socket.write_all(head.as_bytes()).await.unwrap();
                    socket.write_all(&body).await.unwrap();
                    socket.shutdown().await.ok();
                });
            }
        });

        (format!("http://{}", address), in_flight)
    }

    #[test]
    fn should_reserve_two_cores_but_keep_two_workers() {
        let workers = fetch_workers();

        assert!(workers >= 2);
        assert!(workers == 2 || workers == num_cpus::get() - 2);
    }

    #[test]
    fn should_save_plain_and_gzipped_content() {
        let dir = TempDir::new().unwrap();

        let plain = save("https://host/p25/2010/chirps-v2.0.2010.01.01.tif", b"raw", dir.path()).unwrap();
        let gz = save(
            "https://host/p25/2010/chirps-v2.0.2010.01.02.tif.gz",
            &gzip(b"unpacked"),
            dir.path(),
        )
        .unwrap();

        assert_eq!(plain, dir.path().join("chirps-v2.0.2010.01.01.tif"));
        assert_eq!(fs::read(&plain).unwrap(), b"raw");
        assert_eq!(gz, dir.path().join("chirps-v2.0.2010.01.02.tif"));
        assert_eq!(fs::read(&gz).unwrap(), b"unpacked");
    }

    #[test]
    fn should_reject_urls_without_file_name() {
        let dir = TempDir::new().unwrap();

        let err = save("https://host/p25/", b"", dir.path()).unwrap_err();

        assert!(matches!(err, RainError::MalformedFileName { .. }));
    }

    #[tokio::test]
    async fn should_keep_going_when_downloads_fail() {
        let dir = TempDir::new().unwrap();
        let routes = HashMap::from([
            ("/2010/a.2010.01.01.tif.gz".to_string(), gzip(b"day one")),
            ("/2010/a.2010.01.02.tif".to_string(), b"day two".to_vec()),
            ("/2010/a.2010.01.04.tif.gz".to_string(), b"not gzip".to_vec()),
        ]);
        let (base, _) = serve(routes).await;
        let urls: Vec<String> = ["a.2010.01.01.tif.gz", "a.2010.01.02.tif", "a.2010.01.03.tif.gz", "a.2010.01.04.tif.gz"]
            .iter()
            .map(|name| format!("{}/2010/{}", base, name))
            .collect();
        let files = BTreeMap::from([(2010, urls)]);
        // left by an earlier run
        fs::write(dir.path().join("a.2010.01.03.tif"), b"stale").unwrap();

        let report = download_all(&files, dir.path(), 2).await;

        assert_eq!(
            report.fetched,
            vec![
                dir.path().join("a.2010.01.01.tif"),
                dir.path().join("a.2010.01.02.tif"),
            ]
        );
        assert_eq!(fs::read(dir.path().join("a.2010.01.01.tif")).unwrap(), b"day one");
        let mut failed: Vec<&str> = report.failed.iter().map(|(url, _)| url.as_str()).collect();
        failed.sort();
        assert_eq!(failed.len(), 2);
        assert!(failed[0].ends_with("a.2010.01.03.tif.gz"));
        assert!(failed[1].ends_with("a.2010.01.04.tif.gz"));
        assert!(!dir.path().join("a.2010.01.03.tif").exists());
        assert!(!dir.path().join("a.2010.01.04.tif").exists());
    }

    #[tokio::test]
    async fn should_never_exceed_worker_count() {
        let dir = TempDir::new().unwrap();
        let names: Vec<String> = (1..=12).map(|day| format!("a.2010.01.{:02}.tif", day)).collect();
        let routes = names
            .iter()
            .map(|name| (format!("/2010/{}", name), b"day".to_vec()))
            .collect();
        let (base, in_flight) = serve(routes).await;
        let urls: Vec<String> = names.iter().map(|name| format!("{}/2010/{}", base, name)).collect();
        let files = BTreeMap::from([(2010, urls)]);

        let report = download_all(&files, dir.path(), 3).await;

        assert_eq!(report.fetched.len(), 12);
        assert!(report.failed.is_empty());
        let peak = in_flight.peak.load(Ordering::SeqCst);
        assert!((1..=3).contains(&peak), "peak of {} requests", peak);
    }
}
