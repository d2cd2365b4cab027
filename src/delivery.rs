//! Request-to-file pipeline behind `GET /video`.
//!
//! A delivery resolves the URL, ranks the formats, streams the chosen one
//! into a request-unique file inside the output directory and hands that
//! file back as a [`DownloadArtifact`]. The HTTP layer serves the artifact
//! and then gives it back for bookkeeping, which logs the size and deletes it.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use tempfile::TempPath;
use tokio::{
    fs::{File, OpenOptions},
    io::{AsyncReadExt, AsyncWriteExt},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::catalogue::FormatCatalogue;
use crate::error::{DeliveryError, ExtractionError};
use crate::extractor::Extractor;
use crate::media::{Container, sanitize_title, select_formats};

/// Size of the single buffer used while copying the media stream to disk.
const COPY_CHUNK: usize = 64 * 1024;
/// Stem used when a title sanitizes to nothing but spaces.
const FALLBACK_STEM: &str = "video";
/// Cap for the title part of on-disk names; file systems reject long names.
const MAX_DISK_STEM_CHARS: usize = 120;
const UNIQUE_SUFFIX_LEN: usize = 8;

pub struct DeliveryService {
    output_dir: PathBuf,
    extractor: Arc<dyn Extractor>,
    catalogue: Option<FormatCatalogue>,
}

impl DeliveryService {
    pub fn new(output_dir: impl Into<PathBuf>, extractor: Arc<dyn Extractor>) -> Self {
        Self {
            output_dir: output_dir.into(),
            extractor,
            catalogue: None,
        }
    }

    pub fn with_catalogue(mut self, catalogue: Option<FormatCatalogue>) -> Self {
        self.catalogue = catalogue;
        self
    }

    /// Runs the pipeline up to a fully written, synced file.
    ///
    /// Nothing is left on disk when this returns an error.
    pub async fn deliver(&self, url: &str) -> Result<DownloadArtifact, DeliveryError> {
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|err| DeliveryError::storage("could not prepare the output directory", err))?;

        let metadata = self.extractor.resolve(url).await?;
        let title = sanitize_title(&metadata.title);
        debug!(%url, title = %title, formats = metadata.formats.len(), "metadata resolved");

        if let Some(catalogue) = &self.catalogue
            && let Err(err) = catalogue.record(file_stem(&title), &metadata).await
        {
            warn!("Failed to write format catalogue for {title}: {err:#}");
        }

        let ranked = select_formats(&metadata.formats);
        let format = self.extractor.choose_format(&ranked)?;
        debug!(format_id = %format.format_id, height = format.height, "format chosen");

        let artifact = DownloadArtifact::create(&self.output_dir, &title, format.container.clone())?;
        let mut stream = self.extractor.open_stream(&metadata, &format).await?;
        let mut file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(artifact.path())
            .await
            .map_err(|err| DeliveryError::storage("could not open the download file", err))?;

        let mut buffer = vec![0u8; COPY_CHUNK];
        let mut written: u64 = 0;
        loop {
            let read = stream
                .read(&mut buffer)
                .await
                .map_err(|err| ExtractionError::Stream(err.to_string()))?;
            if read == 0 {
                break;
            }
            file.write_all(&buffer[..read])
                .await
                .map_err(|err| DeliveryError::storage("could not write the download file", err))?;
            written += read as u64;
        }

        // The response reopens the file, so every byte must be on disk first.
        file.flush()
            .await
            .map_err(|err| DeliveryError::storage("could not write the download file", err))?;
        file.sync_all()
            .await
            .map_err(|err| DeliveryError::storage("could not write the download file", err))?;
        drop(file);

        stream.finish().await?;
        debug!(bytes = written, path = %artifact.path().display(), "download materialized");
        Ok(artifact)
    }
}

/// A downloaded file waiting to be served.
///
/// Dropping the artifact deletes the file, which covers every early return
/// and a request future that gets cancelled mid-download.
#[derive(Debug)]
pub struct DownloadArtifact {
    path: TempPath,
    title: String,
    container: Container,
}

impl DownloadArtifact {
    fn create(output_dir: &Path, title: &str, container: Container) -> Result<Self, DeliveryError> {
        let disk_stem: String = file_stem(title).chars().take(MAX_DISK_STEM_CHARS).collect();
        let file = tempfile::Builder::new()
            .prefix(&format!("{disk_stem}."))
            .suffix(&format!(".{}", container.extension()))
            .rand_bytes(UNIQUE_SUFFIX_LEN)
            .tempfile_in(output_dir)
            .map_err(|err| DeliveryError::storage("could not create the download file", err))?;

        Ok(Self {
            path: file.into_temp_path(),
            title: title.to_string(),
            container,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The sanitized title, exactly as derived from the source title.
    pub fn sanitized_title(&self) -> &str {
        &self.title
    }

    /// Client-facing attachment name: `{sanitized title}.{container}`.
    pub fn download_name(&self) -> String {
        format!("{}.{}", file_stem(&self.title), self.container.extension())
    }

    /// Reopens the finished file for reading and returns it with its length.
    pub async fn open(&self) -> Result<(File, u64), DeliveryError> {
        let file = File::open(self.path())
            .await
            .map_err(|err| DeliveryError::storage("could not reopen the download file", err))?;
        let size = file
            .metadata()
            .await
            .map_err(|err| DeliveryError::storage("could not reopen the download file", err))?
            .len();
        Ok((file, size))
    }

    /// Logs the delivered size and deletes the file in a detached task.
    ///
    /// Failures are only logged; by the time this runs the response is
    /// already on its way.
    pub fn spawn_bookkeeping(self) -> JoinHandle<()> {
        tokio::spawn(self.finalize())
    }

    async fn finalize(self) {
        match tokio::fs::metadata(self.path()).await {
            Ok(meta) => info!(
                "Downloaded: {} ({} Mb)",
                self.title,
                format_megabytes(meta.len())
            ),
            Err(err) => warn!(
                "Failed to stat {}: {err}",
                self.path().display()
            ),
        }

        let Self { path, .. } = self;
        let shown = path.display().to_string();
        match tokio::task::spawn_blocking(move || path.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(path = %shown, "Failed to remove download: {err}"),
            Err(err) => warn!(path = %shown, "Failed to remove download: {err}"),
        }
    }
}

fn file_stem(title: &str) -> &str {
    if title.trim().is_empty() {
        FALLBACK_STEM
    } else {
        title
    }
}

/// Bytes to mebibytes with one decimal, e.g. `1572864` -> `"1.5"`.
fn format_megabytes(bytes: u64) -> String {
    format!("{:.1}", bytes as f64 / 1024.0 / 1024.0)
}
