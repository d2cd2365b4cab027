//! The extraction capability: resolve a URL to metadata, stream one format.
//!
//! The pipeline only talks to the [`Extractor`] trait. [`YtDlpExtractor`] is
//! the production implementation and shells out to `yt-dlp`, the same tool
//! the rest of our tooling already depends on.

use std::{
    future::Future,
    io,
    path::PathBuf,
    pin::Pin,
    process::{ExitStatus, Stdio},
    task::{Context, Poll},
};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::{
    io::{AsyncRead, AsyncReadExt, ReadBuf},
    process::Command,
};
use tracing::debug;

use crate::error::ExtractionError;
use crate::media::{Container, FormatDescriptor, VideoMetadata};

type Completion = Pin<Box<dyn Future<Output = Result<(), ExtractionError>> + Send>>;

/// Byte stream for one chosen format.
///
/// Reading yields the media bytes. Once the reader hits EOF, [`finish`]
/// reports whether the producer actually succeeded; an extractor process can
/// close its output early and only signal the failure through its exit code.
///
/// [`finish`]: MediaStream::finish
pub struct MediaStream {
    reader: Pin<Box<dyn AsyncRead + Send>>,
    completion: Option<Completion>,
}

impl MediaStream {
    pub fn new(reader: impl AsyncRead + Send + 'static) -> Self {
        Self {
            reader: Box::pin(reader),
            completion: None,
        }
    }

    pub fn with_completion(
        mut self,
        completion: impl Future<Output = Result<(), ExtractionError>> + Send + 'static,
    ) -> Self {
        self.completion = Some(Box::pin(completion));
        self
    }

    pub async fn finish(self) -> Result<(), ExtractionError> {
        match self.completion {
            Some(completion) => completion.await,
            None => Ok(()),
        }
    }
}

impl AsyncRead for MediaStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.reader.as_mut().poll_read(cx, buf)
    }
}

#[async_trait]
pub trait Extractor: Send + Sync {
    /// Resolves a URL to its title and every format the source offers.
    async fn resolve(&self, url: &str) -> Result<VideoMetadata, ExtractionError>;

    /// Picks the format to download from an already ranked list. The
    /// convention is that the first entry is the preferred one.
    fn choose_format(
        &self,
        formats: &[FormatDescriptor],
    ) -> Result<FormatDescriptor, ExtractionError> {
        formats
            .first()
            .cloned()
            .ok_or(ExtractionError::NoViableFormat)
    }

    async fn open_stream(
        &self,
        metadata: &VideoMetadata,
        format: &FormatDescriptor,
    ) -> Result<MediaStream, ExtractionError>;
}

/// Extractor backed by the `yt-dlp` executable.
#[derive(Debug, Clone)]
pub struct YtDlpExtractor {
    binary: PathBuf,
}

impl YtDlpExtractor {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.binary);
        command
            .arg("--no-warnings")
            .arg("--no-progress")
            .arg("--no-playlist")
            .stdin(Stdio::null())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl Extractor for YtDlpExtractor {
    async fn resolve(&self, url: &str) -> Result<VideoMetadata, ExtractionError> {
        if url.trim().is_empty() {
            return Err(ExtractionError::MissingUrl);
        }

        debug!(%url, "resolving metadata");
        let output = self
            .command()
            .arg("--dump-single-json")
            .arg("--skip-download")
            // Keeps URLs that start with `-` from being read as options.
            .arg("--")
            .arg(url)
            .output()
            .await
            .map_err(ExtractionError::Launch)?;

        if !output.status.success() {
            return Err(ExtractionError::Rejected(stderr_summary(
                &output.stderr,
                output.status,
            )));
        }

        let info: VideoInfo = serde_json::from_slice(&output.stdout)?;
        Ok(info.into_metadata(url))
    }

    async fn open_stream(
        &self,
        metadata: &VideoMetadata,
        format: &FormatDescriptor,
    ) -> Result<MediaStream, ExtractionError> {
        debug!(format_id = %format.format_id, url = %metadata.source_url, "opening media stream");
        let mut child = self
            .command()
            .arg("--quiet")
            .arg("--format")
            .arg(&format.format_id)
            .arg("--output")
            .arg("-")
            .arg("--")
            .arg(&metadata.source_url)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(ExtractionError::Launch)?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ExtractionError::Stream("extractor output is unavailable".into()))?;

        // stderr must be drained concurrently or a chatty child blocks.
        let stderr = child.stderr.take();
        let stderr_task = tokio::spawn(async move {
            let mut captured = Vec::new();
            if let Some(mut stderr) = stderr {
                let _ = stderr.read_to_end(&mut captured).await;
            }
            captured
        });

        let completion = async move {
            let status = child
                .wait()
                .await
                .map_err(|err| ExtractionError::Stream(err.to_string()))?;
            let captured = stderr_task.await.unwrap_or_default();
            if status.success() {
                Ok(())
            } else {
                Err(ExtractionError::Stream(stderr_summary(&captured, status)))
            }
        };

        Ok(MediaStream::new(stdout).with_completion(completion))
    }
}

/// Subset of `yt-dlp --dump-single-json` that the pipeline needs.
#[derive(Debug, Deserialize)]
struct VideoInfo {
    title: Option<String>,
    fulltitle: Option<String>,
    #[serde(default)]
    formats: Vec<FormatInfo>,
    /// Single-format results carry the format fields at the top level.
    #[serde(flatten)]
    selected: FormatInfo,
}

#[derive(Debug, Deserialize)]
struct FormatInfo {
    format_id: Option<String>,
    ext: Option<String>,
    vcodec: Option<String>,
    acodec: Option<String>,
    height: Option<i64>,
}

impl VideoInfo {
    fn into_metadata(self, url: &str) -> VideoMetadata {
        let title = self.title.or(self.fulltitle).unwrap_or_default();
        let formats = if self.formats.is_empty() {
            self.selected.into_descriptor().into_iter().collect()
        } else {
            self.formats
                .into_iter()
                .filter_map(FormatInfo::into_descriptor)
                .collect()
        };
        VideoMetadata {
            source_url: url.to_string(),
            title,
            formats,
        }
    }
}

impl FormatInfo {
    fn into_descriptor(self) -> Option<FormatDescriptor> {
        let format_id = self.format_id.filter(|id| !id.trim().is_empty())?;
        Some(FormatDescriptor {
            format_id,
            container: Container::parse(self.ext.as_deref().unwrap_or_default()),
            has_video: codec_present(self.vcodec.as_deref()),
            has_audio: codec_present(self.acodec.as_deref()),
            height: self
                .height
                .and_then(|height| u32::try_from(height).ok())
                .unwrap_or(0),
        })
    }
}

fn codec_present(codec: Option<&str>) -> bool {
    codec.is_some_and(|codec| !codec.is_empty() && codec != "none")
}

/// Last meaningful stderr line, without yt-dlp's `ERROR: ` prefix.
fn stderr_summary(stderr: &[u8], status: ExitStatus) -> String {
    String::from_utf8_lossy(stderr)
        .lines()
        .map(str::trim)
        .rfind(|line| !line.is_empty())
        .map(|line| line.strip_prefix("ERROR:").unwrap_or(line).trim().to_string())
        .unwrap_or_else(|| format!("extractor exited with {status}"))
}
