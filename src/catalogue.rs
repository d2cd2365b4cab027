//! Opt-in persistence of the formats a source offered.
//!
//! Only active when a catalogue directory is configured. Entries are written
//! next to each other as `{sanitized title}.json` and replaced atomically, so
//! a reader never sees a half-written file.

use std::{
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::Serialize;
use tempfile::NamedTempFile;

use crate::media::{FormatDescriptor, VideoMetadata};

#[derive(Debug, Clone)]
pub struct FormatCatalogue {
    dir: PathBuf,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CatalogueEntry<'a> {
    title: &'a str,
    source_url: &'a str,
    formats: &'a [FormatDescriptor],
}

impl FormatCatalogue {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Writes every format of `metadata` under `file_stem` and returns the
    /// path of the entry.
    pub async fn record(&self, file_stem: &str, metadata: &VideoMetadata) -> Result<PathBuf> {
        let path = self.dir.join(format!("{file_stem}.json"));
        let payload = serde_json::to_vec_pretty(&CatalogueEntry {
            title: &metadata.title,
            source_url: &metadata.source_url,
            formats: &metadata.formats,
        })?;

        let dir = self.dir.clone();
        let target = path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&dir, &target, &payload))
            .await
            .context("joining catalogue writer")??;
        Ok(path)
    }
}

fn write_atomic(dir: &Path, path: &Path, payload: &[u8]) -> Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    // A unique temp file keeps concurrent writers of the same title apart.
    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("creating temp file in {}", dir.display()))?;
    tmp.write_all(payload)?;
    tmp.persist(path)
        .with_context(|| format!("replacing {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::Container;
    use serde_json::Value;
    use tempfile::tempdir;

    fn metadata() -> VideoMetadata {
        VideoMetadata {
            source_url: "https://example.test/watch?v=alpha".into(),
            title: "Alpha!".into(),
            formats: vec![
                FormatDescriptor {
                    format_id: "22".into(),
                    container: Container::Mp4,
                    has_video: true,
                    has_audio: true,
                    height: 720,
                },
                FormatDescriptor {
                    format_id: "140".into(),
                    container: Container::parse("m4a"),
                    has_video: false,
                    has_audio: true,
                    height: 0,
                },
            ],
        }
    }

    #[tokio::test]
    async fn record_writes_all_formats() -> Result<()> {
        let dir = tempdir()?;
        let catalogue = FormatCatalogue::new(dir.path().join("catalogue"));
        let path = catalogue.record("Alpha ", &metadata()).await?;
        assert_eq!(path, dir.path().join("catalogue").join("Alpha .json"));

        let parsed: Value = serde_json::from_slice(&std::fs::read(&path)?)?;
        assert_eq!(parsed["title"], "Alpha!");
        assert_eq!(parsed["sourceUrl"], "https://example.test/watch?v=alpha");
        assert_eq!(parsed["formats"].as_array().unwrap().len(), 2);
        assert_eq!(parsed["formats"][0]["container"], "mp4");
        Ok(())
    }

    #[tokio::test]
    async fn record_replaces_previous_entry() -> Result<()> {
        let dir = tempdir()?;
        let catalogue = FormatCatalogue::new(dir.path());
        catalogue.record("Alpha ", &metadata()).await?;

        let mut updated = metadata();
        updated.formats.truncate(1);
        let path = catalogue.record("Alpha ", &updated).await?;

        let parsed: Value = serde_json::from_slice(&std::fs::read(&path)?)?;
        assert_eq!(parsed["formats"].as_array().unwrap().len(), 1);
        let leftovers = std::fs::read_dir(dir.path())?.count();
        assert_eq!(leftovers, 1);
        Ok(())
    }
}
