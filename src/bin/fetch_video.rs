#![forbid(unsafe_code)]

//! Command-line consumer of the client wrapper: asks the delivery service
//! for a video and stores the attachment locally.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::info;
use vidrelay_tools::{
    client::{FetchResult, VideoClient},
    config::resolve_client_endpoint,
    logging,
};

const FALLBACK_FILENAME: &str = "video.bin";

#[derive(Debug, Parser)]
#[command(name = "fetch_video", about = "Downloads a video through the delivery service")]
struct FetchArgs {
    /// Video page URL handed to the service untouched.
    url: String,
    /// Service base URL, overrides VIDRELAY_ENDPOINT.
    #[arg(long)]
    endpoint: Option<String>,
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,
    #[arg(long)]
    env_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();

    let args = FetchArgs::parse();
    let endpoint = resolve_client_endpoint(args.endpoint, args.env_file.as_deref())?;
    let client = VideoClient::new(endpoint);

    let result = client.fetch_video(&args.url).await;
    let saved = save_result(&result, &args.output_dir)?;
    info!("Saved {}", saved.display());
    println!("{}", saved.display());
    Ok(())
}

fn save_result(result: &FetchResult, output_dir: &Path) -> Result<PathBuf> {
    let payload = match result {
        FetchResult::Success { payload, .. } => payload,
        FetchResult::Failure { message } => bail!("download failed: {message}"),
    };

    let name = result
        .filename()
        .as_deref()
        .and_then(safe_file_name)
        .unwrap_or_else(|| FALLBACK_FILENAME.to_string());

    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("creating {}", output_dir.display()))?;
    let target = output_dir.join(name);
    std::fs::write(&target, payload).with_context(|| format!("writing {}", target.display()))?;
    Ok(target)
}

/// Keeps only the final path component so a hostile header cannot escape
/// the output directory.
fn safe_file_name(name: &str) -> Option<String> {
    let file_name = Path::new(name).file_name()?.to_string_lossy().into_owned();
    if file_name.trim().is_empty() {
        None
    } else {
        Some(file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn success(disposition: Option<&str>) -> FetchResult {
        let mut headers = BTreeMap::new();
        if let Some(value) = disposition {
            headers.insert("content-disposition".to_string(), value.to_string());
        }
        FetchResult::Success {
            payload: b"bytes".to_vec(),
            headers,
        }
    }

    #[test]
    fn saves_under_announced_filename() {
        let dir = tempdir().unwrap();
        let saved = save_result(
            &success(Some("attachment; filename=\"My Video .mp4\"")),
            dir.path(),
        )
        .unwrap();
        assert_eq!(saved, dir.path().join("My Video .mp4"));
        assert_eq!(std::fs::read(saved).unwrap(), b"bytes");
    }

    #[test]
    fn missing_header_uses_fallback_name() {
        let dir = tempdir().unwrap();
        let saved = save_result(&success(None), dir.path()).unwrap();
        assert_eq!(saved, dir.path().join(FALLBACK_FILENAME));
    }

    #[test]
    fn traversal_in_filename_is_stripped() {
        let dir = tempdir().unwrap();
        let saved = save_result(
            &success(Some("attachment; filename=\"../../etc/passwd\"")),
            dir.path(),
        )
        .unwrap();
        assert_eq!(saved, dir.path().join("passwd"));
    }

    #[test]
    fn failure_is_reported() {
        let dir = tempdir().unwrap();
        let err = save_result(
            &FetchResult::Failure {
                message: "Request failed with status code 500".into(),
            },
            dir.path(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("status code 500"));
    }

    #[test]
    fn args_require_a_url() {
        assert!(FetchArgs::try_parse_from(["fetch_video"]).is_err());
        let args = FetchArgs::try_parse_from(["fetch_video", "https://example.test/v"]).unwrap();
        assert_eq!(args.output_dir, PathBuf::from("."));
        assert!(args.endpoint.is_none());
    }
}
