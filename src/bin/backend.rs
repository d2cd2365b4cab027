#![forbid(unsafe_code)]

//! HTTP entry point: serves `GET /video?url=...` downloads to the configured
//! client origin.

use std::{net::SocketAddr, path::PathBuf, process::Stdio};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::{net::TcpListener, process::Command, signal};
use tracing::{info, warn};
use vidrelay_tools::{
    config::{ConfigOverrides, ServiceConfig, resolve_service_config},
    logging,
    server::build_app,
};

#[derive(Debug, Parser)]
#[command(name = "backend", about = "Fetches videos by URL and serves them as downloads")]
struct BackendArgs {
    /// Address to bind, overrides VIDRELAY_HOST.
    #[arg(long)]
    host: Option<String>,
    #[arg(long)]
    port: Option<u16>,
    /// Origin allowed to read responses, overrides VIDRELAY_CLIENT_ORIGIN.
    #[arg(long = "origin")]
    client_origin: Option<String>,
    #[arg(long)]
    output_dir: Option<PathBuf>,
    #[arg(long = "yt-dlp")]
    yt_dlp: Option<PathBuf>,
    /// Enables format catalogue persistence into this directory.
    #[arg(long)]
    catalogue_dir: Option<PathBuf>,
    #[arg(long)]
    env_file: Option<PathBuf>,
}

impl BackendArgs {
    fn into_overrides(self) -> ConfigOverrides {
        ConfigOverrides {
            host: self.host,
            port: self.port,
            client_origin: self.client_origin,
            output_dir: self.output_dir,
            yt_dlp: self.yt_dlp,
            catalogue_dir: self.catalogue_dir,
            env_path: self.env_file,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();

    let config = resolve_service_config(BackendArgs::parse().into_overrides())?;
    warn_if_extractor_missing(&config).await;
    let app = build_app(&config)?;

    let addr = SocketAddr::new(config.host, config.port);
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding to {}", addr))?;
    info!(
        origin = %config.client_origin,
        output_dir = %config.output_dir.display(),
        catalogue = config.catalogue_dir.is_some(),
        "Delivery service listening on http://{}",
        addr
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("running delivery service")?;

    Ok(())
}

/// Runs `<yt-dlp> --version` once at startup. A missing binary only fails
/// the requests that need it, so this warns instead of aborting.
async fn warn_if_extractor_missing(config: &ServiceConfig) {
    let status = Command::new(&config.yt_dlp)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;

    match status {
        Ok(status) if status.success() => {}
        Ok(status) => warn!(
            "{} is installed but returned {status}",
            config.yt_dlp.display()
        ),
        Err(err) => warn!(
            "{} is not installed or not in PATH: {err}",
            config.yt_dlp.display()
        ),
    }
}

async fn shutdown_signal() {
    // Only graceful shutdown depends on this; Ctrl+C still terminates.
    if let Err(err) = signal::ctrl_c().await {
        warn!("Failed to install Ctrl+C handler: {}", err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_flags_means_no_overrides() {
        let overrides = BackendArgs::try_parse_from(["backend"])
            .unwrap()
            .into_overrides();
        assert!(overrides.host.is_none());
        assert!(overrides.port.is_none());
        assert!(overrides.client_origin.is_none());
        assert!(overrides.catalogue_dir.is_none());
    }

    #[test]
    fn flags_map_to_overrides() {
        let overrides = BackendArgs::try_parse_from([
            "backend",
            "--host",
            "0.0.0.0",
            "--port",
            "9000",
            "--origin",
            "https://app.example.test",
            "--output-dir",
            "/srv/out",
            "--yt-dlp",
            "/opt/yt-dlp",
            "--catalogue-dir",
            "/srv/catalogue",
        ])
        .unwrap()
        .into_overrides();
        assert_eq!(overrides.host.as_deref(), Some("0.0.0.0"));
        assert_eq!(overrides.port, Some(9000));
        assert_eq!(
            overrides.client_origin.as_deref(),
            Some("https://app.example.test")
        );
        assert_eq!(overrides.output_dir, Some(PathBuf::from("/srv/out")));
        assert_eq!(overrides.yt_dlp, Some(PathBuf::from("/opt/yt-dlp")));
        assert_eq!(overrides.catalogue_dir, Some(PathBuf::from("/srv/catalogue")));
    }

    #[test]
    fn invalid_port_is_rejected() {
        assert!(BackendArgs::try_parse_from(["backend", "--port", "99999"]).is_err());
    }

    #[test]
    fn overrides_resolve_into_config() {
        let dir = tempfile::tempdir().unwrap();
        let overrides = BackendArgs::try_parse_from([
            "backend",
            "--port",
            "4040",
            "--output-dir",
            "/srv/out",
        ])
        .unwrap()
        .into_overrides();
        let config = resolve_service_config(ConfigOverrides {
            env_path: Some(dir.path().join("missing.env")),
            ..overrides
        })
        .unwrap();
        assert_eq!(config.port, 4040);
        assert_eq!(config.output_dir, PathBuf::from("/srv/out"));
    }
}
