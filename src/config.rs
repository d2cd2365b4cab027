#![forbid(unsafe_code)]

use anyhow::{Context, Result, anyhow, bail};
use axum::http::{HeaderValue, Uri};
use std::{
    collections::HashMap,
    env, fs,
    net::IpAddr,
    path::{Component, Path, PathBuf},
};

pub const DEFAULT_ENV_PATH: &str = ".env";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_CLIENT_ORIGIN: &str = "http://localhost:5173";
pub const DEFAULT_OUTPUT_DIR: &str = "./out";
pub const DEFAULT_YT_DLP: &str = "yt-dlp";
pub const DEFAULT_ENDPOINT: &str = "http://localhost:3000";

/// Everything the delivery service needs at construction time.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub host: IpAddr,
    pub port: u16,
    /// Normalized `scheme://authority` origin allowed to read responses.
    pub client_origin: String,
    pub output_dir: PathBuf,
    pub yt_dlp: PathBuf,
    /// Format catalogue persistence is only active when this is set.
    pub catalogue_dir: Option<PathBuf>,
}

impl ServiceConfig {
    pub fn client_origin_header(&self) -> Result<HeaderValue> {
        HeaderValue::from_str(&self.client_origin)
            .with_context(|| format!("invalid client origin {}", self.client_origin))
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub client_origin: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub yt_dlp: Option<PathBuf>,
    pub catalogue_dir: Option<PathBuf>,
    pub env_path: Option<PathBuf>,
}

pub fn resolve_service_config(overrides: ConfigOverrides) -> Result<ServiceConfig> {
    let file_vars = read_env_file(env_path(overrides.env_path.as_deref()))?;
    build_service_config(&file_vars, env_var_string, overrides)
}

/// Base URL of the delivery service as seen by the client wrapper.
pub fn resolve_client_endpoint(
    endpoint: Option<String>,
    env_file: Option<&Path>,
) -> Result<String> {
    let file_vars = read_env_file(env_path(env_file))?;
    build_client_endpoint(&file_vars, env_var_string, endpoint)
}

fn env_path(path: Option<&Path>) -> &Path {
    path.unwrap_or_else(|| Path::new(DEFAULT_ENV_PATH))
}

fn build_service_config(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
    overrides: ConfigOverrides,
) -> Result<ServiceConfig> {
    let host_raw = non_blank(overrides.host)
        .or_else(|| lookup_value("VIDRELAY_HOST", file_vars, &env_lookup))
        .unwrap_or_else(|| DEFAULT_HOST.to_string());
    let host = host_raw
        .parse::<IpAddr>()
        .with_context(|| format!("VIDRELAY_HOST must be an IPv4 or IPv6 address, got {host_raw}"))?;

    let port = overrides
        .port
        .or_else(|| {
            lookup_value("VIDRELAY_PORT", file_vars, &env_lookup)
                .and_then(|value| value.parse::<u16>().ok())
        })
        .unwrap_or(DEFAULT_PORT);

    let origin_raw = non_blank(overrides.client_origin)
        .or_else(|| lookup_value("VIDRELAY_CLIENT_ORIGIN", file_vars, &env_lookup))
        .unwrap_or_else(|| DEFAULT_CLIENT_ORIGIN.to_string());
    let client_origin = validate_origin(&origin_raw)?;

    let output_dir = overrides
        .output_dir
        .or_else(|| lookup_value("VIDRELAY_OUTPUT_DIR", file_vars, &env_lookup).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));
    if output_dir.as_os_str().is_empty() {
        bail!("VIDRELAY_OUTPUT_DIR must not be empty");
    }

    let yt_dlp = overrides
        .yt_dlp
        .filter(|path| !path.as_os_str().is_empty())
        .or_else(|| lookup_value("VIDRELAY_YT_DLP", file_vars, &env_lookup).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_YT_DLP));

    let catalogue_dir = overrides
        .catalogue_dir
        .filter(|path| !path.as_os_str().is_empty())
        .or_else(|| {
            lookup_value("VIDRELAY_CATALOGUE_DIR", file_vars, &env_lookup).map(PathBuf::from)
        });
    if let Some(dir) = &catalogue_dir {
        let output = normalize_dir(&output_dir)?;
        if normalize_dir(dir)?.starts_with(&output) {
            bail!("VIDRELAY_CATALOGUE_DIR must differ from VIDRELAY_OUTPUT_DIR and not sit inside it");
        }
    }

    Ok(ServiceConfig {
        host,
        port,
        client_origin,
        output_dir,
        yt_dlp,
        catalogue_dir,
    })
}

/// Absolute, lexically normalized form of `path`. Symlinks are not resolved.
fn normalize_dir(path: &Path) -> Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir()
            .context("resolving the working directory")?
            .join(path)
    };
    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }
    Ok(normalized)
}

fn build_client_endpoint(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
    endpoint: Option<String>,
) -> Result<String> {
    let raw = non_blank(endpoint)
        .or_else(|| lookup_value("VIDRELAY_ENDPOINT", file_vars, &env_lookup))
        .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
    let uri = parse_http_uri(&raw, "VIDRELAY_ENDPOINT")?;
    if uri.query().is_some() {
        bail!("VIDRELAY_ENDPOINT must not carry a query string, got {raw}");
    }
    Ok(raw.trim().trim_end_matches('/').to_string())
}

/// Accepts `http(s)://host[:port]` with an optional trailing slash and
/// returns it without the slash, ready to be used as a header value.
fn validate_origin(raw: &str) -> Result<String> {
    let uri = parse_http_uri(raw, "VIDRELAY_CLIENT_ORIGIN")?;
    if !matches!(uri.path(), "" | "/") || uri.query().is_some() {
        bail!("VIDRELAY_CLIENT_ORIGIN must be an origin without a path, got {raw}");
    }
    let scheme = uri.scheme_str().unwrap_or("http");
    let authority = uri
        .authority()
        .ok_or_else(|| anyhow!("VIDRELAY_CLIENT_ORIGIN is missing a host: {raw}"))?;
    let origin = format!("{scheme}://{authority}");
    HeaderValue::from_str(&origin)
        .with_context(|| format!("VIDRELAY_CLIENT_ORIGIN is not a valid header value: {raw}"))?;
    Ok(origin)
}

fn parse_http_uri(raw: &str, key: &str) -> Result<Uri> {
    let uri = raw
        .trim()
        .parse::<Uri>()
        .with_context(|| format!("{key} is not a valid URL: {raw}"))?;
    match uri.scheme_str() {
        Some("http") | Some("https") => {}
        _ => bail!("{key} must use http or https, got {raw}"),
    }
    if uri.authority().is_none() {
        bail!("{key} is missing a host: {raw}");
    }
    Ok(uri)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn env_var_string(key: &str) -> Option<String> {
    non_blank(env::var(key).ok())
}

fn lookup_value(
    key: &str,
    file_vars: &HashMap<String, String>,
    env_lookup: &impl Fn(&str) -> Option<String>,
) -> Option<String> {
    env_lookup(key)
        .or_else(|| file_vars.get(key).cloned())
        .filter(|value| !value.trim().is_empty())
}

pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let mut vars = HashMap::new();
    if !path.exists() {
        return Ok(vars);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let line = trimmed.strip_prefix("export ").unwrap_or(trimmed);
        let Some((key, value_raw)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value_raw.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|value| value.strip_suffix('"'))
            .or_else(|| {
                value
                    .strip_prefix('\'')
                    .and_then(|value| value.strip_suffix('\''))
            })
            .unwrap_or(value);
        vars.insert(key.to_string(), value.to_string());
    }
    Ok(vars)
}
