//! Client side of `GET /video`.
//!
//! [`VideoClient::fetch_video`] never returns an error: every outcome is
//! folded into a [`FetchResult`] so UI code only has to match on it.

use std::{collections::BTreeMap, io::Read};

use tracing::debug;

/// Outcome of a single fetch. Exactly one variant is ever populated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchResult {
    Success {
        payload: Vec<u8>,
        /// Response headers keyed by lowercase name.
        headers: BTreeMap<String, String>,
    },
    Failure {
        message: String,
    },
}

impl FetchResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Attachment name announced by the service, if any.
    pub fn filename(&self) -> Option<String> {
        match self {
            Self::Success { headers, .. } => headers
                .get("content-disposition")
                .and_then(|value| filename_from_content_disposition(value)),
            Self::Failure { .. } => None,
        }
    }
}

/// `attachment; filename="video.mp4"` -> `video.mp4`.
///
/// Returns the text after `filename=`, with one pair of surrounding double
/// quotes removed. `None` when the header has no `filename=` part.
pub fn filename_from_content_disposition(header: &str) -> Option<String> {
    let (_, rest) = header.split_once("filename=")?;
    let value = rest.split("filename=").next().unwrap_or(rest);
    let value = value
        .strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .unwrap_or(value);
    Some(value.to_string())
}

#[derive(Clone)]
pub struct VideoClient {
    endpoint: String,
    agent: ureq::Agent,
}

impl VideoClient {
    /// `endpoint` is the service base URL, e.g. `http://localhost:3000`.
    pub fn new(endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            agent: ureq::AgentBuilder::new().build(),
        }
    }

    pub async fn fetch_video(&self, url: &str) -> FetchResult {
        let agent = self.agent.clone();
        let request_url = format!("{}/video", self.endpoint);
        let url = url.to_string();
        // ureq is blocking; keep it off the async workers.
        match tokio::task::spawn_blocking(move || fetch_blocking(&agent, &request_url, &url)).await
        {
            Ok(result) => result,
            Err(err) => FetchResult::Failure {
                message: format!("Request was aborted: {err}"),
            },
        }
    }
}

fn fetch_blocking(agent: &ureq::Agent, request_url: &str, url: &str) -> FetchResult {
    debug!(%request_url, %url, "fetching video");
    let response = match agent.get(request_url).query("url", url).call() {
        Ok(response) => response,
        Err(ureq::Error::Status(code, _)) => {
            return FetchResult::Failure {
                message: format!("Request failed with status code {code}"),
            };
        }
        Err(ureq::Error::Transport(transport)) => {
            let message = match transport.message() {
                Some(detail) => format!("{}: {detail}", transport.kind()),
                None => transport.kind().to_string(),
            };
            return FetchResult::Failure { message };
        }
    };

    // ureq hands back 3xx responses it could not follow as `Ok`.
    if !(200..300).contains(&response.status()) {
        return FetchResult::Failure {
            message: format!("Request failed with status code {}", response.status()),
        };
    }

    let headers = response
        .headers_names()
        .into_iter()
        .filter_map(|name| {
            let value = response.header(&name)?.to_string();
            Some((name.to_ascii_lowercase(), value))
        })
        .collect();

    let mut payload = Vec::new();
    if let Err(err) = response.into_reader().read_to_end(&mut payload) {
        return FetchResult::Failure {
            message: format!("Could not read the response: {err}"),
        };
    }

    FetchResult::Success { payload, headers }
}
