//! Error taxonomy for the delivery pipeline.

use std::io;

use thiserror::Error;

/// Anything that goes wrong while talking to the extraction capability.
///
/// The extractor cannot tell an invalid URL from a network failure or a
/// region lock, so neither do we: callers only get a summary message.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("no video url was provided")]
    MissingUrl,

    #[error("{0}")]
    Rejected(String),

    #[error("no format with both video and audio is available")]
    NoViableFormat,

    #[error("media stream failed: {0}")]
    Stream(String),

    #[error("could not start the extractor: {0}")]
    Launch(#[source] io::Error),

    #[error("extractor returned unreadable metadata: {0}")]
    Metadata(#[from] serde_json::Error),
}

/// Failure of a single `GET /video` request before the response starts.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error("{context}")]
    Storage {
        context: &'static str,
        #[source]
        source: io::Error,
    },
}

impl DeliveryError {
    pub(crate) fn storage(context: &'static str, source: io::Error) -> Self {
        Self::Storage { context, source }
    }

    /// Machine-readable kind rendered into the JSON error body.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Extraction(_) => "extraction_failure",
            Self::Storage { .. } => "storage_failure",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_the_failure_class() {
        let extraction = DeliveryError::from(ExtractionError::NoViableFormat);
        assert_eq!(extraction.kind(), "extraction_failure");
        assert_eq!(
            extraction.to_string(),
            "no format with both video and audio is available"
        );

        let storage = DeliveryError::storage(
            "could not write the download",
            io::Error::other("disk full"),
        );
        assert_eq!(storage.kind(), "storage_failure");
        assert_eq!(storage.to_string(), "could not write the download");
    }
}
