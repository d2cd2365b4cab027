//! Data model shared by the delivery pipeline and the extractor.
//!
//! Nothing here touches the network or the filesystem: these are the pure
//! pieces of the pipeline (title sanitizing and format ranking) plus the
//! structs the extractor fills in.

use serde::{Deserialize, Serialize};

/// Query payload accepted by `GET /video`.
///
/// The URL is used verbatim; only the extractor decides whether it is valid.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VideoRequest {
    #[serde(default)]
    pub url: String,
}

/// Media container reported by the extractor for a single encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Container {
    Mp4,
    Webm,
    #[serde(rename = "3gp")]
    ThreeGp,
    Flv,
    Other(String),
}

impl Container {
    /// Maps an extension string such as `"mp4"` or `"WebM"` to a container.
    ///
    /// Unknown values keep only their ASCII alphanumerics so the result can
    /// always be used as a file extension.
    pub fn parse(value: &str) -> Self {
        let normalized: String = value
            .trim()
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match normalized.as_str() {
            "mp4" => Self::Mp4,
            "webm" => Self::Webm,
            "3gp" => Self::ThreeGp,
            "flv" => Self::Flv,
            "" => Self::Other("bin".to_string()),
            _ => Self::Other(normalized),
        }
    }

    pub fn extension(&self) -> &str {
        match self {
            Self::Mp4 => "mp4",
            Self::Webm => "webm",
            Self::ThreeGp => "3gp",
            Self::Flv => "flv",
            Self::Other(ext) => ext,
        }
    }
}

/// One encoding variant of a video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatDescriptor {
    /// Handle passed back to the extractor to stream this exact encoding.
    pub format_id: String,
    pub container: Container,
    pub has_video: bool,
    pub has_audio: bool,
    /// Vertical resolution in pixels, `0` when the extractor does not know.
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoMetadata {
    /// URL the metadata was resolved from; streams are requested against it.
    pub source_url: String,
    pub title: String,
    pub formats: Vec<FormatDescriptor>,
}

/// Replaces every character outside `[A-Za-z0-9 ]` with a space.
///
/// Works per `char`, so the output has exactly as many characters as the
/// input and permitted characters keep their positions.
pub fn sanitize_title(title: &str) -> String {
    title
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == ' ' {
                c
            } else {
                ' '
            }
        })
        .collect()
}

/// Keeps the formats that carry both video and audio, highest resolution
/// first. Equal heights keep their input order.
pub fn select_formats(formats: &[FormatDescriptor]) -> Vec<FormatDescriptor> {
    let mut combined: Vec<FormatDescriptor> = formats
        .iter()
        .filter(|format| format.has_video && format.has_audio)
        .cloned()
        .collect();
    combined.sort_by(|a, b| b.height.cmp(&a.height));
    combined
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(id: &str, video: bool, audio: bool, height: u32) -> FormatDescriptor {
        FormatDescriptor {
            format_id: id.into(),
            container: Container::Mp4,
            has_video: video,
            has_audio: audio,
            height,
        }
    }

    #[test]
    fn sanitize_replaces_symbols_with_spaces() {
        assert_eq!(sanitize_title("My Video!"), "My Video ");
        assert_eq!(sanitize_title("a/b\\c:d"), "a b c d");
        assert_eq!(sanitize_title("Ünïcode – test"), " n code   test");
    }

    #[test]
    fn sanitize_preserves_length_and_permitted_positions() {
        let titles = [
            "Rust 2024: what's new?",
            "***",
            "",
            "emoji 🎬 title",
            "already clean 123",
        ];
        for title in titles {
            let sanitized = sanitize_title(title);
            assert_eq!(sanitized.chars().count(), title.chars().count());
            for (original, clean) in title.chars().zip(sanitized.chars()) {
                if original.is_ascii_alphanumeric() || original == ' ' {
                    assert_eq!(original, clean);
                } else {
                    assert_eq!(clean, ' ');
                }
            }
            assert_eq!(sanitize_title(&sanitized), sanitized);
        }
    }

    #[test]
    fn select_keeps_only_combined_formats() {
        let formats = vec![
            format("video-only", true, false, 1080),
            format("audio-only", false, true, 0),
            format("combined", true, true, 360),
            format("neither", false, false, 720),
        ];
        let selected = select_formats(&formats);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].format_id, "combined");
    }

    #[test]
    fn select_sorts_by_height_descending_and_is_stable() {
        let formats = vec![
            format("a", true, true, 360),
            format("b", true, true, 720),
            format("c", true, true, 360),
            format("d", true, true, 1080),
            format("e", true, true, 720),
        ];
        let ids: Vec<_> = select_formats(&formats)
            .into_iter()
            .map(|format| format.format_id)
            .collect();
        assert_eq!(ids, vec!["d", "b", "e", "a", "c"]);
    }

    #[test]
    fn select_on_empty_input_is_empty() {
        assert!(select_formats(&[]).is_empty());
        assert!(select_formats(&[format("v", true, false, 720)]).is_empty());
    }

    #[test]
    fn container_parse_normalizes_extensions() {
        assert_eq!(Container::parse("MP4"), Container::Mp4);
        assert_eq!(Container::parse(" webm "), Container::Webm);
        assert_eq!(Container::parse("3gp"), Container::ThreeGp);
        assert_eq!(Container::parse("m4a").extension(), "m4a");
        assert_eq!(Container::parse("../evil").extension(), "evil");
        assert_eq!(Container::parse("").extension(), "bin");
    }
}
