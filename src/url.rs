//! Recognizes the two YouTube URL shapes the archiver accepts.

use regex::Regex;
use std::sync::LazyLock;

static CHANNEL_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://(?:www\.|m\.)?youtube\.com/channel/(?P<id>[A-Za-z0-9_-]+)/?$")
        .expect("valid channel regex")
});

static VIDEO_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://(?:www\.|m\.)?youtube\.com/watch\?v=(?P<id>[A-Za-z0-9_-]+)(?:&.*)?$")
        .expect("valid video regex")
});

/// Result of classifying one input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlKind {
    Video(String),
    Channel(String),
    Invalid,
}

impl UrlKind {
    pub fn video_id(&self) -> Option<&str> {
        match self {
            UrlKind::Video(id) => Some(id),
            _ => None,
        }
    }
}

/// Classifies a URL. Malformed input yields [`UrlKind::Invalid`]; whether that
/// is fatal is up to the caller.
pub fn classify(line: &str) -> UrlKind {
    let trimmed = line.trim();
    if let Some(captures) = VIDEO_URL.captures(trimmed) {
        return UrlKind::Video(captures["id"].to_owned());
    }
    if let Some(captures) = CHANNEL_URL.captures(trimmed) {
        return UrlKind::Channel(captures["id"].to_owned());
    }
    UrlKind::Invalid
}

/// Canonical watch URL for an archived video.
pub fn video_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={video_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_accepts_watch_urls() {
        assert_eq!(
            classify("https://www.youtube.com/watch?v=abc123"),
            UrlKind::Video("abc123".into())
        );
        assert_eq!(
            classify("  http://youtube.com/watch?v=a-b_C&t=42s \n"),
            UrlKind::Video("a-b_C".into())
        );
    }

    #[test]
    fn classify_accepts_channel_urls() {
        assert_eq!(
            classify("https://www.youtube.com/channel/UC123abc/"),
            UrlKind::Channel("UC123abc".into())
        );
        assert_eq!(
            classify("https://m.youtube.com/channel/UCxyz"),
            UrlKind::Channel("UCxyz".into())
        );
    }

    #[test]
    fn classify_rejects_other_shapes() {
        for input in [
            "",
            "https://example.com/not-a-video",
            "https://www.youtube.com/@handle",
            "https://www.youtube.com/watch?v=",
            "https://www.youtube.com/channel/UC1/videos",
            "https://youtu.be/abc123",
            "ftp://www.youtube.com/watch?v=abc",
        ] {
            assert_eq!(classify(input), UrlKind::Invalid, "{input}");
        }
    }

    #[test]
    fn video_url_round_trips_through_classifier() {
        let url = video_url("xyz");
        assert_eq!(classify(&url).video_id(), Some("xyz"));
    }
}
