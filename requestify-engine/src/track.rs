use serde::{Deserialize, Serialize};
use std::fmt::Display;
use url::Url;

/// Display metadata of a proposed track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackMetadata {
    pub name: String,
    pub artist: String,
    pub album: Option<String>,
    /// Duration in seconds.
    pub duration: f32,
}

/// A canonical external track reference.
///
/// Duplicate detection compares these byte-for-byte, so the same track must
/// always normalize to the same reference. For URL references the query
/// string and fragment are dropped, a trailing slash is trimmed, and the
/// scheme and host are lowercased. Anything that doesn't parse as a URL is
/// kept as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackRef(String);

impl TrackRef {
    pub fn normalize(raw: &str) -> Self {
        let raw = raw.trim();

        match Url::parse(raw) {
            Ok(mut url) if url.host_str().is_some() => {
                url.set_query(None);
                url.set_fragment(None);

                let mut canonical = url.to_string();

                while canonical.ends_with('/') {
                    canonical.pop();
                }

                Self(canonical)
            }
            _ => Self(raw.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl Display for TrackRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::TrackRef;

    #[test]
    fn query_parameters_are_dropped() {
        let plain = TrackRef::normalize("https://open.spotify.com/track/abc123");
        let tracked = TrackRef::normalize("https://open.spotify.com/track/abc123?si=xyz&utm=1");

        assert_eq!(plain, tracked);
    }

    #[test]
    fn casing_of_host_is_ignored() {
        let lower = TrackRef::normalize("https://open.spotify.com/track/abc123");
        let upper = TrackRef::normalize("HTTPS://Open.Spotify.com/track/abc123");

        assert_eq!(lower, upper);
    }

    #[test]
    fn path_casing_is_preserved() {
        let lower = TrackRef::normalize("https://open.spotify.com/track/abc123");
        let upper = TrackRef::normalize("https://open.spotify.com/track/ABC123");

        assert_ne!(lower, upper);
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let plain = TrackRef::normalize("https://open.spotify.com/track/abc123");
        let slashed = TrackRef::normalize("https://open.spotify.com/track/abc123/");

        assert_eq!(plain, slashed);
    }

    #[test]
    fn opaque_references_are_kept_verbatim() {
        let opaque = TrackRef::normalize("spotify:track:abc123");

        assert_eq!(opaque.as_str(), "spotify:track:abc123");
    }
}
