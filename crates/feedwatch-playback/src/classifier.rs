//! Locator classification.

use std::net::Ipv4Addr;

use feedwatch_ipc::SourceKind;

/// Extensions that mark a locator as a video file.
pub const VIDEO_EXTENSIONS: &[&str] = &[".mp4", ".webm", ".mov", ".avi", ".mkv"];

/// Scheme prefixes that always mean a live stream.
pub const STREAM_SCHEMES: &[&str] = &["rtsp://", "rtsps://", "rtmp://", "rtmps://"];

/// Substrings of an HTTP(S) locator that suggest a stream endpoint.
pub const STREAM_HINTS: &[&str] = &["stream", "video_feed"];

/// Classify a feed locator.
///
/// Rules are checked in order and the first match wins:
/// 1. a video file extension (query and fragment ignored) → [`SourceKind::FileVideo`]
/// 2. a streaming scheme, an HTTP(S) URL containing a stream hint, or a
///    scheme-less `host:port` / bare IPv4 address → [`SourceKind::LiveStream`]
/// 3. anything else, including the empty string → [`SourceKind::StaticImage`]
pub fn classify(locator: &str) -> SourceKind {
    let locator = locator.trim().to_ascii_lowercase();
    if locator.is_empty() {
        return SourceKind::StaticImage;
    }

    let path = strip_query(&locator);
    if VIDEO_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
        return SourceKind::FileVideo;
    }

    if is_live_stream(&locator) {
        return SourceKind::LiveStream;
    }

    SourceKind::StaticImage
}

fn strip_query(locator: &str) -> &str {
    let end = locator.find(['?', '#']).unwrap_or(locator.len());
    &locator[..end]
}

fn is_live_stream(locator: &str) -> bool {
    if STREAM_SCHEMES.iter().any(|scheme| locator.starts_with(scheme)) {
        return true;
    }

    if locator.starts_with("http://") || locator.starts_with("https://") {
        return STREAM_HINTS.iter().any(|hint| locator.contains(hint));
    }

    if locator.contains("://") {
        return false;
    }

    let authority = locator.split('/').next().unwrap_or_default();
    is_bare_ipv4(authority) || is_host_port(authority)
}

fn is_bare_ipv4(authority: &str) -> bool {
    let host = match authority.rsplit_once(':') {
        Some((host, port)) if is_port(port) => host,
        Some(_) => return false,
        None => authority,
    };
    host.parse::<Ipv4Addr>().is_ok()
}

fn is_host_port(authority: &str) -> bool {
    match authority.rsplit_once(':') {
        Some((host, port)) => is_hostname(host) && is_port(port),
        None => false,
    }
}

fn is_port(port: &str) -> bool {
    !port.is_empty() && port.len() <= 5 && port.chars().all(|c| c.is_ascii_digit())
}

fn is_hostname(host: &str) -> bool {
    !host.is_empty()
        && host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_extensions_are_file_video() {
        for locator in [
            "/videos/parking.mp4",
            "file:///srv/cams/lobby.WEBM",
            "https://cdn.example.com/clip.mov?token=abc",
            "recording.avi",
            "http://192.168.1.20:8080/archive/night.mkv",
            "rtsp://cam.local/stream.mp4",
        ] {
            assert_eq!(classify(locator), SourceKind::FileVideo, "{locator}");
        }
    }

    #[test]
    fn test_stream_schemes_are_live() {
        assert_eq!(classify("rtsp://10.0.0.5:554/h264"), SourceKind::LiveStream);
        assert_eq!(classify("RTMP://live.example.com/app"), SourceKind::LiveStream);
    }

    #[test]
    fn test_http_stream_hints_are_live() {
        assert_eq!(
            classify("http://localhost:5000/video_feed"),
            SourceKind::LiveStream
        );
        assert_eq!(
            classify("https://cams.example.com/Stream/3"),
            SourceKind::LiveStream
        );
        assert_eq!(
            classify("https://example.com/images/front.jpg"),
            SourceKind::StaticImage
        );
    }

    #[test]
    fn test_bare_ipv4_is_live() {
        for locator in [
            "192.168.1.10",
            "192.168.1.10:8080",
            "10.0.0.1:554/live",
            "127.0.0.1:1",
        ] {
            assert_eq!(classify(locator), SourceKind::LiveStream, "{locator}");
        }
    }

    #[test]
    fn test_host_port_is_live() {
        assert_eq!(classify("camera-3.local:8554"), SourceKind::LiveStream);
        assert_eq!(classify("localhost:8080/cam"), SourceKind::LiveStream);
    }

    #[test]
    fn test_everything_else_is_static_image() {
        assert_eq!(classify(""), SourceKind::StaticImage);
        assert_eq!(classify("   "), SourceKind::StaticImage);
        assert_eq!(classify("/placeholder.svg"), SourceKind::StaticImage);
        assert_eq!(classify("camera.jpg"), SourceKind::StaticImage);
        assert_eq!(classify("ftp://10.0.0.1/snap.png"), SourceKind::StaticImage);
        assert_eq!(classify("host:notaport"), SourceKind::StaticImage);
    }

    #[test]
    fn test_reclassifies_on_every_call() {
        assert_eq!(classify("a.mp4"), SourceKind::FileVideo);
        assert_eq!(classify("a.png"), SourceKind::StaticImage);
        assert_eq!(classify("a.mp4"), SourceKind::FileVideo);
    }
}
