//! Default output file names.

use std::path::{Path, PathBuf};

use percent_encoding::percent_decode_str;
use reqwest::Url;

/// Name used when the URL has no usable final path segment.
pub const FALLBACK_NAME: &str = "download.bin";

/// Derive a local file name from the last path segment of `url`.
///
/// The segment is percent-decoded, query and fragment are ignored, and path
/// separators are replaced so the result always names a file in the current
/// directory.
pub fn output_name_from_url(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .map(|segment| percent_decode_str(&segment).decode_utf8_lossy().into_owned())
        .map(|name| sanitize(&name))
        .filter(|name| !name.is_empty() && name != "." && name != "..")
        .unwrap_or_else(|| FALLBACK_NAME.to_string())
}

/// `explicit` if given, otherwise the name derived from `url`.
pub fn resolve_output_path(url: &str, explicit: Option<&Path>) -> PathBuf {
    match explicit {
        Some(path) => path.to_path_buf(),
        None => PathBuf::from(output_name_from_url(url)),
    }
}

fn sanitize(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_file_name() {
        assert_eq!(
            output_name_from_url("https://example.com/pub/archive.tar.gz"),
            "archive.tar.gz"
        );
    }

    #[test]
    fn test_query_and_fragment_ignored() {
        assert_eq!(
            output_name_from_url("https://example.com/image.png?size=large#top"),
            "image.png"
        );
    }

    #[test]
    fn test_percent_decoded() {
        assert_eq!(
            output_name_from_url("https://example.com/my%20file.iso"),
            "my file.iso"
        );
    }

    #[test]
    fn test_encoded_separator_is_replaced() {
        assert_eq!(
            output_name_from_url("https://example.com/a%2Fb.txt"),
            "a_b.txt"
        );
    }

    #[test]
    fn test_fallback_name() {
        assert_eq!(output_name_from_url("https://example.com/"), FALLBACK_NAME);
        assert_eq!(output_name_from_url("https://example.com"), FALLBACK_NAME);
        assert_eq!(output_name_from_url("not a url"), FALLBACK_NAME);
        assert_eq!(output_name_from_url("https://example.com/%2E%2E"), FALLBACK_NAME);
    }

    #[test]
    fn test_resolve_output_path_prefers_explicit() {
        let explicit = Path::new("/tmp/out.bin");
        assert_eq!(
            resolve_output_path("https://example.com/file.zip", Some(explicit)),
            PathBuf::from("/tmp/out.bin")
        );
        assert_eq!(
            resolve_output_path("https://example.com/file.zip", None),
            PathBuf::from("file.zip")
        );
    }
}
