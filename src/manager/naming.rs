//! Display/file names for new jobs.

use std::borrow::Cow;

/// Name used when nothing usable remains after sanitizing.
const FALLBACK_NAME: &str = "download";

/// Extension given to external-extraction outputs.
pub const EXTERNAL_EXTENSION: &str = ".mp4";

/// Replaces path separators, filesystem-illegal characters, whitespace and
/// control characters with `_`.
///
/// Runs of replaced characters are kept one-for-one. Names that would
/// resolve to the current or parent directory become empty.
#[must_use]
pub fn sanitize_file_name(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_whitespace() || c.is_control() => '_',
            c => c,
        })
        .collect();

    if sanitized.chars().all(|c| c == '.') {
        return String::new();
    }
    sanitized
}

/// Derives a job name from the last path segment of `url`.
///
/// The query string and fragment are dropped and the segment is
/// percent-decoded before sanitizing.
#[must_use]
pub fn name_from_url(url: &str) -> String {
    let base = url
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .trim_end_matches('/');
    let segment = base.rsplit('/').next().unwrap_or_default();
    let decoded = urlencoding::decode(segment).unwrap_or(Cow::Borrowed(segment));

    let name = sanitize_file_name(&decoded);
    if name.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        name
    }
}

/// Derives an external job's name from its title.
#[must_use]
pub fn name_from_title(title: &str) -> String {
    let stem = sanitize_file_name(title.trim());
    let stem = if stem.is_empty() { FALLBACK_NAME } else { &stem };
    format!("{stem}{EXTERNAL_EXTENSION}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_from_url_strips_query_and_sanitizes() {
        assert_eq!(name_from_url("https://x.com/a b?c=1"), "a_b");
    }

    #[test]
    fn test_name_from_url_percent_decodes() {
        assert_eq!(
            name_from_url("https://x.com/files/My%20Report%3A%20v2.pdf"),
            "My_Report__v2.pdf"
        );
    }

    #[test]
    fn test_name_from_url_drops_fragment() {
        assert_eq!(name_from_url("https://x.com/dir/file.zip#part"), "file.zip");
    }

    #[test]
    fn test_name_from_url_trailing_slash_uses_previous_segment() {
        assert_eq!(name_from_url("https://x.com/dir/"), "dir");
    }

    #[test]
    fn test_name_from_url_decoded_separators_are_replaced() {
        assert_eq!(name_from_url("https://x.com/a%2Fb%5Cc"), "a_b_c");
    }

    #[test]
    fn test_name_from_url_parent_segment_falls_back() {
        assert_eq!(name_from_url("https://x.com/%2E%2E"), "download");
        assert_eq!(name_from_url(""), "download");
    }

    #[test]
    fn test_sanitize_file_name_replaces_each_illegal_char() {
        assert_eq!(sanitize_file_name("a:b*c?d\"e<f>g|h"), "a_b_c_d_e_f_g_h");
        assert_eq!(sanitize_file_name("tab\there"), "tab_here");
    }

    #[test]
    fn test_name_from_title_appends_extension() {
        assert_eq!(name_from_title("My Clip: Part 1"), "My_Clip__Part_1.mp4");
        assert_eq!(name_from_title("   "), "download.mp4");
    }
}
