//! URL normalization applied before a direct transfer.

/// Characters percent-encoded in the URL body, paired with their encoding.
const ENCODED_CHARS: [(char, &str); 7] = [
    (' ', "%20"),
    ('"', "%22"),
    ('\'', "%27"),
    ('<', "%3C"),
    ('>', "%3E"),
    ('[', "%5B"),
    (']', "%5D"),
];

const SCHEMES: [&str; 2] = ["https://", "http://"];

/// Percent-encodes spaces and `"` `'` `<` `>` `[` `]` in `url`.
///
/// A leading `http://` or `https://` is left untouched; everything after it
/// is encoded. Existing `%XX` escapes are not re-encoded.
#[must_use]
pub fn normalize_url(url: &str) -> String {
    let (scheme, rest) = SCHEMES
        .iter()
        .find_map(|scheme| {
            url.get(..scheme.len())
                .filter(|prefix| prefix.eq_ignore_ascii_case(scheme))
                .map(|prefix| (prefix, &url[scheme.len()..]))
        })
        .unwrap_or(("", url));

    let mut normalized = String::with_capacity(url.len() + 8);
    normalized.push_str(scheme);
    for ch in rest.chars() {
        match ENCODED_CHARS.iter().find(|(c, _)| *c == ch) {
            Some((_, encoded)) => normalized.push_str(encoded),
            None => normalized.push(ch),
        }
    }
    normalized
}
