//! Remote key and public URL derivation.
//!
//! Keys have the form `images/{id}-{name}`. The id is a fresh UUID per upload,
//! so two uploads never map to the same key, even with identical names.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

pub const KEY_PREFIX: &str = "images";

/// Path segment characters left as-is (RFC 3986 unreserved set)
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

pub fn remote_key(id: &str, file_name: &str) -> String {
    format!("{}/{}-{}", KEY_PREFIX, id, file_name)
}

/// Joins `base_url` and `key`, percent-encoding every key segment.
pub fn remote_url(base_url: &str, key: &str) -> String {
    let encoded = key
        .split('/')
        .map(|segment| utf8_percent_encode(segment, SEGMENT).to_string())
        .collect::<Vec<_>>()
        .join("/");

    format!("{}/{}", base_url.trim_end_matches('/'), encoded)
}
