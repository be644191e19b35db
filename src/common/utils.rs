//! Utility functions for syncrony

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use rand::Rng;
use std::time::Duration;

/// Percent-encoding set for one key path segment (`/` separators are kept by the caller)
const SEGMENT_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b'/')
    .add(b'%')
    .add(b' ')
    .add(b'?')
    .add(b'#')
    .add(b'&')
    .add(b'"')
    .add(b'<')
    .add(b'>');

/// Encode a key path for use in a URL, segment by segment.
/// Leading, trailing and repeated slashes are dropped.
pub fn encode_key_path(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| utf8_percent_encode(segment, SEGMENT_ENCODE_SET).to_string())
        .collect::<Vec<_>>()
        .join("/")
}

/// The store only understands the lowercase tokens `true` and `false`.
pub fn wire_bool(value: bool) -> String {
    if value { "true" } else { "false" }.to_string()
}

/// Scale `base` by a random factor in `[1 - jitter, 1 + jitter]`.
pub fn jittered(base: Duration, jitter: f64) -> Duration {
    if jitter <= 0.0 {
        return base;
    }
    let factor = rand::thread_rng().gen_range(1.0 - jitter..=1.0 + jitter);
    base.mul_f64(factor.max(0.0))
}
