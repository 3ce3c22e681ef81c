pub mod extractor;
pub mod filter;
pub mod store;
pub mod validator;
pub mod webhook;
pub mod xtream;

/// Truncate a response body for logging without splitting a multi-byte
/// character.
pub(crate) fn truncate_body(body: &str, max_bytes: usize) -> &str {
    if body.len() <= max_bytes {
        return body;
    }
    let mut end = max_bytes;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}
