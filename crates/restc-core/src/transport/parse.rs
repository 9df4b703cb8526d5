//! Parse raw HTTP response header lines into [`Headers`].

use crate::models::Headers;

/// Parse collected header lines. A status line starts a new block, so after
/// redirects or `100 Continue` only the final response's headers remain.
pub(crate) fn parse_header_lines(lines: &[String]) -> Headers {
    let mut headers = Headers::new();
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with("HTTP/") {
            headers = Headers::new();
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.append(name.trim(), value.trim());
        }
    }
    headers
}
