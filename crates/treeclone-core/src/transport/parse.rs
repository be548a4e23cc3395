//! Parse raw response header lines collected by curl.

/// Status and validator extracted from one response's header block.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct ParsedHeaders {
    /// Status text from the status line, e.g. `"200 OK"`.
    pub status: String,
    pub etag: Option<String>,
}

/// Parse header lines. When redirects were followed curl reports several header
/// blocks; each status line starts a new block so only the final response wins.
pub(crate) fn parse_headers(lines: &[String]) -> ParsedHeaders {
    let mut parsed = ParsedHeaders::default();

    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with("HTTP/") {
            parsed = ParsedHeaders {
                status: status_text(line),
                etag: None,
            };
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("etag") {
                parsed.etag = Some(strip_etag(value));
            }
        }
    }

    parsed
}

/// `"HTTP/1.1 404 Not Found"` -> `"404 Not Found"`.
fn status_text(line: &str) -> String {
    match line.split_once(' ') {
        Some((_, rest)) => rest.trim().to_string(),
        None => line.to_string(),
    }
}

/// Remove every double quote, and a weak-validator prefix if present.
pub(crate) fn strip_etag(raw: &str) -> String {
    let v = raw.trim();
    let v = v.strip_prefix("W/").unwrap_or(v);
    v.replace('"', "")
}
