//! Opportunistic HTTP request sniffing
//!
//! The detectors only need the request line and User-Agent; a partial
//! parse is fine and absence is not an error.

use nids_common::HttpHints;

const METHODS: [&str; 8] = [
    "GET ", "POST ", "PUT ", "DELETE ", "HEAD ", "OPTIONS ", "PATCH ", "TRACE ",
];

/// Extract method, URI and User-Agent from the start of a TCP payload
pub fn sniff_http_request(payload: &[u8]) -> Option<HttpHints> {
    if payload.len() < 5 {
        return None;
    }
    let starts_like_http = METHODS
        .iter()
        .any(|m| payload.len() >= m.len() && payload[..m.len()].eq_ignore_ascii_case(m.as_bytes()));
    if !starts_like_http {
        return None;
    }

    let mut headers = [httparse::EMPTY_HEADER; 16];
    let mut req = httparse::Request::new(&mut headers);

    // Partial is expected: the sample is capped well below a full request
    if req.parse(payload).is_err() {
        return None;
    }

    let header = |name: &str| {
        req.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .and_then(|h| std::str::from_utf8(h.value).ok())
            .map(|v| v.trim().to_string())
    };

    let hints = HttpHints {
        user_agent: header("user-agent"),
        host: header("host"),
        method: req.method.map(str::to_string),
        uri: req.path.map(str::to_string),
    };

    if hints.is_empty() {
        None
    } else {
        Some(hints)
    }
}
