//! libcurl transport: one Easy handle per request, body buffered in memory.

use std::str;
use std::time::Duration;

use super::parse::parse_headers;
use super::{FetchError, Method, Response, Transport};
use crate::config::TransportConfig;

/// Blocking transport backed by the curl crate. Safe to share across worker threads;
/// every request builds its own handle so no connection state is shared.
#[derive(Debug, Clone)]
pub struct CurlTransport {
    connect_timeout: Duration,
    timeout: Duration,
    user_agent: String,
}

impl CurlTransport {
    pub fn new(cfg: &TransportConfig) -> Self {
        Self {
            connect_timeout: cfg.connect_timeout(),
            timeout: cfg.timeout(),
            user_agent: cfg.user_agent.clone(),
        }
    }

    fn perform(&self, method: Method, url: &str) -> Result<Response, curl::Error> {
        let mut headers: Vec<String> = Vec::new();
        let mut body: Vec<u8> = Vec::new();

        let mut easy = curl::easy::Easy::new();
        easy.url(url)?;
        if method == Method::Head {
            easy.nobody(true)?;
        }
        easy.follow_location(true)?;
        easy.max_redirections(10)?;
        easy.useragent(&self.user_agent)?;
        easy.connect_timeout(self.connect_timeout)?;
        easy.timeout(self.timeout)?;
        // Each request gets a fresh connection.
        easy.forbid_reuse(true)?;

        {
            let mut transfer = easy.transfer();
            transfer.header_function(|data| {
                if let Ok(s) = str::from_utf8(data) {
                    headers.push(s.trim_end().to_string());
                }
                true
            })?;
            transfer.write_function(|data| {
                body.extend_from_slice(data);
                Ok(data.len())
            })?;
            transfer.perform()?;
        }

        let code = easy.response_code()?;
        let parsed = parse_headers(&headers);
        let status = if parsed.status.is_empty() {
            format!("{}", code)
        } else {
            parsed.status
        };

        Ok(Response {
            code,
            status,
            etag: parsed.etag,
            body,
        })
    }
}

impl Default for CurlTransport {
    fn default() -> Self {
        Self::new(&TransportConfig::default())
    }
}

impl Transport for CurlTransport {
    fn request(&self, method: Method, url: &str) -> Result<Response, FetchError> {
        self.perform(method, url).map_err(|source| {
            tracing::warn!("failed to {} {}, because {}", method, url, source);
            FetchError::Transport {
                method,
                url: url.to_string(),
                source,
            }
        })
    }
}
