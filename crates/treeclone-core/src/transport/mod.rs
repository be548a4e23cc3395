//! HTTP transport contract used by the clone engine.
//!
//! The engine issues HEAD requests to read a remote validator (ETag) and GET
//! requests to retrieve content. Anything other than `200` is surfaced as
//! [`FetchError::Status`] carrying the server's status text.

mod easy;
mod parse;

pub use easy::CurlTransport;

use std::fmt;

/// The only success code the engine accepts.
pub const STATUS_OK: u32 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Metadata only, no body transfer.
    Head,
    /// Full content.
    Get,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Head => "HEAD",
            Method::Get => "GET",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully read response. The body is empty for HEAD.
#[derive(Debug, Clone, Default)]
pub struct Response {
    /// Numeric status code of the final response (after redirects).
    pub code: u32,
    /// Status text such as `"404 Not Found"`.
    pub status: String,
    /// `ETag` with surrounding quotes removed, if the server sent one.
    pub etag: Option<String>,
    pub body: Vec<u8>,
}

impl Response {
    /// A `200 OK` response, mostly for stub transports in tests.
    pub fn ok(body: impl Into<Vec<u8>>, etag: Option<&str>) -> Self {
        Self {
            code: STATUS_OK,
            status: "200 OK".to_string(),
            etag: etag.map(str::to_string),
            body: body.into(),
        }
    }

    pub fn with_status(code: u32, status: impl Into<String>) -> Self {
        Self {
            code,
            status: status.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("{method} {url}: {source}")]
    Transport {
        method: Method,
        url: String,
        source: curl::Error,
    },
    #[error("{method} {url}: {status}")]
    Status {
        method: Method,
        url: String,
        code: u32,
        status: String,
    },
}

impl FetchError {
    /// Status code when the server answered with something other than 200.
    pub fn status_code(&self) -> Option<u32> {
        match self {
            FetchError::Status { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Performs one HTTP request and returns the fully read response.
///
/// Implementations only report transport failures from `request`; status
/// checking is done once in [`Transport::fetch`].
pub trait Transport: Send + Sync {
    fn request(&self, method: Method, url: &str) -> Result<Response, FetchError>;

    /// `request` plus the status check: any code other than 200 is an error.
    fn fetch(&self, method: Method, url: &str) -> Result<Response, FetchError> {
        tracing::debug!("{} {}", method, url);
        let rsp = self.request(method, url)?;
        if rsp.code != STATUS_OK {
            let status = if rsp.status.is_empty() {
                format!("HTTP {}", rsp.code)
            } else {
                rsp.status
            };
            tracing::warn!(
                "failed to {} {}: expected {} from source and got '{}' instead",
                method,
                url,
                STATUS_OK,
                status
            );
            return Err(FetchError::Status {
                method,
                url: url.to_string(),
                code: rsp.code,
                status,
            });
        }
        Ok(rsp)
    }
}
