//! HTTP transport seam between the sync engine and the server.

mod digest;
mod http;

use async_trait::async_trait;
use url::Url;

use crate::util::{is_http_url, normalize_text_option};
use crate::{Error, Result};

pub use digest::{DigestAlgorithm, DigestChallenge};
pub use http::HttpTransport;

/// Request methods used by the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Head,
}

impl HttpMethod {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
        }
    }
}

/// One outgoing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportRequest {
    pub method: HttpMethod,
    pub url: String,
    pub query: Vec<(String, String)>,
    /// Whether the account credentials may be sent with this request.
    pub authenticated: bool,
}

impl TransportRequest {
    /// Authenticated `GET`.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            query: Vec::new(),
            authenticated: true,
        }
    }

    /// Authenticated `HEAD`.
    pub fn head(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Head,
            ..Self::get(url)
        }
    }

    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Drop credentials, e.g. for a pre-signed redirect target.
    #[must_use]
    pub const fn anonymous(mut self) -> Self {
        self.authenticated = false;
        self
    }

    /// Full URL with the query pairs appended.
    pub fn resolved_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.url)
            .map_err(|error| Error::Transport(format!("invalid URL {}: {error}", self.url)))?;
        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&self.query);
        }
        Ok(url)
    }
}

/// Response status, redirect target and body of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub location: Option<String>,
    pub body: Vec<u8>,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            location: None,
            body: body.into(),
        }
    }

    pub fn redirect(status: u16, location: impl Into<String>) -> Self {
        Self {
            status,
            location: Some(location.into()),
            body: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Redirect status carrying a usable `Location`.
    pub fn redirect_target(&self) -> Option<&str> {
        if (300..400).contains(&self.status) {
            self.location.as_deref().filter(|location| !location.is_empty())
        } else {
            None
        }
    }
}

/// Sends requests to the server.
///
/// Implementations authenticate requests flagged `authenticated` and must not
/// attach any credentials to the others. Redirects are returned, not followed.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse>;
}

/// Well-known endpoints below the server base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEndpoints {
    base: Url,
}

impl ServerEndpoints {
    pub fn new(base_url: &str) -> Result<Self> {
        let base = normalize_text_option(Some(base_url.to_string()))
            .ok_or_else(|| Error::Config("server URL must not be empty".to_string()))?;
        if !is_http_url(&base) {
            return Err(Error::Config(
                "server URL must include http:// or https://".to_string(),
            ));
        }
        let base = format!("{}/", base.trim_end_matches('/'));
        let base = Url::parse(&base)
            .map_err(|error| Error::Config(format!("invalid server URL {base}: {error}")))?;
        Ok(Self { base })
    }

    pub fn base(&self) -> &str {
        self.base.as_str()
    }

    pub fn form_list(&self) -> String {
        self.join("formList")
    }

    pub fn submission_list(&self) -> String {
        self.join("view/submissionList")
    }

    pub fn download_submission(&self) -> String {
        self.join("view/downloadSubmission")
    }

    fn join(&self, path: &str) -> String {
        // Joining a relative path onto a base ending in `/` cannot fail.
        self.base
            .join(path)
            .map_or_else(|_| format!("{}{path}", self.base), String::from)
    }
}
