//! `reqwest`-backed transport with digest authentication.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderValue, AUTHORIZATION, LOCATION, WWW_AUTHENTICATE};
use reqwest::{redirect, Client, Method, StatusCode};
use url::{Position, Url};

use super::digest::DigestChallenge;
use super::{HttpMethod, Transport, TransportRequest, TransportResponse};
use crate::config::Credentials;
use crate::{Error, Result};

#[derive(Debug)]
struct DigestSession {
    challenge: DigestChallenge,
    nonce_count: u32,
}

/// Transport talking to a live server.
///
/// Redirects are never followed so the caller can decide whether the target
/// should see credentials. The last digest challenge is reused until the
/// server rejects it.
#[derive(Debug)]
pub struct HttpTransport {
    client: Client,
    credentials: Option<Credentials>,
    session: Mutex<Option<DigestSession>>,
}

impl HttpTransport {
    pub fn new(credentials: Option<Credentials>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .redirect(redirect::Policy::none())
            .timeout(timeout)
            .user_agent(concat!("briefcase/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            credentials,
            session: Mutex::new(None),
        })
    }

    fn session(&self) -> MutexGuard<'_, Option<DigestSession>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Authorization header from the cached challenge, if any.
    fn cached_authorization(&self, method: HttpMethod, url: &Url) -> Option<String> {
        let credentials = self.credentials.as_ref()?;
        let mut session = self.session();
        let session = session.as_mut()?;
        session.nonce_count = session.nonce_count.wrapping_add(1);
        Some(session.challenge.authorization(
            credentials,
            method.as_str(),
            &url[Position::BeforePath..],
            session.nonce_count,
            &new_cnonce(),
        ))
    }

    /// Store a fresh challenge and build the header for its first use.
    fn answer_challenge(
        &self,
        challenge: DigestChallenge,
        method: HttpMethod,
        url: &Url,
    ) -> Option<String> {
        let credentials = self.credentials.as_ref()?;
        let header = challenge.authorization(
            credentials,
            method.as_str(),
            &url[Position::BeforePath..],
            1,
            &new_cnonce(),
        );
        *self.session() = Some(DigestSession {
            challenge,
            nonce_count: 1,
        });
        Some(header)
    }

    async fn execute(
        &self,
        method: HttpMethod,
        url: &Url,
        authorization: Option<&str>,
    ) -> Result<reqwest::Response> {
        let method = match method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Head => Method::HEAD,
        };
        let mut builder = self.client.request(method, url.clone());
        if let Some(authorization) = authorization {
            let value = HeaderValue::from_str(authorization)
                .map_err(|error| Error::Transport(format!("invalid authorization header: {error}")))?;
            builder = builder.header(AUTHORIZATION, value);
        }
        Ok(builder.send().await?)
    }
}

fn new_cnonce() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

fn digest_challenge(response: &reqwest::Response) -> Option<DigestChallenge> {
    response
        .headers()
        .get_all(WWW_AUTHENTICATE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(DigestChallenge::parse)
}

async fn into_transport_response(response: reqwest::Response) -> Result<TransportResponse> {
    let status = response.status().as_u16();
    let location = response
        .headers()
        .get(LOCATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let body = response.bytes().await?.to_vec();
    Ok(TransportResponse {
        status,
        location,
        body,
    })
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse> {
        let url = request.resolved_url()?;
        let authenticate = request.authenticated && self.credentials.is_some();

        let authorization = if authenticate {
            self.cached_authorization(request.method, &url)
        } else {
            None
        };
        let response = self
            .execute(request.method, &url, authorization.as_deref())
            .await?;

        if authenticate && response.status() == StatusCode::UNAUTHORIZED {
            if let Some(challenge) = digest_challenge(&response) {
                tracing::debug!(url = %url, "answering digest challenge");
                if let Some(authorization) = self.answer_challenge(challenge, request.method, &url) {
                    let retried = self
                        .execute(request.method, &url, Some(&authorization))
                        .await?;
                    return into_transport_response(retried).await;
                }
            }
        }

        into_transport_response(response).await
    }
}
