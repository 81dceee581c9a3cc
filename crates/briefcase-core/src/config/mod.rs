//! Run configuration for pull and push.
//!
//! Values come from `BRIEFCASE_*` environment variables. Front ends may layer
//! their own overrides on top through [`SyncConfig::from_lookup`].

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::mirror::MirrorLayout;
use crate::retry::{
    RetryConfig, DEFAULT_BACKOFF_MULTIPLIER, DEFAULT_INITIAL_DELAY, DEFAULT_MAX_RETRIES,
};
use crate::transport::ServerEndpoints;
use crate::util::normalize_text_option;
use crate::{Error, Result};

pub const ENV_SERVER_URL: &str = "BRIEFCASE_SERVER_URL";
pub const ENV_USERNAME: &str = "BRIEFCASE_USERNAME";
pub const ENV_PASSWORD: &str = "BRIEFCASE_PASSWORD";
pub const ENV_STORAGE_ROOT: &str = "BRIEFCASE_STORAGE_ROOT";
pub const ENV_MAX_RETRIES: &str = "BRIEFCASE_MAX_RETRIES";
pub const ENV_RETRY_DELAY_SECS: &str = "BRIEFCASE_RETRY_DELAY_SECS";
pub const ENV_RETRY_BACKOFF: &str = "BRIEFCASE_RETRY_BACKOFF";
pub const ENV_PAGE_SIZE: &str = "BRIEFCASE_PAGE_SIZE";
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "BRIEFCASE_REQUEST_TIMEOUT_SECS";
pub const ENV_MEDIA_CONCURRENCY: &str = "BRIEFCASE_MEDIA_CONCURRENCY";
pub const ENV_EXCLUDED_PREFIX: &str = "BRIEFCASE_EXCLUDED_PREFIX";

pub const DEFAULT_PAGE_SIZE: u32 = 100;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MEDIA_CONCURRENCY: usize = 1;
/// Form names starting with this prefix are not real forms and are never pulled.
pub const DEFAULT_EXCLUDED_PREFIX: &str = "Crowd/";

/// Account credentials for digest authentication.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Everything one pull or push run needs.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    pub server_url: String,
    pub credentials: Credentials,
    /// Directory holding every account's mirror.
    pub storage_root: PathBuf,
    pub retry: RetryConfig,
    pub page_size: u32,
    pub request_timeout: Duration,
    pub media_concurrency: usize,
    pub excluded_prefix: String,
}

impl SyncConfig {
    /// Load configuration from environment variables.
    ///
    /// Returns `Ok(None)` when none of the required variables are set and an
    /// error naming the missing ones for a partial configuration.
    pub fn from_env() -> Result<Option<Self>> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Option<Self>> {
        parse_config(lookup)
    }

    pub fn endpoints(&self) -> Result<ServerEndpoints> {
        ServerEndpoints::new(&self.server_url)
    }

    /// Mirror layout relative to [`Self::storage_root`].
    pub fn mirror_layout(&self) -> Result<MirrorLayout> {
        MirrorLayout::for_user(&self.credentials.username)
    }

    /// Absolute mirror root of this account.
    pub fn mirror_root(&self) -> Result<PathBuf> {
        Ok(self.storage_root.join(self.mirror_layout()?.root()))
    }
}

/// Platform data directory for briefcase files, `./.briefcase` when unknown.
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir().map_or_else(|| PathBuf::from(".briefcase"), |dir| dir.join("briefcase"))
}

fn parse_config(lookup: impl Fn(&str) -> Option<String>) -> Result<Option<SyncConfig>> {
    let server_url = lookup(ENV_SERVER_URL).map(|value| value.trim().to_string());
    let username = lookup(ENV_USERNAME).map(|value| value.trim().to_string());
    let password = lookup(ENV_PASSWORD);

    if server_url.is_none() && username.is_none() && password.is_none() {
        return Ok(None);
    }

    let mut missing = Vec::new();
    if server_url.as_ref().map_or(true, String::is_empty) {
        missing.push(ENV_SERVER_URL);
    }
    if username.as_ref().map_or(true, String::is_empty) {
        missing.push(ENV_USERNAME);
    }
    if password.as_ref().map_or(true, String::is_empty) {
        missing.push(ENV_PASSWORD);
    }
    let (Some(server_url), Some(username), Some(password), true) =
        (server_url, username, password, missing.is_empty())
    else {
        return Err(Error::Config(format!(
            "briefcase configuration is incomplete. Missing: {}",
            missing.join(", ")
        )));
    };

    // Validates the URL up front so a bad value never reaches the network.
    ServerEndpoints::new(&server_url)?;

    let storage_root = normalize_text_option(lookup(ENV_STORAGE_ROOT))
        .map_or_else(default_data_dir, PathBuf::from);

    let max_retries = parse_value(&lookup, ENV_MAX_RETRIES, i64::from(DEFAULT_MAX_RETRIES))?;
    let delay_secs = parse_value(
        &lookup,
        ENV_RETRY_DELAY_SECS,
        DEFAULT_INITIAL_DELAY.as_secs_f64(),
    )?;
    let backoff = parse_value(&lookup, ENV_RETRY_BACKOFF, DEFAULT_BACKOFF_MULTIPLIER)?;
    let retry = RetryConfig::new(max_retries, seconds(ENV_RETRY_DELAY_SECS, delay_secs)?, backoff)?;

    let page_size = parse_value(&lookup, ENV_PAGE_SIZE, DEFAULT_PAGE_SIZE)?;
    if page_size == 0 {
        return Err(Error::Config(format!("{ENV_PAGE_SIZE} must be at least 1")));
    }

    let timeout_secs = parse_value(
        &lookup,
        ENV_REQUEST_TIMEOUT_SECS,
        DEFAULT_REQUEST_TIMEOUT.as_secs_f64(),
    )?;
    let request_timeout = seconds(ENV_REQUEST_TIMEOUT_SECS, timeout_secs)?;

    let media_concurrency = parse_value(&lookup, ENV_MEDIA_CONCURRENCY, DEFAULT_MEDIA_CONCURRENCY)?;
    if media_concurrency == 0 {
        return Err(Error::Config(format!(
            "{ENV_MEDIA_CONCURRENCY} must be at least 1"
        )));
    }

    // An explicitly empty prefix disables the exclusion.
    let excluded_prefix = lookup(ENV_EXCLUDED_PREFIX)
        .map_or_else(|| DEFAULT_EXCLUDED_PREFIX.to_string(), |value| value.trim().to_string());

    Ok(Some(SyncConfig {
        server_url,
        credentials: Credentials::new(username, password),
        storage_root,
        retry,
        page_size,
        request_timeout,
        media_concurrency,
        excluded_prefix,
    }))
}

fn parse_value<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    let Some(raw) = normalize_text_option(lookup(key)) else {
        return Ok(default);
    };
    raw.parse()
        .map_err(|error| Error::Config(format!("{key} has invalid value {raw:?}: {error}")))
}

fn seconds(key: &str, value: f64) -> Result<Duration> {
    if !value.is_finite() || value <= 0.0 {
        return Err(Error::Config(format!(
            "{key} must be a positive number of seconds (got {value})"
        )));
    }
    Duration::try_from_secs_f64(value)
        .map_err(|error| Error::Config(format!("{key} is out of range: {error}")))
}
