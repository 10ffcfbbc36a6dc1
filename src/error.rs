//! Error types.
//!
//! Startup failures surface as [`ConfigError`] and are fatal. Everything else
//! is request-scoped and ends up as a generic 5xx response with the details
//! logged.

use std::path::PathBuf;
use thiserror::Error;

/// Configuration could not be loaded or failed validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read config file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to parse config file {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },

    #[error("endpoint #{index} must include uri, e.g. /example")]
    MissingUri { index: usize },

    #[error("endpoint {uri} must include response_code, e.g. 200")]
    MissingResponseCode { uri: String },

    #[error("invalid response_code ({code}) for endpoint {uri}")]
    InvalidResponseCode { uri: String, code: u16 },

    #[error("invalid HTTP method ({method}) for endpoint {uri}. Allowed: {allowed:?}")]
    InvalidMethod {
        uri: String,
        method: String,
        allowed: &'static [&'static str],
    },

    #[error("invalid endpoint type ({kind}) for endpoint {uri}. Allowed: {allowed:?}")]
    InvalidType {
        uri: String,
        kind: String,
        allowed: &'static [&'static str],
    },

    #[error("invalid regex uri for endpoint {uri}: {source}")]
    InvalidPattern {
        uri: String,
        #[source]
        source: regex::Error,
    },

    #[error("unable to render template {template} of endpoint {uri}: {source}")]
    Template {
        uri: String,
        template: String,
        #[source]
        source: RenderError,
    },

    #[error("rendering template {template} of endpoint {uri} returns invalid JSON: {rendered}")]
    TemplateNotJson {
        uri: String,
        template: String,
        rendered: String,
    },

    #[error("invalid proxy_pass URL {url}: {reason}")]
    InvalidProxyPass { url: String, reason: String },

    #[error("unable to build proxy client: {0}")]
    ProxyClient(#[source] reqwest::Error),
}

/// Template rendering failed.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("unable to read template {template}: {source}")]
    FileUnreadable {
        template: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to parse template {template}: tag opened at byte {offset} is never closed")]
    UnterminatedTag { template: String, offset: usize },

    #[error("env variable {env_var} not found for template {template} of endpoint {uri}")]
    MissingEnvVar {
        env_var: String,
        template: String,
        uri: String,
    },

    #[error("no matching variable found for tag {tag} in template {template} of endpoint {uri}")]
    UnknownTag {
        tag: String,
        template: String,
        uri: String,
    },
}

/// Endpoint lookup did not produce an endpoint.
#[derive(Debug, Error)]
pub enum MatchError {
    #[error("no matching endpoint found")]
    NotFound,

    #[error("uri pattern {uri} does not compile: {source}")]
    InvalidPattern {
        uri: String,
        #[source]
        source: regex::Error,
    },
}

/// Forwarding to the upstream origin failed.
///
/// Upstream responses with error statuses are not errors; they are relayed.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("error creating a proxyable request for {url}: {source}")]
    Build {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("error connecting to proxied destination {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("proxied request to {url} timed out")]
    Timeout { url: String },

    #[error("error reading proxied response body from {url}: {source}")]
    ResponseBody {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl ProxyError {
    /// Whether the failure was a deadline or client timeout.
    pub fn is_timeout(&self) -> bool {
        match self {
            ProxyError::Timeout { .. } => true,
            ProxyError::Connect { source, .. } | ProxyError::ResponseBody { source, .. } => {
                source.is_timeout()
            }
            _ => false,
        }
    }
}
