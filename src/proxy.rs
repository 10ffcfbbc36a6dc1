//! Proxy fallback.
//!
//! Requests that match no endpoint are sent to a single upstream origin and
//! the upstream response is relayed unchanged: status, every header value,
//! and the body byte for byte. Upstream error statuses are not failures.

use crate::config::parse_proxy_origin;
use crate::error::{ConfigError, ProxyError};
use axum::body::{Body, Bytes};
use axum::http::header::{CONTENT_LENGTH, HOST, TRANSFER_ENCODING};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Overall deadline for one proxied exchange.
pub const PROXY_DEADLINE: Duration = Duration::from_secs(60);
/// Send/receive timeout of the underlying client.
pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

/// Forwards unmatched requests to the configured upstream.
#[derive(Debug, Clone)]
pub struct ProxyForwarder {
    origin: Url,
    client: reqwest::Client,
    deadline: Duration,
}

/// Fully read upstream response.
#[derive(Debug)]
pub struct ProxiedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl IntoResponse for ProxiedResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

impl ProxyForwarder {
    /// Create a forwarder for a `proxy_pass` origin.
    pub fn new(origin: &str) -> Result<Self, ConfigError> {
        Self::with_timeouts(origin, CLIENT_TIMEOUT, PROXY_DEADLINE)
    }

    /// Create a forwarder with explicit client timeout and overall deadline.
    pub fn with_timeouts(
        origin: &str,
        client_timeout: Duration,
        deadline: Duration,
    ) -> Result<Self, ConfigError> {
        let origin = parse_proxy_origin(origin)?;
        let client = reqwest::Client::builder()
            .timeout(client_timeout)
            .build()
            .map_err(ConfigError::ProxyClient)?;

        Ok(Self {
            origin,
            client,
            deadline,
        })
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    /// Upstream URL for a request target: the origin's scheme, host and port
    /// followed by the request's path and query.
    pub fn target_url(&self, path_and_query: &str) -> String {
        format!(
            "{}{}",
            self.origin.origin().ascii_serialization(),
            path_and_query
        )
    }

    /// Send the request upstream and read the full response.
    ///
    /// The request body is streamed to the upstream as it arrives.
    pub async fn forward(
        &self,
        method: Method,
        path_and_query: &str,
        headers: &HeaderMap,
        body: Body,
    ) -> Result<ProxiedResponse, ProxyError> {
        let url = self.target_url(path_and_query);

        // The client sets these for the upstream connection and body.
        let mut headers = headers.clone();
        for name in [HOST, CONTENT_LENGTH, TRANSFER_ENCODING] {
            headers.remove(name);
        }

        let request = self
            .client
            .request(method, &url)
            .headers(headers)
            .body(reqwest::Body::wrap_stream(body.into_data_stream()))
            .build()
            .map_err(|source| ProxyError::Build {
                url: url.clone(),
                source,
            })?;

        debug!(url = %url, method = %request.method(), "Forwarding request upstream");

        let exchange = async {
            let response = self
                .client
                .execute(request)
                .await
                .map_err(|source| ProxyError::Connect {
                    url: url.clone(),
                    source,
                })?;

            let status = response.status();
            let headers = response.headers().clone();
            let body = response
                .bytes()
                .await
                .map_err(|source| ProxyError::ResponseBody {
                    url: url.clone(),
                    source,
                })?;

            Ok::<_, ProxyError>(ProxiedResponse {
                status,
                headers,
                body,
            })
        };

        match tokio::time::timeout(self.deadline, exchange).await {
            Ok(result) => result,
            Err(_) => Err(ProxyError::Timeout { url }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_target_url_replaces_origin_only() {
        let proxy = ProxyForwarder::new("http://upstream.example").unwrap();
        assert_eq!(proxy.target_url("/unknown"), "http://upstream.example/unknown");
        assert_eq!(
            proxy.target_url("/search?q=a&b=c"),
            "http://upstream.example/search?q=a&b=c"
        );

        let proxy = ProxyForwarder::new("https://upstream.example:8443/ignored/path").unwrap();
        assert_eq!(proxy.target_url("/x"), "https://upstream.example:8443/x");
    }

    #[test]
    fn test_rejects_invalid_origin() {
        assert!(matches!(
            ProxyForwarder::new("upstream.example"),
            Err(ConfigError::InvalidProxyPass { .. })
        ));
    }

    #[test]
    fn test_proxied_response_keeps_multi_valued_headers() {
        let mut headers = HeaderMap::new();
        headers.append("set-cookie", HeaderValue::from_static("a=1"));
        headers.append("set-cookie", HeaderValue::from_static("b=2"));

        let response = ProxiedResponse {
            status: StatusCode::IM_A_TEAPOT,
            headers,
            body: Bytes::from_static(b"short and stout"),
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
        let cookies: Vec<_> = response.headers().get_all("set-cookie").iter().collect();
        assert_eq!(cookies, vec!["a=1", "b=2"]);
    }

    #[tokio::test]
    async fn test_connection_failure_is_an_error() {
        // Nothing listens on port 1 on loopback.
        let proxy = ProxyForwarder::new("http://127.0.0.1:1").unwrap();
        let err = proxy
            .forward(Method::GET, "/", &HeaderMap::new(), Body::empty())
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::Connect { .. }));
        assert!(!err.is_timeout());
    }
}
