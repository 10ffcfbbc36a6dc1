//! Exchange logging.
//!
//! Every request produces one access line when its response is chosen, plus
//! optional body dumps. Stub response bodies are logged with configured
//! secrets masked; the response sent to the client is never altered.

use crate::config::Variable;
use crate::template::is_json;
use axum::extract::{ConnectInfo, Request};
use axum::http::header::USER_AGENT;
use axum::http::{Method, Version};
use axum::response::Response;
use std::net::{IpAddr, SocketAddr};
use tracing::info;

const MASK: char = '*';

/// Request-scoped log record, carried through the dispatch pipeline.
#[derive(Debug)]
pub struct Exchange {
    client: Option<IpAddr>,
    method: Method,
    uri: String,
    version: Version,
    user_agent: String,
    proxied: bool,
    request_body: Option<String>,
    response_body: Option<LoggedBody>,
}

#[derive(Debug)]
struct LoggedBody {
    text: String,
    json: bool,
}

impl Exchange {
    /// Capture what the access line needs from the incoming request.
    pub fn new(request: &Request) -> Self {
        let client = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());
        let uri = request
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| request.uri().to_string());
        let user_agent = request
            .headers()
            .get(USER_AGENT)
            .map(|ua| String::from_utf8_lossy(ua.as_bytes()).into_owned())
            .unwrap_or_default();

        Self {
            client,
            method: request.method().clone(),
            uri,
            version: request.version(),
            user_agent,
            proxied: false,
            request_body: None,
            response_body: None,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Request target as received, query string included.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn mark_proxied(&mut self) {
        self.proxied = true;
    }

    /// Pretty-printed JSON request body.
    pub fn set_request_body(&mut self, body: String) {
        self.request_body = Some(body);
    }

    /// Stub response body, masked against `variables` before storing.
    pub fn set_stub_body(&mut self, body: &str, variables: &[Variable]) {
        self.response_body = Some(LoggedBody {
            text: redact(body, variables),
            json: true,
        });
    }

    /// Upstream response body, stored as-is.
    pub fn set_proxied_body(&mut self, body: &[u8]) {
        let text = String::from_utf8_lossy(body).into_owned();
        let json = is_json(&text);
        self.response_body = Some(LoggedBody { text, json });
    }

    /// Log the exchange and hand back the response unchanged.
    pub fn respond(self, response: Response) -> Response {
        let client = self
            .client
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| "-".to_string());

        info!(
            client = %client,
            method = %self.method,
            uri = %self.uri,
            protocol = ?self.version,
            status = response.status().as_u16(),
            user_agent = %self.user_agent,
            proxied = self.proxied,
            "request served"
        );

        if let Some(body) = &self.request_body {
            info!(method = %self.method, uri = %self.uri, "Request body:\n{}", body);
        }
        if let Some(body) = &self.response_body {
            info!(
                method = %self.method,
                uri = %self.uri,
                json = body.json,
                "Response body:\n{}",
                body.text
            );
        }

        response
    }
}

/// Replace every occurrence of each variable's secret with `*`.
///
/// The mask has one `*` per `char` of the secret, not per byte, so
/// `héllo` becomes `*****`.
pub fn redact(text: &str, variables: &[Variable]) -> String {
    variables
        .iter()
        .filter_map(Variable::secret)
        .fold(text.to_string(), |text, secret| {
            let mask: String = std::iter::repeat(MASK).take(secret.chars().count()).collect();
            text.replace(&secret, &mask)
        })
}

/// Re-indent a JSON document with two spaces, keeping key order.
pub fn pretty_json(body: &[u8]) -> Result<String, serde_json::Error> {
    let value: serde_json::Value = serde_json::from_slice(body)?;
    serde_json::to_string_pretty(&value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    #[test]
    fn test_redact_literal_values() {
        let variables = vec![
            Variable::literal("password", "hunter2"),
            Variable::header("user", "X-User"),
        ];
        let body = r#"{"password": "hunter2", "again": "xhunter2x", "user": "alice"}"#;
        assert_eq!(
            redact(body, &variables),
            r#"{"password": "*******", "again": "x*******x", "user": "alice"}"#
        );
    }

    #[test]
    fn test_redact_env_values() {
        std::env::set_var("HTTP_MOCKERY_TEST_REDACT_TOKEN", "tok-123");
        let variables = vec![Variable::env("token", "HTTP_MOCKERY_TEST_REDACT_TOKEN")];
        assert_eq!(
            redact(r#"{"token": "tok-123"}"#, &variables),
            r#"{"token": "*******"}"#
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_redact_env_values_with_invalid_utf8() {
        use crate::config::Endpoint;
        use std::ffi::OsStr;
        use std::io::Write;
        use std::os::unix::ffi::OsStrExt;

        std::env::set_var(
            "HTTP_MOCKERY_TEST_REDACT_BINARY",
            OsStr::from_bytes(b"topsecret\xff"),
        );
        let mut template = tempfile::NamedTempFile::new().unwrap();
        template.write_all(br#"{"t": "<t>"}"#).unwrap();
        let endpoint = Endpoint {
            uri: "/binary".to_string(),
            kind: "normal".to_string(),
            method: "GET".to_string(),
            response_code: 200,
            template: Some(template.path().to_string_lossy().into_owned()),
            variables: vec![Variable::env("t", "HTTP_MOCKERY_TEST_REDACT_BINARY")],
        };

        let rendered = crate::template::render(&endpoint, None).unwrap();
        assert_eq!(rendered, "{\"t\": \"topsecret\u{FFFD}\"}");
        assert_eq!(
            redact(&rendered, &endpoint.variables),
            r#"{"t": "**********"}"#
        );
    }

    #[test]
    fn test_redact_counts_characters() {
        let variables = vec![Variable::literal("word", "héllo")];
        assert_eq!(redact("say héllo", &variables), "say *****");
    }

    #[test]
    fn test_redact_without_secrets_is_identity() {
        let body = r#"{"a": 1}"#;
        assert_eq!(redact(body, &[]), body);
        assert_eq!(redact(body, &[Variable::header("a", "X-A")]), body);
    }

    #[test]
    fn test_pretty_json_keeps_key_order() {
        let pretty = pretty_json(br#"{"z": 1, "a": [true, null]}"#).unwrap();
        assert_eq!(pretty, "{\n  \"z\": 1,\n  \"a\": [\n    true,\n    null\n  ]\n}");
        assert!(pretty_json(b"not json").is_err());
    }

    #[test]
    fn test_exchange_captures_request_line() {
        let request = axum::http::Request::builder()
            .method(Method::POST)
            .uri("/resource?id=7")
            .header(USER_AGENT, "curl/8.0")
            .body(Body::empty())
            .unwrap();

        let mut exchange = Exchange::new(&request);
        assert_eq!(exchange.method(), &Method::POST);
        assert_eq!(exchange.uri(), "/resource?id=7");
        assert_eq!(exchange.user_agent, "curl/8.0");
        assert!(exchange.client.is_none());

        exchange.set_stub_body(r#"{"secret": "abc"}"#, &[Variable::literal("s", "abc")]);
        let logged = exchange.response_body.as_ref().unwrap();
        assert_eq!(logged.text, r#"{"secret": "***"}"#);

        let response = exchange.respond((StatusCode::CREATED, "abc").into_response());
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    #[test]
    fn test_proxied_body_json_detection() {
        let request = axum::http::Request::builder().uri("/").body(Body::empty()).unwrap();
        let mut exchange = Exchange::new(&request);

        exchange.set_proxied_body(b"<html></html>");
        assert!(!exchange.response_body.as_ref().unwrap().json);

        exchange.set_proxied_body(br#"{"ok": true}"#);
        assert!(exchange.response_body.as_ref().unwrap().json);
    }
}
