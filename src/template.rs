//! Template rendering for stub responses.
//!
//! Templates are text files containing JSON with `<tag>` placeholders. Each
//! tag is resolved against the endpoint's variables in this order:
//!
//! 1. `env_var`: read from the process environment, missing is an error
//! 2. `value`: substituted verbatim
//! 3. `header`: read from the request, missing renders as an empty string
//!
//! Rendering without a request (startup validation) treats every header as
//! missing.

use crate::config::{env_value, Endpoint};
use crate::error::RenderError;
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use base64::Engine;
use tracing::{debug, warn};

/// Synthetic header carrying the Basic auth username.
pub const AUTH_USERNAME_HEADER: &str = "authorization_username";
/// Synthetic header carrying the Basic auth password.
pub const AUTH_PASSWORD_HEADER: &str = "authorization_password";

const TAG_START: char = '<';
const TAG_END: char = '>';

#[derive(Debug, PartialEq)]
enum Segment<'a> {
    Text(&'a str),
    Tag(&'a str),
}

/// Split a template into text and tags. Returns the byte offset of an
/// unterminated tag on failure.
fn parse(source: &str) -> Result<Vec<Segment<'_>>, usize> {
    let mut segments = Vec::new();
    let mut rest = source;
    let mut offset = 0;

    while let Some(start) = rest.find(TAG_START) {
        if start > 0 {
            segments.push(Segment::Text(&rest[..start]));
        }
        let after = &rest[start + 1..];
        let end = after.find(TAG_END).ok_or(offset + start)?;
        segments.push(Segment::Tag(&after[..end]));

        let consumed = start + 1 + end + 1;
        offset += consumed;
        rest = &rest[consumed..];
    }

    if !rest.is_empty() {
        segments.push(Segment::Text(rest));
    }
    Ok(segments)
}

/// Render an endpoint's template.
///
/// The file is read on every call. `request` is the live request's headers,
/// or `None` during startup validation.
pub fn render(endpoint: &Endpoint, request: Option<&HeaderMap>) -> Result<String, RenderError> {
    let template = endpoint.template_path().unwrap_or_default();
    let source = std::fs::read_to_string(template).map_err(|source| RenderError::FileUnreadable {
        template: template.to_string(),
        source,
    })?;

    let headers = request.map(header_variables);
    render_source(&source, template, endpoint, headers.as_ref())
}

fn render_source(
    source: &str,
    template: &str,
    endpoint: &Endpoint,
    headers: Option<&HeaderMap>,
) -> Result<String, RenderError> {
    let segments = parse(source).map_err(|offset| RenderError::UnterminatedTag {
        template: template.to_string(),
        offset,
    })?;

    let mut rendered = String::with_capacity(source.len());
    for segment in segments {
        match segment {
            Segment::Text(text) => rendered.push_str(text),
            Segment::Tag(tag) => rendered.push_str(&resolve(tag, template, endpoint, headers)?),
        }
    }
    Ok(rendered)
}

fn resolve(
    tag: &str,
    template: &str,
    endpoint: &Endpoint,
    headers: Option<&HeaderMap>,
) -> Result<String, RenderError> {
    for variable in endpoint.variables.iter().filter(|v| v.name == tag) {
        if let Some(env_var) = variable.env_var_name() {
            return env_value(env_var).ok_or_else(|| RenderError::MissingEnvVar {
                env_var: env_var.to_string(),
                template: template.to_string(),
                uri: endpoint.uri.clone(),
            });
        }

        if let Some(value) = variable.literal_value() {
            return Ok(value.to_string());
        }

        if let Some(header) = variable.header_name() {
            if let Some(value) = headers.and_then(|h| header_value(h, header)) {
                return Ok(value);
            }
            // Headers only exist at request time, so a miss is not an error.
            if headers.is_some() {
                warn!(
                    header = %header,
                    template = %template,
                    uri = %endpoint.uri,
                    "HTTP header not found for template"
                );
            } else {
                debug!(header = %header, template = %template, "No request, header tag left empty");
            }
            return Ok(String::new());
        }
    }

    Err(RenderError::UnknownTag {
        tag: tag.to_string(),
        template: template.to_string(),
        uri: endpoint.uri.clone(),
    })
}

/// Case-insensitive header lookup; first value wins, empty counts as absent.
fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
        .filter(|value| !value.is_empty())
}

/// Request headers plus the synthetic Basic auth credential headers.
pub fn header_variables(headers: &HeaderMap) -> HeaderMap {
    let mut variables = headers.clone();
    if let Some((username, password)) = basic_credentials(headers) {
        for (name, value) in [
            (AUTH_USERNAME_HEADER, username),
            (AUTH_PASSWORD_HEADER, password),
        ] {
            if let Ok(value) = HeaderValue::from_str(&value) {
                variables.insert(HeaderName::from_static(name), value);
            }
        }
    }
    variables
}

/// Decode `Authorization: Basic ...` into username and password.
pub fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }

    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

/// Whether `text` is a single well-formed JSON value.
pub fn is_json(text: &str) -> bool {
    serde_json::from_str::<serde::de::IgnoredAny>(text).is_ok()
}
