//! Configuration for the mock server.
//!
//! Defines the listener, logging toggles, the optional proxy fallback origin
//! and the ordered endpoint list. Endpoint order matters: the first endpoint
//! that matches a request wins.

use crate::error::ConfigError;
use crate::template;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

/// HTTP methods an endpoint may declare.
pub const ALLOWED_METHODS: &[&str] = &["GET", "POST", "PUT", "DELETE", "PATCH"];

/// Endpoint types an endpoint may declare.
pub const ALLOWED_TYPES: &[&str] = &[ENDPOINT_TYPE_NORMAL, ENDPOINT_TYPE_REGEX];

pub const ENDPOINT_TYPE_NORMAL: &str = "normal";
pub const ENDPOINT_TYPE_REGEX: &str = "regex";

const DEFAULT_LISTEN_IP: &str = "0.0.0.0";
const DEFAULT_LISTEN_PORT: u16 = 8080;

/// Main configuration for the mock server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Address to listen on
    #[serde(default = "default_listen_ip")]
    pub listen_ip: String,

    /// Port to listen on
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Upstream origin for requests that match no endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_pass: Option<String>,

    /// Body logging toggles
    #[serde(default)]
    pub logging: Logging,

    /// Endpoint definitions, in match order
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
}

fn default_listen_ip() -> String {
    DEFAULT_LISTEN_IP.to_string()
}

fn default_listen_port() -> u16 {
    DEFAULT_LISTEN_PORT
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_ip: default_listen_ip(),
            listen_port: default_listen_port(),
            proxy_pass: None,
            logging: Logging::default(),
            endpoints: Vec::new(),
        }
    }
}

/// Values that take precedence over the config file (CLI flags or
/// environment variables).
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub listen_ip: Option<String>,
    pub listen_port: Option<u16>,
    pub log_request_contents: Option<bool>,
    pub log_response_contents: Option<bool>,
}

impl Config {
    /// Load configuration from a file.
    ///
    /// `.yaml`/`.yml` files are read as YAML, anything else as JSON.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let is_yaml = matches!(
            path.extension().and_then(|ext| ext.to_str()),
            Some("yaml") | Some("yml")
        );
        let parsed = if is_yaml {
            Self::from_yaml(&content).map_err(|e| e.to_string())
        } else {
            Self::from_json(&content).map_err(|e| e.to_string())
        };

        parsed.map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })
    }

    /// Parse configuration from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Apply overrides on top of the file values.
    pub fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(ip) = &overrides.listen_ip {
            self.listen_ip = ip.clone();
        }
        if let Some(port) = overrides.listen_port {
            self.listen_port = port;
        }
        if let Some(enabled) = overrides.log_request_contents {
            self.logging.request_contents = enabled;
        }
        if let Some(enabled) = overrides.log_response_contents {
            self.logging.response_contents = enabled;
        }
    }

    /// `ip:port` to bind, falling back to defaults for empty values.
    pub fn listen_address(&self) -> String {
        let ip = if self.listen_ip.is_empty() {
            DEFAULT_LISTEN_IP
        } else {
            self.listen_ip.as_str()
        };
        let port = if self.listen_port == 0 {
            DEFAULT_LISTEN_PORT
        } else {
            self.listen_port
        };
        format!("{}:{}", ip, port)
    }

    /// Configured proxy origin, if any.
    pub fn proxy_origin(&self) -> Option<&str> {
        self.proxy_pass.as_deref().filter(|url| !url.is_empty())
    }

    /// Validate the configuration.
    ///
    /// Stops at the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(url) = self.proxy_origin() {
            parse_proxy_origin(url)?;
        }

        for (index, endpoint) in self.endpoints.iter().enumerate() {
            endpoint.validate(index)?;
        }
        Ok(())
    }
}

/// Parse a `proxy_pass` value into an absolute http(s) origin.
pub fn parse_proxy_origin(raw: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidProxyPass {
        url: raw.to_string(),
        reason,
    };

    let url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme {}", url.scheme())));
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host".to_string()));
    }
    Ok(url)
}

/// Body logging toggles.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Logging {
    /// Log JSON request bodies
    #[serde(default)]
    pub request_contents: bool,

    /// Log response bodies (secrets redacted)
    #[serde(default)]
    pub response_contents: bool,
}

/// How an endpoint's `uri` is compared against the request URI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// Byte-exact comparison
    Literal,
    /// Regular expression search
    Pattern,
}

impl MatchKind {
    /// Parse an endpoint `type` value, ignoring case.
    pub fn parse(kind: &str) -> Option<Self> {
        if kind.eq_ignore_ascii_case(ENDPOINT_TYPE_NORMAL) {
            Some(MatchKind::Literal)
        } else if kind.eq_ignore_ascii_case(ENDPOINT_TYPE_REGEX) {
            Some(MatchKind::Pattern)
        } else {
            None
        }
    }
}

/// A single stub endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Request URI (literal) or pattern (regex)
    #[serde(default)]
    pub uri: String,

    /// `normal` or `regex`
    #[serde(rename = "type", default = "default_endpoint_type")]
    pub kind: String,

    /// HTTP method
    #[serde(default)]
    pub method: String,

    /// Status code to respond with
    #[serde(default)]
    pub response_code: u16,

    /// Path to the response template
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,

    /// Values for template tags
    #[serde(default)]
    pub variables: Vec<Variable>,
}

fn default_endpoint_type() -> String {
    ENDPOINT_TYPE_NORMAL.to_string()
}

impl Endpoint {
    /// Parsed match kind, `None` when `type` is not an allowed value.
    pub fn match_kind(&self) -> Option<MatchKind> {
        MatchKind::parse(&self.kind)
    }

    /// Template path, if one is configured.
    pub fn template_path(&self) -> Option<&str> {
        self.template.as_deref().filter(|path| !path.is_empty())
    }

    /// Validate the endpoint. `index` identifies it when the uri is missing.
    pub fn validate(&self, index: usize) -> Result<(), ConfigError> {
        if self.uri.is_empty() {
            return Err(ConfigError::MissingUri { index });
        }

        if self.response_code == 0 {
            return Err(ConfigError::MissingResponseCode {
                uri: self.uri.clone(),
            });
        }
        if !(100..=599).contains(&self.response_code) {
            return Err(ConfigError::InvalidResponseCode {
                uri: self.uri.clone(),
                code: self.response_code,
            });
        }

        let method = self.method.to_uppercase();
        if !ALLOWED_METHODS.contains(&method.as_str()) {
            return Err(ConfigError::InvalidMethod {
                uri: self.uri.clone(),
                method: self.method.clone(),
                allowed: ALLOWED_METHODS,
            });
        }

        match self.match_kind() {
            None => {
                return Err(ConfigError::InvalidType {
                    uri: self.uri.clone(),
                    kind: self.kind.clone(),
                    allowed: ALLOWED_TYPES,
                });
            }
            Some(MatchKind::Pattern) => {
                Regex::new(&self.uri).map_err(|source| ConfigError::InvalidPattern {
                    uri: self.uri.clone(),
                    source,
                })?;
            }
            Some(MatchKind::Literal) => {}
        }

        if let Some(path) = self.template_path() {
            let rendered =
                template::render(self, None).map_err(|source| ConfigError::Template {
                    uri: self.uri.clone(),
                    template: path.to_string(),
                    source,
                })?;

            if !template::is_json(&rendered) {
                return Err(ConfigError::TemplateNotJson {
                    uri: self.uri.clone(),
                    template: path.to_string(),
                    rendered,
                });
            }
        }

        Ok(())
    }
}

/// A template variable and where its value comes from.
///
/// When several sources are set, `env_var` wins over `value`, which wins
/// over `header`. Empty strings count as unset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    /// Tag name, used as `<name>` in the template
    pub name: String,

    /// Environment variable to read
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_var: Option<String>,

    /// Literal value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    /// Request header to read
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,
}

impl Variable {
    /// A variable with a literal value.
    pub fn literal(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
            ..Self::default()
        }
    }

    /// A variable read from the process environment.
    pub fn env(name: impl Into<String>, env_var: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            env_var: Some(env_var.into()),
            ..Self::default()
        }
    }

    /// A variable read from a request header.
    pub fn header(name: impl Into<String>, header: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            header: Some(header.into()),
            ..Self::default()
        }
    }

    pub fn env_var_name(&self) -> Option<&str> {
        non_empty(&self.env_var)
    }

    pub fn literal_value(&self) -> Option<&str> {
        non_empty(&self.value)
    }

    pub fn header_name(&self) -> Option<&str> {
        non_empty(&self.header)
    }

    /// Value that must not appear in logs: the environment value when the
    /// variable is set, otherwise the literal value.
    pub fn secret(&self) -> Option<String> {
        self.env_var_name()
            .and_then(env_value)
            .filter(|value| !value.is_empty())
            .or_else(|| self.literal_value().map(str::to_string))
    }
}

/// Read an environment variable. Invalid UTF-8 is replaced with U+FFFD.
pub fn env_value(name: &str) -> Option<String> {
    std::env::var_os(name).map(|value| value.to_string_lossy().into_owned())
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn template_file(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn endpoint(uri: &str, method: &str, code: u16) -> Endpoint {
        Endpoint {
            uri: uri.to_string(),
            kind: ENDPOINT_TYPE_NORMAL.to_string(),
            method: method.to_string(),
            response_code: code,
            template: None,
            variables: Vec::new(),
        }
    }

    #[test]
    fn test_parse_json_defaults() {
        let config = Config::from_json(
            r#"{"endpoints": [{"uri": "/a", "method": "get", "response_code": 200}]}"#,
        )
        .unwrap();
        assert_eq!(config.listen_ip, "0.0.0.0");
        assert_eq!(config.listen_port, 8080);
        assert!(config.proxy_pass.is_none());
        assert!(!config.logging.request_contents);
        assert!(!config.logging.response_contents);
        assert_eq!(config.endpoints[0].kind, "normal");
        assert_eq!(config.endpoints[0].match_kind(), Some(MatchKind::Literal));
        assert!(config.endpoints[0].variables.is_empty());
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
listen_ip: 127.0.0.1
listen_port: 9000
proxy_pass: http://upstream.example
logging:
  request_contents: true
endpoints:
  - uri: /resource/[0-9]+
    type: regex
    method: DELETE
    response_code: 204
  - uri: /example
    method: GET
    response_code: 200
    template: response.json
    variables:
      - name: token
        env_var: API_TOKEN
      - name: user
        header: X-User
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.listen_address(), "127.0.0.1:9000");
        assert_eq!(config.proxy_origin(), Some("http://upstream.example"));
        assert!(config.logging.request_contents);
        assert_eq!(config.endpoints.len(), 2);
        assert_eq!(config.endpoints[0].match_kind(), Some(MatchKind::Pattern));
        assert_eq!(config.endpoints[1].template_path(), Some("response.json"));
        assert_eq!(config.endpoints[1].variables[0].env_var_name(), Some("API_TOKEN"));
        assert_eq!(config.endpoints[1].variables[1].header_name(), Some("X-User"));
    }

    #[test]
    fn test_from_file() {
        let err = Config::from_file(Path::new("test/nonexisting-config.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));

        let mut minimal = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        minimal
            .write_all(br#"{"listen_ip": "1.2.3.4", "listen_port": 1337}"#)
            .unwrap();
        let config = Config::from_file(minimal.path()).unwrap();
        assert_eq!(config.listen_ip, "1.2.3.4");
        assert_eq!(config.listen_port, 1337);
        assert!(config.endpoints.is_empty());

        let mut broken = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        broken.write_all(b"{\"listen_ip\": ").unwrap();
        let err = Config::from_file(broken.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_overrides() {
        let mut config = Config::default();
        config.apply_overrides(&Overrides {
            listen_ip: Some("127.0.0.1".to_string()),
            listen_port: Some(3000),
            log_request_contents: Some(true),
            log_response_contents: None,
        });
        assert_eq!(config.listen_address(), "127.0.0.1:3000");
        assert!(config.logging.request_contents);
        assert!(!config.logging.response_contents);
    }

    #[test]
    fn test_listen_address_falls_back_for_empty_values() {
        let config = Config {
            listen_ip: String::new(),
            listen_port: 0,
            ..Config::default()
        };
        assert_eq!(config.listen_address(), "0.0.0.0:8080");
    }

    #[test]
    fn test_validate_accepts_well_formed_config() {
        let template = template_file(r#"{"item": "<item1>"}"#);
        let mut example = endpoint("/example", "get", 200);
        example.template = Some(template.path().to_string_lossy().into_owned());
        example.variables = vec![Variable::literal("item1", "test123")];

        let mut delete = endpoint("/resource/[0-9]+", "DELETE", 204);
        delete.kind = "REGEX".to_string();

        let config = Config {
            proxy_pass: Some("https://upstream.example:8443".to_string()),
            endpoints: vec![example, delete],
            ..Config::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_unsupported_method() {
        let config = Config {
            endpoints: vec![endpoint("/example", "TRACE", 200)],
            ..Config::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidMethod { .. }));
        let message = err.to_string();
        assert!(message.contains("invalid HTTP method (TRACE)"));
        assert!(message.contains("/example"));
        assert!(message.contains("PATCH"));
    }

    #[test]
    fn test_validate_rejects_missing_fields() {
        let config = Config {
            endpoints: vec![endpoint("/ok", "GET", 200), endpoint("", "GET", 200)],
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingUri { index: 1 })
        ));

        let config = Config {
            endpoints: vec![endpoint("/example", "GET", 0)],
            ..Config::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("must include response_code"));

        let config = Config {
            endpoints: vec![endpoint("/example", "GET", 1000)],
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidResponseCode { code: 1000, .. })
        ));
    }

    #[test]
    fn test_validate_rejects_bad_type_and_pattern() {
        let mut glob = endpoint("/example/*", "GET", 200);
        glob.kind = "glob".to_string();
        let config = Config {
            endpoints: vec![glob],
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidType { .. })));

        let mut broken = endpoint("/resource/[0-9+", "GET", 200);
        broken.kind = "regex".to_string();
        let config = Config {
            endpoints: vec![broken],
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidPattern { .. })));
    }

    #[test]
    fn test_validate_renders_templates() {
        let unknown = template_file(r#"{"item": "<missing>"}"#);
        let mut example = endpoint("/example", "GET", 200);
        example.template = Some(unknown.path().to_string_lossy().into_owned());
        let config = Config {
            endpoints: vec![example.clone()],
            ..Config::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Template {
                source: crate::error::RenderError::UnknownTag { .. },
                ..
            }
        ));

        let not_json = template_file(r#"{"item": <item1>}"#);
        example.template = Some(not_json.path().to_string_lossy().into_owned());
        example.variables = vec![Variable::literal("item1", "unquoted")];
        let config = Config {
            endpoints: vec![example],
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::TemplateNotJson { .. })
        ));
    }

    #[test]
    fn test_validate_header_variables_render_empty_at_startup() {
        let template = template_file(r#"{"user": "<user>"}"#);
        let mut example = endpoint("/example", "GET", 200);
        example.template = Some(template.path().to_string_lossy().into_owned());
        example.variables = vec![Variable::header("user", "X-User")];
        let config = Config {
            endpoints: vec![example],
            ..Config::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_proxy_pass() {
        for url in ["not a url", "ftp://upstream.example", "/relative"] {
            let config = Config {
                proxy_pass: Some(url.to_string()),
                ..Config::default()
            };
            assert!(
                matches!(config.validate(), Err(ConfigError::InvalidProxyPass { .. })),
                "{} should be rejected",
                url
            );
        }

        let config = Config {
            proxy_pass: Some(String::new()),
            ..Config::default()
        };
        assert!(config.validate().is_ok());
        assert!(config.proxy_origin().is_none());
    }

    #[test]
    fn test_variable_secret_precedence() {
        std::env::set_var("HTTP_MOCKERY_TEST_SECRET_PRECEDENCE", "from-env");
        let variable = Variable {
            name: "token".to_string(),
            env_var: Some("HTTP_MOCKERY_TEST_SECRET_PRECEDENCE".to_string()),
            value: Some("literal".to_string()),
            header: None,
        };
        assert_eq!(variable.secret().as_deref(), Some("from-env"));

        let unset = Variable {
            env_var: Some("HTTP_MOCKERY_TEST_SECRET_UNSET".to_string()),
            ..variable.clone()
        };
        assert_eq!(unset.secret().as_deref(), Some("literal"));

        assert_eq!(Variable::header("user", "X-User").secret(), None);
    }
}
