//! HTTP Mockery
//!
//! A configurable HTTP stub server. Requests matching a configured endpoint
//! are answered with a fixed status code and an optional templated JSON
//! body; everything else is forwarded to an upstream origin when proxy
//! fallback is enabled, or answered with 404.
//!
//! # Features
//!
//! - **Ordered Matching**: First endpoint whose method and URI match wins
//! - **Literal and Regex URIs**: Exact request-target comparison or regex search
//! - **JSON Templates**: `<tag>` placeholders filled from environment
//!   variables, literal values or request headers
//! - **Proxy Fallback**: Unmatched requests relayed to a single upstream
//! - **Body Logging**: Request and response bodies, with secrets masked
//!
//! # Example Configuration
//!
//! ```json
//! {
//!   "listen_port": 8080,
//!   "proxy_pass": "http://upstream.example",
//!   "logging": { "request_contents": true, "response_contents": true },
//!   "endpoints": [
//!     {
//!       "uri": "/example",
//!       "method": "GET",
//!       "response_code": 200,
//!       "template": "templates/example.json",
//!       "variables": [
//!         { "name": "item1", "value": "test123" },
//!         { "name": "token", "env_var": "API_TOKEN" },
//!         { "name": "user", "header": "authorization_username" }
//!       ]
//!     },
//!     {
//!       "uri": "/resource/[0-9]+",
//!       "type": "regex",
//!       "method": "DELETE",
//!       "response_code": 204
//!     }
//!   ]
//! }
//! ```

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod logging;
pub mod matcher;
pub mod proxy;
pub mod server;
pub mod template;

pub use config::Config;
pub use error::{ConfigError, MatchError, ProxyError, RenderError};
pub use server::MockServer;
