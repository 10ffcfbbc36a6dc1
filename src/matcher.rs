//! Request matching logic.
//!
//! Matches an incoming method and request URI against the endpoint list.
//! Endpoints are tried in declaration order and the first hit wins.

use crate::config::{Endpoint, MatchKind};
use crate::error::MatchError;
use regex::Regex;

/// Endpoint matcher.
///
/// Holds the compiled form of each endpoint's `uri`, indexed like the
/// endpoint slice it was built from. Immutable after construction.
#[derive(Debug)]
pub struct Matcher {
    compiled: Vec<CompiledUri>,
}

#[derive(Debug)]
enum CompiledUri {
    Literal,
    Pattern(Regex),
    InvalidPattern(regex::Error),
    /// `type` outside the allowed set, never matches
    Unsupported,
}

impl Matcher {
    /// Compile the endpoint URIs.
    pub fn new(endpoints: &[Endpoint]) -> Self {
        let compiled = endpoints
            .iter()
            .map(|endpoint| match endpoint.match_kind() {
                Some(MatchKind::Literal) => CompiledUri::Literal,
                Some(MatchKind::Pattern) => match Regex::new(&endpoint.uri) {
                    Ok(regex) => CompiledUri::Pattern(regex),
                    Err(e) => CompiledUri::InvalidPattern(e),
                },
                None => CompiledUri::Unsupported,
            })
            .collect();

        Self { compiled }
    }

    /// Find the first endpoint matching `method` and `uri`.
    ///
    /// `uri` is the request target as received, query string included.
    /// Literal endpoints compare it byte for byte; pattern endpoints search
    /// it anywhere.
    pub fn find_match<'a>(
        &self,
        endpoints: &'a [Endpoint],
        method: &str,
        uri: &str,
    ) -> Result<&'a Endpoint, MatchError> {
        for (endpoint, compiled) in endpoints.iter().zip(&self.compiled) {
            if !endpoint.method.eq_ignore_ascii_case(method) {
                continue;
            }

            let matched = match compiled {
                CompiledUri::Literal => endpoint.uri == uri,
                CompiledUri::Pattern(regex) => regex.is_match(uri),
                CompiledUri::InvalidPattern(e) => {
                    return Err(MatchError::InvalidPattern {
                        uri: endpoint.uri.clone(),
                        source: e.clone(),
                    });
                }
                CompiledUri::Unsupported => false,
            };

            if matched {
                return Ok(endpoint);
            }
        }

        Err(MatchError::NotFound)
    }
}
