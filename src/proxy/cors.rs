//! Cross-origin policy for the browser frontend.

use axum::http::{request::Parts, HeaderValue};
use regex::Regex;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};

use crate::config::{ConfigError, CorsConfig};

/// Origins accepted by exact match or by a pattern spanning the whole origin.
#[derive(Debug, Clone)]
pub struct OriginMatcher {
    exact: Vec<String>,
    patterns: Vec<Regex>,
}

impl OriginMatcher {
    pub fn new(config: &CorsConfig) -> Result<Self, ConfigError> {
        let patterns = config
            .allowed_origin_patterns
            .iter()
            .map(|p| {
                Regex::new(&format!("^(?:{})$", p)).map_err(|e| {
                    ConfigError::Validation(format!("Invalid origin pattern '{}': {}", p, e))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            exact: config
                .allowed_origins
                .iter()
                .map(|o| o.trim_end_matches('/').to_string())
                .collect(),
            patterns,
        })
    }

    pub fn allows(&self, origin: &str) -> bool {
        self.exact.iter().any(|o| o == origin) || self.patterns.iter().any(|p| p.is_match(origin))
    }
}

/// Build the CORS layer.
///
/// Methods and headers are mirrored from the preflight, which is how "allow
/// everything" is expressed when credentials are allowed.
pub fn cors_layer(config: &CorsConfig) -> Result<CorsLayer, ConfigError> {
    let matcher = OriginMatcher::new(config)?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(
            move |origin: &HeaderValue, _parts: &Parts| {
                origin.to_str().map(|o| matcher.allows(o)).unwrap_or(false)
            },
        ))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(config.allow_credentials))
}
