//! Scraping-provider templates and credential pools.
//!
//! A [`ProviderDefinition`] says how to wrap a target URL into a request
//! against one vendor's proxy API, and how to get HTML back out of its
//! response. A [`ProviderPool`] pairs each definition with the weight and
//! API keys configured for this run.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::SourceError;

/// Request template for one scraping vendor.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderDefinition {
    /// Unique identifier (e.g., `"scraperapi"`).
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Proxy API endpoint.
    pub endpoint: String,
    /// Query parameter carrying the API key.
    pub key_param: String,
    /// Query parameter carrying the target URL.
    pub url_param: String,
    /// Environment variable holding comma-separated API keys.
    pub credentials_env: String,
    /// Environment variable overriding the weight.
    #[serde(default)]
    pub weight_env: Option<String>,
    /// Weight used when `weight_env` is unset.
    #[serde(default = "default_weight")]
    pub default_weight: u32,
    /// Extra fixed query parameters.
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    /// How the response body carries the page.
    pub response: ResponseFormat,
}

/// Shape of a provider's response body.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseFormat {
    /// The body is the page HTML.
    Html,
    /// The body is a JSON envelope; the HTML is in `content_field`.
    Json {
        /// Field holding the page HTML.
        content_field: String,
    },
}

const fn default_weight() -> u32 {
    1
}

impl ProviderDefinition {
    /// Builds the proxy request URL for `target` using `api_key`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Config`] if the endpoint is not a valid URL.
    pub fn request_url(&self, api_key: &str, target: &str) -> Result<reqwest::Url, SourceError> {
        let mut query: Vec<(&str, &str)> = vec![
            (self.key_param.as_str(), api_key),
            (self.url_param.as_str(), target),
        ];
        query.extend(self.params.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        reqwest::Url::parse_with_params(&self.endpoint, &query).map_err(|e| SourceError::Config {
            message: format!("provider {}: invalid endpoint '{}': {e}", self.id, self.endpoint),
        })
    }

    /// Extracts page HTML from a response body.
    ///
    /// JSON envelopes that fail to decode, or lack the content field, yield
    /// an empty string so the fetch is classified as a failure.
    #[must_use]
    pub fn unwrap_content(&self, body: String) -> String {
        match &self.response {
            ResponseFormat::Html => body,
            ResponseFormat::Json { content_field } => {
                match serde_json::from_str::<serde_json::Value>(&body) {
                    Ok(value) => value
                        .get(content_field)
                        .and_then(serde_json::Value::as_str)
                        .map(ToString::to_string)
                        .unwrap_or_default(),
                    Err(e) => {
                        log::debug!("{}: response is not a JSON envelope: {e}", self.id);
                        String::new()
                    }
                }
            }
        }
    }
}

/// Parses a [`ProviderDefinition`] from a TOML string.
///
/// # Errors
///
/// Returns an error if the TOML is malformed or missing required fields.
pub fn parse_provider_toml(toml_str: &str) -> Result<ProviderDefinition, String> {
    toml::de::from_str(toml_str).map_err(|e| e.to_string())
}

/// A provider with the weight and credentials configured for this run.
#[derive(Debug, Clone)]
pub struct ProviderSlot {
    /// The request template.
    pub definition: ProviderDefinition,
    /// Relative share of first-attempt traffic.
    pub weight: u32,
    /// API keys; one is picked per request.
    pub credentials: Vec<String>,
}

impl ProviderSlot {
    /// Creates a slot.
    #[must_use]
    pub const fn new(definition: ProviderDefinition, weight: u32, credentials: Vec<String>) -> Self {
        Self {
            definition,
            weight,
            credentials,
        }
    }

    /// Provider id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.definition.id
    }

    /// A slot takes traffic only with a non-zero weight and at least one key.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.weight > 0 && !self.credentials.is_empty()
    }
}

/// Every known provider with its run configuration, sorted by id.
#[derive(Debug, Clone, Default)]
pub struct ProviderPool {
    slots: Vec<ProviderSlot>,
}

impl ProviderPool {
    /// Creates a pool from explicit slots.
    #[must_use]
    pub fn new(mut slots: Vec<ProviderSlot>) -> Self {
        slots.sort_by(|a, b| a.id().cmp(b.id()));
        Self { slots }
    }

    /// Builds a pool from provider definitions, reading keys and weight
    /// overrides from each definition's environment variables.
    #[must_use]
    pub fn from_env(definitions: Vec<ProviderDefinition>) -> Self {
        Self::from_lookup(definitions, |name| std::env::var(name).ok())
    }

    /// Same as [`Self::from_env`] with an arbitrary variable lookup.
    #[must_use]
    pub fn from_lookup(
        definitions: Vec<ProviderDefinition>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let slots = definitions
            .into_iter()
            .map(|definition| {
                let credentials = lookup(&definition.credentials_env)
                    .map(|raw| split_credentials(&raw))
                    .unwrap_or_default();
                let weight = definition
                    .weight_env
                    .as_deref()
                    .and_then(&lookup)
                    .map_or(definition.default_weight, |raw| {
                        raw.trim().parse().unwrap_or_else(|_| {
                            log::warn!(
                                "{}: ignoring unparsable weight {raw:?}, using {}",
                                definition.id,
                                definition.default_weight
                            );
                            definition.default_weight
                        })
                    });
                ProviderSlot::new(definition, weight, credentials)
            })
            .collect();
        Self::new(slots)
    }

    /// All slots, enabled or not.
    #[must_use]
    pub fn slots(&self) -> &[ProviderSlot] {
        &self.slots
    }

    /// Slots that can take traffic.
    #[must_use]
    pub fn enabled(&self) -> Vec<ProviderSlot> {
        self.slots
            .iter()
            .filter(|s| s.is_enabled())
            .cloned()
            .collect()
    }
}

/// Splits a comma-separated key list, dropping blanks.
fn split_credentials(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}
