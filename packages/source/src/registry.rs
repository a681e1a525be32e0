//! Provider registry. Loads every scraping-provider template from embedded
//! TOML configs.
//!
//! Each `.toml` file in `packages/source/providers/` is baked into the
//! binary at compile time via [`include_str!`]. Supporting another vendor
//! means adding a TOML file and a line to the list below; nothing
//! downstream of the fetch cares which vendor served a page.

use crate::provider::{ProviderDefinition, parse_provider_toml};

/// TOML configs embedded at compile time.
const PROVIDER_TOMLS: &[(&str, &str)] = &[
    ("scraperapi", include_str!("../providers/scraperapi.toml")),
    ("scrapingbee", include_str!("../providers/scrapingbee.toml")),
    ("scrapingant", include_str!("../providers/scrapingant.toml")),
];

/// Total number of configured providers (used in tests).
#[cfg(test)]
const EXPECTED_PROVIDER_COUNT: usize = 3;

/// Returns all provider definitions, parsed from embedded TOML and sorted
/// by id.
///
/// # Panics
///
/// Panics if any TOML config is malformed (this is a compile-time guarantee
/// since the configs are embedded).
#[must_use]
pub fn all_providers() -> Vec<ProviderDefinition> {
    let mut providers: Vec<ProviderDefinition> = PROVIDER_TOMLS
        .iter()
        .map(|(name, toml)| {
            parse_provider_toml(toml)
                .unwrap_or_else(|e| panic!("Failed to parse provider {name}.toml: {e}"))
        })
        .collect();
    providers.sort_by(|a, b| a.id.cmp(&b.id));
    providers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ResponseFormat;

    #[test]
    fn loads_all_providers() {
        assert_eq!(all_providers().len(), EXPECTED_PROVIDER_COUNT);
    }

    #[test]
    fn provider_ids_are_unique() {
        let providers = all_providers();
        let mut ids: Vec<&str> = providers.iter().map(|p| p.id.as_str()).collect();
        ids.dedup();
        assert_eq!(ids.len(), EXPECTED_PROVIDER_COUNT);
    }

    #[test]
    fn all_providers_have_required_fields() {
        for provider in &all_providers() {
            assert!(!provider.name.is_empty(), "{}: empty name", provider.id);
            assert!(
                provider.endpoint.starts_with("https://"),
                "{}: endpoint must be https",
                provider.id
            );
            assert!(!provider.key_param.is_empty(), "{}: no key_param", provider.id);
            assert!(!provider.url_param.is_empty(), "{}: no url_param", provider.id);
            assert!(
                !provider.credentials_env.is_empty(),
                "{}: no credentials_env",
                provider.id
            );
        }
    }

    #[test]
    fn ships_html_and_json_envelope_variants() {
        let providers = all_providers();
        assert!(
            providers
                .iter()
                .any(|p| matches!(p.response, ResponseFormat::Html))
        );
        assert!(
            providers
                .iter()
                .any(|p| matches!(p.response, ResponseFormat::Json { .. }))
        );
    }
}
