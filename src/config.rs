//! Service configuration from environment variables.
//!
//! Every variable is optional. A value that fails to parse falls back to its
//! default, the same way a bad port does.

use std::env;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_SOLR_URL: &str = "http://localhost:8983/solr";
pub const DEFAULT_SOLR_COLLECTION: &str = "bop";
pub const DEFAULT_HANDLER: &str = "/select";
pub const DEFAULT_SOLR_TIMEOUT_SECS: u64 = 30;

/// Connection settings for the Solr engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolrConfig {
    pub url: String,
    pub collection: String,
    pub search_handler: String,
    pub export_handler: String,
    /// Added to every engine request.
    pub extra_params: Vec<(String, String)>,
    pub timeout_secs: u64,
}

impl Default for SolrConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_SOLR_URL.to_string(),
            collection: DEFAULT_SOLR_COLLECTION.to_string(),
            search_handler: DEFAULT_HANDLER.to_string(),
            export_handler: DEFAULT_HANDLER.to_string(),
            extra_params: Vec::new(),
            timeout_secs: DEFAULT_SOLR_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub port: u16,
    /// Permissive CORS for browser clients.
    pub cors: bool,
    pub solr: SolrConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            cors: true,
            solr: SolrConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from `GEOSEARCH_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let text = |name: &str, default: String| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(default)
        };

        Self {
            port: lookup("GEOSEARCH_PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            cors: lookup("GEOSEARCH_CORS")
                .and_then(|c| c.parse().ok())
                .unwrap_or(defaults.cors),
            solr: SolrConfig {
                url: text("GEOSEARCH_SOLR_URL", defaults.solr.url),
                collection: text("GEOSEARCH_SOLR_COLLECTION", defaults.solr.collection),
                search_handler: text("GEOSEARCH_SEARCH_HANDLER", defaults.solr.search_handler),
                export_handler: text("GEOSEARCH_EXPORT_HANDLER", defaults.solr.export_handler),
                extra_params: lookup("GEOSEARCH_SOLR_PARAMS")
                    .map(|raw| parse_params(&raw))
                    .unwrap_or_default(),
                timeout_secs: lookup("GEOSEARCH_SOLR_TIMEOUT_SECS")
                    .and_then(|t| t.parse().ok())
                    .unwrap_or(defaults.solr.timeout_secs),
            },
        }
    }
}

/// Parse `k=v&k=v`. Keys and values are URL-decoded; pairs that fail to decode are skipped.
pub fn parse_params(raw: &str) -> Vec<(String, String)> {
    raw.split('&')
        .filter(|pair| !pair.is_empty())
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let key = urlencoding::decode(&key.replace('+', " ")).ok()?.into_owned();
            let value = urlencoding::decode(&value.replace('+', " ")).ok()?.into_owned();
            (!key.is_empty()).then_some((key, value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> ServiceConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServiceConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]);
        assert_eq!(config, ServiceConfig::default());
        assert_eq!(config.port, 8080);
        assert_eq!(config.solr.url, "http://localhost:8983/solr");
        assert_eq!(config.solr.collection, "bop");
        assert!(config.cors);
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("GEOSEARCH_PORT", "9000"),
            ("GEOSEARCH_CORS", "false"),
            ("GEOSEARCH_SOLR_URL", "http://solr:8983/solr"),
            ("GEOSEARCH_EXPORT_HANDLER", "/export"),
            ("GEOSEARCH_SOLR_TIMEOUT_SECS", "5"),
        ]);
        assert_eq!(config.port, 9000);
        assert!(!config.cors);
        assert_eq!(config.solr.url, "http://solr:8983/solr");
        assert_eq!(config.solr.search_handler, "/select");
        assert_eq!(config.solr.export_handler, "/export");
        assert_eq!(config.solr.timeout_secs, 5);
    }

    #[test]
    fn test_unparseable_values_fall_back() {
        let config = config(&[
            ("GEOSEARCH_PORT", "eighty"),
            ("GEOSEARCH_CORS", "maybe"),
            ("GEOSEARCH_SOLR_TIMEOUT_SECS", "-1"),
            ("GEOSEARCH_SOLR_COLLECTION", "  "),
        ]);
        assert_eq!(config, ServiceConfig::default());
    }

    #[test]
    fn test_parse_params() {
        assert_eq!(
            parse_params("shards.tolerant=true&fq=%7B!cache%3Dfalse%7Dtype%3Atweet&&flag"),
            vec![
                ("shards.tolerant".to_string(), "true".to_string()),
                ("fq".to_string(), "{!cache=false}type:tweet".to_string()),
                ("flag".to_string(), String::new()),
            ]
        );
        assert!(parse_params("").is_empty());
    }
}
