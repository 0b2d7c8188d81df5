use secrecy::SecretString;
use serde::Deserialize;

use crate::shared::connection::{PgConnectionConfig, ValidationError};

/// Default namespace inspected on the source database.
fn default_source_schema() -> String {
    "public".to_owned()
}

/// Default namespace holding the structural mirror on the destination.
fn default_staging_schema() -> String {
    "staging".to_owned()
}

/// Default maximum length of one content fragment in class documents.
fn default_content_max_len() -> usize {
    250
}

/// Default pause between requests issued by the law lookup collaborator.
fn default_request_delay_ms() -> u64 {
    2_000
}

/// Top-level configuration for one mirror run.
///
/// The optional sections switch whole phases on and off: without
/// `law_lookup` the class aggregator stores laws with no description, and
/// without `scores_api` the feedback phase is skipped entirely.
#[derive(Debug, Clone, Deserialize)]
pub struct MirrorConfig {
    /// The source-of-truth database whose structure and rows are mirrored.
    pub source: PgConnectionConfig,
    /// The destination database owning the staging schema and the
    /// operational tables.
    pub destination: PgConnectionConfig,
    #[serde(default = "default_source_schema")]
    pub source_schema: String,
    #[serde(default = "default_staging_schema")]
    pub staging_schema: String,
    /// Document store receiving the aggregated activity and class documents.
    pub documents: DocumentStoreConfig,
    #[serde(default = "default_content_max_len")]
    pub content_max_len: usize,
    pub law_lookup: Option<LawLookupConfig>,
    pub scores_api: Option<ScoresApiConfig>,
}

impl MirrorConfig {
    /// Validates the configuration before any connection is attempted.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.source.tls.validate()?;
        self.destination.tls.validate()?;

        Ok(())
    }
}

/// Connection settings for the document store.
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentStoreConfig {
    /// Connection string, possibly embedding credentials.
    pub uri: SecretString,
    pub database: String,
}

/// Endpoint used to resolve human-readable law descriptions.
#[derive(Debug, Clone, Deserialize)]
pub struct LawLookupConfig {
    pub base_url: String,
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,
}

/// Credentials for the review-score API.
#[derive(Debug, Clone, Deserialize)]
pub struct ScoresApiConfig {
    pub base_url: String,
    pub username: String,
    pub password: SecretString,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_optional_sections() {
        let yaml = r#"
source:
  host: localhost
  port: 5432
  name: source
  username: postgres
destination:
  host: localhost
  port: 5433
  name: mirror
  username: postgres
documents:
  uri: mongodb://localhost:27017/app
  database: app
"#;
        let config: MirrorConfig = serde_yaml_from_str(yaml);

        assert_eq!(config.source_schema, "public");
        assert_eq!(config.staging_schema, "staging");
        assert_eq!(config.content_max_len, 250);
        assert!(config.law_lookup.is_none());
        assert!(config.scores_api.is_none());
        assert!(config.validate().is_ok());
    }

    /// Deserializes through the same `config` crate machinery used at runtime.
    fn serde_yaml_from_str(yaml: &str) -> MirrorConfig {
        config::Config::builder()
            .add_source(config::File::from_str(yaml, config::FileFormat::Yaml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }
}
