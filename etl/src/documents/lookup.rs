//! Best-effort resolution of human-readable law descriptions.
//!
//! The class aggregator stores each statute reference together with a
//! description resolved through an external legislation search service. The
//! service is slow and unreliable, so the collaborator sits behind a narrow
//! contract: any internal failure yields `None` and is never propagated.

use std::time::Duration;

use async_trait::async_trait;
use etl_config::shared::LawLookupConfig;
use serde::Deserialize;
use tracing::warn;

use crate::error::EtlResult;

/// Resolves a description for a statute reference.
#[async_trait]
pub trait LawLookup: Send + Sync {
    /// Best-effort lookup: may take seconds, must not fail. On any internal
    /// error the implementation yields `None`.
    async fn lookup(&self, reference: &str) -> Option<String>;
}

/// Lookup used when no legislation endpoint is configured.
pub struct DisabledLawLookup;

#[async_trait]
impl LawLookup for DisabledLawLookup {
    async fn lookup(&self, _reference: &str) -> Option<String> {
        None
    }
}

/// Statute categories understood by the legislation search service.
///
/// Order matters: `complementary law` must match before plain `law`.
const CATEGORIES: &[(&str, &str)] = &[
    ("decree", "decree"),
    ("complementary law", "complementary-law"),
    ("law", "law"),
    ("normative instruction", "normative-instruction"),
    ("ordinance", "ordinance"),
    ("technical note", "technical-note"),
    ("resolution", "resolution"),
];

/// HTTP-backed lookup against a configured legislation search endpoint.
pub struct HttpLawLookup {
    http: reqwest::Client,
    base_url: String,
    request_delay: Duration,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchEntry>,
}

#[derive(Debug, Deserialize)]
struct SearchEntry {
    summary: Option<String>,
}

impl HttpLawLookup {
    pub fn new(config: &LawLookupConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            request_delay: Duration::from_millis(config.request_delay_ms),
        }
    }

    /// Infers the search category from the reference wording.
    fn category(reference: &str) -> Option<&'static str> {
        let lowered = reference.to_lowercase();

        CATEGORIES
            .iter()
            .find(|(keyword, _)| lowered.contains(keyword))
            .map(|(_, category)| *category)
    }

    /// Extracts the `number/year` fragment of a reference.
    ///
    /// The number may contain thousands dots (`1.234/2019`); the year must be
    /// four digits.
    fn number_and_year(reference: &str) -> Option<(String, String)> {
        for (index, _) in reference.match_indices('/') {
            let before = reference[..index].trim_end();
            let number_rev: String = before
                .chars()
                .rev()
                .take_while(|c| c.is_ascii_digit() || *c == '.')
                .collect();
            let number: String = number_rev.chars().rev().collect();
            if !number.chars().any(|c| c.is_ascii_digit()) {
                continue;
            }

            let after = reference[index + 1..].trim_start();
            let year: String = after.chars().take_while(char::is_ascii_digit).collect();
            if year.len() == 4 {
                return Some((number, year));
            }
        }

        None
    }

    async fn try_lookup(&self, reference: &str) -> EtlResult<Option<String>> {
        let Some(category) = Self::category(reference) else {
            return Ok(None);
        };
        let Some((number, year)) = Self::number_and_year(reference) else {
            return Ok(None);
        };

        // The service throttles aggressively; pause before every request.
        tokio::time::sleep(self.request_delay).await;

        let response = self
            .http
            .get(format!("{}/search", self.base_url))
            .query(&[
                ("category", category),
                ("number", number.as_str()),
                ("year", year.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?;

        let body: SearchResponse = response.json().await?;

        Ok(body.results.into_iter().next().and_then(|entry| entry.summary))
    }
}

#[async_trait]
impl LawLookup for HttpLawLookup {
    async fn lookup(&self, reference: &str) -> Option<String> {
        match self.try_lookup(reference).await {
            Ok(description) => description,
            Err(err) => {
                warn!(reference, "law lookup failed: {}", err);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complementary_law_matches_before_plain_law() {
        assert_eq!(
            HttpLawLookup::category("Complementary Law 140/2011"),
            Some("complementary-law")
        );
        assert_eq!(HttpLawLookup::category("Law 8.078/1990"), Some("law"));
        assert_eq!(HttpLawLookup::category("Memo 12/2020"), None);
    }

    #[test]
    fn number_and_year_handles_thousands_dots() {
        assert_eq!(
            HttpLawLookup::number_and_year("Law 8.078/1990"),
            Some(("8.078".to_owned(), "1990".to_owned()))
        );
        assert_eq!(
            HttpLawLookup::number_and_year("Decree 140 / 2011 text"),
            Some(("140".to_owned(), "2011".to_owned()))
        );
        assert_eq!(HttpLawLookup::number_and_year("Law 12/99"), None);
        assert_eq!(HttpLawLookup::number_and_year("no fraction"), None);
    }

    #[tokio::test]
    async fn disabled_lookup_always_yields_none() {
        assert_eq!(DisabledLawLookup.lookup("Law 1/2000").await, None);
    }
}
