//! Loads review scores from the external scoring API into the feedback
//! schema.
//!
//! The loader authenticates against the review API, fetches the full review
//! list, upserts the distinct grading criteria and inserts one score row per
//! grade. Unlike the other phases, a login or fetch failure is fatal to the
//! run: with no review data there is nothing to reconcile.

use std::collections::HashMap;

use bigdecimal::BigDecimal;
use etl_config::shared::ScoresApiConfig;
use secrecy::ExposeSecret;
use serde::Deserialize;
use sqlx::PgPool;
use tracing::info;

use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;

/// One graded criterion inside a review.
#[derive(Debug, Clone, Deserialize)]
pub struct ReviewGrade {
    pub name: String,
    pub weight: Option<f64>,
    pub score: Option<i32>,
}

/// One review fetched from the scoring API.
#[derive(Debug, Clone, Deserialize)]
pub struct Review {
    pub id: String,
    #[serde(default)]
    pub grades: Vec<ReviewGrade>,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    access_token: Option<String>,
}

/// Client for the review-scoring API.
pub struct ScoresApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ScoresApiClient {
    pub fn new(config: &ScoresApiConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_owned(),
        }
    }

    /// Authenticates with form-encoded credentials and returns a bearer
    /// token.
    pub async fn login(&self, config: &ScoresApiConfig) -> EtlResult<String> {
        let response = self
            .http
            .post(format!("{}/users/login", self.base_url))
            .form(&[
                ("username", config.username.as_str()),
                ("password", config.password.expose_secret()),
            ])
            .send()
            .await?
            .error_for_status()?;

        let body: LoginResponse = response.json().await?;

        body.access_token.ok_or_else(|| {
            etl_error!(
                ErrorKind::AuthenticationError,
                "Login response carried no access token"
            )
        })
    }

    /// Fetches the full review list for the project.
    pub async fn fetch_reviews(&self, token: &str) -> EtlResult<Vec<Review>> {
        let response = self
            .http
            .get(format!("{}/reviews/project", self.base_url))
            .bearer_auth(token)
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json().await?)
    }
}

/// Collapses the criteria referenced by the reviews into unique names.
///
/// When the same name appears with different weights, the last seen weight
/// wins. Order follows first appearance.
pub fn unique_criteria(reviews: &[Review]) -> Vec<(String, Option<f64>)> {
    let mut order = vec![];
    let mut weights: HashMap<String, Option<f64>> = HashMap::new();

    for review in reviews {
        for grade in &review.grades {
            if !weights.contains_key(&grade.name) {
                order.push(grade.name.clone());
            }
            weights.insert(grade.name.clone(), grade.weight);
        }
    }

    order
        .into_iter()
        .map(|name| {
            let weight = weights[&name];
            (name, weight)
        })
        .collect()
}

/// Creates the feedback schema and its tables when they do not exist yet.
async fn ensure_feedback_tables(pool: &PgPool) -> EtlResult<()> {
    sqlx::query("create schema if not exists feedback;")
        .execute(pool)
        .await?;

    sqlx::query(
        "create table if not exists feedback.criteria (
            id serial primary key,
            name text unique not null,
            weight numeric
        );",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "create table if not exists feedback.scores (
            id serial primary key,
            review_id text,
            criteria_id int references feedback.criteria(id),
            score int
        );",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Counts logged after the feedback phase.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FeedbackReport {
    pub criteria: u64,
    pub scores: u64,
}

/// Loads the current review scores into the `feedback` schema.
pub async fn load_feedback(pool: &PgPool, config: &ScoresApiConfig) -> EtlResult<FeedbackReport> {
    let client = ScoresApiClient::new(config);
    let token = client.login(config).await?;
    let reviews = client.fetch_reviews(&token).await?;

    ensure_feedback_tables(pool).await?;

    let mut report = FeedbackReport::default();

    // The upsert returns the criterion id whether the row was inserted or
    // already present, so no second resolution pass is needed.
    let mut criteria_ids: HashMap<String, i32> = HashMap::new();
    for (name, weight) in unique_criteria(&reviews) {
        let weight = weight.and_then(|weight| BigDecimal::try_from(weight).ok());

        let id: i32 = sqlx::query_scalar(
            "insert into feedback.criteria (name, weight) values ($1, $2)
             on conflict (name) do update set weight = excluded.weight
             returning id;",
        )
        .bind(&name)
        .bind(&weight)
        .fetch_one(pool)
        .await?;

        criteria_ids.insert(name, id);
        report.criteria += 1;
    }

    for review in &reviews {
        for grade in &review.grades {
            let Some(criteria_id) = criteria_ids.get(&grade.name) else {
                continue;
            };

            sqlx::query(
                "insert into feedback.scores (review_id, criteria_id, score)
                 values ($1, $2, $3);",
            )
            .bind(&review.id)
            .bind(criteria_id)
            .bind(grade.score)
            .execute(pool)
            .await?;
            report.scores += 1;
        }
    }

    info!(
        criteria = report.criteria,
        scores = report.scores,
        "feedback schema loaded"
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn review(id: &str, grades: Vec<(&str, Option<f64>, Option<i32>)>) -> Review {
        Review {
            id: id.to_owned(),
            grades: grades
                .into_iter()
                .map(|(name, weight, score)| ReviewGrade {
                    name: name.to_owned(),
                    weight,
                    score,
                })
                .collect(),
        }
    }

    #[test]
    fn criteria_are_unique_with_last_seen_weight() {
        let reviews = vec![
            review("r1", vec![("clarity", Some(0.4), Some(8))]),
            review(
                "r2",
                vec![("clarity", Some(0.5), Some(9)), ("impact", None, Some(7))],
            ),
        ];

        assert_eq!(
            unique_criteria(&reviews),
            vec![
                ("clarity".to_owned(), Some(0.5)),
                ("impact".to_owned(), None),
            ]
        );
    }

    #[test]
    fn reviews_without_grades_deserialize_to_an_empty_list() {
        let reviews: Vec<Review> =
            serde_json::from_str(r#"[{"id": "r1"}, {"id": "r2", "grades": []}]"#).unwrap();

        assert_eq!(reviews.len(), 2);
        assert!(reviews.iter().all(|review| review.grades.is_empty()));
        assert!(unique_criteria(&reviews).is_empty());
    }
}
