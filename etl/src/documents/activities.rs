//! Aggregation of staging activity rows into nested activity documents.
//!
//! The staging `activity`, `question` and `answer` tables are joined into one
//! flat result and regrouped into `{_id, class_id, points, questions}`
//! documents. Both nested joins fan out on the activity id, so the grouping
//! deduplicates questions by id and answers by id within each question.

use std::collections::{HashMap, HashSet};

use mongodb::Collection;
use pg_escape::quote_identifier;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::info;

use crate::documents::{DocumentSyncCounts, reconcile_documents};
use crate::error::EtlResult;

/// The activity document persisted in the `activities` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityDocument {
    #[serde(rename = "_id")]
    pub id: i32,
    pub class_id: Option<i32>,
    pub points: f64,
    pub questions: Vec<ActivityQuestion>,
}

/// One question of an activity with its answer options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityQuestion {
    pub question: Option<String>,
    pub answers: Vec<ActivityAnswer>,
}

/// One answer option of a question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityAnswer {
    pub answer: String,
    pub correct: Option<bool>,
}

/// One row of the activity join, ordered by activity, question and answer id.
#[derive(Debug, Clone)]
pub struct ActivityRow {
    pub activity_id: i32,
    pub points: Option<f64>,
    pub class_id: Option<i32>,
    pub question_id: Option<i32>,
    pub question: Option<String>,
    pub answer_id: Option<i32>,
    pub answer: Option<String>,
    pub correct: Option<bool>,
}

/// Working state for one activity while rows are grouped.
///
/// The dedup indexes never leave this struct; only the finished document is
/// persisted.
struct ActivityInProgress {
    document: ActivityDocument,
    question_slots: HashMap<i32, usize>,
    seen_answers: HashMap<i32, HashSet<i32>>,
}

/// Groups the flat join rows into activity documents.
///
/// Rows without a question id contribute only the activity itself; rows
/// without an answer contribute only their question. A null points value
/// becomes zero.
pub fn group_activity_rows(rows: &[ActivityRow]) -> Vec<ActivityDocument> {
    let mut order = vec![];
    let mut building: HashMap<i32, ActivityInProgress> = HashMap::new();

    for row in rows {
        let entry = building.entry(row.activity_id).or_insert_with(|| {
            order.push(row.activity_id);

            ActivityInProgress {
                document: ActivityDocument {
                    id: row.activity_id,
                    class_id: row.class_id,
                    points: row.points.unwrap_or(0.0),
                    questions: vec![],
                },
                question_slots: HashMap::new(),
                seen_answers: HashMap::new(),
            }
        });

        let Some(question_id) = row.question_id else {
            continue;
        };

        let slot = match entry.question_slots.get(&question_id) {
            Some(slot) => *slot,
            None => {
                entry.document.questions.push(ActivityQuestion {
                    question: row.question.clone(),
                    answers: vec![],
                });

                let slot = entry.document.questions.len() - 1;
                entry.question_slots.insert(question_id, slot);
                slot
            }
        };

        if let (Some(answer_id), Some(answer)) = (row.answer_id, row.answer.as_deref()) {
            let seen = entry.seen_answers.entry(question_id).or_default();
            if seen.insert(answer_id) {
                entry.document.questions[slot].answers.push(ActivityAnswer {
                    answer: answer.to_owned(),
                    correct: row.correct,
                });
            }
        }
    }

    order
        .into_iter()
        .filter_map(|id| building.remove(&id))
        .map(|in_progress| in_progress.document)
        .collect()
}

/// Reads the flat activity join from the staging schema.
async fn fetch_activity_rows(pool: &PgPool, staging_schema: &str) -> EtlResult<Vec<ActivityRow>> {
    let staging = quote_identifier(staging_schema);
    let query = format!(
        "select
            a.id as activity_id,
            a.points::float8 as points,
            a.lesson_id as class_id,
            q.id as question_id,
            q.question,
            ans.id as answer_id,
            ans.answer,
            ans.correct
        from {staging}.activity a
        left join {staging}.question q on q.activity_id = a.id
        left join {staging}.answer ans on ans.activity_id = a.id
        order by a.id, q.id, ans.id;"
    );

    type Row = (
        i32,
        Option<f64>,
        Option<i32>,
        Option<i32>,
        Option<String>,
        Option<i32>,
        Option<String>,
        Option<bool>,
    );
    let rows: Vec<Row> = sqlx::query_as(&query).fetch_all(pool).await?;

    Ok(rows
        .into_iter()
        .map(
            |(activity_id, points, class_id, question_id, question, answer_id, answer, correct)| {
                ActivityRow {
                    activity_id,
                    points,
                    class_id,
                    question_id,
                    question,
                    answer_id,
                    answer,
                    correct,
                }
            },
        )
        .collect())
}

/// Rebuilds every activity document from staging and converges the
/// `activities` collection with the result.
pub async fn sync_activities(
    pool: &PgPool,
    collection: &Collection<ActivityDocument>,
    staging_schema: &str,
) -> EtlResult<DocumentSyncCounts> {
    let rows = fetch_activity_rows(pool, staging_schema).await?;
    let documents = group_activity_rows(&rows);

    let counts = reconcile_documents(collection, &documents, |document| document.id).await?;

    info!(
        inserted = counts.inserted,
        updated = counts.updated,
        deleted = counts.deleted,
        "activities collection reconciled"
    );

    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(
        activity_id: i32,
        question_id: Option<i32>,
        question: Option<&str>,
        answer_id: Option<i32>,
        answer: Option<&str>,
        correct: Option<bool>,
    ) -> ActivityRow {
        ActivityRow {
            activity_id,
            points: Some(10.0),
            class_id: Some(1),
            question_id,
            question: question.map(str::to_owned),
            answer_id,
            answer: answer.map(str::to_owned),
            correct,
        }
    }

    #[test]
    fn join_fan_out_deduplicates_questions_and_answers() {
        // Two questions and two answers on one activity produce four rows;
        // each answer must land exactly once under each question.
        let rows = vec![
            row(1, Some(10), Some("Q1"), Some(100), Some("A"), Some(true)),
            row(1, Some(10), Some("Q1"), Some(101), Some("B"), Some(false)),
            row(1, Some(11), Some("Q2"), Some(100), Some("A"), Some(true)),
            row(1, Some(11), Some("Q2"), Some(101), Some("B"), Some(false)),
        ];

        let documents = group_activity_rows(&rows);
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].questions.len(), 2);
        for question in &documents[0].questions {
            assert_eq!(question.answers.len(), 2);
        }
    }

    #[test]
    fn activity_without_questions_keeps_an_empty_list() {
        let rows = vec![row(1, None, None, None, None, None)];

        let documents = group_activity_rows(&rows);
        assert_eq!(documents.len(), 1);
        assert!(documents[0].questions.is_empty());
    }

    #[test]
    fn null_points_default_to_zero() {
        let mut no_points = row(1, None, None, None, None, None);
        no_points.points = None;

        let documents = group_activity_rows(&[no_points]);
        assert_eq!(documents[0].points, 0.0);
    }

    #[test]
    fn activities_keep_their_source_order() {
        let rows = vec![
            row(3, None, None, None, None, None),
            row(7, None, None, None, None, None),
            row(9, None, None, None, None, None),
        ];

        let ids: Vec<i32> = group_activity_rows(&rows)
            .iter()
            .map(|document| document.id)
            .collect();
        assert_eq!(ids, vec![3, 7, 9]);
    }

    #[test]
    fn rebuilding_from_the_same_rows_compares_equal() {
        let rows = vec![
            row(1, Some(10), Some("Q1"), Some(100), Some("A"), Some(true)),
            row(1, Some(10), Some("Q1"), Some(101), Some("B"), Some(false)),
        ];

        assert_eq!(group_activity_rows(&rows), group_activity_rows(&rows));
    }

    #[test]
    fn persisted_shape_exposes_the_mongo_id_and_no_tracking_state() {
        let rows = vec![row(1, Some(10), Some("Q1"), Some(100), Some("A"), Some(true))];
        let documents = group_activity_rows(&rows);

        let json = serde_json::to_value(&documents[0]).unwrap();
        let keys: Vec<&String> = json.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["_id", "class_id", "points", "questions"]);
    }
}
