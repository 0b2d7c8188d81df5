//! Aggregation of staging lesson rows into nested class documents.
//!
//! The staging `lesson`, `module`, `lesson_text`, `flashcard` and `law`
//! tables are joined into one flat result and regrouped into class documents
//! with content fragments, flashcards and law references. Three one-to-many
//! joins fan out on the lesson id, so every nested list is guarded by its own
//! dedup key: the fragment text, the `front||back` pair, and the law number.
//!
//! Law descriptions are resolved through the [`LawLookup`] collaborator, once
//! per distinct law number within a lesson; a `None` result is stored as-is.

use std::collections::{HashMap, HashSet};

use mongodb::Collection;
use pg_escape::quote_identifier;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::info;

use crate::documents::lookup::LawLookup;
use crate::documents::text::split_text;
use crate::documents::{DocumentSyncCounts, reconcile_documents};
use crate::error::EtlResult;

/// The class document persisted in the `classes` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDocument {
    #[serde(rename = "_id")]
    pub id: i32,
    pub program_id: Option<i32>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub content: Vec<String>,
    pub flashcards: Vec<Flashcard>,
    pub laws: Vec<LawEntry>,
}

/// One flashcard of a lesson.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flashcard {
    pub front: String,
    pub back: String,
}

/// One law referenced by a lesson, with its resolved description when the
/// lookup produced one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LawEntry {
    pub number: String,
    pub description: Option<String>,
}

/// One row of the lesson join, ordered by lesson id.
#[derive(Debug, Clone)]
pub struct ClassRow {
    pub lesson_id: i32,
    pub lesson_name: Option<String>,
    pub module_id: Option<i32>,
    pub module_name: Option<String>,
    pub body: Option<String>,
    pub front: Option<String>,
    pub back: Option<String>,
    pub law_number: Option<String>,
}

/// Working state for one class while rows are grouped.
///
/// The seen-sets never leave this struct; only the finished document is
/// persisted.
struct ClassInProgress {
    document: ClassDocument,
    seen_content: HashSet<String>,
    seen_flashcards: HashSet<String>,
    seen_laws: HashSet<String>,
}

/// Groups the flat join rows into class documents.
///
/// Body text is segmented into fragments of at most `content_max_len`
/// characters before deduplication. A row needs both flashcard sides for a
/// flashcard to be appended; null nested keys are skipped entirely.
pub async fn group_class_rows(
    rows: &[ClassRow],
    content_max_len: usize,
    lookup: &dyn LawLookup,
) -> Vec<ClassDocument> {
    let mut order = vec![];
    let mut building: HashMap<i32, ClassInProgress> = HashMap::new();

    for row in rows {
        let entry = building.entry(row.lesson_id).or_insert_with(|| {
            order.push(row.lesson_id);

            ClassInProgress {
                document: ClassDocument {
                    id: row.lesson_id,
                    program_id: row.module_id,
                    title: row.lesson_name.clone(),
                    description: row.module_name.clone(),
                    content: vec![],
                    flashcards: vec![],
                    laws: vec![],
                },
                seen_content: HashSet::new(),
                seen_flashcards: HashSet::new(),
                seen_laws: HashSet::new(),
            }
        });

        if let Some(body) = row.body.as_deref() {
            for part in split_text(body, content_max_len) {
                if entry.seen_content.insert(part.clone()) {
                    entry.document.content.push(part);
                }
            }
        }

        if let (Some(front), Some(back)) = (row.front.as_deref(), row.back.as_deref()) {
            let key = format!("{front}||{back}");
            if entry.seen_flashcards.insert(key) {
                entry.document.flashcards.push(Flashcard {
                    front: front.to_owned(),
                    back: back.to_owned(),
                });
            }
        }

        if let Some(number) = row.law_number.as_deref()
            && entry.seen_laws.insert(number.to_owned())
        {
            let description = lookup.lookup(number).await;
            entry.document.laws.push(LawEntry {
                number: number.to_owned(),
                description,
            });
        }
    }

    order
        .into_iter()
        .filter_map(|id| building.remove(&id))
        .map(|in_progress| in_progress.document)
        .collect()
}

/// Reads the flat lesson join from the staging schema.
async fn fetch_class_rows(pool: &PgPool, staging_schema: &str) -> EtlResult<Vec<ClassRow>> {
    let staging = quote_identifier(staging_schema);
    let query = format!(
        "select
            l.id as lesson_id,
            l.name as lesson_name,
            l.module_id,
            m.name as module_name,
            t.body,
            f.front,
            f.back,
            w.law as law_number
        from {staging}.lesson l
        left join {staging}.module m on l.module_id = m.id
        left join {staging}.lesson_text t on t.lesson_id = l.id
        left join {staging}.flashcard f on f.lesson_id = l.id
        left join {staging}.law w on w.lesson_id = l.id
        order by l.id;"
    );

    type Row = (
        i32,
        Option<String>,
        Option<i32>,
        Option<String>,
        Option<String>,
        Option<String>,
        Option<String>,
        Option<String>,
    );
    let rows: Vec<Row> = sqlx::query_as(&query).fetch_all(pool).await?;

    Ok(rows
        .into_iter()
        .map(
            |(lesson_id, lesson_name, module_id, module_name, body, front, back, law_number)| {
                ClassRow {
                    lesson_id,
                    lesson_name,
                    module_id,
                    module_name,
                    body,
                    front,
                    back,
                    law_number,
                }
            },
        )
        .collect())
}

/// Rebuilds every class document from staging and converges the `classes`
/// collection with the result.
pub async fn sync_classes(
    pool: &PgPool,
    collection: &Collection<ClassDocument>,
    staging_schema: &str,
    content_max_len: usize,
    lookup: &dyn LawLookup,
) -> EtlResult<DocumentSyncCounts> {
    let rows = fetch_class_rows(pool, staging_schema).await?;
    let documents = group_class_rows(&rows, content_max_len, lookup).await;

    let counts = reconcile_documents(collection, &documents, |document| document.id).await?;

    info!(
        inserted = counts.inserted,
        updated = counts.updated,
        deleted = counts.deleted,
        "classes collection reconciled"
    );

    Ok(counts)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::documents::lookup::DisabledLawLookup;

    fn row(
        lesson_id: i32,
        body: Option<&str>,
        front: Option<&str>,
        back: Option<&str>,
        law_number: Option<&str>,
    ) -> ClassRow {
        ClassRow {
            lesson_id,
            lesson_name: Some("Intro".to_owned()),
            module_id: Some(4),
            module_name: Some("Basics".to_owned()),
            body: body.map(str::to_owned),
            front: front.map(str::to_owned),
            back: back.map(str::to_owned),
            law_number: law_number.map(str::to_owned),
        }
    }

    /// Records every looked-up reference and answers with a fixed description.
    struct RecordingLookup {
        calls: Mutex<Vec<String>>,
    }

    impl RecordingLookup {
        fn new() -> Self {
            Self {
                calls: Mutex::new(vec![]),
            }
        }
    }

    #[async_trait]
    impl LawLookup for RecordingLookup {
        async fn lookup(&self, reference: &str) -> Option<String> {
            self.calls.lock().unwrap().push(reference.to_owned());
            Some("resolved".to_owned())
        }
    }

    #[tokio::test]
    async fn repeated_flashcard_pairs_collapse_to_one_entry() {
        let rows = vec![
            row(1, None, Some("front"), Some("back"), None),
            row(1, None, Some("front"), Some("back"), None),
            row(1, None, Some("front"), Some("back"), None),
        ];

        let documents = group_class_rows(&rows, 250, &DisabledLawLookup).await;
        assert_eq!(documents.len(), 1);
        assert_eq!(
            documents[0].flashcards,
            vec![Flashcard {
                front: "front".to_owned(),
                back: "back".to_owned(),
            }]
        );
    }

    #[tokio::test]
    async fn half_flashcards_and_absent_nested_keys_are_skipped() {
        let rows = vec![row(1, None, Some("front"), None, None)];

        let documents = group_class_rows(&rows, 250, &DisabledLawLookup).await;
        assert!(documents[0].flashcards.is_empty());
        assert!(documents[0].content.is_empty());
        assert!(documents[0].laws.is_empty());
    }

    #[tokio::test]
    async fn body_text_is_fragmented_and_deduplicated() {
        // The same body arrives on every fanned-out row but is segmented and
        // stored once.
        let rows = vec![
            row(1, Some("First part, second part."), None, None, None),
            row(1, Some("First part, second part."), None, None, None),
        ];

        let documents = group_class_rows(&rows, 12, &DisabledLawLookup).await;
        assert_eq!(
            documents[0].content,
            vec!["First part,".to_owned(), "second part.".to_owned()]
        );
    }

    #[tokio::test]
    async fn each_distinct_law_is_looked_up_once() {
        let lookup = RecordingLookup::new();
        let rows = vec![
            row(1, None, None, None, Some("Law 8.078/1990")),
            row(1, None, None, None, Some("Law 8.078/1990")),
            row(1, None, None, None, Some("Decree 140/2011")),
        ];

        let documents = group_class_rows(&rows, 250, &lookup).await;
        assert_eq!(
            *lookup.calls.lock().unwrap(),
            vec!["Law 8.078/1990".to_owned(), "Decree 140/2011".to_owned()]
        );
        assert_eq!(documents[0].laws.len(), 2);
        assert_eq!(documents[0].laws[0].description.as_deref(), Some("resolved"));
    }

    #[tokio::test]
    async fn unresolved_descriptions_are_stored_as_null() {
        let rows = vec![row(1, None, None, None, Some("Law 8.078/1990"))];

        let documents = group_class_rows(&rows, 250, &DisabledLawLookup).await;
        assert_eq!(
            documents[0].laws,
            vec![LawEntry {
                number: "Law 8.078/1990".to_owned(),
                description: None,
            }]
        );
    }

    #[tokio::test]
    async fn rebuilding_from_the_same_rows_compares_equal() {
        let rows = vec![
            row(1, Some("One, two."), Some("front"), Some("back"), None),
            row(2, Some("Three."), None, None, None),
        ];

        let first = group_class_rows(&rows, 250, &DisabledLawLookup).await;
        let second = group_class_rows(&rows, 250, &DisabledLawLookup).await;
        assert_eq!(first, second);
    }
}
