//! Document aggregation and reconciliation for the learning-content store.
//!
//! The aggregators join normalized staging rows into nested documents and
//! converge them against a document collection. Writes are equality-guarded:
//! an existing document is replaced only when it differs field-for-field from
//! the newly built one, so an unchanged source produces zero replace
//! operations.

use std::collections::HashSet;

use mongodb::Collection;
use mongodb::bson::{Bson, doc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::error::EtlResult;

pub mod activities;
pub mod classes;
pub mod lookup;
pub mod text;

/// Per-collection counts logged after each document pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DocumentSyncCounts {
    pub inserted: u64,
    pub updated: u64,
    pub deleted: u64,
}

/// Converges a document collection with freshly built documents.
///
/// Per-document failures are logged and skipped while the pass continues;
/// documents whose id is no longer present in the source set are deleted in
/// bulk at the end.
pub(crate) async fn reconcile_documents<T>(
    collection: &Collection<T>,
    documents: &[T],
    id_of: impl Fn(&T) -> i32,
) -> EtlResult<DocumentSyncCounts>
where
    T: Serialize + DeserializeOwned + PartialEq + Send + Sync,
{
    let existing_ids: HashSet<i32> = collection
        .distinct("_id", doc! {})
        .await?
        .iter()
        .filter_map(bson_id)
        .collect();

    let mut counts = DocumentSyncCounts::default();
    let mut valid_ids = HashSet::new();

    for document in documents {
        let id = id_of(document);
        valid_ids.insert(id);

        if let Err(err) = upsert_document(collection, id, document, &mut counts).await {
            warn!(document = id, "failed to reconcile document: {}", err);
        }
    }

    let to_delete: Vec<i32> = existing_ids.difference(&valid_ids).copied().collect();
    if !to_delete.is_empty() {
        let result = collection
            .delete_many(doc! { "_id": { "$in": to_delete } })
            .await?;
        counts.deleted = result.deleted_count;
    }

    Ok(counts)
}

/// Inserts a document when absent, replaces it only when it changed.
async fn upsert_document<T>(
    collection: &Collection<T>,
    id: i32,
    document: &T,
    counts: &mut DocumentSyncCounts,
) -> EtlResult<()>
where
    T: Serialize + DeserializeOwned + PartialEq + Send + Sync,
{
    match collection.find_one(doc! { "_id": id }).await? {
        None => {
            collection.insert_one(document).await?;
            counts.inserted += 1;
        }
        Some(existing) if existing != *document => {
            collection.replace_one(doc! { "_id": id }, document).await?;
            counts.updated += 1;
        }
        Some(_) => {}
    }

    Ok(())
}

/// Extracts a numeric document id from a raw BSON value.
fn bson_id(value: &Bson) -> Option<i32> {
    match value {
        Bson::Int32(id) => Some(*id),
        Bson::Int64(id) => i32::try_from(*id).ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bson_ids_accept_both_integer_widths() {
        assert_eq!(bson_id(&Bson::Int32(7)), Some(7));
        assert_eq!(bson_id(&Bson::Int64(7)), Some(7));
        assert_eq!(bson_id(&Bson::Int64(i64::MAX)), None);
        assert_eq!(bson_id(&Bson::String("7".to_owned())), None);
    }
}
