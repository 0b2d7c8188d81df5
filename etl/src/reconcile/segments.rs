//! Reconciles the `segments` table from the staging course snapshot.

use std::collections::HashSet;

use pg_escape::quote_identifier;
use sqlx::PgPool;
use tracing::info;

use crate::error::EtlResult;
use crate::reconcile::ReconcileCounts;

/// Converges the `segments` table with the staging course rows.
pub async fn reconcile_segments(pool: &PgPool, staging_schema: &str) -> EtlResult<ReconcileCounts> {
    let courses_query = format!(
        "select id, name from {}.course;",
        quote_identifier(staging_schema)
    );
    let courses: Vec<(i32, String)> = sqlx::query_as(&courses_query).fetch_all(pool).await?;

    let mut counts = ReconcileCounts::default();

    let valid_ids: Vec<i32> = courses.iter().map(|row| row.0).collect();
    if valid_ids.is_empty() {
        info!("no courses in staging, skipping segment deletions");
    } else {
        counts.removed = sqlx::query("delete from segments where id <> all($1);")
            .bind(&valid_ids)
            .execute(pool)
            .await?
            .rows_affected();
    }

    let existing_ids: HashSet<i32> = sqlx::query_scalar::<_, i32>("select id from segments;")
        .fetch_all(pool)
        .await?
        .into_iter()
        .collect();

    for (id, name) in courses {
        if existing_ids.contains(&id) {
            sqlx::query("update segments set name = $1 where id = $2;")
                .bind(&name)
                .bind(id)
                .execute(pool)
                .await?;
            counts.updated += 1;
        } else {
            sqlx::query("insert into segments (id, name) values ($1, $2);")
                .bind(id)
                .bind(&name)
                .execute(pool)
                .await?;
            counts.inserted += 1;
        }
    }

    info!(
        inserted = counts.inserted,
        updated = counts.updated,
        deleted = counts.removed,
        "segments table reconciled"
    );

    Ok(counts)
}
