//! Reconciles the `workers` table from the staging producer snapshot.
//!
//! Workers are never hard-deleted: a worker absent from the source is marked
//! inactive instead, preserving historical foreign key references from other
//! tables. Inserts stamp a creation date and start out active.

use std::collections::HashSet;

use pg_escape::quote_identifier;
use sqlx::PgPool;
use tracing::info;

use crate::error::EtlResult;
use crate::reconcile::ReconcileCounts;

/// Converges the `workers` table with the staging producer rows.
pub async fn reconcile_workers(pool: &PgPool, staging_schema: &str) -> EtlResult<ReconcileCounts> {
    let staging = quote_identifier(staging_schema);
    let producers_query = format!(
        "select
            p.id,
            p.email,
            p.first_name || ' ' || p.last_name as full_name,
            s.company_id
        from {staging}.producer p
        join {staging}.supplier s on p.supplier_id = s.id;"
    );
    let producers: Vec<(i32, String, String, i32)> = sqlx::query_as(&producers_query)
        .fetch_all(pool)
        .await?;

    let mut counts = ReconcileCounts::default();

    let valid_ids: Vec<i32> = producers.iter().map(|row| row.0).collect();
    if valid_ids.is_empty() {
        info!("no producers in staging, no workers were deactivated");
    } else {
        // Soft delete: the rows stay behind with their history.
        counts.removed = sqlx::query("update workers set active = false where id <> all($1);")
            .bind(&valid_ids)
            .execute(pool)
            .await?
            .rows_affected();
    }

    let existing_ids: HashSet<i32> = sqlx::query_scalar::<_, i32>("select id from workers;")
        .fetch_all(pool)
        .await?
        .into_iter()
        .collect();

    for (id, email, full_name, company_id) in producers {
        if existing_ids.contains(&id) {
            sqlx::query("update workers set name = $1, email = $2, company_id = $3 where id = $4;")
                .bind(&full_name)
                .bind(&email)
                .bind(company_id)
                .bind(id)
                .execute(pool)
                .await?;
            counts.updated += 1;
        } else {
            sqlx::query(
                "insert into workers (id, email, name, company_id, created_at, active)
                values ($1, $2, $3, $4, current_date, true);",
            )
            .bind(id)
            .bind(&email)
            .bind(&full_name)
            .bind(company_id)
            .execute(pool)
            .await?;
            counts.inserted += 1;
        }
    }

    info!(
        inserted = counts.inserted,
        updated = counts.updated,
        deactivated = counts.removed,
        "workers table reconciled"
    );

    Ok(counts)
}
