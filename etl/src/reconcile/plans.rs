//! Reconciles the `plans` table from the staging subscription snapshot.

use std::collections::HashSet;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use pg_escape::quote_identifier;
use sqlx::PgPool;
use tracing::info;

use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;
use crate::reconcile::ReconcileCounts;

/// Parses a textual price into a numeric value.
///
/// Strips one leading currency symbol and thousands separators before
/// parsing. A malformed price is an error: the caller aborts the whole plans
/// pass rather than skipping the row.
pub fn parse_price(raw: &str) -> EtlResult<BigDecimal> {
    let cleaned = raw.trim().trim_start_matches('$').replace(',', "");

    BigDecimal::from_str(cleaned.trim()).map_err(|err| {
        etl_error!(
            ErrorKind::ConversionError,
            "Malformed price text",
            format!("could not parse price '{raw}'"),
            source: err
        )
    })
}

/// Converges the `plans` table with the staging subscription rows.
pub async fn reconcile_plans(pool: &PgPool, staging_schema: &str) -> EtlResult<ReconcileCounts> {
    let subscriptions_query = format!(
        "select id, plan_type, fixed_price from {}.subscription;",
        quote_identifier(staging_schema)
    );
    let subscriptions: Vec<(i32, String, String)> = sqlx::query_as(&subscriptions_query)
        .fetch_all(pool)
        .await?;

    let mut counts = ReconcileCounts::default();

    let valid_ids: Vec<i32> = subscriptions.iter().map(|row| row.0).collect();
    if valid_ids.is_empty() {
        info!("no subscriptions in staging, skipping plan deletions");
    } else {
        counts.removed = sqlx::query("delete from plans where id <> all($1);")
            .bind(&valid_ids)
            .execute(pool)
            .await?
            .rows_affected();
    }

    let existing_ids: HashSet<i32> = sqlx::query_scalar::<_, i32>("select id from plans;")
        .fetch_all(pool)
        .await?
        .into_iter()
        .collect();

    for (id, plan_type, fixed_price) in subscriptions {
        let value = parse_price(&fixed_price)?;

        if existing_ids.contains(&id) {
            sqlx::query("update plans set name = $1, value = $2 where id = $3;")
                .bind(&plan_type)
                .bind(&value)
                .bind(id)
                .execute(pool)
                .await?;
            counts.updated += 1;
        } else {
            sqlx::query("insert into plans (id, name, value) values ($1, $2, $3);")
                .bind(id)
                .bind(&plan_type)
                .bind(&value)
                .execute(pool)
                .await?;
            counts.inserted += 1;
        }
    }

    info!(
        inserted = counts.inserted,
        updated = counts.updated,
        deleted = counts.removed,
        "plans table reconciled"
    );

    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_parsing_strips_currency_symbol_and_separators() {
        assert_eq!(
            parse_price("$1,200.00").unwrap(),
            BigDecimal::from_str("1200.00").unwrap()
        );
        assert_eq!(
            parse_price("  $15.50 ").unwrap(),
            BigDecimal::from_str("15.50").unwrap()
        );
        assert_eq!(parse_price("980").unwrap(), BigDecimal::from_str("980").unwrap());
    }

    #[test]
    fn malformed_price_is_an_error() {
        let err = parse_price("free").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConversionError);

        assert!(parse_price("").is_err());
    }
}
