//! Diff-aware bulk row transfer from the source namespace into staging.
//!
//! Rows travel through the simple query protocol in text form and are
//! re-emitted as quoted literals, so arbitrary staging tables can be copied
//! without knowing their types at compile time. Inserts are append-only:
//! `ON CONFLICT (id) DO NOTHING` never overwrites an existing row.
//!
//! **Limitation**: a table is skipped when source and destination row counts
//! match, which is a count check rather than a content check and can miss
//! same-count drift in already-transferred rows.

use etl_postgres::TableName;
use pg_escape::{quote_identifier, quote_literal};
use tokio_postgres::SimpleQueryMessage;
use tracing::{error, info};

use crate::clients::postgres::PgDatabaseClient;
use crate::error::EtlResult;

/// Maximum number of rows emitted per INSERT statement.
const INSERT_CHUNK_SIZE: usize = 500;

/// Decision taken for one table before any row is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferAction {
    /// The source table has no rows; the destination is left untouched.
    SkipEmptySource,
    /// Source and destination row counts match; nothing to do.
    SkipRowCountEqual,
    /// Rows must be copied.
    Copy,
}

/// Chooses the transfer action from the observed row counts.
pub fn transfer_action(source_rows: usize, destination_rows: usize) -> TransferAction {
    if source_rows == 0 {
        return TransferAction::SkipEmptySource;
    }

    if source_rows == destination_rows {
        return TransferAction::SkipRowCountEqual;
    }

    TransferAction::Copy
}

/// All rows of one table in text form, with the column names in source
/// ordinal order.
#[derive(Debug, Default)]
pub struct TextRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

/// Reads every row of a table through the simple query protocol.
pub async fn fetch_text_rows(
    client: &PgDatabaseClient,
    table: &TableName,
) -> EtlResult<TextRows> {
    let query = format!("select * from {};", table.as_quoted_identifier());

    let mut result = TextRows::default();
    for message in client.simple_query(&query).await? {
        match message {
            SimpleQueryMessage::RowDescription(description) => {
                result.columns = description
                    .iter()
                    .map(|column| column.name().to_owned())
                    .collect();
            }
            SimpleQueryMessage::Row(row) => {
                if result.columns.is_empty() {
                    result.columns = row
                        .columns()
                        .iter()
                        .map(|column| column.name().to_owned())
                        .collect();
                }

                let values = (0..row.len())
                    .map(|index| row.get(index).map(str::to_owned))
                    .collect();
                result.rows.push(values);
            }
            _ => {}
        }
    }

    Ok(result)
}

/// Builds one conflict-tolerant INSERT statement for a chunk of rows.
pub fn insert_statement(
    table: &TableName,
    columns: &[String],
    rows: &[Vec<Option<String>>],
) -> String {
    let column_list = columns
        .iter()
        .map(|column| quote_identifier(column).into_owned())
        .collect::<Vec<_>>()
        .join(", ");

    let values = rows
        .iter()
        .map(|row| {
            let literals = row
                .iter()
                .map(|value| match value {
                    Some(value) => quote_literal(value),
                    None => "NULL".to_owned(),
                })
                .collect::<Vec<_>>()
                .join(", ");

            format!("({literals})")
        })
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "insert into {} ({}) values {} on conflict (id) do nothing;",
        table.as_quoted_identifier(),
        column_list,
        values
    )
}

/// Summary of one full transfer pass over the source namespace.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TransferReport {
    pub copied_tables: usize,
    pub skipped_empty: usize,
    pub skipped_in_sync: usize,
    pub failed_tables: usize,
    pub inserted_rows: usize,
}

/// Copies the rows of one source table into its staging counterpart inside a
/// single transaction.
///
/// Returns the number of source rows submitted. A failure rolls back this
/// table's transfer only.
async fn copy_table_rows(
    destination: &PgDatabaseClient,
    staging_table: &TableName,
    source_rows: &TextRows,
) -> EtlResult<usize> {
    destination.begin_tx().await?;

    for chunk in source_rows.rows.chunks(INSERT_CHUNK_SIZE) {
        let statement = insert_statement(staging_table, &source_rows.columns, chunk);
        if let Err(err) = destination.simple_query(&statement).await {
            destination.rollback_tx().await?;
            return Err(err);
        }
    }

    destination.commit_tx().await?;

    Ok(source_rows.rows.len())
}

/// Transfers every table of the source namespace into the staging schema.
///
/// Tables are processed independently: a failed table is rolled back and
/// logged while the remaining tables proceed.
pub async fn transfer_all(
    source: &PgDatabaseClient,
    destination: &PgDatabaseClient,
    source_schema: &str,
    staging_schema: &str,
) -> EtlResult<TransferReport> {
    let mut report = TransferReport::default();

    for table in source.list_tables(source_schema).await? {
        let source_table = TableName::new(source_schema, table.clone());
        let staging_table = TableName::new(staging_schema, table.clone());

        let source_rows = fetch_text_rows(source, &source_table).await?;
        let destination_rows = fetch_text_rows(destination, &staging_table)
            .await
            .map(|rows| rows.rows.len());

        let destination_rows = match destination_rows {
            Ok(count) => count,
            Err(err) => {
                error!(table = %staging_table, "failed to read staging rows: {}", err);
                report.failed_tables += 1;
                continue;
            }
        };

        match transfer_action(source_rows.rows.len(), destination_rows) {
            TransferAction::SkipEmptySource => {
                info!(table = %source_table, "no rows found in source table, skipping");
                report.skipped_empty += 1;
            }
            TransferAction::SkipRowCountEqual => {
                info!(table = %staging_table, "staging table already up to date, skipping");
                report.skipped_in_sync += 1;
            }
            TransferAction::Copy => {
                match copy_table_rows(destination, &staging_table, &source_rows).await {
                    Ok(inserted) => {
                        info!(table = %staging_table, rows = inserted, "rows transferred");
                        report.copied_tables += 1;
                        report.inserted_rows += inserted;
                    }
                    Err(err) => {
                        error!(table = %staging_table, "failed to transfer rows: {}", err);
                        report.failed_tables += 1;
                    }
                }
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_source_is_skipped_before_count_comparison() {
        assert_eq!(transfer_action(0, 0), TransferAction::SkipEmptySource);
        assert_eq!(transfer_action(0, 7), TransferAction::SkipEmptySource);
    }

    #[test]
    fn equal_counts_skip_the_copy() {
        assert_eq!(transfer_action(3, 3), TransferAction::SkipRowCountEqual);
        assert_eq!(transfer_action(3, 1), TransferAction::Copy);
        assert_eq!(transfer_action(1, 3), TransferAction::Copy);
    }

    #[test]
    fn insert_statement_quotes_literals_and_nulls() {
        let table = TableName::new("staging", "course");
        let columns = vec!["id".to_owned(), "name".to_owned()];
        let rows = vec![
            vec![Some("1".to_owned()), Some("Bob's course".to_owned())],
            vec![Some("2".to_owned()), None],
        ];

        assert_eq!(
            insert_statement(&table, &columns, &rows),
            "insert into staging.course (id, name) \
             values ('1', 'Bob''s course'), ('2', NULL) \
             on conflict (id) do nothing;"
        );
    }
}
