//! Column-level structure synchronization between source and staging.
//!
//! For every table of the source namespace the differ compares the live
//! column sets of both databases, keyed by trimmed lowercase name, and
//! converges the staging table with `ADD COLUMN` / `DROP COLUMN` statements.
//! The pass is idempotent: when the structures already match it performs no
//! operations. A column whose normalized name is `id` is never dropped, which
//! protects the synthesized primary key even if source naming drifts.

use std::collections::HashMap;

use etl_postgres::{ColumnDescriptor, TableName};
use pg_escape::quote_identifier;
use tracing::{error, info};

use crate::clients::postgres::PgDatabaseClient;
use crate::error::EtlResult;

/// One structural operation needed to converge a staging table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnOp {
    /// The column exists on the source but not on the destination.
    Add(ColumnDescriptor),
    /// The column (destination stored-case name) no longer exists on the
    /// source.
    Drop(String),
}

/// Computes the operations converging the destination column set with the
/// source's.
///
/// Additions preserve the source column order; drops follow the destination
/// order. Matching is performed on normalized names while the emitted
/// operations carry the stored-case names.
pub fn compute_column_ops(
    source: &[ColumnDescriptor],
    destination: &[ColumnDescriptor],
) -> Vec<ColumnOp> {
    let source_by_name: HashMap<String, &ColumnDescriptor> = source
        .iter()
        .map(|column| (column.normalized_name(), column))
        .collect();
    let destination_by_name: HashMap<String, &ColumnDescriptor> = destination
        .iter()
        .map(|column| (column.normalized_name(), column))
        .collect();

    let mut ops = vec![];

    for column in source {
        if !destination_by_name.contains_key(&column.normalized_name()) {
            ops.push(ColumnOp::Add(column.clone()));
        }
    }

    for column in destination {
        let normalized = column.normalized_name();
        if normalized == "id" {
            continue;
        }

        if !source_by_name.contains_key(&normalized) {
            ops.push(ColumnOp::Drop(column.name.clone()));
        }
    }

    ops
}

/// Maps a declared source type to the type used in `ADD COLUMN`.
///
/// Unlike table creation, which uppercases the passthrough types, additions
/// keep them lowercase.
pub fn add_column_type(column: &ColumnDescriptor) -> String {
    if column.declared_type.eq_ignore_ascii_case("character varying") {
        return match column.max_length {
            Some(max_length) => format!("VARCHAR({max_length})"),
            None => "VARCHAR".to_owned(),
        };
    }

    column.declared_type.to_lowercase()
}

/// Summary of one structure synchronization pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StructureSyncReport {
    pub added_columns: usize,
    pub dropped_columns: usize,
}

/// Synchronizes the column structure of every staging table with its source
/// counterpart.
///
/// Catalog reads propagate their errors (fatal to the run); individual ALTER
/// statements run in their own transaction and a failure only skips that one
/// operation.
pub async fn sync_table_structures(
    source: &PgDatabaseClient,
    destination: &PgDatabaseClient,
    source_schema: &str,
    staging_schema: &str,
) -> EtlResult<StructureSyncReport> {
    let mut report = StructureSyncReport::default();

    for table in source.list_tables(source_schema).await? {
        let source_columns = source.get_table_columns(source_schema, &table).await?;
        let destination_columns = destination.get_table_columns(staging_schema, &table).await?;

        let staging_table = TableName::new(staging_schema, table.clone());
        for op in compute_column_ops(&source_columns, &destination_columns) {
            match op {
                ColumnOp::Add(column) => {
                    let query = format!(
                        "alter table {} add column {} {};",
                        staging_table.as_quoted_identifier(),
                        quote_identifier(&column.name),
                        add_column_type(&column)
                    );

                    match destination.simple_query(&query).await {
                        Ok(_) => {
                            info!(table = %staging_table, column = %column.name, "column added");
                            report.added_columns += 1;
                        }
                        Err(err) => {
                            error!(
                                table = %staging_table,
                                column = %column.name,
                                "failed to add column: {}",
                                err
                            );
                        }
                    }
                }
                ColumnOp::Drop(column) => {
                    let query = format!(
                        "alter table {} drop column if exists {} cascade;",
                        staging_table.as_quoted_identifier(),
                        quote_identifier(&column)
                    );

                    match destination.simple_query(&query).await {
                        Ok(_) => {
                            info!(table = %staging_table, column = %column, "column dropped");
                            report.dropped_columns += 1;
                        }
                        Err(err) => {
                            error!(
                                table = %staging_table,
                                column = %column,
                                "failed to drop column: {}",
                                err
                            );
                        }
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

    fn column(name: &str, declared_type: &str) -> ColumnDescriptor {
        ColumnDescriptor::new(name, declared_type, true, None)
    }

    #[test]
    fn matching_structures_need_no_operations() {
        let source = vec![column("id", "integer"), column("name", "text")];
        let destination = vec![column("id", "integer"), column("name", "text")];

        assert!(compute_column_ops(&source, &destination).is_empty());
    }

    #[test]
    fn source_only_columns_are_added_in_order() {
        let source = vec![
            column("id", "integer"),
            column("rating", "numeric"),
            column("notes", "text"),
        ];
        let destination = vec![column("id", "integer")];

        let ops = compute_column_ops(&source, &destination);
        assert_eq!(
            ops,
            vec![
                ColumnOp::Add(column("rating", "numeric")),
                ColumnOp::Add(column("notes", "text")),
            ]
        );
    }

    #[test]
    fn destination_only_columns_are_dropped() {
        let source = vec![column("id", "integer")];
        let destination = vec![column("id", "integer"), column("legacy", "text")];

        let ops = compute_column_ops(&source, &destination);
        assert_eq!(ops, vec![ColumnOp::Drop("legacy".to_owned())]);
    }

    #[test]
    fn id_is_never_dropped_even_when_absent_from_source() {
        let source = vec![column("code", "text")];
        let destination = vec![column("Id", "integer"), column("code", "text")];

        let ops = compute_column_ops(&source, &destination);
        assert!(ops.is_empty());
    }

    #[test]
    fn comparison_normalizes_case_and_whitespace() {
        let source = vec![column("  Name ", "text")];
        let destination = vec![column("name", "text")];

        assert!(compute_column_ops(&source, &destination).is_empty());
    }

    #[test]
    fn added_varchar_keeps_its_bound_and_passthrough_is_lowercase() {
        let bounded = ColumnDescriptor::new("title", "character varying", true, Some(60));
        assert_eq!(add_column_type(&bounded), "VARCHAR(60)");

        let passthrough = ColumnDescriptor::new("score", "NUMERIC", true, None);
        assert_eq!(add_column_type(&passthrough), "numeric");
    }
}
