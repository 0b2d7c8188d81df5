//! DDL synthesis for the staging schema.
//!
//! Converts the structural model read by the catalog inspector into
//! `CREATE TABLE IF NOT EXISTS` and `ALTER TABLE ... ADD CONSTRAINT`
//! statements against the staging namespace. Execution is best-effort per
//! table and per constraint: a failed statement is logged and the remaining
//! statements still run, so a partially broken source never blocks the whole
//! structural mirror.

use etl_postgres::{ColumnDescriptor, ForeignKeyDescriptor, TableName, TableStructure};
use pg_escape::quote_identifier;
use tracing::{error, info, warn};

use crate::clients::postgres::PgDatabaseClient;
use crate::error::EtlResult;

/// Renders the column definition used inside a `CREATE TABLE` statement.
///
/// A column named `id` (case-insensitive) becomes an auto-incrementing
/// primary key regardless of its source type. `character varying` becomes a
/// bounded `VARCHAR` parameterized with the source's maximum length; every
/// other declared type passes through uppercased. `NOT NULL` is rendered only
/// when the source marks the column non-nullable.
pub fn column_definition(column: &ColumnDescriptor) -> String {
    let rendered_type = if column.normalized_name() == "id" {
        "SERIAL PRIMARY KEY".to_owned()
    } else {
        create_column_type(column)
    };

    let not_null = if column.nullable { "" } else { " NOT NULL" };

    format!(
        "{} {}{}",
        quote_identifier(&column.name),
        rendered_type,
        not_null
    )
}

/// Maps a declared source type to the type used in `CREATE TABLE`.
fn create_column_type(column: &ColumnDescriptor) -> String {
    if column.declared_type.eq_ignore_ascii_case("character varying") {
        return match column.max_length {
            Some(max_length) => format!("VARCHAR({max_length})"),
            // The catalog reports no length for an unbounded varchar.
            None => "VARCHAR".to_owned(),
        };
    }

    column.declared_type.to_uppercase()
}

/// Builds the `CREATE TABLE IF NOT EXISTS` statement mirroring one source
/// table into the staging schema.
pub fn create_table_sql(staging_schema: &str, table: &TableStructure) -> String {
    let column_definitions = table
        .columns
        .iter()
        .map(column_definition)
        .collect::<Vec<_>>()
        .join(", ");

    let staging_table = TableName::new(staging_schema, table.name.name.clone());

    format!(
        "create table if not exists {} ({});",
        staging_table.as_quoted_identifier(),
        column_definitions
    )
}

/// Builds the `ALTER TABLE` statement replaying one source foreign key inside
/// the staging schema.
///
/// Both endpoints of the constraint are rewritten into the staging namespace,
/// since the referenced table is mirrored there as well.
pub fn add_foreign_key_sql(staging_schema: &str, fk: &ForeignKeyDescriptor) -> String {
    let source_table = TableName::new(staging_schema, fk.source_table.clone());
    let target_table = TableName::new(staging_schema, fk.target_table.clone());

    format!(
        "alter table {} add constraint {} foreign key ({}) references {} ({});",
        source_table.as_quoted_identifier(),
        quote_identifier(&fk.constraint_name),
        quote_identifier(&fk.source_column),
        target_table.as_quoted_identifier(),
        quote_identifier(&fk.target_column),
    )
}

/// Creates the staging schema when it does not exist yet.
pub async fn create_staging_schema(
    destination: &PgDatabaseClient,
    staging_schema: &str,
) -> EtlResult<()> {
    let query = format!(
        "create schema if not exists {};",
        quote_identifier(staging_schema)
    );
    destination.simple_query(&query).await?;

    info!(schema = staging_schema, "staging schema is present");

    Ok(())
}

/// Creates one staging table per source table, best-effort.
///
/// Returns the number of statements that executed successfully. Failures are
/// logged and do not abort the remaining tables.
pub async fn create_tables(
    destination: &PgDatabaseClient,
    staging_schema: &str,
    structures: &[TableStructure],
) -> usize {
    let mut created = 0;

    for table in structures {
        let query = create_table_sql(staging_schema, table);

        match destination.simple_query(&query).await {
            Ok(_) => {
                info!(table = %table.name.name, "staging table is present");
                created += 1;
            }
            Err(err) => {
                error!(table = %table.name.name, "failed to create staging table: {}", err);
            }
        }
    }

    created
}

/// Replays the source foreign keys inside the staging schema, best-effort.
///
/// There is no existence check: rerunning over already-applied constraints
/// fails per constraint with a duplicate error, which is logged and skipped.
pub async fn create_foreign_keys(
    destination: &PgDatabaseClient,
    staging_schema: &str,
    foreign_keys: &[ForeignKeyDescriptor],
) -> usize {
    let mut created = 0;

    for fk in foreign_keys {
        let query = add_foreign_key_sql(staging_schema, fk);

        match destination.simple_query(&query).await {
            Ok(_) => {
                info!(constraint = %fk.constraint_name, "foreign key created");
                created += 1;
            }
            Err(err) => {
                warn!(constraint = %fk.constraint_name, "failed to create foreign key: {}", err);
            }
        }
    }

    created
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(
        name: &str,
        declared_type: &str,
        nullable: bool,
        max_length: Option<i32>,
    ) -> ColumnDescriptor {
        ColumnDescriptor::new(name, declared_type, nullable, max_length)
    }

    #[test]
    fn id_column_becomes_serial_primary_key() {
        let definition = column_definition(&column("id", "integer", false, None));
        assert_eq!(definition, "id SERIAL PRIMARY KEY NOT NULL");

        // Case-insensitive, and the source type is irrelevant.
        let definition = column_definition(&column("ID", "uuid", true, None));
        assert_eq!(definition, r#""ID" SERIAL PRIMARY KEY"#);
    }

    #[test]
    fn varchar_is_bounded_by_source_length() {
        let definition = column_definition(&column("name", "character varying", true, Some(80)));
        assert_eq!(definition, "name VARCHAR(80)");

        let definition = column_definition(&column("name", "character varying", false, None));
        assert_eq!(definition, "name VARCHAR NOT NULL");
    }

    #[test]
    fn other_types_pass_through_uppercased() {
        let definition = column_definition(&column("points", "numeric", true, None));
        assert_eq!(definition, "points NUMERIC");

        let definition = column_definition(&column("created_at", "timestamp without time zone", false, None));
        assert_eq!(definition, "created_at TIMESTAMP WITHOUT TIME ZONE NOT NULL");
    }

    #[test]
    fn create_table_joins_definitions_with_commas() {
        let table = TableStructure::new(
            TableName::new("public", "course"),
            vec![
                column("id", "integer", false, None),
                column("name", "character varying", false, Some(120)),
            ],
        );

        assert_eq!(
            create_table_sql("staging", &table),
            "create table if not exists staging.course \
             (id SERIAL PRIMARY KEY NOT NULL, name VARCHAR(120) NOT NULL);"
        );
    }

    #[test]
    fn foreign_keys_are_rewritten_into_the_staging_schema() {
        let fk = ForeignKeyDescriptor {
            source_table: "question".to_owned(),
            source_column: "activity_id".to_owned(),
            target_table: "activity".to_owned(),
            target_column: "id".to_owned(),
            constraint_name: "question_activity_id_fkey".to_owned(),
        };

        assert_eq!(
            add_foreign_key_sql("staging", &fk),
            "alter table staging.question add constraint question_activity_id_fkey \
             foreign key (activity_id) references staging.activity (id);"
        );
    }
}
