use std::cmp::Ordering;
use std::fmt;

use pg_escape::quote_identifier;

/// Fully qualified Postgres table name with schema and table components.
///
/// Represents a complete table identifier that includes both schema and table
/// name, providing methods for proper SQL identifier quoting and formatting.
#[derive(Debug, Clone, Eq, PartialEq, PartialOrd, Ord)]
pub struct TableName {
    /// The schema name containing the table
    pub schema: String,
    /// The name of the table within the schema
    pub name: String,
}

impl TableName {
    /// Creates a new [`TableName`] with the given schema and table name.
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> TableName {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// Returns the table name as a properly quoted Postgres identifier.
    ///
    /// Escapes both schema and table names according to Postgres identifier
    /// quoting rules to handle special characters and reserved keywords safely.
    pub fn as_quoted_identifier(&self) -> String {
        let quoted_schema = quote_identifier(&self.schema);
        let quoted_name = quote_identifier(&self.name);

        format!("{quoted_schema}.{quoted_name}")
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("{0}.{1}", self.schema, self.name))
    }
}

/// Catalog metadata for a single column as reported by `information_schema`.
///
/// The declared type is kept verbatim as the catalog spells it (for example
/// `character varying` or `integer`); rendering rules for DDL live with the
/// DDL synthesizer, not here.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ColumnDescriptor {
    /// The column name as stored in the catalog, case preserved.
    pub name: String,
    /// The declared data type, verbatim from the catalog.
    pub declared_type: String,
    /// Whether the column accepts NULL values.
    pub nullable: bool,
    /// Maximum character length for bounded text types, when declared.
    pub max_length: Option<i32>,
}

impl ColumnDescriptor {
    /// Creates a new [`ColumnDescriptor`] with the given metadata.
    pub fn new(
        name: impl Into<String>,
        declared_type: impl Into<String>,
        nullable: bool,
        max_length: Option<i32>,
    ) -> ColumnDescriptor {
        Self {
            name: name.into(),
            declared_type: declared_type.into(),
            nullable,
            max_length,
        }
    }

    /// Returns the column name normalized for identity comparison.
    ///
    /// Columns are matched between source and destination by trimmed,
    /// lowercased name; the stored-case name is still what DDL emits.
    pub fn normalized_name(&self) -> String {
        self.name.trim().to_lowercase()
    }
}

/// Structure of one table: its name plus columns in source ordinal order.
///
/// The column order is significant and must match the source's ordinal
/// positions, since row transfer reuses it when listing insert columns.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TableStructure {
    /// The fully qualified name of the table.
    pub name: TableName,
    /// The columns of the table, ordered by ordinal position.
    pub columns: Vec<ColumnDescriptor>,
}

impl TableStructure {
    /// Creates a new [`TableStructure`] with the given components.
    pub fn new(name: TableName, columns: Vec<ColumnDescriptor>) -> Self {
        Self { name, columns }
    }
}

impl PartialOrd for TableStructure {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TableStructure {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name.cmp(&other.name)
    }
}

/// A foreign key constraint read from the source catalog.
///
/// Read once from the source and applied once to the destination; there is
/// no existence check on re-application, so replays surface as constraint
/// errors that callers are expected to treat as non-fatal.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ForeignKeyDescriptor {
    /// Table the constraint is declared on.
    pub source_table: String,
    /// Constrained column on the declaring table.
    pub source_column: String,
    /// Table the constraint references.
    pub target_table: String,
    /// Referenced column on the target table.
    pub target_column: String,
    /// Constraint name as declared in the source catalog.
    pub constraint_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_name_quotes_identifiers_that_need_it() {
        let table = TableName::new("staging", "Flash Card");
        assert_eq!(table.as_quoted_identifier(), r#"staging."Flash Card""#);
        assert_eq!(table.to_string(), "staging.Flash Card");
    }

    #[test]
    fn normalized_name_trims_and_lowercases() {
        let column = ColumnDescriptor::new("  CreatedAt ", "timestamp", true, None);
        assert_eq!(column.normalized_name(), "createdat");
    }

    #[test]
    fn table_structures_order_by_name() {
        let a = TableStructure::new(TableName::new("staging", "answer"), vec![]);
        let b = TableStructure::new(TableName::new("staging", "question"), vec![]);
        assert!(a < b);
    }
}
