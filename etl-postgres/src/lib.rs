//! Shared Postgres structural types for the staging mirror.
//!
//! These types model what the catalog inspector reads from a live database:
//! table identity, column metadata in ordinal order, and foreign key
//! relationships. They carry no connection logic of their own.

pub mod schema;

pub use schema::{ColumnDescriptor, ForeignKeyDescriptor, TableName, TableStructure};
