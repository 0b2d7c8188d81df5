//! Postgres client for catalog inspection, DDL execution and bulk transfer.
//!
//! The client wraps a tokio-postgres connection and speaks the simple query
//! protocol exclusively: the statements it runs are synthesized from catalog
//! metadata at runtime, so there is nothing to prepare. Identifiers and
//! literals are escaped with `pg_escape` before interpolation.

use std::io::BufReader;
use std::str::FromStr;
use std::sync::Arc;

use etl_config::shared::{IntoConnectOptions, PgConnectionConfig};
use etl_postgres::{ColumnDescriptor, ForeignKeyDescriptor, TableName, TableStructure};
use pg_escape::quote_literal;
use rustls::ClientConfig;
use tokio_postgres::tls::MakeTlsConnect;
use tokio_postgres::{
    Client, Config, Connection, NoTls, SimpleQueryMessage, SimpleQueryRow, Socket,
};
use tokio_postgres_rustls::MakeRustlsConnect;
use tracing::{error, info};

use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;

/// Which side of the mirror a connection belongs to.
///
/// Determines the error classification of connection failures, which is what
/// separates "the source is unreachable" from "the destination is
/// unreachable" in the run report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseRole {
    Source,
    Destination,
}

impl DatabaseRole {
    fn connection_error_kind(&self) -> ErrorKind {
        match self {
            DatabaseRole::Source => ErrorKind::SourceConnectionFailed,
            DatabaseRole::Destination => ErrorKind::DestinationConnectionFailed,
        }
    }
}

/// Spawns a background task to monitor a Postgres connection until it
/// terminates.
fn spawn_postgres_connection<T>(connection: Connection<Socket, T::Stream>)
where
    T: MakeTlsConnect<Socket>,
    T::Stream: Send + 'static,
{
    tokio::spawn(async move {
        match connection.await {
            Err(err) => error!("an error occurred during the postgres connection: {}", err),
            Ok(()) => info!("postgres connection terminated successfully"),
        }
    });
}

/// A client for one of the two relational databases involved in a mirror run.
#[derive(Debug, Clone)]
pub struct PgDatabaseClient {
    client: Arc<Client>,
    role: DatabaseRole,
}

impl PgDatabaseClient {
    /// Establishes a connection to Postgres. The connection uses TLS if
    /// configured in the supplied [`PgConnectionConfig`].
    pub async fn connect(config: &PgConnectionConfig, role: DatabaseRole) -> EtlResult<Self> {
        match config.tls.enabled {
            true => Self::connect_tls(config, role).await,
            false => Self::connect_no_tls(config, role).await,
        }
    }

    /// Establishes a connection to Postgres without TLS encryption.
    async fn connect_no_tls(config: &PgConnectionConfig, role: DatabaseRole) -> EtlResult<Self> {
        let pg_config: Config = config.with_db();

        let (client, connection) = pg_config.connect(NoTls).await.map_err(|err| {
            etl_error!(
                role.connection_error_kind(),
                "Failed to connect to postgres",
                format!("could not connect to {}:{}", config.host, config.port),
                source: err
            )
        })?;

        spawn_postgres_connection::<NoTls>(connection);

        info!(role = ?role, "successfully connected to postgres without tls");

        Ok(Self {
            client: Arc::new(client),
            role,
        })
    }

    /// Establishes a TLS-encrypted connection to Postgres.
    async fn connect_tls(config: &PgConnectionConfig, role: DatabaseRole) -> EtlResult<Self> {
        let pg_config: Config = config.with_db();

        let mut root_store = rustls::RootCertStore::empty();
        let mut root_certs_reader = BufReader::new(config.tls.trusted_root_certs.as_bytes());
        for cert in rustls_pemfile::certs(&mut root_certs_reader) {
            let cert = cert?;
            root_store.add(cert).map_err(|err| {
                etl_error!(
                    ErrorKind::ConfigError,
                    "Invalid trusted root certificate",
                    source: err
                )
            })?;
        }

        let tls_config = ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();

        let (client, connection) = pg_config
            .connect(MakeRustlsConnect::new(tls_config))
            .await
            .map_err(|err| {
                etl_error!(
                    role.connection_error_kind(),
                    "Failed to connect to postgres",
                    format!("could not connect to {}:{}", config.host, config.port),
                    source: err
                )
            })?;

        spawn_postgres_connection::<MakeRustlsConnect>(connection);

        info!(role = ?role, "successfully connected to postgres with tls");

        Ok(Self {
            client: Arc::new(client),
            role,
        })
    }

    /// Returns the role this connection was opened with.
    pub fn role(&self) -> DatabaseRole {
        self.role
    }

    /// Runs a statement through the simple query protocol.
    pub async fn simple_query(&self, query: &str) -> EtlResult<Vec<SimpleQueryMessage>> {
        Ok(self.client.simple_query(query).await?)
    }

    /// Begins a new transaction.
    pub async fn begin_tx(&self) -> EtlResult<()> {
        self.client.simple_query("begin;").await?;

        Ok(())
    }

    /// Commits the current transaction.
    pub async fn commit_tx(&self) -> EtlResult<()> {
        self.client.simple_query("commit;").await?;

        Ok(())
    }

    /// Rolls back the current transaction.
    pub async fn rollback_tx(&self) -> EtlResult<()> {
        self.client.simple_query("rollback;").await?;

        Ok(())
    }

    /// Lists the tables of a namespace.
    ///
    /// Only the namespace constraint filters the result; system tables do not
    /// appear because they live in their own namespaces.
    pub async fn list_tables(&self, schema: &str) -> EtlResult<Vec<String>> {
        let query = format!(
            "select table_name from information_schema.tables where table_schema = {} order by table_name;",
            quote_literal(schema)
        );

        let mut tables = vec![];
        for message in self.simple_query(&query).await? {
            if let SimpleQueryMessage::Row(row) = message {
                tables.push(row_value::<String>(&row, "table_name")?);
            }
        }

        Ok(tables)
    }

    /// Retrieves catalog metadata for all columns of a table, in ordinal
    /// order.
    pub async fn get_table_columns(
        &self,
        schema: &str,
        table: &str,
    ) -> EtlResult<Vec<ColumnDescriptor>> {
        let query = format!(
            "select column_name, data_type, is_nullable, character_maximum_length
            from information_schema.columns
            where table_schema = {} and table_name = {}
            order by ordinal_position;",
            quote_literal(schema),
            quote_literal(table)
        );

        let mut columns = vec![];
        for message in self.simple_query(&query).await? {
            if let SimpleQueryMessage::Row(row) = message {
                let name = row_value::<String>(&row, "column_name")?;
                let declared_type = row_value::<String>(&row, "data_type")?;
                let nullable = row_value::<String>(&row, "is_nullable")? == "YES";
                let max_length = optional_row_value::<i32>(&row, "character_maximum_length")?;

                columns.push(ColumnDescriptor::new(name, declared_type, nullable, max_length));
            }
        }

        Ok(columns)
    }

    /// Reads the full structural model of a namespace: every table with its
    /// columns in ordinal order.
    pub async fn get_table_structures(&self, schema: &str) -> EtlResult<Vec<TableStructure>> {
        let mut structures = vec![];
        for table in self.list_tables(schema).await? {
            let columns = self.get_table_columns(schema, &table).await?;
            structures.push(TableStructure::new(TableName::new(schema, table), columns));
        }

        Ok(structures)
    }

    /// Reads all foreign key constraints declared on tables of a namespace.
    pub async fn get_foreign_keys(&self, schema: &str) -> EtlResult<Vec<ForeignKeyDescriptor>> {
        let query = format!(
            "select
                t.relname as source_table,
                a.attname as source_column,
                tr.relname as target_table,
                ar.attname as target_column,
                c.conname as constraint_name
            from pg_constraint c
            join pg_class t on t.oid = c.conrelid
            join pg_namespace n on n.oid = t.relnamespace
            join pg_attribute a on a.attrelid = t.oid and a.attnum = any(c.conkey)
            join pg_class tr on tr.oid = c.confrelid
            join pg_attribute ar on ar.attrelid = tr.oid and ar.attnum = any(c.confkey)
            where c.contype = 'f'
              and n.nspname = {}
            order by t.relname, c.conname;",
            quote_literal(schema)
        );

        let mut foreign_keys = vec![];
        for message in self.simple_query(&query).await? {
            if let SimpleQueryMessage::Row(row) = message {
                foreign_keys.push(ForeignKeyDescriptor {
                    source_table: row_value::<String>(&row, "source_table")?,
                    source_column: row_value::<String>(&row, "source_column")?,
                    target_table: row_value::<String>(&row, "target_table")?,
                    target_column: row_value::<String>(&row, "target_column")?,
                    constraint_name: row_value::<String>(&row, "constraint_name")?,
                });
            }
        }

        Ok(foreign_keys)
    }
}

/// Extracts a required value from a simple query row by column name.
pub fn row_value<T: FromStr>(row: &SimpleQueryRow, column: &str) -> EtlResult<T> {
    let value = optional_row_value::<T>(row, column)?;

    value.ok_or_else(|| {
        etl_error!(
            ErrorKind::SourceSchemaError,
            "Unexpected null in catalog row",
            format!("column '{column}' was null")
        )
    })
}

/// Extracts an optional value from a simple query row by column name.
pub fn optional_row_value<T: FromStr>(
    row: &SimpleQueryRow,
    column: &str,
) -> EtlResult<Option<T>> {
    let raw = row.try_get(column)?;

    match raw {
        None => Ok(None),
        Some(raw) => raw.parse::<T>().map(Some).map_err(|_| {
            etl_error!(
                ErrorKind::ConversionError,
                "Failed to parse catalog value",
                format!("column '{column}' held unparsable value '{raw}'")
            )
        }),
    }
}
