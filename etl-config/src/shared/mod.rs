mod connection;
mod mirror;

pub use connection::{IntoConnectOptions, PgConnectionConfig, TlsConfig, ValidationError};
pub use mirror::{DocumentStoreConfig, LawLookupConfig, MirrorConfig, ScoresApiConfig};
