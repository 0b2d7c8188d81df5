//! Core library of the staging mirror.
//!
//! Mirrors a source-of-truth Postgres database into a staging schema on a
//! destination database (structure synchronization plus diff-aware row
//! transfer), reconciles operational tables derived from the staging schema,
//! and aggregates normalized rows into documents for the learning-content
//! application's document store.

pub mod clients;
pub mod documents;
pub mod error;
pub mod feedback;
mod macros;
pub mod pipeline;
pub mod reconcile;
pub mod schema;
pub mod transfer;
