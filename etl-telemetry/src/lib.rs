//! Telemetry initialization shared by the mirror binaries.

pub mod tracing;
