use std::backtrace::Backtrace;
use std::error::Error;
use std::fmt;

use etl::error::EtlError;

/// Returns whether terminal output should include backtraces.
fn should_render_backtrace() -> bool {
    matches!(
        std::env::var("RUST_BACKTRACE").as_deref(),
        Ok("1") | Ok("full")
    )
}

/// Result type for mirror service operations.
pub type MirrorResult<T> = Result<T, MirrorError>;

/// Captured backtrace wrapper to avoid thiserror's unstable feature
/// detection.
pub struct CapturedBacktrace(Backtrace);

impl CapturedBacktrace {
    /// Captures a new backtrace for an error variant.
    fn capture() -> Self {
        Self(Backtrace::capture())
    }
}

impl fmt::Debug for CapturedBacktrace {
    /// Renders the wrapped backtrace for debugging output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error type for the mirror service.
///
/// Wraps [`EtlError`] for pipeline errors and provides variants for
/// infrastructure errors.
#[derive(Debug)]
pub enum MirrorError {
    /// Pipeline or ETL-related error.
    Etl(EtlError),
    /// Configuration error.
    Config(Box<dyn Error + Send + Sync>, CapturedBacktrace),
    /// I/O error.
    Io(std::io::Error, CapturedBacktrace),
}

impl MirrorError {
    /// Returns a short category label for this error.
    pub fn category(&self) -> &'static str {
        match self {
            MirrorError::Etl(_) => "mirror error",
            MirrorError::Config(_, _) => "configuration error",
            MirrorError::Io(_, _) => "i/o error",
        }
    }

    /// Returns the backtrace for this error.
    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self {
            // EtlError captures the callsite location instead of a backtrace.
            MirrorError::Etl(_) => None,
            MirrorError::Config(_, cb) => Some(&cb.0),
            MirrorError::Io(_, cb) => Some(&cb.0),
        }
    }

    /// Creates a configuration error from any boxed source.
    pub fn config<E: Error + Send + Sync + 'static>(err: E) -> Self {
        MirrorError::Config(Box::new(err), CapturedBacktrace::capture())
    }

    /// Returns a user-oriented report for terminal output.
    pub fn render_report(&self) -> String {
        let mut out = String::new();
        out.push_str("mirror run failed\n");
        out.push_str(&format!("category: {}\n", self.category()));
        out.push_str(&format!("error: {}\n", self));

        let mut source = Error::source(self);
        let mut idx = 1usize;
        while let Some(err) = source {
            out.push_str(&format!("cause {idx}: {err}\n"));
            source = err.source();
            idx += 1;
        }

        if should_render_backtrace()
            && let Some(backtrace) = self.backtrace()
        {
            out.push_str("backtrace:\n");
            out.push_str(&backtrace.to_string());
            if !out.ends_with('\n') {
                out.push('\n');
            }
        }

        out
    }
}

impl fmt::Display for MirrorError {
    /// Renders a user-focused one-line description for terminal and log
    /// output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MirrorError::Etl(err) => write!(f, "{err}"),
            MirrorError::Config(source, _) => write!(f, "configuration error: {source}"),
            MirrorError::Io(source, _) => write!(f, "i/o error: {source}"),
        }
    }
}

impl Error for MirrorError {
    /// Returns the direct cause for this error variant.
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            MirrorError::Etl(err) => err.source(),
            MirrorError::Config(source, _) => Some(source.as_ref()),
            MirrorError::Io(source, _) => Some(source),
        }
    }
}

impl From<std::io::Error> for MirrorError {
    /// Converts an I/O error into an I/O error variant.
    fn from(err: std::io::Error) -> Self {
        MirrorError::Io(err, CapturedBacktrace::capture())
    }
}

impl From<EtlError> for MirrorError {
    /// Converts an ETL error into a mirror ETL error variant.
    fn from(err: EtlError) -> Self {
        MirrorError::Etl(err)
    }
}
