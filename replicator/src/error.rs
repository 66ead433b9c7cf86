use std::backtrace::Backtrace;
use std::error::Error;
use std::fmt;

use etl::error::EtlError;

/// Result type for replicator operations.
pub type ReplicatorResult<T> = Result<T, ReplicatorError>;

/// Captured backtrace wrapper to avoid thiserror's unstable feature detection.
pub struct CapturedBacktrace(Backtrace);

impl CapturedBacktrace {
    fn capture() -> Self {
        Self(Backtrace::capture())
    }
}

impl fmt::Debug for CapturedBacktrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error type for the replicator service.
///
/// Wraps [`EtlError`] for channel errors and provides variants for startup failures.
#[derive(Debug)]
pub enum ReplicatorError {
    /// Channel or sync error.
    Etl(EtlError),
    /// Configuration or tracing setup error.
    Config(Box<dyn Error + Send + Sync>, CapturedBacktrace),
    /// I/O error, including runtime and signal handler setup.
    Io(std::io::Error, CapturedBacktrace),
}

impl ReplicatorError {
    /// Returns a short category label for this error.
    pub fn category(&self) -> &'static str {
        match self {
            ReplicatorError::Etl(_) => "replicator error",
            ReplicatorError::Config(_, _) => "configuration error",
            ReplicatorError::Io(_, _) => "i/o error",
        }
    }

    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self {
            ReplicatorError::Etl(err) => err.backtrace(),
            ReplicatorError::Config(_, cb) => Some(&cb.0),
            ReplicatorError::Io(_, cb) => Some(&cb.0),
        }
    }

    /// Creates a configuration error from any error source.
    pub fn config<E: Error + Send + Sync + 'static>(err: E) -> Self {
        ReplicatorError::Config(Box::new(err), CapturedBacktrace::capture())
    }

    /// Returns a user-oriented report for terminal output.
    ///
    /// Aggregated channel errors list every channel failure instead of a cause chain.
    pub fn render_report(&self) -> String {
        let mut out = String::new();
        out.push_str("replicator failed\n");
        out.push_str(&format!("category: {}\n", self.category()));
        out.push_str(&format!("error: {}\n", self));

        if let ReplicatorError::Etl(err) = self
            && let Some(errors) = err.errors()
        {
            for (idx, channel_err) in errors.iter().enumerate() {
                out.push_str(&format!("failure {}: {channel_err}\n", idx + 1));
            }
        } else {
            let mut source = Error::source(self);
            let mut idx = 1usize;
            while let Some(err) = source {
                out.push_str(&format!("cause {idx}: {err}\n"));
                source = err.source();
                idx += 1;
            }
        }

        if let Some(backtrace) = self.backtrace()
            && should_render_backtrace()
        {
            out.push_str(&format!("backtrace:\n{backtrace}\n"));
        }

        out
    }
}

fn should_render_backtrace() -> bool {
    matches!(
        std::env::var("RUST_BACKTRACE").as_deref(),
        Ok("1") | Ok("full")
    )
}

impl fmt::Display for ReplicatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplicatorError::Etl(err) => write!(f, "{err}"),
            ReplicatorError::Config(source, _) => write!(f, "configuration error: {source}"),
            ReplicatorError::Io(source, _) => write!(f, "i/o error: {source}"),
        }
    }
}

impl Error for ReplicatorError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ReplicatorError::Etl(err) => err.source(),
            ReplicatorError::Config(source, _) => Some(source.as_ref()),
            ReplicatorError::Io(source, _) => Some(source),
        }
    }
}

impl From<std::io::Error> for ReplicatorError {
    fn from(err: std::io::Error) -> Self {
        ReplicatorError::Io(err, CapturedBacktrace::capture())
    }
}

impl From<EtlError> for ReplicatorError {
    fn from(err: EtlError) -> Self {
        ReplicatorError::Etl(err)
    }
}

#[cfg(test)]
mod tests {
    use etl::error::ErrorKind;
    use etl::etl_error;

    use super::*;

    #[test]
    fn report_lists_every_channel_failure() {
        let errors: Vec<EtlError> = vec![
            etl_error!(ErrorKind::ConfigError, "Datasource is not configured", "erp"),
            etl_error!(ErrorKind::DestinationQueryFailed, "Search index request failed"),
        ];
        let err = ReplicatorError::from(EtlError::from(errors));

        let report = err.render_report();

        assert_eq!(err.category(), "replicator error");
        assert!(report.contains("failure 1: "));
        assert!(report.contains("failure 2: "));
    }

    #[test]
    fn io_errors_report_their_cause() {
        let err = ReplicatorError::from(std::io::Error::other("signal handler unavailable"));

        assert_eq!(err.category(), "i/o error");
        assert!(
            err.render_report()
                .starts_with("replicator failed\ncategory: i/o error\n")
        );
        assert_eq!(err.to_string(), "i/o error: signal handler unavailable");
    }
}
