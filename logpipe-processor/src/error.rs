use logpipe::error::PipeError;
use std::backtrace::Backtrace;
use std::error::Error;
use std::fmt;

fn should_render_backtrace() -> bool {
    matches!(
        std::env::var("RUST_BACKTRACE").as_deref(),
        Ok("1") | Ok("full")
    )
}

pub type ProcessorResult<T> = Result<T, ProcessorError>;

/// Backtrace captured when an infrastructure error is created.
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

/// Error type of the processor service.
///
/// Consumer errors are [`PipeError`]s, the other variants cover startup of the service.
#[derive(Debug)]
pub enum ProcessorError {
    Pipe(PipeError),
    Config(Box<dyn Error + Send + Sync>, CapturedBacktrace),
    Migration(sqlx::Error, CapturedBacktrace),
    Io(std::io::Error, CapturedBacktrace),
}

impl ProcessorError {
    pub fn category(&self) -> &'static str {
        match self {
            ProcessorError::Pipe(_) => "pipeline error",
            ProcessorError::Config(_, _) => "configuration error",
            ProcessorError::Migration(_, _) => "migration error",
            ProcessorError::Io(_, _) => "i/o error",
        }
    }

    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self {
            ProcessorError::Pipe(err) => Some(err.backtrace()),
            ProcessorError::Config(_, backtrace)
            | ProcessorError::Migration(_, backtrace)
            | ProcessorError::Io(_, backtrace) => Some(&backtrace.0),
        }
    }

    pub fn config<E: Error + Send + Sync + 'static>(err: E) -> Self {
        ProcessorError::Config(Box::new(err), CapturedBacktrace::capture())
    }

    /// Renders the error, its causes and, with `RUST_BACKTRACE` set, its backtrace for the
    /// terminal.
    pub fn render_report(&self) -> String {
        let mut out = String::new();
        out.push_str("processor failed\n");
        out.push_str(&format!("category: {}\n", self.category()));
        out.push_str(&format!("error: {self}\n"));

        let mut source = Error::source(self);
        let mut idx = 1usize;
        while let Some(err) = source {
            out.push_str(&format!("cause {idx}: {err}\n"));
            source = err.source();
            idx += 1;
        }

        if should_render_backtrace() {
            if let Some(backtrace) = self.backtrace() {
                out.push_str("backtrace:\n");
                out.push_str(&backtrace.to_string());
                if !out.ends_with('\n') {
                    out.push('\n');
                }
            }
        }

        out
    }
}

impl fmt::Display for ProcessorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessorError::Pipe(err) => write!(f, "{err}"),
            ProcessorError::Config(source, _) => write!(f, "configuration error: {source}"),
            ProcessorError::Migration(source, _) => write!(f, "migration error: {source}"),
            ProcessorError::Io(source, _) => write!(f, "i/o error: {source}"),
        }
    }
}

impl Error for ProcessorError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ProcessorError::Pipe(err) => err.source(),
            ProcessorError::Config(source, _) => Some(source.as_ref()),
            ProcessorError::Migration(source, _) => Some(source),
            ProcessorError::Io(source, _) => Some(source),
        }
    }
}

impl From<sqlx::Error> for ProcessorError {
    fn from(err: sqlx::Error) -> Self {
        ProcessorError::Migration(err, CapturedBacktrace::capture())
    }
}

impl From<std::io::Error> for ProcessorError {
    fn from(err: std::io::Error) -> Self {
        ProcessorError::Io(err, CapturedBacktrace::capture())
    }
}

impl From<PipeError> for ProcessorError {
    fn from(err: PipeError) -> Self {
        ProcessorError::Pipe(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logpipe::error::ErrorKind;

    #[test]
    fn report_lists_category_and_error() {
        let err = ProcessorError::from(PipeError::from((
            ErrorKind::LogConnectionFailed,
            "Log connection failed",
        )));

        let report = err.render_report();

        assert!(report.starts_with("processor failed\n"));
        assert!(report.contains("category: pipeline error"));
        assert!(report.contains("Log connection failed"));
    }

    #[test]
    fn io_errors_report_their_cause() {
        let err = ProcessorError::from(std::io::Error::other("disk full"));

        assert_eq!(err.category(), "i/o error");
        assert!(err.to_string().contains("disk full"));
        assert!(err.render_report().contains("cause 1: disk full"));
    }
}
