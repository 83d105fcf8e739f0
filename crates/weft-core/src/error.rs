//! Error types for weft.

use std::path::PathBuf;
use std::sync::Arc;

use crate::syntax::SourcePosition;

/// A specialized Result type for weft operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for weft operations.
///
/// Errors are cheap to clone so a failed refinement can be cached on the
/// unit it belongs to and handed back to every later caller.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// The plugin set could not be assembled.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Raw syntax could not be turned into structured syntax.
    #[error("Parse error at {position}: {message}")]
    Parse {
        message: String,
        position: SourcePosition,
    },

    /// A subscription method or post-process hook failed.
    #[error("Plugin `{plugin}` failed in `{method}`: {cause}")]
    Plugin {
        plugin: &'static str,
        method: &'static str,
        cause: String,
    },

    /// A validator reported a fatal finding while the error manager rethrows.
    #[error("Validation error at {position}: {message}")]
    Validation {
        message: String,
        position: SourcePosition,
    },

    /// A sibling operation was attempted on a unit that is not in a collection.
    #[error("Cannot {operation}: the unit is not attached to a collection")]
    Detached { operation: &'static str },

    /// Processing stopped because a fatal report was raised in rethrow mode.
    #[error("Processing aborted: {cause}")]
    Aborted { cause: Box<Error> },

    /// A stylesheet file could not be read.
    #[error("Failed to read stylesheet '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: Arc<std::io::Error>,
    },
}

impl Error {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a parse error.
    pub fn parse(message: impl Into<String>, position: SourcePosition) -> Self {
        Self::Parse {
            message: message.into(),
            position,
        }
    }

    /// Create a plugin error.
    pub fn plugin(plugin: &'static str, method: &'static str, cause: impl Into<String>) -> Self {
        Self::Plugin {
            plugin,
            method,
            cause: cause.into(),
        }
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>, position: SourcePosition) -> Self {
        Self::Validation {
            message: message.into(),
            position,
        }
    }

    /// Create an I/O error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source: Arc::new(source),
        }
    }

    /// Wrap the error that caused processing to stop.
    pub fn aborted(cause: Error) -> Self {
        Self::Aborted {
            cause: Box::new(cause),
        }
    }

    /// The source position carried by this error, if any.
    pub fn position(&self) -> Option<SourcePosition> {
        match self {
            Self::Parse { position, .. } | Self::Validation { position, .. } => Some(*position),
            Self::Aborted { cause } => cause.position(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_display_includes_position() {
        let err = Error::parse("unexpected `}`", SourcePosition::new(2, 5));
        assert_eq!(err.to_string(), "Parse error at line 2, column 5: unexpected `}`");
    }

    #[test]
    fn aborted_keeps_cause_position() {
        let err = Error::aborted(Error::validation("bad", SourcePosition::new(1, 1)));
        assert_eq!(err.position(), Some(SourcePosition::new(1, 1)));
        assert!(err.to_string().contains("bad"));
    }
}
