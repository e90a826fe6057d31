use thiserror::Error;

/// Every failure is fatal to the document being built.
#[derive(Debug, Error)]
pub enum ScribeError {
    /// Invalid unit, orientation, page size, zoom/layout mode, rotation or destination.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// The operation is not allowed in the document's current lifecycle state.
    #[error("invalid state: {0}")]
    State(String),

    /// A font definition or image could not be found, read or understood.
    #[error("resource error: {0}")]
    Resource(String),

    /// The output sink or file system refused the finished document.
    #[error("output error: {0}")]
    Environment(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ScribeError>;

impl ScribeError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        ScribeError::Configuration(message.into())
    }

    pub(crate) fn state(message: impl Into<String>) -> Self {
        ScribeError::State(message.into())
    }

    pub(crate) fn resource(message: impl Into<String>) -> Self {
        ScribeError::Resource(message.into())
    }

    pub(crate) fn environment(message: impl Into<String>) -> Self {
        ScribeError::Environment(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_convert_and_keep_source() {
        let err: ScribeError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(err, ScribeError::Io(_)));
        assert!(std::error::Error::source(&err).is_some());
        assert_eq!(err.to_string(), "io error: gone");
    }

    #[test]
    fn messages_carry_category() {
        assert_eq!(
            ScribeError::config("bad unit: furlong").to_string(),
            "invalid configuration: bad unit: furlong"
        );
        assert!(ScribeError::resource("x").to_string().starts_with("resource error"));
    }
}
