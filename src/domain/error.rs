//! Domain error types.
//!
//! Every calculation in [`crate::domain`] fails with [`ForecastError::InvalidInput`].
//! The outer message names the aggregate check that failed, the optional cause
//! names the primitive that was violated. The remaining variants belong to the
//! configuration and data-loading shell around the core.

/// Top-level error type for forecaster.
#[derive(Debug, thiserror::Error)]
pub enum ForecastError {
    #[error("invalid input: {message}")]
    InvalidInput {
        message: String,
        #[source]
        cause: Option<Box<ForecastError>>,
    },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("data error in {source_name}: {reason}")]
    Data { source_name: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ForecastError {
    /// A primitive input violation with no underlying cause.
    pub fn invalid(message: impl Into<String>) -> Self {
        ForecastError::InvalidInput {
            message: message.into(),
            cause: None,
        }
    }

    /// An aggregate check that failed because of `cause`.
    pub fn wrap(message: impl Into<String>, cause: ForecastError) -> Self {
        ForecastError::InvalidInput {
            message: message.into(),
            cause: Some(Box::new(cause)),
        }
    }

    /// The wrapped cause of an `InvalidInput`, if any.
    pub fn cause(&self) -> Option<&ForecastError> {
        match self {
            ForecastError::InvalidInput { cause, .. } => cause.as_deref(),
            _ => None,
        }
    }

    pub fn is_invalid_input(&self) -> bool {
        matches!(self, ForecastError::InvalidInput { .. })
    }

    /// Message text of an `InvalidInput`, or the display string otherwise.
    pub fn message(&self) -> String {
        match self {
            ForecastError::InvalidInput { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Attach an aggregate-check message to a failing core result.
pub trait Context<T> {
    fn context(self, message: impl Into<String>) -> Result<T, ForecastError>;
}

impl<T> Context<T> for Result<T, ForecastError> {
    fn context(self, message: impl Into<String>) -> Result<T, ForecastError> {
        self.map_err(|e| ForecastError::wrap(message, e))
    }
}

impl From<&ForecastError> for std::process::ExitCode {
    fn from(err: &ForecastError) -> Self {
        let code: u8 = match err {
            ForecastError::Io(_) => 1,
            ForecastError::ConfigParse { .. }
            | ForecastError::ConfigMissing { .. }
            | ForecastError::ConfigInvalid { .. } => 2,
            ForecastError::Data { .. } => 3,
            ForecastError::InvalidInput { .. } => 4,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn invalid_has_no_cause() {
        let err = ForecastError::invalid("capital must be positive");
        assert!(err.is_invalid_input());
        assert!(err.cause().is_none());
        assert_eq!(err.to_string(), "invalid input: capital must be positive");
    }

    #[test]
    fn wrap_keeps_two_levels() {
        let inner = ForecastError::invalid("duplicate date 2024-01-02");
        let outer = ForecastError::wrap("invalid price series", inner);

        assert_eq!(outer.message(), "invalid price series");
        assert_eq!(
            outer.cause().map(|c| c.message()),
            Some("duplicate date 2024-01-02".to_string())
        );
        let source = outer.source().map(|s| s.to_string());
        assert_eq!(
            source,
            Some("invalid input: duplicate date 2024-01-02".to_string())
        );
    }

    #[test]
    fn context_wraps_errors_only() {
        let ok: Result<u8, ForecastError> = Ok(3);
        assert_eq!(ok.context("never used").unwrap(), 3);

        let err: Result<u8, ForecastError> = Err(ForecastError::invalid("inner"));
        let wrapped = err.context("outer").unwrap_err();
        assert_eq!(wrapped.message(), "outer");
        assert_eq!(wrapped.cause().unwrap().message(), "inner");
    }

    #[test]
    fn exit_codes() {
        let cases = [
            (ForecastError::invalid("x"), std::process::ExitCode::from(4)),
            (
                ForecastError::ConfigMissing {
                    section: "subsystem".into(),
                    key: "capital".into(),
                },
                std::process::ExitCode::from(2),
            ),
            (
                ForecastError::Data {
                    source_name: "prices.csv".into(),
                    reason: "bad".into(),
                },
                std::process::ExitCode::from(3),
            ),
        ];
        for (err, expected) in &cases {
            assert_eq!(std::process::ExitCode::from(err), *expected);
        }
    }
}
