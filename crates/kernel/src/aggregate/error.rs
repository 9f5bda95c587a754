//! Aggregation error taxonomy.

use thiserror::Error;

/// Errors raised while building an aggregate response.
#[derive(Debug, Error)]
pub enum AggregateError {
    /// The view is declared incorrectly. Raised before any data is fetched
    /// when possible.
    #[error("{view}: {message}")]
    Configuration { view: String, message: String },

    /// The request asked for something the data cannot satisfy.
    #[error("{0}")]
    Validation(String),

    /// A filter backend or per-source filter failed.
    #[error(transparent)]
    Filter(#[from] anyhow::Error),
}

impl AggregateError {
    pub(crate) fn configuration(view: &str, message: impl Into<String>) -> Self {
        Self::Configuration {
            view: view.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}
