//! Error taxonomy for the ingestion and query pipeline.
//!
//! Adapters (stores, ledgers, model clients) report failures as
//! [`anyhow::Error`]; the pipeline wraps them into [`RagError::Upstream`]
//! together with a short description of the step that failed. Callers map
//! the variants onto transport status codes:
//!
//! | Variant | Meaning | HTTP |
//! |---------|---------|------|
//! | [`RagError::Validation`] | malformed request, unsupported method | 400 |
//! | [`RagError::Upstream`] | embedding / generation / store / ledger failure | 500 |
//! | [`RagError::SchemaMismatch`] | model metadata failed to parse or validate | recovered locally |

use thiserror::Error;

/// Errors produced by the core pipeline.
#[derive(Debug, Error)]
pub enum RagError {
    /// The request is missing fields or carries an unsupported value.
    #[error("invalid argument: {0}")]
    Validation(String),

    /// A collaborator call failed. `context` names the step.
    #[error("{context}: {source:#}")]
    Upstream {
        context: String,
        #[source]
        source: anyhow::Error,
    },

    /// Model output did not match the metadata schema.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),
}

impl RagError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn upstream(context: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::Upstream {
            context: context.into(),
            source: source.into(),
        }
    }

    /// Upstream failure without an underlying error value (e.g. malformed model output).
    pub fn upstream_msg(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Upstream {
            context: context.into(),
            source: anyhow::anyhow!(message.into()),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

/// Result alias for pipeline operations.
pub type Result<T> = std::result::Result<T, RagError>;

/// Attach step context to adapter results.
pub trait UpstreamContext<T> {
    fn upstream(self, context: &str) -> Result<T>;
}

impl<T, E> UpstreamContext<T> for std::result::Result<T, E>
where
    E: Into<anyhow::Error>,
{
    fn upstream(self, context: &str) -> Result<T> {
        self.map_err(|e| RagError::upstream(context, e))
    }
}
