use std::error::Error;
use std::fmt;

/// An error raised while compiling a SPARQL-Generate query into an execution plan.
///
/// All these errors are structural: they are raised before any data is looked at
/// and a failed compilation never yields a partial plan.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum PlanError {
    /// A binding clause or a generated triple does not have the expected shape
    #[error("Malformed {clause} clause: {message}")]
    MalformedClause { clause: ClauseKind, message: String },
    /// A structural precondition of the compiler is not met
    #[error("Invalid plan: {0}")]
    InvalidPlan(String),
    /// The query reached a compiler branch that is not able to handle it
    #[error("Internal compiler error: {0}")]
    Internal(String),
    /// The query could not be parsed again during normalization
    #[error("Error while parsing the query\n{query}")]
    Parse {
        query: String,
        #[source]
        error: Box<dyn Error + Send + Sync>,
    },
}

impl PlanError {
    pub(crate) fn malformed(clause: ClauseKind, message: impl Into<String>) -> Self {
        Self::MalformedClause {
            clause,
            message: message.into(),
        }
    }
}

/// The kind of clause a [`PlanError::MalformedClause`] is about.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum ClauseKind {
    Iterator,
    Source,
    Bind,
    /// A triple of a `GENERATE` template
    GenerateTriple,
}

impl fmt::Display for ClauseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Iterator => "ITERATOR",
            Self::Source => "SOURCE",
            Self::Bind => "BIND",
            Self::GenerateTriple => "GENERATE triple",
        })
    }
}
