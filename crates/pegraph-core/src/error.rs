use crate::config::ConfigError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Malformed bytecode in {method}: {reason}")]
    MalformedBytecode { method: String, reason: String },

    #[error("No bytecode available for {0}")]
    MissingBytecode(String),

    #[error("Canonicalization error: {0}")]
    Canonicalization(String),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Failed to build graph for {method}: {source}")]
    BuildFailed {
        method: String,
        #[source]
        source: Box<GraphError>,
    },

    #[error("Concurrent build of {method} failed: {reason}")]
    PeerBuildFailed { method: String, reason: String },

    #[error("Cyclic graph build requested for {method}")]
    CyclicBuild { method: String },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    External(#[from] anyhow::Error),
}

impl GraphError {
    pub fn malformed(method: impl ToString, reason: impl Into<String>) -> Self {
        GraphError::MalformedBytecode {
            method: method.to_string(),
            reason: reason.into(),
        }
    }

    /// Wraps a phase failure with the method whose build it aborted.
    pub fn build_failed(method: impl ToString, source: GraphError) -> Self {
        GraphError::BuildFailed {
            method: method.to_string(),
            source: Box::new(source),
        }
    }

    /// The innermost error, looking through `BuildFailed` wrappers.
    pub fn root_cause(&self) -> &GraphError {
        match self {
            GraphError::BuildFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, GraphError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_failed_keeps_method_and_cause() {
        let err = GraphError::build_failed(
            "Foo.bar()I",
            GraphError::malformed("Foo.bar()I", "stack underflow at 3"),
        );
        let msg = err.to_string();
        assert!(msg.contains("Foo.bar()I"));
        assert!(msg.contains("stack underflow"));
        assert!(matches!(
            err.root_cause(),
            GraphError::MalformedBytecode { .. }
        ));
    }
}
