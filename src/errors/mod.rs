//! # Error Handling
//!
//! Error types for the xDS control-plane core, following the same
//! context-carrying `thiserror` pattern used throughout this codebase:
//! every fallible operation returns a typed variant with enough context
//! (application name, node hash, offending input) to log and act on
//! without unwinding through a generic error.

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the control-plane core.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Configuration rejected by validation (shape, not loading — loading a
    /// config file/env/CLI is an external collaborator's concern).
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Generic field-level validation error.
    #[error("Validation error: {message}")]
    Validation { message: String, field: Option<String> },

    /// `TranslationError` (§7): a single application could not be packed
    /// into the corresponding xDS resources. Aborts the snapshot being
    /// built; never corrupts the cache, since no partial snapshot is
    /// ever published.
    #[error("failed to translate application '{application}' into xDS resources: {message}")]
    Translation { application: String, message: String },

    /// `IngestError` (§7): a single EndpointSlice could not be translated
    /// into an `Application`. The informer logs and skips it; other
    /// slices continue to flow.
    #[error("failed to ingest endpoint slice '{slice}': {message}")]
    Ingest { slice: String, message: String },

    /// `ParseError` (§7): a bootstrap server-listener resource name failed
    /// the template regex. Skipped, not fatal to the request.
    #[error("failed to parse server-listener resource name '{name}': {message}")]
    Parse { name: String, message: String },

    /// `SnapshotInstallError` (§7): the watch-matching delegate refused a
    /// snapshot, typically a cross-reference validation failure.
    #[error("failed to install snapshot for node hash '{node_hash}': {message}")]
    SnapshotInstall { node_hash: String, message: String },

    /// `TransportError` (§7): any gRPC-level transport failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// Anything else that doesn't fit a more specific variant.
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl Error {
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into(), source: None }
    }

    pub fn config_with_source<S: Into<String>>(
        message: S,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Config { message: message.into(), source: Some(source) }
    }

    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation { message: message.into(), field: None }
    }

    pub fn validation_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::Validation { message: message.into(), field: Some(field.into()) }
    }

    pub fn translation<A: Into<String>, M: Into<String>>(application: A, message: M) -> Self {
        Self::Translation { application: application.into(), message: message.into() }
    }

    pub fn ingest<S: Into<String>, M: Into<String>>(slice: S, message: M) -> Self {
        Self::Ingest { slice: slice.into(), message: message.into() }
    }

    pub fn parse<N: Into<String>, M: Into<String>>(name: N, message: M) -> Self {
        Self::Parse { name: name.into(), message: message.into() }
    }

    pub fn snapshot_install<N: Into<String>, M: Into<String>>(node_hash: N, message: M) -> Self {
        Self::SnapshotInstall { node_hash: node_hash.into(), message: message.into() }
    }

    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport(message.into())
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal { message: message.into() }
    }
}

/// Aggregate of per-node-hash failures returned by
/// [`crate::xds::SnapshotCache::update_resources`]. Individual failures
/// never abort the sweep across the remaining node hashes (§4.6).
#[derive(Debug, Default)]
pub struct AggregateError {
    pub failures: Vec<(String, Error)>,
}

impl AggregateError {
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn push(&mut self, node_hash: impl Into<String>, error: Error) {
        self.failures.push((node_hash.into(), error));
    }
}

impl std::fmt::Display for AggregateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} node-hash snapshot rebuild(s) failed: ", self.failures.len())?;
        for (i, (node_hash, err)) in self.failures.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{node_hash}: {err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateError {}
