//! # Structured logging helpers
//!
//! Span-building macros for the operations this core performs, following
//! the teacher's `xds_span!` pattern — one macro per operation family so
//! call sites stay terse while every emitted span carries a stable set of
//! fields.

/// Span for an xDS watch/response operation, keyed by node hash.
#[macro_export]
macro_rules! xds_span {
    ($operation:expr, $node_hash:expr) => {
        tracing::info_span!(
            "xds_operation",
            operation = %$operation,
            node_hash = %$node_hash,
        )
    };
    ($operation:expr, $node_hash:expr, $($field:tt)*) => {
        tracing::info_span!(
            "xds_operation",
            operation = %$operation,
            node_hash = %$node_hash,
            $($field)*
        )
    };
}

/// Span for an informer ingest pass over a single EndpointSlice.
#[macro_export]
macro_rules! ingest_span {
    ($slice_name:expr) => {
        tracing::debug_span!("endpoint_slice_ingest", slice = %$slice_name)
    };
}
