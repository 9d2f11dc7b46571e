//! # Observability
//!
//! Structured logging setup for the control-plane core. No HTTP surface
//! exists in this crate, so metrics export and health-check endpoints
//! are out of scope here (trimmed from the teacher's fuller observability
//! stack, which also wires OpenTelemetry and Prometheus for its REST
//! API — neither applies to a library-plus-gRPC-server core).

pub mod logging;

use tracing_subscriber::{fmt, EnvFilter};

use crate::errors::Result;

/// Initialize the global tracing subscriber.
///
/// `json` selects structured JSON output (suitable for log aggregation)
/// over the default human-readable format. The env filter defaults to
/// `info` and can be overridden with `RUST_LOG`.
pub fn init_tracing(json: bool) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let result = if json {
        fmt().with_env_filter(env_filter).json().try_init()
    } else {
        fmt().with_env_filter(env_filter).try_init()
    };

    result.map_err(|e| crate::errors::Error::internal(format!("failed to init tracing: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_tracing_does_not_panic() {
        // May return Err if a subscriber is already installed by another
        // test in the same process; either outcome is acceptable here.
        let _ = init_tracing(false);
    }
}
