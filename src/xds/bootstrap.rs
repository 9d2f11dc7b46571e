//! Server-listener bootstrap resource-name parsing (§6, S1/S2).
//!
//! xDS-enabled gRPC servers subscribe LDS to a name built from their own
//! listening address using the template
//! `grpc/server?xds.resource.listening_address=<host>:<port>`. Parsing
//! it back out is how the control plane learns what to bind for them.

use crate::errors::{Error, Result};
use crate::model::EndpointAddress;
use crate::snapshot::SERVER_LISTENER_TEMPLATE_PREFIX;

/// Parses every resource name that matches the bootstrap template;
/// names that don't match are ignored (not an error). Names that match
/// the prefix but fail to parse are logged and skipped (§4.6's "Malformed
/// server-listener names are skipped, not fatal").
pub fn parse_server_listener_names(resource_names: &[String]) -> Vec<EndpointAddress> {
    resource_names
        .iter()
        .filter_map(|name| match parse_one(name) {
            Ok(Some(address)) => Some(address),
            Ok(None) => None,
            Err(error) => {
                tracing::warn!(name = %name, %error, "skipping malformed server-listener resource name");
                None
            }
        })
        .collect()
}

fn parse_one(name: &str) -> Result<Option<EndpointAddress>> {
    let Some(suffix) = name.strip_prefix(SERVER_LISTENER_TEMPLATE_PREFIX) else {
        return Ok(None);
    };

    if let Some(rest) = suffix.strip_prefix('[') {
        let close = rest.find(']').ok_or_else(|| Error::parse(name, "missing closing ']' in bracketed host"))?;
        let host = rest[..close].to_string();
        let after = &rest[close + 1..];
        let port_str =
            after.strip_prefix(':').ok_or_else(|| Error::parse(name, "missing port after bracketed host"))?;
        let port: u32 = port_str.parse().map_err(|_| Error::parse(name, "port is not a valid integer"))?;
        Ok(Some(EndpointAddress::new(host, port)))
    } else {
        let idx = suffix.rfind(':').ok_or_else(|| Error::parse(name, "missing ':' separating host and port"))?;
        let host = suffix[..idx].to_string();
        let port: u32 =
            suffix[idx + 1..].parse().map_err(|_| Error::parse(name, "port is not a valid integer"))?;
        Ok(Some(EndpointAddress::new(host, port)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ipv4_bootstrap_name() {
        let names = vec!["grpc/server?xds.resource.listening_address=0.0.0.0:50051".to_string()];
        let parsed = parse_server_listener_names(&names);
        assert_eq!(parsed, vec![EndpointAddress::new("0.0.0.0", 50051)]);
    }

    #[test]
    fn parses_bracketed_ipv6_bootstrap_name() {
        let names = vec!["grpc/server?xds.resource.listening_address=[::]:50051".to_string()];
        let parsed = parse_server_listener_names(&names);
        assert_eq!(parsed, vec![EndpointAddress::new("::", 50051)]);
    }

    #[test]
    fn ignores_names_with_no_matching_prefix() {
        let names = vec!["some-other-listener".to_string()];
        assert!(parse_server_listener_names(&names).is_empty());
    }

    #[test]
    fn skips_malformed_bracketed_host_without_erroring() {
        let names = vec!["grpc/server?xds.resource.listening_address=[::".to_string()];
        assert!(parse_server_listener_names(&names).is_empty());
    }
}
