//! Listen-address selection for holon servers.
//!
//! Holons accept either `--listen <uri>` or `--port <n>` on their command
//! line and fall back to [`TransportConfig::DEFAULT_URI`].

use crate::config::TransportConfig;

/// Pick the transport URI from a raw argument list.
///
/// `--listen <uri>` is returned as given, `--port <n>` becomes `tcp://:<n>`.
/// The first matching flag wins.
pub fn parse_flags<S: AsRef<str>>(args: &[S]) -> String {
    let mut iter = args.iter().map(AsRef::as_ref);
    while let Some(arg) = iter.next() {
        match arg {
            "--listen" => {
                if let Some(uri) = iter.next() {
                    return uri.to_string();
                }
            }
            "--port" => {
                if let Some(port) = iter.next() {
                    return format!("tcp://:{}", port);
                }
            }
            _ => {}
        }
    }
    TransportConfig::DEFAULT_URI.to_string()
}

/// Same precedence as [`parse_flags`] for options that are already parsed.
pub fn listen_uri(listen: Option<&str>, port: Option<u16>) -> String {
    match (listen, port) {
        (Some(uri), _) => uri.to_string(),
        (None, Some(port)) => format!("tcp://:{}", port),
        (None, None) => TransportConfig::DEFAULT_URI.to_string(),
    }
}
