use crate::error::ConfigError;

/// Extract the port from a `host:port` listen address.
///
/// The port is whatever follows the last colon, so bracketed IPv6 hosts such
/// as `[::1]:8080` parse as well.
pub fn parse_port(listen_address: &str) -> Result<u16, ConfigError> {
    let (_, port) = listen_address
        .rsplit_once(':')
        .ok_or_else(|| ConfigError::MissingPort(listen_address.to_owned()))?;

    port.parse::<u16>()
        .map_err(|source| ConfigError::InvalidPort {
            address: listen_address.to_owned(),
            source,
        })
}
