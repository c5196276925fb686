use std::io;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpStream;

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("service at {target} is not accepting connections: {source}")]
    Unreachable { target: String, source: io::Error },
    #[error("service at {target} did not accept a connection within {timeout:?}")]
    Timeout { target: String, timeout: Duration },
}

/// Address to dial for a listen address: wildcard hosts become loopback.
pub fn target(listen_address: &str) -> String {
    match listen_address.rsplit_once(':') {
        Some(("" | "0.0.0.0", port)) => format!("127.0.0.1:{}", port),
        Some(("[::]", port)) => format!("[::1]:{}", port),
        _ => listen_address.to_owned(),
    }
}

/// Healthy when a TCP connection to `target` can be opened within `timeout`.
pub async fn tcp(target: &str, timeout: Duration) -> Result<(), ProbeError> {
    match tokio::time::timeout(timeout, TcpStream::connect(target)).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(source)) => Err(ProbeError::Unreachable {
            target: target.to_owned(),
            source,
        }),
        Err(_) => Err(ProbeError::Timeout {
            target: target.to_owned(),
            timeout,
        }),
    }
}
