//! TCP channel, optionally wrapped in TLS
//!
//! Connection retry, keep-alive and TCP_NODELAY setup.

use super::config::TlsOptions;
use super::stream::StreamParts;
use crate::constants::transport::TCP;
use crate::error::{Error, Result};
#[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
use midrive_config::DEFAULT_TCP_KEEPALIVE_RETRIES;
use midrive_config::{TransportConfig, LOCALHOST_IPV4};
use rustls::pki_types::ServerName;
use socket2::{SockRef, TcpKeepalive};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, info, trace, warn};

pub(crate) async fn open(
    host: &str,
    port: u16,
    tls: Option<&TlsOptions>,
    config: &TransportConfig,
) -> Result<StreamParts> {
    info!("Connecting to debugger at {}:{}...", host, port);

    let stream = connect_with_retry(&normalize_host(host), port, config).await?;
    configure_tcp_keepalive(&stream, config);

    match tls {
        None => {
            info!("Connected to debugger on port {}", port);
            let (reader, writer) = tokio::io::split(stream);
            Ok(StreamParts::new(TCP, writer, reader))
        }
        Some(options) => {
            let name = options.server_name.as_deref().unwrap_or(host);
            let tls_stream = tls_handshake(stream, name, config).await?;
            info!(server_name = %name, "TLS session established on port {}", port);
            let (reader, writer) = tokio::io::split(tls_stream);
            Ok(StreamParts::new(TCP, writer, reader))
        }
    }
}

/// "localhost" may resolve to ::1 first; the debug servers we talk to
/// usually listen on IPv4 only
fn normalize_host(host: &str) -> String {
    if host == "localhost" {
        LOCALHOST_IPV4.to_string()
    } else {
        host.to_string()
    }
}

async fn tls_handshake(
    stream: TcpStream,
    server_name: &str,
    config: &TransportConfig,
) -> Result<tokio_rustls::client::TlsStream<TcpStream>> {
    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let client_config = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    let connector = TlsConnector::from(Arc::new(client_config));

    let name = ServerName::try_from(server_name.to_string()).map_err(|e| {
        Error::InvalidArgument(format!("invalid TLS server name '{}': {}", server_name, e))
    })?;

    match tokio::time::timeout(config.connection_timeout(), connector.connect(name, stream)).await
    {
        Ok(Ok(tls)) => Ok(tls),
        Ok(Err(e)) => Err(Error::Transport(format!("TLS handshake failed: {}", e))),
        Err(_) => Err(Error::ConnectTimeout(format!(
            "TLS handshake with {} did not complete within {}ms",
            server_name, config.connection_timeout_ms
        ))),
    }
}

/// Connect with exponential backoff and jitter
///
/// - Starts with `retry_interval_ms`, doubling up to `max_retry_interval_ms`
/// - Adds 0-100ms of jitter to each wait
/// - `max_connection_refused_attempts` refusals in a row fail fast: nothing
///   is listening on that port
/// - Gives up with `ConnectTimeout` after `connection_timeout_ms`
pub(crate) async fn connect_with_retry(
    host: &str,
    port: u16,
    config: &TransportConfig,
) -> Result<TcpStream> {
    use rand::Rng;

    let address = format!("{}:{}", host, port);
    let start = std::time::Instant::now();
    let timeout = config.connection_timeout();

    let mut retry_interval_ms = config.retry_interval_ms;
    let mut attempt = 0u32;
    let mut connection_refused_count = 0u32;

    loop {
        let remaining = timeout.saturating_sub(start.elapsed());
        let outcome = tokio::time::timeout(remaining, TcpStream::connect(&address)).await;
        let e = match outcome {
            Ok(Ok(stream)) => return Ok(stream),
            Ok(Err(e)) => e,
            Err(_) => {
                return Err(Error::ConnectTimeout(format!(
                    "connecting to {} after {} attempts",
                    address,
                    attempt + 1
                )))
            }
        };
        attempt += 1;

        if e.kind() == std::io::ErrorKind::ConnectionRefused {
            connection_refused_count += 1;
            if connection_refused_count >= config.max_connection_refused_attempts {
                return Err(Error::Transport(format!(
                    "No debugger listening on {} (connection refused {} times)",
                    address, connection_refused_count
                )));
            }
        } else {
            connection_refused_count = 0;
        }

        if start.elapsed() > timeout {
            return Err(Error::ConnectTimeout(format!(
                "connecting to {} after {} attempts: {}",
                address, attempt, e
            )));
        }

        let jitter_ms = rand::rng().random_range(0..100);
        let wait_ms = retry_interval_ms.saturating_add(jitter_ms);
        trace!(
            "Connection attempt {} failed, retrying in {}ms (backoff: {}ms + jitter: {}ms)",
            attempt,
            wait_ms,
            retry_interval_ms,
            jitter_ms
        );
        tokio::time::sleep(Duration::from_millis(wait_ms)).await;

        retry_interval_ms = (retry_interval_ms * 2).min(config.max_retry_interval_ms);
    }
}

/// TCP_NODELAY plus keep-alive, so an idle session stopped at a breakpoint
/// is not dropped by middleboxes
fn configure_tcp_keepalive(stream: &TcpStream, config: &TransportConfig) {
    let socket = SockRef::from(stream);

    if let Err(e) = socket.set_nodelay(true) {
        warn!("Failed to set TCP_NODELAY: {}", e);
    }

    let keepalive = TcpKeepalive::new()
        .with_time(Duration::from_secs(config.tcp_keepalive_time_secs))
        .with_interval(Duration::from_secs(config.tcp_keepalive_interval_secs));

    #[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
    let keepalive = keepalive.with_retries(DEFAULT_TCP_KEEPALIVE_RETRIES);

    if let Err(e) = socket.set_tcp_keepalive(&keepalive) {
        warn!("Failed to set TCP keep-alive: {}", e);
    } else {
        debug!("TCP keep-alive configured");
    }
}
