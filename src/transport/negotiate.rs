//! Session establishment with in-band TLS upgrade.
//!
//! ```text
//! connect ──► read greeting (≤4096 B, 10 s)
//!               │
//!               ├─ no "TLS" ──────────────────────────► plain session
//!               │
//!               └─ "TLS" ─► send "ENC TLS\n"
//!                           read one line (5 s)
//!                             ├─ has "ENC OK" ─► TLS handshake ─► TLS session
//!                             └─ otherwise ───► Error::Connection
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fs::File;
use std::io::BufReader as StdBufReader;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tracing::{debug, info, warn};

use crate::config::{Timeouts, TlsSettings};
use crate::error::{Error, Result};
use crate::protocol::line::{TLS_REQUEST, greeting_offers_tls, is_tls_ack};

use super::connection::LineConnection;

// ============================================================================
// Constants
// ============================================================================

/// Wait for the server greeting.
pub const GREETING_TIMEOUT: Duration = Duration::from_secs(10);

/// Largest greeting read.
pub const GREETING_MAX_LEN: usize = 4096;

/// Wait for the upgrade acknowledgement.
pub const TLS_ACK_TIMEOUT: Duration = Duration::from_secs(5);

/// Longest acknowledgement line accepted.
const TLS_ACK_MAX_LEN: usize = 1024;

// ============================================================================
// Negotiator
// ============================================================================

/// Opens line-protocol sessions to one endpoint.
///
/// Clones share one TLS client configuration, built on the first upgrade.
#[derive(Clone)]
pub struct Negotiator {
    host: String,
    port: u16,
    connect_timeout: Duration,
    server_name: String,
    tls: Arc<TlsSettings>,
    tls_config: Arc<Mutex<Option<Arc<ClientConfig>>>>,
}

impl Negotiator {
    /// Creates a negotiator for `host:port`.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16, timeouts: &Timeouts, tls: &TlsSettings) -> Self {
        let host = host.into();
        let server_name = tls.server_name.clone().unwrap_or_else(|| host.clone());
        Self {
            host,
            port,
            connect_timeout: timeouts.connection,
            server_name,
            tls: Arc::new(tls.clone()),
            tls_config: Arc::new(Mutex::new(None)),
        }
    }

    /// Endpoint label, `host:port`.
    #[must_use]
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Shared TLS client configuration, built on first use.
    fn tls_config(&self) -> Result<Arc<ClientConfig>> {
        let mut slot = self.tls_config.lock();
        if let Some(config) = slot.as_ref() {
            return Ok(Arc::clone(config));
        }
        let config = client_config(&self.tls)?;
        *slot = Some(Arc::clone(&config));
        Ok(config)
    }

    /// Opens one session.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionTimeout`] if TCP connect exceeds the connection timeout
    /// - [`Error::Connection`] if the greeting or upgrade acknowledgement fails
    /// - [`Error::Tls`] if the handshake fails
    /// - [`Error::Io`] on socket failure
    pub async fn open(&self) -> Result<LineConnection> {
        let endpoint = self.endpoint();
        let stream = timeout(
            self.connect_timeout,
            TcpStream::connect((self.host.as_str(), self.port)),
        )
        .await
        .map_err(|_| Error::connection_timeout(self.connect_timeout.as_millis() as u64))??;
        stream.set_nodelay(true)?;

        self.negotiate(stream, endpoint).await
    }

    /// Runs the greeting and optional upgrade on an established stream.
    pub(crate) async fn negotiate<S>(&self, mut stream: S, peer: String) -> Result<LineConnection>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let greeting = read_greeting(&mut stream).await?;
        if !greeting_offers_tls(&greeting) {
            debug!(peer = %peer, "Plain session established");
            return Ok(LineConnection::new(stream, peer, false));
        }

        stream.write_all(TLS_REQUEST).await?;
        stream.flush().await?;

        let ack = timeout(TLS_ACK_TIMEOUT, read_ack_line(&mut stream))
            .await
            .map_err(|_| Error::connection("TLS negotiation timed out"))??;
        if !is_tls_ack(&ack) {
            warn!(peer = %peer, reply = ack.trim_end(), "TLS upgrade refused");
            return Err(Error::connection(format!(
                "TLS negotiation failed: {}",
                ack.trim_end()
            )));
        }

        let config = self.tls_config()?;
        let server_name = ServerName::try_from(self.server_name.clone())
            .map_err(|e| Error::tls(format!("Invalid server name {}: {e}", self.server_name)))?;

        let tls_stream = TlsConnector::from(config)
            .connect(server_name, stream)
            .await
            .map_err(|e| Error::tls(format!("Handshake with {peer} failed: {e}")))?;

        info!(peer = %peer, "TLS session established");
        Ok(LineConnection::new(tls_stream, peer, true))
    }
}

impl std::fmt::Debug for Negotiator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Negotiator")
            .field("endpoint", &self.endpoint())
            .field("server_name", &self.server_name)
            .field("tls_ready", &self.tls_config.lock().is_some())
            .finish()
    }
}

// ============================================================================
// Handshake Helpers
// ============================================================================

/// Reads the greeting in one read of at most [`GREETING_MAX_LEN`] bytes.
async fn read_greeting<S: AsyncRead + Unpin>(stream: &mut S) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; GREETING_MAX_LEN];
    let n = timeout(GREETING_TIMEOUT, stream.read(&mut buf))
        .await
        .map_err(|_| Error::connection("No greeting received"))??;
    if n == 0 {
        return Err(Error::ConnectionClosed);
    }
    buf.truncate(n);
    Ok(buf)
}

/// Reads one line byte by byte so no handshake bytes are consumed.
async fn read_ack_line<S: AsyncRead + Unpin>(stream: &mut S) -> Result<String> {
    let mut line = Vec::new();
    loop {
        let byte = match stream.read_u8().await {
            Ok(byte) => byte,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(Error::ConnectionClosed);
            }
            Err(e) => return Err(e.into()),
        };
        line.push(byte);
        if byte == b'\n' || line.len() >= TLS_ACK_MAX_LEN {
            break;
        }
    }
    Ok(String::from_utf8_lossy(&line).into_owned())
}

// ============================================================================
// TLS Configuration
// ============================================================================

/// Builds a client configuration from platform roots and an optional CA file.
fn client_config(settings: &TlsSettings) -> Result<Arc<ClientConfig>> {
    let mut roots = RootCertStore::empty();

    if settings.system_roots {
        match rustls_native_certs::load_native_certs() {
            Ok(certs) => {
                let (added, ignored) = roots.add_parsable_certificates(certs);
                debug!(added, ignored, "Loaded platform trust roots");
            }
            Err(e) => warn!(error = %e, "Platform trust roots unavailable"),
        }
    }

    if let Some(path) = &settings.ca_file {
        let file = File::open(path)
            .map_err(|e| Error::tls(format!("Cannot open CA file {}: {e}", path.display())))?;
        for cert in rustls_pemfile::certs(&mut StdBufReader::new(file)) {
            let cert = cert
                .map_err(|e| Error::tls(format!("Bad PEM in {}: {e}", path.display())))?;
            roots
                .add(cert)
                .map_err(|e| Error::tls(format!("Rejected CA in {}: {e}", path.display())))?;
        }
    }

    if roots.is_empty() {
        return Err(Error::tls("No trusted CA certificates available"));
    }

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::tls(e.to_string()))?
        .with_root_certificates(roots)
        .with_no_client_auth();

    Ok(Arc::new(config))
}

// ============================================================================
// Tests
// ============================================================================
