//! Dialers and the connection stream.
//!
//! The bot connects over plain TCP or client-side TLS. Both dial paths can
//! be overridden by the caller: a custom dial function for the TCP leg, and
//! a custom rustls configuration for the TLS handshake.

use std::io;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;
use tracing::warn;

use crate::error::{BotError, Result};

/// Caller-supplied dial function for the plaintext leg of a connection.
///
/// Receives the `host:port` string the bot was built with and yields a
/// connected [`TcpStream`].
pub type DialFn =
    Arc<dyn Fn(String) -> BoxFuture<'static, io::Result<TcpStream>> + Send + Sync>;

/// Boxed read half of the session stream.
pub(crate) type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
/// Boxed write half of the session stream.
pub(crate) type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// An established connection, plaintext or TLS.
#[derive(Debug)]
pub(crate) enum Conn {
    Tcp(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl Conn {
    /// The OS descriptor backing the connection, when one can be handed to
    /// a successor process. TLS sessions carry handshake state that cannot
    /// travel with the descriptor, so they report `None`.
    pub(crate) fn raw_fd(&self) -> Option<i32> {
        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            match self {
                Conn::Tcp(stream) => Some(stream.as_raw_fd()),
                Conn::Tls(_) => None,
            }
        }
        #[cfg(not(unix))]
        {
            None
        }
    }

    /// The OS descriptor of the underlying socket, for the close path's
    /// teardown. Unlike [`Conn::raw_fd`] this is also available for TLS,
    /// whose plaintext inner stream still has a socket to shut down.
    pub(crate) fn socket_fd(&self) -> Option<i32> {
        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            match self {
                Conn::Tcp(stream) => Some(stream.as_raw_fd()),
                Conn::Tls(stream) => Some(stream.get_ref().0.as_raw_fd()),
            }
        }
        #[cfg(not(unix))]
        {
            None
        }
    }

    /// Split into independently owned read and write halves.
    pub(crate) fn split(self) -> (BoxedReader, BoxedWriter) {
        match self {
            Conn::Tcp(stream) => {
                let (r, w) = tokio::io::split(stream);
                (Box::new(r), Box::new(w))
            }
            Conn::Tls(stream) => {
                let (r, w) = tokio::io::split(*stream);
                (Box::new(r), Box::new(w))
            }
        }
    }
}

/// Connect to `host`, upgrading to TLS when `ssl` is set.
pub(crate) async fn dial(
    host: &str,
    ssl: bool,
    dial_fn: Option<&DialFn>,
    tls_config: Option<Arc<ClientConfig>>,
) -> Result<Conn> {
    let tcp = match dial_fn {
        Some(f) => f(host.to_string()).await,
        None => default_dial(host).await,
    }
    .map_err(BotError::Connect)?;

    if ssl {
        let tls = tls_connect(host, tcp, tls_config).await?;
        Ok(Conn::Tls(Box::new(tls)))
    } else {
        Ok(Conn::Tcp(tcp))
    }
}

async fn default_dial(addr: &str) -> io::Result<TcpStream> {
    let stream = TcpStream::connect(addr).await?;
    if let Err(e) = enable_keepalive(&stream) {
        warn!(error = %e, "failed to enable TCP keepalive");
    }
    Ok(stream)
}

fn enable_keepalive(stream: &TcpStream) -> io::Result<()> {
    use socket2::{SockRef, TcpKeepalive};
    use std::time::Duration;

    let sock = SockRef::from(stream);
    let keepalive = TcpKeepalive::new()
        .with_time(Duration::from_secs(120))
        .with_interval(Duration::from_secs(30));

    sock.set_tcp_keepalive(&keepalive)
}

async fn tls_connect(
    host: &str,
    tcp: TcpStream,
    config: Option<Arc<ClientConfig>>,
) -> Result<TlsStream<TcpStream>> {
    let config = match config {
        Some(c) => c,
        None => Arc::new(default_client_config()),
    };
    let connector = TlsConnector::from(config);

    let name = host.rsplit_once(':').map(|(h, _)| h).unwrap_or(host);
    let server_name = ServerName::try_from(name.to_string())
        .map_err(|_| BotError::InvalidHost(host.to_string()))?;

    connector
        .connect(server_name, tcp)
        .await
        .map_err(BotError::Tls)
}

fn default_client_config() -> ClientConfig {
    let mut roots = RootCertStore::empty();
    let certs = rustls_native_certs::load_native_certs();
    for cert in certs.certs {
        if let Err(e) = roots.add(cert) {
            warn!(error = %e, "failed to add root certificate");
        }
    }
    for e in &certs.errors {
        warn!(error = %e, "error loading native certificates");
    }

    ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth()
}
