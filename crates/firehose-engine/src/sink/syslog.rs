//! Syslog sink over TCP, UDP or TCP with TLS.

use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use firehose_types::Event;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::Mutex;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;

use crate::config::{LogFormat, SinkConfig, SyslogProtocol};
use crate::sink::{format, Sink, SinkError};

/// Upper bound on connecting, including the TLS handshake.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

enum Transport {
    Tcp(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
    Udp(UdpSocket),
}

impl Transport {
    async fn send(&mut self, frame: &[u8]) -> io::Result<()> {
        match self {
            Self::Tcp(stream) => stream.write_all(frame).await,
            Self::Tls(stream) => {
                stream.write_all(frame).await?;
                stream.flush().await
            }
            Self::Udp(socket) => socket.send(frame).await.map(|_| ()),
        }
    }
}

/// Ships events to a remote syslog server.
///
/// The connection is established by [`Sink::connect`] and re-established
/// once per failed write.
pub struct SyslogSink {
    server: String,
    protocol: SyslogProtocol,
    format: LogFormat,
    ca_cert_path: Option<std::path::PathBuf>,
    hostname: String,
    connect_timeout: Duration,
    transport: Mutex<Option<Transport>>,
}

impl SyslogSink {
    #[must_use]
    pub fn new(server: impl Into<String>, config: &SinkConfig) -> Self {
        Self {
            server: server.into(),
            protocol: config.protocol,
            format: config.format,
            ca_cert_path: config.ca_cert_path.clone(),
            hostname: local_hostname(),
            connect_timeout: CONNECT_TIMEOUT,
            transport: Mutex::new(None),
        }
    }

    /// Replace the default connect timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    fn connect_error(&self, source: io::Error) -> SinkError {
        SinkError::Connect {
            server: self.server.clone(),
            source,
        }
    }

    async fn dial(&self) -> Result<Transport, SinkError> {
        match tokio::time::timeout(self.connect_timeout, self.open_transport()).await {
            Ok(result) => result,
            Err(_) => Err(self.connect_error(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("no connection within {:?}", self.connect_timeout),
            ))),
        }
    }

    async fn open_transport(&self) -> Result<Transport, SinkError> {
        match self.protocol {
            SyslogProtocol::Tcp => TcpStream::connect(&self.server)
                .await
                .map(Transport::Tcp)
                .map_err(|e| self.connect_error(e)),
            SyslogProtocol::Udp => {
                let target = tokio::net::lookup_host(&self.server)
                    .await
                    .map_err(|e| self.connect_error(e))?
                    .next()
                    .ok_or_else(|| {
                        self.connect_error(io::Error::new(
                            io::ErrorKind::NotFound,
                            "no address resolved",
                        ))
                    })?;
                let local = if target.is_ipv6() { "[::]:0" } else { "0.0.0.0:0" };
                let socket = UdpSocket::bind(local)
                    .await
                    .map_err(|e| self.connect_error(e))?;
                socket
                    .connect(target)
                    .await
                    .map_err(|e| self.connect_error(e))?;
                Ok(Transport::Udp(socket))
            }
            SyslogProtocol::TcpTls => {
                let path = self
                    .ca_cert_path
                    .as_deref()
                    .ok_or_else(|| SinkError::Tls("no CA certificate configured".into()))?;
                let connector = tls_connector(path).await?;
                let name = ServerName::try_from(host_part(&self.server).to_string())
                    .map_err(|e| SinkError::Tls(e.to_string()))?;
                let tcp = TcpStream::connect(&self.server)
                    .await
                    .map_err(|e| self.connect_error(e))?;
                let tls = connector
                    .connect(name, tcp)
                    .await
                    .map_err(|e| self.connect_error(e))?;
                Ok(Transport::Tls(Box::new(tls)))
            }
        }
    }
}

#[async_trait]
impl Sink for SyslogSink {
    async fn connect(&self) -> bool {
        match self.dial().await {
            Ok(transport) => {
                *self.transport.lock().await = Some(transport);
                tracing::info!(
                    server = %self.server,
                    protocol = %self.protocol,
                    "Connected to syslog server"
                );
                true
            }
            Err(e) => {
                tracing::error!(
                    server = %self.server,
                    error = %e,
                    "Failed to connect to syslog server"
                );
                false
            }
        }
    }

    async fn ship(&self, event: &Event) -> Result<(), SinkError> {
        let body = format::render(event, self.format);
        let frame = format::syslog_frame(
            &self.hostname,
            event,
            &body,
            self.protocol != SyslogProtocol::Udp,
        );

        let mut slot = self.transport.lock().await;
        if let Some(transport) = slot.as_mut() {
            match transport.send(&frame).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::warn!(
                        server = %self.server,
                        error = %e,
                        "Syslog write failed, reconnecting"
                    );
                    *slot = None;
                }
            }
        }

        let mut transport = self.dial().await?;
        transport
            .send(&frame)
            .await
            .map_err(|source| SinkError::Write {
                server: self.server.clone(),
                source,
            })?;
        *slot = Some(transport);
        Ok(())
    }
}

async fn tls_connector(ca_path: &Path) -> Result<TlsConnector, SinkError> {
    let pem = tokio::fs::read(ca_path)
        .await
        .map_err(|source| SinkError::Certificate {
            path: ca_path.display().to_string(),
            source,
        })?;

    let mut roots = RootCertStore::empty();
    for cert in rustls_pemfile::certs(&mut pem.as_slice()) {
        let cert = cert.map_err(|source| SinkError::Certificate {
            path: ca_path.display().to_string(),
            source,
        })?;
        roots
            .add(cert)
            .map_err(|e| SinkError::Tls(e.to_string()))?;
    }
    if roots.is_empty() {
        return Err(SinkError::Tls(format!(
            "no certificates found in {}",
            ca_path.display()
        )));
    }

    let provider = Arc::new(tokio_rustls::rustls::crypto::ring::default_provider());
    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| SinkError::Tls(e.to_string()))?
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(TlsConnector::from(Arc::new(config)))
}

fn host_part(server: &str) -> &str {
    let host = server.rsplit_once(':').map_or(server, |(host, _)| host);
    host.trim_start_matches('[').trim_end_matches(']')
}

fn local_hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .or_else(|| std::fs::read_to_string("/etc/hostname").ok())
        .map(|h| h.trim().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use firehose_types::{EventPayload, Envelope};
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    fn config(protocol: SyslogProtocol) -> SinkConfig {
        SinkConfig {
            server: None,
            protocol,
            format: LogFormat::Json,
            ca_cert_path: None,
        }
    }

    fn metric() -> Event {
        Event::from_envelope(&Envelope::new(
            0,
            EventPayload::ValueMetric {
                name: "numCPUS".into(),
                value: 4.0,
                unit: "count".into(),
            },
        ))
    }

    #[test]
    fn host_part_strips_port_and_brackets() {
        assert_eq!(host_part("logs.example.com:6514"), "logs.example.com");
        assert_eq!(host_part("[::1]:514"), "::1");
        assert_eq!(host_part("logs"), "logs");
    }

    #[tokio::test]
    async fn tcp_connect_and_ship() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let sink = SyslogSink::new(addr.to_string(), &config(SyslogProtocol::Tcp));

        assert!(sink.connect().await);
        let (mut accepted, _) = listener.accept().await.unwrap();
        sink.ship(&metric()).await.unwrap();
        drop(sink);

        let mut received = String::new();
        accepted.read_to_string(&mut received).await.unwrap();
        let (len, line) = received.split_once(' ').unwrap();
        assert_eq!(len.parse::<usize>().unwrap(), line.len());
        assert!(line.contains("firehose-to-syslog - ValueMetric -"), "{line}");
        assert!(line.contains("\"name\":\"numCPUS\""), "{line}");
    }

    #[tokio::test]
    async fn tcp_unreachable_fails_connect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let sink = SyslogSink::new(addr.to_string(), &config(SyslogProtocol::Tcp));
        assert!(!sink.connect().await);
    }

    #[tokio::test]
    async fn udp_ship_sends_unframed_datagram() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = receiver.local_addr().unwrap();
        let sink = SyslogSink::new(addr.to_string(), &config(SyslogProtocol::Udp));

        assert!(sink.connect().await);
        sink.ship(&metric()).await.unwrap();

        let mut buf = vec![0u8; 4096];
        let n = receiver.recv(&mut buf).await.unwrap();
        let datagram = std::str::from_utf8(&buf[..n]).unwrap();
        assert!(datagram.starts_with("<14>1 "), "{datagram}");
    }

    #[tokio::test]
    async fn tls_without_readable_certificate_fails_connect() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(SyslogProtocol::TcpTls);
        cfg.ca_cert_path = Some(dir.path().join("missing.pem"));
        let sink = SyslogSink::new("127.0.0.1:6514", &cfg);
        assert!(!sink.connect().await);
    }

    const TEST_CA: &str = "-----BEGIN CERTIFICATE-----
MIIBjTCCATOgAwIBAgIUEJ2mC98R8hEDbh8hjLsjS1lOcyEwCgYIKoZIzj0EAwIw
GzEZMBcGA1UEAwwQZmlyZWhvc2UtdGVzdC1jYTAgFw0yNjEwMTkxMjU4NTNaGA8y
MTI2MDkyNTEyNTg1M1owGzEZMBcGA1UEAwwQZmlyZWhvc2UtdGVzdC1jYTBZMBMG
ByqGSM49AgEGCCqGSM49AwEHA0IABAPaD6KVj6RtUWkVcXPP4diruPkXs7ggLdtO
SQL9cDDkxNFzjYDVwU7nl6uVREnDkYrhIVaZSWtiD25Uivy3FwujUzBRMB0GA1Ud
DgQWBBTwiLd/WTewzoNPEnx2815jW80XRjAfBgNVHSMEGDAWgBTwiLd/WTewzoNP
Enx2815jW80XRjAPBgNVHRMBAf8EBTADAQH/MAoGCCqGSM49BAMCA0gAMEUCIGFs
kwU+woPjkOLSlHWU8tNgfmix9QgE8Chy+xwws4AhAiEA2aLtH6mlpI51u3GdksMp
Dd4ouesmDRYzB0JHB64fy90=
-----END CERTIFICATE-----
";

    #[tokio::test]
    async fn silent_server_times_out_connect_and_ship() {
        // Accepts TCP but never answers the TLS handshake.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let held = tokio::spawn(async move {
            let mut sockets = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                sockets.push(socket);
            }
        });

        let dir = tempfile::tempdir().unwrap();
        let ca = dir.path().join("ca.pem");
        std::fs::write(&ca, TEST_CA).unwrap();
        let mut cfg = config(SyslogProtocol::TcpTls);
        cfg.ca_cert_path = Some(ca);
        let sink = SyslogSink::new(addr.to_string(), &cfg)
            .with_connect_timeout(Duration::from_millis(100));

        let bounded = Duration::from_secs(5);
        let connected = tokio::time::timeout(bounded, sink.connect()).await;
        assert_eq!(connected.ok(), Some(false));

        let shipped = tokio::time::timeout(bounded, sink.ship(&metric()))
            .await
            .expect("ship gives up on its own");
        match shipped {
            Err(SinkError::Connect { source, .. }) => {
                assert_eq!(source.kind(), io::ErrorKind::TimedOut);
            }
            other => panic!("expected connect timeout, got {other:?}"),
        }
        held.abort();
    }

    #[tokio::test]
    async fn tls_with_empty_bundle_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.pem");
        std::fs::write(&path, b"").unwrap();
        assert!(matches!(tls_connector(&path).await, Err(SinkError::Tls(_))));
    }
}
