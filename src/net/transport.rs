//! WebTransport server
//!
//! Each client opens one bidirectional stream. Frames read from it are
//! decoded and handed to the game session; the player's outbound channel is
//! drained into the send half by a writer task.

use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::game::state::PlayerId;
use crate::metrics::Metrics;
use crate::net::framing::{read_client_message, write_server_message, FramingError};
use crate::net::game_session::{self, SharedSession};
use crate::net::protocol::ServerMessage;
use crate::net::tls::TlsConfig;

const KEEP_ALIVE: Duration = Duration::from_secs(3);

/// WebTransport server
pub struct WebTransportServer {
    config: ServerConfig,
    tls_config: TlsConfig,
    session: SharedSession,
    metrics: Arc<Metrics>,
}

impl WebTransportServer {
    pub async fn new(
        config: ServerConfig,
        session: SharedSession,
        metrics: Arc<Metrics>,
    ) -> anyhow::Result<Self> {
        let tls_config = TlsConfig::load(&config).await?;
        Ok(Self {
            config,
            tls_config,
            session,
            metrics,
        })
    }

    /// Certificate hash for client configuration
    pub fn cert_hash(&self) -> &str {
        self.tls_config.cert_hash()
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.config.bind_address, self.config.port)
    }

    /// Accept connections until the endpoint fails
    pub async fn run(self) -> anyhow::Result<()> {
        use wtransport::Endpoint;

        let bind_addr = self.bind_addr();
        let server_config = wtransport::ServerConfig::builder()
            .with_bind_address(bind_addr)
            .with_identity(self.tls_config.identity)
            .keep_alive_interval(Some(KEEP_ALIVE))
            .build();

        let server = Endpoint::server(server_config).context("Failed to bind WebTransport endpoint")?;

        info!("WebTransport server listening on {}", bind_addr);

        loop {
            let incoming = server.accept().await;
            let session = self.session.clone();
            let metrics = self.metrics.clone();

            tokio::spawn(async move {
                if let Err(e) = handle_connection(incoming, session, metrics).await {
                    warn!("Connection error: {:#}", e);
                }
            });
        }
    }
}

async fn handle_connection(
    incoming: wtransport::endpoint::IncomingSession,
    session: SharedSession,
    metrics: Arc<Metrics>,
) -> anyhow::Result<()> {
    let request = incoming.await.context("Handshake failed")?;
    debug!(
        "Session request from {:?}, path: {}",
        request.authority(),
        request.path()
    );

    let connection = request.accept().await.context("Failed to accept session")?;
    let (send, recv) = connection
        .accept_bi()
        .await
        .context("Client never opened a stream")?;

    serve_stream(session, recv, send, metrics).await;
    Ok(())
}

/// Run one client over a reliable stream pair until it closes
pub async fn serve_stream<R, W>(session: SharedSession, mut recv: R, send: W, metrics: Arc<Metrics>)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (player_id, outbound) = game_session::connect(&session).await;
    tokio::spawn(write_loop(player_id, send, outbound, metrics.clone()));

    read_loop(&session, player_id, &mut recv, &metrics).await;

    // Dropping the outbound sender ends the writer
    game_session::disconnect(&session, player_id).await;
}

async fn read_loop<R: AsyncRead + Unpin>(
    session: &SharedSession,
    player_id: PlayerId,
    recv: &mut R,
    metrics: &Metrics,
) {
    loop {
        let message = match read_client_message(recv).await {
            Ok((message, size)) => {
                metrics.bytes_received.fetch_add(size as u64, Ordering::Relaxed);
                message
            }
            Err(FramingError::ConnectionClosed) => {
                debug!("Player {} closed the stream", player_id);
                return;
            }
            Err(e) if e.is_fatal() => {
                warn!("Player {} stream error: {}", player_id, e);
                return;
            }
            Err(e) => {
                metrics.messages_received.fetch_add(1, Ordering::Relaxed);
                debug!("Dropping malformed message from {}: {}", player_id, e);
                continue;
            }
        };
        metrics.messages_received.fetch_add(1, Ordering::Relaxed);

        game_session::handle_message(session, player_id, message).await;
    }
}

async fn write_loop<W: AsyncWrite + Unpin>(
    player_id: PlayerId,
    mut send: W,
    mut outbound: mpsc::UnboundedReceiver<ServerMessage>,
    metrics: Arc<Metrics>,
) {
    while let Some(message) = outbound.recv().await {
        match write_server_message(&mut send, &message).await {
            Ok(written) => {
                metrics.bytes_sent.fetch_add(written as u64, Ordering::Relaxed);
            }
            Err(e) if e.is_fatal() => {
                debug!("Write to {} failed: {}", player_id, e);
                return;
            }
            Err(e) => {
                warn!("Failed to encode {} for {}: {}", message.event_name(), player_id, e);
            }
        }
    }
}
