//! # Client Connection Management
//!
//! This module handles one client socket and the game server connection
//! the relay opens on its behalf.
//!
//! # Architecture
//!
//! Each connection runs in its own Tokio task:
//! - A `select!` loop reads client frames, upstream frames and the queue
//!   of packets bound for the server, so every hook for this connection
//!   runs sequentially in arrival order.
//! - A writer task drains the queue of packets bound for the client.
//!
//! The upstream side does not exist until a hook asks for it with
//! [`ClientConnection::connect`]. The loop opens it right after the
//! packet that asked has been dispatched.
//!
//! # Lifecycle
//!
//! ```text
//! Accepted → Handshake → Connected upstream → Closed
//!                ↓                ↓
//!          connect failed   idle / peer closed
//! ```
//!
//! # Thread Safety
//!
//! Hooks receive the connection as `&Arc<ClientConnection>` and may keep a
//! clone (e.g. for a delayed message). Sending never blocks: both
//! directions are backed by unbounded channels.

use crate::handlers::Verdict;
use crate::relay::Relay;
use futures::{SinkExt, StreamExt};
use krelay_core::{ConnectionId, RelayError, Result, SessionId};
use krelay_protocol::{FrameCodec, HelloPacket, Packet, RawFrame};
use krelay_session::StateRef;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info, trace, warn};

/// How long the client writer may take to flush after the loop ends
const WRITER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Item queued for one side of the connection
#[derive(Debug)]
pub enum Outgoing {
    Packet(Packet),
    /// Flush what was queued before and close that side
    Close,
}

/// Receiving ends of a connection's outgoing queues
///
/// Handed to [`ClientConnection::run`]. Tests that drive a connection
/// without sockets read them directly.
pub struct ConnectionChannels {
    pub client_rx: mpsc::UnboundedReceiver<Outgoing>,
    pub server_rx: mpsc::UnboundedReceiver<Outgoing>,
}

/// Upstream game server connection
struct Upstream {
    frames: FramedRead<OwnedReadHalf, FrameCodec>,
    sink: FramedWrite<OwnedWriteHalf, FrameCodec>,
}

impl Upstream {
    async fn send(&mut self, relay: &Relay, packet: Packet) -> Result<()> {
        match relay.game_data().packets.encode(&packet) {
            Ok(frame) => self.sink.send(frame).await,
            Err(e) => {
                warn!("Dropping packet bound for server: {}", e);
                Ok(())
            }
        }
    }
}

/// One client and its upstream game server
///
/// # Example
///
/// ```rust,no_run
/// use krelay_network::ClientConnection;
/// # use krelay_network::Relay;
/// # use std::sync::Arc;
/// # async fn example(listener: tokio::net::TcpListener, relay: Arc<Relay>) -> Result<(), Box<dyn std::error::Error>> {
///
/// let (socket, peer_addr) = listener.accept().await?;
/// let (conn, channels) = ClientConnection::new(relay.clone(), peer_addr);
/// tokio::spawn(conn.run(socket, channels));
/// # Ok(())
/// # }
/// ```
pub struct ClientConnection {
    id: ConnectionId,
    peer_addr: SocketAddr,
    relay: Arc<Relay>,

    /// Session this connection currently drives
    state: Mutex<Option<StateRef>>,

    client_tx: mpsc::UnboundedSender<Outgoing>,
    server_tx: mpsc::UnboundedSender<Outgoing>,

    /// Handshake to open the upstream connection with, set by a hook
    pending_connect: Mutex<Option<HelloPacket>>,
}

impl ClientConnection {
    /// Create a connection and register it with the relay
    pub fn new(relay: Arc<Relay>, peer_addr: SocketAddr) -> (Arc<Self>, ConnectionChannels) {
        let (client_tx, client_rx) = mpsc::unbounded_channel();
        let (server_tx, server_rx) = mpsc::unbounded_channel();

        let conn = Arc::new(Self {
            id: relay.next_connection_id(),
            peer_addr,
            relay: relay.clone(),
            state: Mutex::new(None),
            client_tx,
            server_tx,
            pending_connect: Mutex::new(None),
        });
        relay.register_connection(conn.clone());

        (conn, ConnectionChannels { client_rx, server_rx })
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn relay(&self) -> &Arc<Relay> {
        &self.relay
    }

    pub fn state(&self) -> Option<StateRef> {
        self.state.lock().clone()
    }

    pub fn set_state(&self, state: StateRef) {
        *self.state.lock() = Some(state);
    }

    /// Id of the current session, `None` before the handshake
    pub fn session_id(&self) -> Option<SessionId> {
        let state = self.state()?;
        let id = state.lock().id().clone();
        Some(id)
    }

    /// Queue a packet for the client
    pub fn send_to_client(&self, packet: Packet) -> Result<()> {
        self.client_tx
            .send(Outgoing::Packet(packet))
            .map_err(|_| RelayError::Disconnected(format!("client of connection {}", self.id)))
    }

    /// Queue a packet for the game server
    ///
    /// Packets queued before the upstream connection exists are sent once
    /// it is open, after the handshake.
    pub fn send_to_server(&self, packet: Packet) -> Result<()> {
        self.server_tx
            .send(Outgoing::Packet(packet))
            .map_err(|_| RelayError::Disconnected(format!("server of connection {}", self.id)))
    }

    /// Ask for an upstream connection to the current session's target
    ///
    /// The connection is opened after the packet being handled has been
    /// dispatched, and `hello` is the first thing sent on it.
    pub fn connect(&self, hello: HelloPacket) {
        *self.pending_connect.lock() = Some(hello);
    }

    pub fn take_connect_request(&self) -> Option<HelloPacket> {
        self.pending_connect.lock().take()
    }

    /// Close the client side once everything queued so far is written
    pub fn close(&self) {
        let _ = self.client_tx.send(Outgoing::Close);
    }

    /// Run the connection until either side closes
    ///
    /// The connection is unregistered and its session released on return.
    pub async fn run(self: Arc<Self>, socket: TcpStream, channels: ConnectionChannels) -> Result<()> {
        info!("Connection {} from {}", self.id, self.peer_addr);

        let ConnectionChannels { client_rx, server_rx } = channels;
        let codec = FrameCodec::new(self.relay.config().max_frame_len);
        let (client_read, client_write) = socket.into_split();

        let client_writer = tokio::spawn(write_loop(
            self.relay.clone(),
            FramedWrite::new(client_write, codec),
            client_rx,
        ));

        let result = self.relay_loop(FramedRead::new(client_read, codec), server_rx, codec).await;

        self.cleanup();
        self.close();
        if tokio::time::timeout(WRITER_SHUTDOWN_TIMEOUT, client_writer).await.is_err() {
            debug!("Connection {}: client writer did not finish in time", self.id);
        }

        match &result {
            Ok(()) => info!("Connection {} closed", self.id),
            Err(e) => warn!("Connection {} closed: {}", self.id, e),
        }
        result
    }

    async fn relay_loop(
        self: &Arc<Self>,
        mut client_frames: FramedRead<OwnedReadHalf, FrameCodec>,
        mut server_rx: mpsc::UnboundedReceiver<Outgoing>,
        codec: FrameCodec,
    ) -> Result<()> {
        let idle_timeout = self.relay.config().idle_timeout;
        let idle = tokio::time::sleep(idle_timeout);
        tokio::pin!(idle);

        let mut upstream: Option<Upstream> = None;

        loop {
            tokio::select! {
                frame = client_frames.next() => match frame {
                    Some(Ok(frame)) => {
                        self.handle_client_frame(frame).await;
                        if let Some(hello) = self.take_connect_request() {
                            upstream = Some(self.connect_upstream(hello, codec).await?);
                        }
                    }
                    Some(Err(e)) => return Err(e),
                    None => {
                        debug!("Connection {}: client closed", self.id);
                        return Ok(());
                    }
                },

                frame = next_upstream_frame(&mut upstream) => match frame {
                    Some(Ok(frame)) => self.handle_server_frame(frame).await,
                    Some(Err(e)) => return Err(e),
                    None => {
                        debug!("Connection {}: server closed", self.id);
                        return Ok(());
                    }
                },

                Some(outgoing) = server_rx.recv(), if upstream.is_some() => {
                    let Outgoing::Packet(packet) = outgoing else {
                        return Ok(());
                    };
                    if let Some(upstream) = upstream.as_mut() {
                        upstream.send(&self.relay, packet).await?;
                    }
                },

                _ = &mut idle => {
                    info!("Connection {} idle for {:?}, closing", self.id, idle_timeout);
                    return Ok(());
                }
            }

            idle.as_mut().reset(tokio::time::Instant::now() + idle_timeout);
        }
    }

    async fn handle_client_frame(self: &Arc<Self>, frame: RawFrame) {
        let packet = self.relay.game_data().packets.decode(frame);
        self.handle_client_packet(packet).await;
    }

    async fn handle_server_frame(self: &Arc<Self>, frame: RawFrame) {
        let packet = self.relay.game_data().packets.decode(frame);
        self.handle_server_packet(packet).await;
    }

    /// Run the hooks for a packet from the client and forward it upstream
    ///
    /// A chat command with at least one command hook is consumed and never
    /// reaches the server.
    pub async fn handle_client_packet(self: &Arc<Self>, mut packet: Packet) {
        trace!("Connection {}: client -> {:?}", self.id, packet.packet_type());

        if let Packet::PlayerText(text) = &packet {
            if let Some((command, args)) = text.as_command() {
                if self.relay.hooks().dispatch_command(self, &command, &args).await {
                    return;
                }
            }
        }

        if self.relay.hooks().dispatch_packet(self, &mut packet).await == Verdict::Forward {
            if let Err(e) = self.send_to_server(packet) {
                debug!("{}", e);
            }
        }
    }

    /// Run the hooks for a packet from the server and forward it to the client
    pub async fn handle_server_packet(self: &Arc<Self>, mut packet: Packet) {
        trace!("Connection {}: server -> {:?}", self.id, packet.packet_type());

        if self.relay.hooks().dispatch_packet(self, &mut packet).await == Verdict::Forward {
            if let Err(e) = self.send_to_client(packet) {
                debug!("{}", e);
            }
        }
    }

    async fn connect_upstream(&self, hello: HelloPacket, codec: FrameCodec) -> Result<Upstream> {
        let state = self.state().ok_or(RelayError::NoSession(self.id.get()))?;
        let (address, port) = {
            let s = state.lock();
            (s.upstream_address.clone(), s.upstream_port)
        };

        let connect_timeout = self.relay.config().connect_timeout;
        let stream = tokio::time::timeout(connect_timeout, TcpStream::connect((address.as_str(), port)))
            .await
            .map_err(|_| RelayError::Disconnected(format!("timed out connecting to {}:{}", address, port)))??;
        stream.set_nodelay(true)?;

        info!("Connection {} connected to {}:{}", self.id, address, port);

        let (read, write) = stream.into_split();
        let mut upstream = Upstream {
            frames: FramedRead::new(read, codec),
            sink: FramedWrite::new(write, codec),
        };
        upstream.send(&self.relay, Packet::Hello(hello)).await?;
        Ok(upstream)
    }

    /// Release this connection's hold on the relay
    ///
    /// The session is dropped only if this connection still owns it and no
    /// redirect handoff is pending.
    fn cleanup(&self) {
        self.relay.unregister_connection(self.id);

        let Some(state) = self.state() else {
            return;
        };
        let id = state.lock().id().clone();
        if !self.relay.sessions().remove_owned(&id, self.id) {
            debug!("Connection {}: session {} kept", self.id, id);
        }
    }
}

async fn next_upstream_frame(upstream: &mut Option<Upstream>) -> Option<Result<RawFrame>> {
    match upstream {
        Some(upstream) => upstream.frames.next().await,
        None => std::future::pending().await,
    }
}

async fn write_loop(
    relay: Arc<Relay>,
    mut sink: FramedWrite<OwnedWriteHalf, FrameCodec>,
    mut rx: mpsc::UnboundedReceiver<Outgoing>,
) {
    while let Some(outgoing) = rx.recv().await {
        let Outgoing::Packet(packet) = outgoing else {
            break;
        };

        let frame = match relay.game_data().packets.encode(&packet) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Dropping packet bound for client: {}", e);
                continue;
            }
        };

        if let Err(e) = sink.send(frame).await {
            debug!("Client write failed: {}", e);
            break;
        }
    }

    if let Err(e) = sink.close().await {
        trace!("Closing client socket: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_client, test_client_on, test_relay};
    use crate::ProxyConfig;
    use krelay_protocol::{PlayerTextPacket, TextPacket};

    #[tokio::test]
    async fn test_new_connection_is_registered() {
        let relay = test_relay(ProxyConfig::default());
        let (client, _channels) = test_client_on(&relay);
        assert!(relay.is_live(client.id()));
        assert!(client.session_id().is_none());
    }

    #[tokio::test]
    async fn test_unhooked_packets_are_forwarded() {
        let (client, mut channels) = test_client();
        let text = Packet::Text(TextPacket { text: "hi".into(), ..Default::default() });

        client.handle_server_packet(text.clone()).await;
        assert!(matches!(channels.client_rx.try_recv(), Ok(Outgoing::Packet(p)) if p == text));

        let unknown = Packet::Unknown { id: 200, payload: vec![9, 9] };
        client.handle_client_packet(unknown.clone()).await;
        assert!(matches!(channels.server_rx.try_recv(), Ok(Outgoing::Packet(p)) if p == unknown));
    }

    #[tokio::test]
    async fn test_commands_are_consumed() {
        let (client, mut channels) = test_client();

        client
            .handle_client_packet(Packet::PlayerText(PlayerTextPacket { text: "/recon".into() }))
            .await;
        assert!(channels.server_rx.try_recv().is_err());
        assert!(matches!(channels.client_rx.try_recv(), Ok(Outgoing::Packet(Packet::Text(_)))));

        // not a relay command
        let chat = Packet::PlayerText(PlayerTextPacket { text: "/tell someone hi".into() });
        client.handle_client_packet(chat.clone()).await;
        assert!(matches!(channels.server_rx.try_recv(), Ok(Outgoing::Packet(p)) if p == chat));
    }

    #[tokio::test]
    async fn test_cleanup_releases_owned_session() {
        let relay = test_relay(ProxyConfig::default());
        let (client, _channels) = test_client_on(&relay);
        let state = relay.sessions().create("10.0.0.1", 2050);
        state.lock().owner = Some(client.id());
        client.set_state(state);

        client.cleanup();
        assert!(!relay.is_live(client.id()));
        assert!(relay.sessions().is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_keeps_session_awaiting_handoff() {
        let relay = test_relay(ProxyConfig::default());
        let (client, _channels) = test_client_on(&relay);
        let state = relay.sessions().create("10.0.0.1", 2050);
        {
            let mut s = state.lock();
            s.owner = Some(client.id());
            s.begin_handoff();
        }
        client.set_state(state);

        client.cleanup();
        assert_eq!(relay.sessions().len(), 1);
    }

    #[tokio::test]
    async fn test_connect_without_session_fails() {
        let (client, _channels) = test_client();
        let result = client.connect_upstream(HelloPacket::default(), FrameCodec::default()).await;
        assert!(matches!(result, Err(RelayError::NoSession(_))));
    }
}
