use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use anyhow::anyhow;
use bytes::BytesMut;
use tokio::net::{ToSocketAddrs, UdpSocket};
use tokio::select;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, span, trace, warn, Instrument, Level, Span};
use uuid::Uuid;
use crate::config::{ConnectionConfig, LIB_VERSION};
use crate::connection::Connection;
use crate::connection_ids::ConnectionIdAllocator;
use crate::connection_request::ConnectionRequest;
use crate::event_listener::EventListener;
use crate::packet_header::{peek_connection_id, RequestType, SystemPacketHeader, SYSTEM_CONNECTION_ID};
use crate::send_socket::{SendSocket, UdpSendSocket};
use crate::system_packets::{ConnectPacket, DisconnectPacket, DisconnectReason, PingPacket};
use crate::util::atomic_map::AtomicMap;

/// A datagram (or the relevant part of it) on its way to a connection's worker, together with
///  the span it was received in
struct Inbound {
    kind: InboundKind,
    span: Span,
}

enum InboundKind {
    Data(Vec<u8>),
    Ping(PingPacket),
    Disconnect(DisconnectReason),
}

#[derive(Clone)]
struct ConnectionEntry {
    connection: Arc<Connection>,
    inbound: mpsc::Sender<Inbound>,
}

impl ConnectionEntry {
    fn enqueue(&self, kind: InboundKind) {
        let inbound = Inbound {
            kind,
            span: Span::current(),
        };
        match self.inbound.try_send(inbound) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                debug!("queue for connection #{} is full - dropping datagram", self.connection.connection_id());
            }
            Err(TrySendError::Closed(_)) => {
                debug!("worker for connection #{} is gone - dropping datagram", self.connection.connection_id());
            }
        }
    }
}

/// The listener's state that is shared with connection workers and pending connection requests
pub(crate) struct ListenerCore {
    config: Arc<ConnectionConfig>,
    send_socket: Arc<dyn SendSocket>,
    event_listener: Arc<dyn EventListener>,
    connections: AtomicMap<SocketAddr, ConnectionEntry>,
    connection_ids: Mutex<ConnectionIdAllocator>,
    started_at: Instant,
    is_running: AtomicBool,
}

impl ListenerCore {
    pub(crate) fn new(config: Arc<ConnectionConfig>, send_socket: Arc<dyn SendSocket>, event_listener: Arc<dyn EventListener>) -> ListenerCore {
        ListenerCore {
            config,
            send_socket,
            event_listener,
            connections: AtomicMap::new(),
            connection_ids: Mutex::new(ConnectionIdAllocator::new()),
            started_at: Instant::now(),
            is_running: AtomicBool::new(true),
        }
    }

    pub(crate) fn connection(&self, addr: &SocketAddr) -> Option<Arc<Connection>> {
        self.connections.get(addr)
            .map(|entry| entry.connection)
    }

    pub(crate) fn connection_count(&self) -> usize {
        self.connections.load().len()
    }

    /// Demultiplexes a datagram: system packets are handled here, data packets go to their
    ///  connection's worker
    async fn on_datagram(self: &Arc<Self>, from: SocketAddr, datagram: &[u8]) {
        trace!("received datagram from {:?}: {:?}", from, datagram);

        let connection_id = match peek_connection_id(datagram) {
            Ok(id) => id,
            Err(_) => {
                warn!("datagram from {:?} is too short for a connection id - dropping", from);
                return;
            }
        };

        if connection_id == SYSTEM_CONNECTION_ID {
            self.on_system_packet(from, datagram).await;
            return;
        }

        let Some(entry) = self.connections.get(&from) else {
            debug!("data packet from unknown peer {:?} - dropping", from);
            return;
        };
        if entry.connection.connection_id() != connection_id {
            debug!("data packet from {:?} for connection #{}, but the peer's connection is #{} - dropping", from, connection_id, entry.connection.connection_id());
            return;
        }
        entry.enqueue(InboundKind::Data(datagram.to_vec()));
    }

    async fn on_system_packet(self: &Arc<Self>, from: SocketAddr, datagram: &[u8]) {
        let request_type = match datagram.get(2).map(|&raw| RequestType::try_from(raw)) {
            Some(Ok(request_type)) => request_type,
            Some(Err(_)) => {
                warn!("system packet from {:?} with unknown request type {} - dropping", from, datagram[2]);
                return;
            }
            None => {
                warn!("system packet from {:?} is too short - dropping", from);
                return;
            }
        };

        let mut buf = datagram;
        match (request_type, self.connections.get(&from)) {
            (RequestType::ConnectRequest, Some(_)) => {
                debug!("connect request from {:?}, which has a connection already - ignoring", from);
            }
            (RequestType::ConnectRequest, None) => {
                match ConnectPacket::deser(&mut buf) {
                    Ok(packet) => self.on_connect_request(from, packet),
                    Err(e) => warn!("malformed connect request from {:?} - dropping: {}", from, e),
                }
            }
            (_, None) => {
                debug!("{:?} from {:?}, which has no connection - ignoring", request_type, from);
            }
            (RequestType::Disconnect, Some(entry)) => {
                match DisconnectPacket::deser(&mut buf) {
                    Ok(packet) => entry.enqueue(InboundKind::Disconnect(packet.reason)),
                    Err(e) => warn!("malformed disconnect from {:?} - dropping: {}", from, e),
                }
            }
            (RequestType::Ping, Some(entry)) => {
                match PingPacket::deser(&mut buf) {
                    Ok(packet) => entry.enqueue(InboundKind::Ping(packet)),
                    Err(e) => warn!("malformed ping from {:?} - dropping: {}", from, e),
                }
            }
        }
    }

    /// The application decides in a separate task, so a slow decision does not hold up other
    ///  datagrams
    fn on_connect_request(self: &Arc<Self>, from: SocketAddr, packet: ConnectPacket) {
        debug!("connection request from {:?}", from);

        let request = ConnectionRequest::new(self.clone(), from, packet);
        let event_listener = self.event_listener.clone();
        tokio::spawn(async move {
            event_listener.on_connection_request(request).await;
        }.instrument(Span::current()));
    }

    pub(crate) async fn accept(self: &Arc<Self>, from: SocketAddr, packet: &ConnectPacket) -> Option<Arc<Connection>> {
        if !self.is_running.load(Ordering::Acquire) {
            debug!("listener is stopped - not accepting connection from {:?}", from);
            return None;
        }

        let allocated = self.connection_ids.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .allocate();
        let Some(connection_id) = allocated else {
            warn!("no free connection id for {:?} - rejecting", from);
            self.reject(from, packet, DisconnectReason::NoResources).await;
            return None;
        };

        let connection = Arc::new(Connection::new(
            self.config.clone(),
            connection_id,
            from,
            packet.header.local_connection_id,
            new_session_id(),
            packet.header.session_id,
            self.send_socket.clone(),
            self.started_at,
        ));

        let (sender, receiver) = mpsc::channel(self.config.max_queued_datagrams);
        let entry = ConnectionEntry {
            connection: connection.clone(),
            inbound: sender,
        };
        let was_inserted = self.connections.update(|connections| {
            if connections.contains_key(&from) {
                false
            }
            else {
                connections.insert(from, entry);
                true
            }
        });
        if !was_inserted {
            debug!("{:?} was connected concurrently - discarding the new connection", from);
            self.release_connection_id(connection_id);
            return None;
        }

        info!("accepted connection #{} from {:?}", connection_id, from);
        tokio::spawn(connection_worker(self.clone(), connection.clone(), receiver));

        connection.send_initial_ping().await;
        Some(connection)
    }

    pub(crate) async fn reject(&self, from: SocketAddr, packet: &ConnectPacket, reason: DisconnectReason) {
        debug!("rejecting connection request from {:?}: {:?}", from, reason);

        let disconnect = DisconnectPacket {
            header: SystemPacketHeader {
                request_type: RequestType::Disconnect,
                packet_id: 0,
                session_id: packet.header.session_id,
                local_connection_id: 0,
                remote_connection_id: packet.header.local_connection_id,
            },
            lib_version: LIB_VERSION,
            reason,
        };

        let mut buf = BytesMut::with_capacity(SystemPacketHeader::SERIALIZED_LEN + 5);
        disconnect.ser(&mut buf);
        self.send_socket.send_datagram(from, &buf).await;
    }

    /// Tears a connection down, notifying the peer if the disconnect is initiated locally. The
    ///  connection id is released only after the connection is removed from the table.
    pub(crate) async fn disconnect(&self, connection: &Arc<Connection>, reason: DisconnectReason, notify_peer: bool) {
        if !connection.mark_disconnected().await {
            debug!("connection #{} is disconnected already", connection.connection_id());
            return;
        }

        if notify_peer {
            connection.send_disconnect(reason).await;
        }

        let addr = connection.remote_addr();
        self.connections.update(|connections| {
            if connections.get(&addr).is_some_and(|entry| Arc::ptr_eq(&entry.connection, connection)) {
                connections.remove(&addr);
            }
        });
        self.release_connection_id(connection.connection_id());

        info!("connection #{} to {:?} disconnected: {:?}", connection.connection_id(), addr, reason);
        self.event_listener.on_client_disconnected(connection.clone(), reason).await;
    }

    fn release_connection_id(&self, connection_id: u16) {
        self.connection_ids.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .release(connection_id);
    }

    /// Drops all connections without notifying anybody. Workers finish the datagram they are
    ///  working on, remaining datagrams are discarded since the connections are disconnected.
    async fn shut_down(&self) {
        self.is_running.store(false, Ordering::Release);

        let connections = self.connections.update(std::mem::take);
        for entry in connections.values() {
            entry.connection.mark_disconnected().await;
        }
        info!("dropped {} connection(s)", connections.len());
    }

    async fn on_inbound(&self, connection: &Arc<Connection>, kind: InboundKind) {
        match kind {
            InboundKind::Data(datagram) => {
                for message in connection.on_data_packet(&datagram).await {
                    self.event_listener.on_network_receive(connection.clone(), &message.data, message.channel_id).await;
                }
            }
            InboundKind::Ping(ping) => {
                if connection.on_ping(&ping).await {
                    info!("connection #{} to {:?} is established", connection.connection_id(), connection.remote_addr());
                    self.event_listener.on_client_connected(connection.clone()).await;
                }
            }
            InboundKind::Disconnect(reason) => {
                self.disconnect(connection, reason, false).await;
            }
        }
    }
}

/// Random and non-zero
fn new_session_id() -> u16 {
    loop {
        let candidate: u16 = rand::random();
        if candidate != 0 {
            return candidate;
        }
    }
}

/// Processes a single connection's datagrams sequentially. The loop ends when the connection is
///  removed from the table, which drops the sending side of its queue.
async fn connection_worker(core: Arc<ListenerCore>, connection: Arc<Connection>, mut inbound: mpsc::Receiver<Inbound>) {
    while let Some(Inbound { kind, span }) = inbound.recv().await {
        core.on_inbound(&connection, kind)
            .instrument(span)
            .await;
    }
    trace!("worker for connection #{} finished", connection.connection_id());
}

async fn receive_loop(core: Arc<ListenerCore>, socket: Arc<UdpSocket>, shutdown: Arc<Notify>) {
    info!("starting receive loop");

    let mut buf = vec![0u8; u16::MAX as usize];
    loop {
        let (num_read, from) = select! {
            _ = shutdown.notified() => {
                info!("receive loop shutting down");
                break;
            }
            received = socket.recv_from(&mut buf) => match received {
                Ok(x) => x,
                Err(e) => {
                    error!("socket error: {}", e);
                    continue;
                }
            }
        };

        let correlation_id = Uuid::new_v4();
        let span = span!(Level::TRACE, "datagram_received", ?correlation_id, ?from);
        core.on_datagram(from, &buf[..num_read])
            .instrument(span)
            .await;
    }
}

/// The server side of the protocol. The listener owns the UDP socket and a receive loop, and it
///  keeps the table of connections by remote address.
///
/// Applications interact with it through an [EventListener] for incoming events, and by sending
///  through [Connection]s or the listener.
pub struct Listener {
    core: Arc<ListenerCore>,
    send_socket: Arc<UdpSendSocket>,
    local_addr: SocketAddr,
    shutdown: Arc<Notify>,
    receive_loop_handle: Option<JoinHandle<()>>,
}

impl Drop for Listener {
    fn drop(&mut self) {
        if let Some(handle) = self.receive_loop_handle.take() {
            handle.abort();
        }
        self.core.is_running.store(false, Ordering::Release);
        self.core.connections.update(|connections| connections.clear());
        self.send_socket.release();
    }
}

impl Listener {
    /// Binds the socket and starts receiving
    pub async fn bind(addr: impl ToSocketAddrs, config: ConnectionConfig, event_listener: Arc<dyn EventListener>) -> anyhow::Result<Listener> {
        config.validate()?;

        let socket = Arc::new(UdpSocket::bind(addr).await?);
        let local_addr = UdpSocket::local_addr(&socket)?;
        info!("bound listener socket to {:?}", local_addr);

        let send_socket = Arc::new(UdpSendSocket::new(socket.clone()));
        let core = Arc::new(ListenerCore::new(Arc::new(config), send_socket.clone(), event_listener));
        let shutdown = Arc::new(Notify::new());

        let receive_loop_handle = tokio::spawn(receive_loop(core.clone(), socket, shutdown.clone()));

        Ok(Listener {
            core,
            send_socket,
            local_addr,
            shutdown,
            receive_loop_handle: Some(receive_loop_handle),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_running(&self) -> bool {
        self.core.is_running.load(Ordering::Acquire)
    }

    pub fn connection(&self, addr: &SocketAddr) -> Option<Arc<Connection>> {
        self.core.connection(addr)
    }

    pub fn connection_count(&self) -> usize {
        self.core.connection_count()
    }

    pub async fn send_to(&self, addr: &SocketAddr, channel_id: u8, data: &[u8]) -> anyhow::Result<()> {
        let connection = self.connection(addr)
            .ok_or_else(|| anyhow!("no connection to {:?}", addr))?;
        connection.send(channel_id, data).await
    }

    /// Sends a disconnect to the peer (fire-and-forget) and removes the connection. Disconnecting
    ///  a connection more than once has no effect.
    pub async fn disconnect(&self, connection: &Arc<Connection>, reason: DisconnectReason) {
        self.core.disconnect(connection, reason, true).await;
    }

    /// Stops receiving, drops all connections and closes the socket, even if the application
    ///  still holds connections. Stopping a stopped listener has no effect.
    pub async fn stop(&mut self) {
        let Some(handle) = self.receive_loop_handle.take() else {
            return;
        };

        self.shutdown.notify_one();
        if let Err(e) = handle.await {
            error!("receive loop terminated abnormally: {}", e);
        }
        self.core.shut_down().await;
        self.send_socket.release();
    }
}
