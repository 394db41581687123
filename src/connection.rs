use std::net::SocketAddr;
use std::sync::Arc;
use anyhow::bail;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use rustc_hash::FxHashMap;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, trace, warn};
use crate::ack_window::AckWindow;
use crate::channel::Channel;
use crate::config::{ConnectionConfig, LIB_VERSION};
use crate::packet_header::{DataPacketHeader, RequestType, SystemPacketHeader};
use crate::send_socket::SendSocket;
use crate::system_packets::{remote_session_id, DisconnectPacket, DisconnectReason, PingPacket};

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ConnectionState {
    /// accepted, waiting for the peer's first ping
    Handshake,
    Connected,
    /// terminal
    Disconnected,
}

/// A message that was received on a connection and is ready for delivery to the application
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ReceivedMessage {
    pub channel_id: u8,
    pub data: Vec<u8>,
}

/// A reliable frame that was sent but not acknowledged yet
#[derive(Clone)]
struct PendingMessage {
    channel_id: u8,
    frame: Bytes,
}

struct ConnectionInner {
    state: ConnectionState,
    next_packet_id: u16,
    /// shared by all reliable channels of the connection
    next_message_id: u16,
    ack_window: AckWindow,
    pending_messages: FxHashMap<u16, PendingMessage>,
    channels: Vec<Channel>,
    /// framing for sending on channel ids without configuration
    fallback_channel: Channel,
}

impl ConnectionInner {
    fn next_packet_id(&mut self) -> u16 {
        let result = self.next_packet_id;
        self.next_packet_id = self.next_packet_id.wrapping_add(1);
        result
    }
}

/// A logical connection with a single remote peer.
///
/// All mutable state is behind a single lock. Incoming datagrams for a connection are processed
///  sequentially by the listener, application sends can happen concurrently with them.
pub struct Connection {
    config: Arc<ConnectionConfig>,
    connection_id: u16,
    remote_addr: SocketAddr,
    /// the peer's id for this connection
    remote_connection_id: u16,
    session_id: u16,
    peer_session_id: u16,
    /// echoed in our pings, derived from the peer's session id
    ping_session_id: u16,
    /// reference point for ping times
    started_at: Instant,
    send_socket: Arc<dyn SendSocket>,
    inner: Mutex<ConnectionInner>,
}

impl Connection {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<ConnectionConfig>,
        connection_id: u16,
        remote_addr: SocketAddr,
        remote_connection_id: u16,
        session_id: u16,
        peer_session_id: u16,
        send_socket: Arc<dyn SendSocket>,
        started_at: Instant,
    ) -> Connection {
        let channels = config.channels.iter()
            .map(|&qos_type| Channel::new(qos_type))
            .collect();

        let inner = ConnectionInner {
            state: ConnectionState::Handshake,
            next_packet_id: 0,
            next_message_id: 1,
            ack_window: AckWindow::new(config.ack_mode),
            pending_messages: FxHashMap::default(),
            channels,
            fallback_channel: Channel::Unreliable,
        };

        Connection {
            connection_id,
            remote_addr,
            remote_connection_id,
            session_id,
            peer_session_id,
            ping_session_id: remote_session_id(peer_session_id),
            started_at,
            send_socket,
            inner: Mutex::new(inner),
            config,
        }
    }

    pub fn connection_id(&self) -> u16 {
        self.connection_id
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    pub fn remote_connection_id(&self) -> u16 {
        self.remote_connection_id
    }

    pub fn session_id(&self) -> u16 {
        self.session_id
    }

    pub async fn state(&self) -> ConnectionState {
        self.inner.lock().await.state
    }

    /// Number of reliable messages that were sent and not acknowledged yet
    pub async fn num_pending_messages(&self) -> usize {
        self.inner.lock().await.pending_messages.len()
    }

    /// Sends a message on a given channel. Messages on a channel id without configuration are
    ///  framed as unreliable.
    ///
    /// Fails if the connection is disconnected, or if the message is too long for the channel.
    pub async fn send(&self, channel_id: u8, data: &[u8]) -> anyhow::Result<()> {
        if data.len() > self.config.max_message_len {
            bail!("message of length {} exceeds the maximum message length of {}", data.len(), self.config.max_message_len);
        }

        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;

        if inner.state == ConnectionState::Disconnected {
            bail!("connection #{} to {:?} is disconnected", self.connection_id, self.remote_addr);
        }

        let channel = match inner.channels.get_mut(channel_id as usize) {
            Some(channel) => channel,
            None => {
                debug!("sending on unconfigured channel {} to {:?} - framing it as {:?}", channel_id, self.remote_addr, self.config.channel_type(channel_id));
                &mut inner.fallback_channel
            }
        };

        if !matches!(channel, Channel::ReliableFragmented { .. }) {
            let packet_len = DataPacketHeader::SERIALIZED_LEN + channel.header_len() + data.len();
            if packet_len > self.config.max_datagram_size {
                bail!("message of length {} does not fit into a datagram of {} bytes - use a fragmenting channel", data.len(), self.config.max_datagram_size);
            }
        }

        let frames = channel.prepare(data, &mut inner.next_message_id)?;
        for prepared in frames {
            if let Some(message_id) = prepared.message_id {
                inner.pending_messages.insert(message_id, PendingMessage {
                    channel_id,
                    frame: prepared.frame.clone(),
                });
            }

            let packet = self.build_packet(inner, Some((channel_id, &prepared.frame)))?;
            self.send_socket.send_datagram(self.remote_addr, &packet).await;
        }
        Ok(())
    }

    /// Writes a data packet header with the current ack state, followed by a frame if there is
    ///  one. A packet without a frame is a pure ack.
    fn build_packet(&self, inner: &mut ConnectionInner, frame: Option<(u8, &[u8])>) -> anyhow::Result<BytesMut> {
        let (ack_message_id, ack_mask) = inner.ack_window.build_outgoing_ack()?;
        let header = DataPacketHeader {
            connection_id: self.connection_id,
            packet_id: inner.next_packet_id(),
            session_id: self.session_id,
            ack_message_id,
            ack_mask,
        };

        let mut buf = BytesMut::with_capacity(self.config.max_datagram_size);
        header.ser(&mut buf, self.config.ack_mode)?;
        if let Some((channel_id, frame)) = frame {
            buf.put_u8(channel_id);
            buf.put_slice(frame);
        }
        Ok(buf)
    }

    /// Evicts acknowledged messages from the pending store, and re-sends those the peer reported
    ///  as missing. A re-sent message gets a new packet header but keeps its original frame.
    async fn process_acks(&self, inner: &mut ConnectionInner, ack_message_id: u16, ack_mask: u32) -> anyhow::Result<()> {
        let acks = inner.ack_window.apply_incoming_ack(ack_message_id, ack_mask)?;

        for message_id in &acks.confirmed {
            if inner.pending_messages.remove(message_id).is_some() {
                trace!("message #{} to {:?} was acknowledged", message_id, self.remote_addr);
            }
        }

        for message_id in acks.resend {
            let Some(pending) = inner.pending_messages.get(&message_id).cloned() else {
                trace!("peer {:?} reported message #{} as missing, but it is not pending - skipping", self.remote_addr, message_id);
                continue;
            };

            debug!("re-sending message #{} to {:?}", message_id, self.remote_addr);
            let packet = self.build_packet(inner, Some((pending.channel_id, &pending.frame)))?;
            self.send_socket.send_datagram(self.remote_addr, &packet).await;
        }
        Ok(())
    }

    /// Processes a data packet, returning the messages that are ready for delivery in the order
    ///  in which they should be delivered.
    ///
    /// Problems with the datagram are logged, and processing stops at the first malformed frame.
    ///  Messages from frames before it are still returned since they were acknowledged already.
    pub async fn on_data_packet(&self, datagram: &[u8]) -> Vec<ReceivedMessage> {
        let mut buf = datagram;
        let header = match DataPacketHeader::deser(&mut buf, self.config.ack_mode) {
            Ok(header) => header,
            Err(e) => {
                warn!("unparsable data packet header from {:?} - dropping: {}", self.remote_addr, e);
                return vec![];
            }
        };

        if header.connection_id != self.connection_id {
            debug!("data packet from {:?} for connection #{}, expected #{} - dropping", self.remote_addr, header.connection_id, self.connection_id);
            return vec![];
        }
        if self.config.validate_session_id && header.session_id != self.peer_session_id {
            debug!("data packet from {:?} with session id {}, expected {} - dropping", self.remote_addr, header.session_id, self.peer_session_id);
            return vec![];
        }

        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;

        if inner.state == ConnectionState::Disconnected {
            debug!("data packet from {:?} for disconnected connection #{} - dropping", self.remote_addr, self.connection_id);
            return vec![];
        }

        trace!("data packet #{} from {:?}", header.packet_id, self.remote_addr);

        if let Err(e) = self.process_acks(inner, header.ack_message_id, header.ack_mask).await {
            error!("error processing acks from {:?}: {}", self.remote_addr, e);
            return vec![];
        }

        if buf.is_empty() {
            trace!("pure ack packet");
            return vec![];
        }

        let mut result = Vec::new();
        let mut accepted_reliable = false;
        while buf.has_remaining() {
            let channel_id = buf.get_u8();
            let Some(channel) = inner.channels.get_mut(channel_id as usize) else {
                warn!("data packet from {:?} for unknown channel {} - dropping the rest of the datagram", self.remote_addr, channel_id);
                break;
            };

            match channel.process(&mut buf, &mut inner.ack_window) {
                Ok(processed) => {
                    accepted_reliable |= processed.accepted_reliable;
                    result.extend(processed.delivered.into_iter()
                        .map(|data| ReceivedMessage { channel_id, data }));
                }
                Err(e) => {
                    warn!("malformed frame on channel {} from {:?} - dropping the rest of the datagram: {}", channel_id, self.remote_addr, e);
                    break;
                }
            }
        }

        if accepted_reliable {
            for _ in 0..self.config.ack_echo_count {
                match self.build_packet(inner, None) {
                    Ok(packet) => self.send_socket.send_datagram(self.remote_addr, &packet).await,
                    Err(e) => error!("error building ack packet for {:?}: {}", self.remote_addr, e),
                }
            }
        }

        result
    }

    /// Handles an incoming ping, always replying with a ping of our own. Returns `true` if this
    ///  ping completed the handshake.
    pub async fn on_ping(&self, ping: &PingPacket) -> bool {
        let mut inner = self.inner.lock().await;

        let just_connected = match inner.state {
            ConnectionState::Disconnected => {
                debug!("ping from {:?} for disconnected connection #{} - ignoring", self.remote_addr, self.connection_id);
                return false;
            }
            ConnectionState::Handshake => {
                debug!("handshake with {:?} complete", self.remote_addr);
                inner.state = ConnectionState::Connected;
                true
            }
            ConnectionState::Connected => false,
        };

        self.do_send_ping(&mut inner, Some(ping)).await;
        just_connected
    }

    /// The ping that answers an accepted connection request
    pub async fn send_initial_ping(&self) {
        let mut inner = self.inner.lock().await;
        self.do_send_ping(&mut inner, None).await;
    }

    async fn do_send_ping(&self, inner: &mut ConnectionInner, incoming: Option<&PingPacket>) {
        let ping = PingPacket {
            header: SystemPacketHeader {
                request_type: RequestType::Ping,
                packet_id: inner.next_packet_id(),
                session_id: self.session_id,
                local_connection_id: self.connection_id,
                remote_connection_id: self.remote_connection_id,
            },
            sent_ping_time: self.ping_time(),
            ack_ping_time: incoming.map(|p| p.sent_ping_time).unwrap_or(0),
            local_time_correction: 0,
            int_drop_rate: 0,
            ext_drop_rate: 0,
            remote_session_id: self.ping_session_id,
        };

        let mut buf = BytesMut::with_capacity(32);
        ping.ser(&mut buf);
        self.send_socket.send_datagram(self.remote_addr, &buf).await;
    }

    /// millis since the listener started, wrapping
    fn ping_time(&self) -> u32 {
        self.started_at.elapsed().as_millis() as u32
    }

    /// Fire-and-forget, there is no acknowledgement for a disconnect
    pub async fn send_disconnect(&self, reason: DisconnectReason) {
        let packet = DisconnectPacket {
            header: SystemPacketHeader {
                request_type: RequestType::Disconnect,
                packet_id: 0,
                session_id: self.session_id,
                local_connection_id: self.connection_id,
                remote_connection_id: self.remote_connection_id,
            },
            lib_version: LIB_VERSION,
            reason,
        };

        let mut buf = BytesMut::with_capacity(SystemPacketHeader::SERIALIZED_LEN + 5);
        packet.ser(&mut buf);
        self.send_socket.send_datagram(self.remote_addr, &buf).await;
    }

    /// Moves the connection to its terminal state, returning `false` if it was disconnected
    ///  before.
    pub async fn mark_disconnected(&self) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.state == ConnectionState::Disconnected {
            return false;
        }
        inner.state = ConnectionState::Disconnected;
        inner.pending_messages.clear();
        true
    }
}
