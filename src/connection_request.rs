use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;
use crate::connection::Connection;
use crate::listener::ListenerCore;
use crate::system_packets::{ConnectPacket, DisconnectReason};

/// A peer's request to connect, handed to the application for a decision. Only the first call
///  to either `accept()` or `reject()` has an effect, all later calls are no-ops.
pub struct ConnectionRequest {
    listener: Arc<ListenerCore>,
    remote_addr: SocketAddr,
    connect_packet: ConnectPacket,
    handled: AtomicBool,
}

impl ConnectionRequest {
    pub(crate) fn new(listener: Arc<ListenerCore>, remote_addr: SocketAddr, connect_packet: ConnectPacket) -> ConnectionRequest {
        ConnectionRequest {
            listener,
            remote_addr,
            connect_packet,
            handled: AtomicBool::new(false),
        }
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    pub fn connect_packet(&self) -> &ConnectPacket {
        &self.connect_packet
    }

    pub fn is_handled(&self) -> bool {
        self.handled.load(Ordering::Acquire)
    }

    /// returns `true` for the first caller only
    fn mark_handled(&self) -> bool {
        !self.handled.swap(true, Ordering::AcqRel)
    }

    /// Registers a new connection and sends the handshake ping. Returns the new connection, or
    ///  `None` if the request was handled before or could not be accepted (e.g. because there
    ///  are no free connection ids).
    pub async fn accept(&self) -> Option<Arc<Connection>> {
        if !self.mark_handled() {
            debug!("connection request from {:?} was handled before - ignoring accept", self.remote_addr);
            return None;
        }
        self.listener.accept(self.remote_addr, &self.connect_packet).await
    }

    /// Sends a disconnect with the given reason, without registering any state for the peer
    pub async fn reject(&self, reason: DisconnectReason) {
        if !self.mark_handled() {
            debug!("connection request from {:?} was handled before - ignoring reject", self.remote_addr);
            return;
        }
        self.listener.reject(self.remote_addr, &self.connect_packet, reason).await
    }
}
