use std::net::SocketAddr;
use std::sync::{Arc, PoisonError, RwLock};
use async_trait::async_trait;
#[cfg(test)] use mockall::automock;
use tokio::net::UdpSocket;
use tracing::{debug, error, trace};

/// Outbound datagrams go through this trait rather than the socket directly, abstracting the I/O
///  part away for testing.
///
/// Sending is fire-and-forget: errors are logged, and the protocol treats an unsent datagram the
///  same way as one that was lost in transit.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SendSocket: Send + Sync + 'static {
    async fn send_datagram(&self, to: SocketAddr, datagram: &[u8]);
}

/// The listener's UDP socket as connections see it. Connections can outlive the listener (the
///  application may hold on to them), so the socket is released explicitly on shutdown rather
///  than when the last connection is dropped.
pub struct UdpSendSocket {
    socket: RwLock<Option<Arc<UdpSocket>>>,
}

impl UdpSendSocket {
    pub fn new(socket: Arc<UdpSocket>) -> UdpSendSocket {
        UdpSendSocket {
            socket: RwLock::new(Some(socket)),
        }
    }

    /// Drops this reference to the socket. Datagrams sent afterwards are discarded.
    pub fn release(&self) {
        if self.socket.write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some()
        {
            debug!("released UDP send socket");
        }
    }
}

#[async_trait]
impl SendSocket for UdpSendSocket {
    async fn send_datagram(&self, to: SocketAddr, datagram: &[u8]) {
        let socket = self.socket.read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let Some(socket) = socket else {
            debug!("socket is released - dropping datagram to {:?}", to);
            return;
        };

        trace!("UDP socket: sending {} bytes to {:?}", datagram.len(), to);
        if let Err(e) = socket.send_to(datagram, to).await {
            error!("error sending UDP datagram to {:?}: {}", to, e);
        }
    }
}
