use std::net::SocketAddr;
use std::sync::Mutex;
use async_trait::async_trait;
use crate::send_socket::SendSocket;

/// Records all datagrams instead of sending them
pub struct RecordingSendSocket {
    sent: Mutex<Vec<(SocketAddr, Vec<u8>)>>,
}

impl Default for RecordingSendSocket {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingSendSocket {
    pub fn new() -> RecordingSendSocket {
        RecordingSendSocket {
            sent: Default::default(),
        }
    }

    /// returns sent datagrams, clearing the internal buffer
    pub fn take_sent(&self) -> Vec<(SocketAddr, Vec<u8>)> {
        std::mem::take(&mut *self.sent.lock().unwrap())
    }

    pub fn num_sent(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl SendSocket for RecordingSendSocket {
    async fn send_datagram(&self, to: SocketAddr, datagram: &[u8]) {
        self.sent.lock().unwrap().push((to, datagram.to_vec()));
    }
}
