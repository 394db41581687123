//! A reliable messaging transport over UDP for a single server socket with many clients.
//!
//! Applications exchange *messages* (byte chunks) over numbered *channels*. Each channel has a
//!  fixed QoS type which determines its guarantees:
//! * **Unreliable**: fire and forget, delivered as received
//! * **UnreliableSequenced**: fire and forget, stale messages (older than the newest delivered
//!    message) are dropped
//! * **Reliable** (and **AllCostDelivery**): re-sent until acknowledged, delivered as received
//! * **ReliableSequenced**: re-sent until acknowledged, delivered in send order
//! * **ReliableFragmented**: re-sent until acknowledged, messages bigger than a fragment are
//!    split and re-assembled
//!
//! ## Packets
//!
//! All multi-byte fields are big endian. The first two bytes of every datagram are a connection
//!  id, with 0 marking *system packets* (connect, ping, disconnect) and every other value a
//!  *data packet* for the connection with that id.
//!
//! A data packet has a 12 byte header followed by any number of channel frames:
//!
//! ```ascii
//!  0: connection id (u16) - assigned by the listener
//!  2: packet id (u16)
//!  4: session id (u16)
//!  6: ack message id (u16) - the highest reliable message id received from the peer
//!  8: ack mask (u32) - bit n set means 'message (ack message id - n) was received'
//! 12: channel frames
//! ```
//!
//! A data packet without frames is a *pure ack*.
//!
//! ## Acknowledgement
//!
//! Reliable messages are numbered per connection and kept until the peer acknowledges them.
//!  Every outgoing data packet carries the receive state; a message the peer reports as missing
//!  is sent again in a new packet. There are no timers - retransmission is driven by the peer's
//!  acks only.
//!
//! ## Handshake
//!
//! A client sends a connect request, and the application decides whether to accept it. On
//!  accept, the listener allocates a connection id and replies with a ping; the connection is
//!  established when the client's ping reply arrives.

pub mod ack_window;
pub mod channel;
pub mod config;
pub mod connection;
pub mod connection_ids;
pub mod connection_request;
pub mod event_listener;
pub mod fragment_reassembler;
pub mod listener;
pub mod packet_header;
pub mod safe_converter;
pub mod send_socket;
pub mod system_packets;
pub mod util;

#[cfg(test)] mod test_util;
