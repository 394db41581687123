use anyhow::bail;
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// The payload size of a single fragment of a `ReliableFragmented` message. This is part of the
///  wire protocol and therefore not configurable.
pub const MAX_FRAGMENT_PAYLOAD_LEN: usize = 512;

/// Protocol / library version that is sent in `Disconnect` packets
pub const LIB_VERSION: u32 = 16_777_472;

/// A datagram must have room for a data packet header and a full-size fragment
pub const MIN_DATAGRAM_SIZE: usize = 12 + 8 + MAX_FRAGMENT_PAYLOAD_LEN;

/// A fragmented message has at most this many fragments, since fragment index and count are u8
pub const MAX_FRAGMENTS_PER_MESSAGE: usize = u8::MAX as usize;

/// The delivery guarantees of a channel. The numeric values are the ones used by the protocol's
///  configuration, which is why there are gaps for QoS types that are not supported.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum QosType {
    /// No guarantee of delivery or ordering
    Unreliable = 0,
    /// No guarantee of delivery, and messages older than the last delivered one are dropped
    UnreliableSequenced = 2,
    /// Each message is delivered exactly once, but not necessarily in order
    Reliable = 3,
    /// Like `Reliable`, but messages are split into fragments of up to 512 bytes
    ReliableFragmented = 4,
    /// Each message is delivered, in the order in which it was sent
    ReliableSequenced = 5,
    /// Same framing and guarantees as `Reliable`
    AllCostDelivery = 8,
}

impl QosType {
    pub fn is_reliable(&self) -> bool {
        matches!(self, QosType::Reliable | QosType::ReliableFragmented | QosType::ReliableSequenced | QosType::AllCostDelivery)
    }

    pub fn is_sequenced(&self) -> bool {
        matches!(self, QosType::UnreliableSequenced | QosType::ReliableSequenced)
    }
}

/// Width of the ack mask in data packet headers.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum AckMode {
    /// 32 bit ack mask
    Short,
    /// 64 bit ack mask (two u32 on the wire). This is reserved in the protocol but not supported.
    Long,
}

#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// The QoS type per channel, the index in this list is the channel id
    pub channels: Vec<QosType>,

    pub ack_mode: AckMode,

    /// The maximum size of an outgoing UDP payload. Sending a message that does not fit into
    ///  a datagram of this size fails (unless the channel fragments messages).
    ///
    /// The default is `1500 - 20 - 8 = 1472`, i.e. full Ethernet frames on IPV4 without optional
    ///  IP headers.
    pub max_datagram_size: usize,

    /// Upper bound for the length of a single application message on any channel. Messages on
    ///  non-fragmenting channels are additionally limited by `max_datagram_size`.
    pub max_message_len: usize,

    /// Number of pure ack packets that are sent after receiving a datagram with new reliable
    ///  messages. Sending more than one makes it less likely that the peer re-sends messages
    ///  because of a lost ack.
    pub ack_echo_count: usize,

    /// If set, data packets whose session id differs from the peer's session id are dropped.
    pub validate_session_id: bool,

    /// Number of received datagrams that can wait for processing per connection. Datagrams
    ///  arriving while the queue is full are dropped.
    pub max_queued_datagrams: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            channels: vec![QosType::Reliable, QosType::Unreliable],
            ack_mode: AckMode::Short,
            max_datagram_size: 1472,
            max_message_len: MAX_FRAGMENTS_PER_MESSAGE * MAX_FRAGMENT_PAYLOAD_LEN,
            ack_echo_count: 3,
            validate_session_id: false,
            max_queued_datagrams: 1024,
        }
    }
}

impl ConnectionConfig {
    pub fn with_channels(channels: Vec<QosType>) -> ConnectionConfig {
        ConnectionConfig {
            channels,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.channels.len() > u8::MAX as usize {
            bail!("at most {} channels are supported, configured {}", u8::MAX, self.channels.len());
        }
        if self.ack_mode == AckMode::Long {
            bail!("long (64 bit) ack mode is not implemented");
        }
        if self.max_datagram_size < MIN_DATAGRAM_SIZE {
            bail!("max datagram size {} is below the minimum of {}", self.max_datagram_size, MIN_DATAGRAM_SIZE);
        }
        if self.max_datagram_size > u16::MAX as usize {
            bail!("max datagram size {} exceeds the UDP limit", self.max_datagram_size);
        }
        if self.max_message_len > MAX_FRAGMENTS_PER_MESSAGE * MAX_FRAGMENT_PAYLOAD_LEN {
            bail!("max message length {} exceeds the maximum size of a fragmented message", self.max_message_len);
        }
        if self.max_queued_datagrams == 0 {
            bail!("max queued datagrams must be at least 1");
        }
        Ok(())
    }

    /// The QoS type for a channel id - channel ids without configuration are unreliable
    pub fn channel_type(&self, channel_id: u8) -> QosType {
        self.channels.get(channel_id as usize)
            .cloned()
            .unwrap_or(QosType::Unreliable)
    }
}
