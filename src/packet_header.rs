use anyhow::bail;
use bytes::{Buf, BufMut, BytesMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use crate::config::AckMode;

/// Connection id `0` on the wire marks a system packet (connect, disconnect, ping)
pub const SYSTEM_CONNECTION_ID: u16 = 0;

/// Reads the leading connection id of a datagram without consuming it
pub fn peek_connection_id(buf: &[u8]) -> anyhow::Result<u16> {
    let mut b = buf;
    Ok(b.try_get_u16()?)
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum RequestType {
    ConnectRequest = 1,
    Disconnect = 3,
    Ping = 4,
}

/// Common prefix of all system packets:
///
/// ```ascii
/// 0: connection id (u16) - always 0 for system packets
/// 2: request type (u8)
/// 3: packet id (u16)
/// 5: session id (u16) - the sender's session id
/// 7: local connection id (u16) - the sender's id for the connection
/// 9: remote connection id (u16) - the receiver's id for the connection, 0 if not yet known
/// ```
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SystemPacketHeader {
    pub request_type: RequestType,
    pub packet_id: u16,
    pub session_id: u16,
    pub local_connection_id: u16,
    pub remote_connection_id: u16,
}

impl SystemPacketHeader {
    pub const SERIALIZED_LEN: usize = 11;

    pub fn ser(&self, buf: &mut BytesMut) {
        buf.put_u16(SYSTEM_CONNECTION_ID);
        buf.put_u8(self.request_type.into());
        buf.put_u16(self.packet_id);
        buf.put_u16(self.session_id);
        buf.put_u16(self.local_connection_id);
        buf.put_u16(self.remote_connection_id);
    }

    pub fn deser(buf: &mut impl Buf) -> anyhow::Result<SystemPacketHeader> {
        let connection_id = buf.try_get_u16()?;
        if connection_id != SYSTEM_CONNECTION_ID {
            bail!("connection id {} is not a system packet", connection_id);
        }
        let raw_request_type = buf.try_get_u8()?;
        let request_type = match RequestType::try_from(raw_request_type) {
            Ok(t) => t,
            Err(_) => bail!("unknown system request type {}", raw_request_type),
        };

        Ok(SystemPacketHeader {
            request_type,
            packet_id: buf.try_get_u16()?,
            session_id: buf.try_get_u16()?,
            local_connection_id: buf.try_get_u16()?,
            remote_connection_id: buf.try_get_u16()?,
        })
    }
}

/// Header of a data packet, followed by zero or more channel frames:
///
/// ```ascii
///  0: connection id (u16) - non-zero, the id the listener assigned to the connection. It is
///      the same in both directions.
///  2: packet id (u16)
///  4: session id (u16)
///  6: ack message id (u16) - the highest reliable message id the sender received
///  8: ack mask (u32) - bit i acknowledges message id `ack message id - i`
/// 12: [ack mask high (u32) - only in long ack mode, which is not supported]
/// ```
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct DataPacketHeader {
    pub connection_id: u16,
    pub packet_id: u16,
    pub session_id: u16,
    pub ack_message_id: u16,
    pub ack_mask: u32,
}

impl DataPacketHeader {
    pub const SERIALIZED_LEN: usize = 12;

    pub fn ser(&self, buf: &mut BytesMut, ack_mode: AckMode) -> anyhow::Result<()> {
        if ack_mode == AckMode::Long {
            bail!("long ack mode is not implemented - cannot write a data packet header");
        }

        buf.put_u16(self.connection_id);
        buf.put_u16(self.packet_id);
        buf.put_u16(self.session_id);
        buf.put_u16(self.ack_message_id);
        buf.put_u32(self.ack_mask);
        Ok(())
    }

    pub fn deser(buf: &mut impl Buf, ack_mode: AckMode) -> anyhow::Result<DataPacketHeader> {
        if ack_mode == AckMode::Long {
            bail!("long ack mode is not implemented - cannot parse a data packet header");
        }

        Ok(DataPacketHeader {
            connection_id: buf.try_get_u16()?,
            packet_id: buf.try_get_u16()?,
            session_id: buf.try_get_u16()?,
            ack_message_id: buf.try_get_u16()?,
            ack_mask: buf.try_get_u32()?,
        })
    }
}
