use anyhow::bail;
use bytes::{Buf, BufMut, BytesMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use crate::packet_header::{RequestType, SystemPacketHeader};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum DisconnectReason {
    Ok = 0,
    WrongHost,
    WrongConnection,
    WrongChannel,
    NoResources,
    BadMessage,
    Timeout,
    MessageTooLong,
    WrongOperation,
    VersionMismatch,
    CrcMismatch,
    DnsFailure,
}

/// The session id that a peer expects in our pings is its own session id with the two bytes
///  swapped
pub fn remote_session_id(peer_session_id: u16) -> u16 {
    peer_session_id.swap_bytes()
}

/// Sent by a client to request a connection. It is answered with a ping if the application
///  accepts the connection, and with a disconnect otherwise.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ConnectPacket {
    pub header: SystemPacketHeader,
    pub lib_version: u32,
    pub crc: u32,
}

impl ConnectPacket {
    pub fn ser(&self, buf: &mut BytesMut) {
        self.header.ser(buf);
        buf.put_u32(self.lib_version);
        buf.put_u32(self.crc);
    }

    pub fn deser(buf: &mut impl Buf) -> anyhow::Result<ConnectPacket> {
        let header = SystemPacketHeader::deser(buf)?;
        if header.request_type != RequestType::ConnectRequest {
            bail!("expected a connect request, was {:?}", header.request_type);
        }
        Ok(ConnectPacket {
            header,
            lib_version: buf.try_get_u32()?,
            crc: buf.try_get_u32()?,
        })
    }
}

/// Terminates a connection, or rejects a connection request. Disconnects are fire-and-forget,
///  there is no acknowledgement.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct DisconnectPacket {
    pub header: SystemPacketHeader,
    pub lib_version: u32,
    pub reason: DisconnectReason,
}

impl DisconnectPacket {
    pub fn ser(&self, buf: &mut BytesMut) {
        self.header.ser(buf);
        buf.put_u32(self.lib_version);
        buf.put_u8(self.reason.into());
    }

    pub fn deser(buf: &mut impl Buf) -> anyhow::Result<DisconnectPacket> {
        let header = SystemPacketHeader::deser(buf)?;
        if header.request_type != RequestType::Disconnect {
            bail!("expected a disconnect, was {:?}", header.request_type);
        }
        let lib_version = buf.try_get_u32()?;
        let raw_reason = buf.try_get_u8()?;
        let reason = match DisconnectReason::try_from(raw_reason) {
            Ok(r) => r,
            Err(_) => bail!("unknown disconnect reason {}", raw_reason),
        };
        Ok(DisconnectPacket {
            header,
            lib_version,
            reason,
        })
    }
}

/// Pings are exchanged to complete the handshake, and they are answered for the lifetime of the
///  connection.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PingPacket {
    pub header: SystemPacketHeader,
    /// millis since the sender started, wrapping
    pub sent_ping_time: u32,
    /// `sent_ping_time` of the ping this one answers, 0 if none
    pub ack_ping_time: u32,
    pub local_time_correction: u32,
    pub int_drop_rate: u8,
    pub ext_drop_rate: u8,
    /// the receiver's session id with swapped bytes
    pub remote_session_id: u16,
}

impl PingPacket {
    pub fn ser(&self, buf: &mut BytesMut) {
        self.header.ser(buf);
        buf.put_u32(self.sent_ping_time);
        buf.put_u32(self.ack_ping_time);
        buf.put_u32(self.local_time_correction);
        buf.put_u8(self.int_drop_rate);
        buf.put_u8(self.ext_drop_rate);
        buf.put_u16(self.remote_session_id);
    }

    pub fn deser(buf: &mut impl Buf) -> anyhow::Result<PingPacket> {
        let header = SystemPacketHeader::deser(buf)?;
        if header.request_type != RequestType::Ping {
            bail!("expected a ping, was {:?}", header.request_type);
        }
        Ok(PingPacket {
            header,
            sent_ping_time: buf.try_get_u32()?,
            ack_ping_time: buf.try_get_u32()?,
            local_time_correction: buf.try_get_u32()?,
            int_drop_rate: buf.try_get_u8()?,
            ext_drop_rate: buf.try_get_u8()?,
            remote_session_id: buf.try_get_u16()?,
        })
    }
}
