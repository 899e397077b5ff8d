//! MQTT v5.0 control packets.
//!
//! Each packet type implements [`MqttPacket`]; [`Packet`] is the tagged union
//! the client engine matches on after a frame is decoded.

mod ack_common;
pub mod auth;
pub mod connack;
pub mod connect;
pub mod disconnect;
pub mod puback;
pub mod pubcomp;
pub mod publish;
pub mod pubrec;
pub mod pubrel;
pub mod suback;
pub mod subscribe;
pub mod unsuback;
pub mod unsubscribe;

use crate::encoding::{decode_variable_int, encode_variable_int, variable_int_len};
use crate::error::{MqttError, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};

pub use auth::AuthPacket;
pub use connack::ConnAckPacket;
pub use connect::ConnectPacket;
pub use disconnect::DisconnectPacket;
pub use puback::PubAckPacket;
pub use pubcomp::PubCompPacket;
pub use publish::PublishPacket;
pub use pubrec::PubRecPacket;
pub use pubrel::PubRelPacket;
pub use suback::SubAckPacket;
pub use subscribe::{SubscribePacket, TopicFilter};
pub use unsuback::UnsubAckPacket;
pub use unsubscribe::UnsubscribePacket;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    Connect = 1,
    ConnAck = 2,
    Publish = 3,
    PubAck = 4,
    PubRec = 5,
    PubRel = 6,
    PubComp = 7,
    Subscribe = 8,
    SubAck = 9,
    Unsubscribe = 10,
    UnsubAck = 11,
    PingReq = 12,
    PingResp = 13,
    Disconnect = 14,
    Auth = 15,
}

impl PacketType {
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        let kind = match value {
            1 => Self::Connect,
            2 => Self::ConnAck,
            3 => Self::Publish,
            4 => Self::PubAck,
            5 => Self::PubRec,
            6 => Self::PubRel,
            7 => Self::PubComp,
            8 => Self::Subscribe,
            9 => Self::SubAck,
            10 => Self::Unsubscribe,
            11 => Self::UnsubAck,
            12 => Self::PingReq,
            13 => Self::PingResp,
            14 => Self::Disconnect,
            15 => Self::Auth,
            _ => return None,
        };
        Some(kind)
    }

    /// Flags every packet type except PUBLISH must carry.
    #[must_use]
    pub fn required_flags(self) -> Option<u8> {
        match self {
            Self::Publish => None,
            Self::PubRel | Self::Subscribe | Self::Unsubscribe => Some(0x02),
            _ => Some(0x00),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedHeader {
    pub packet_type: PacketType,
    pub flags: u8,
    pub remaining_length: u32,
}

impl FixedHeader {
    #[must_use]
    pub fn new(packet_type: PacketType, flags: u8, remaining_length: u32) -> Self {
        Self {
            packet_type,
            flags,
            remaining_length,
        }
    }

    pub fn encode<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        buf.put_u8(((self.packet_type as u8) << 4) | (self.flags & 0x0F));
        encode_variable_int(buf, self.remaining_length)
    }

    pub fn decode<B: Buf>(buf: &mut B) -> Result<Self> {
        if !buf.has_remaining() {
            return Err(MqttError::MalformedPacket(
                "Missing fixed header".to_string(),
            ));
        }
        let first = buf.get_u8();
        let packet_type =
            PacketType::from_u8(first >> 4).ok_or(MqttError::InvalidPacketType(first >> 4))?;
        let flags = first & 0x0F;
        if let Some(required) = packet_type.required_flags() {
            if flags != required {
                return Err(MqttError::MalformedPacket(format!(
                    "Invalid flags 0x{flags:X} for {packet_type:?}"
                )));
            }
        }
        let remaining_length = decode_variable_int(buf)?;
        Ok(Self::new(packet_type, flags, remaining_length))
    }

    #[must_use]
    pub fn encoded_len(&self) -> usize {
        1 + variable_int_len(self.remaining_length)
    }
}

pub trait MqttPacket: Sized {
    fn packet_type(&self) -> PacketType;

    fn flags(&self) -> u8 {
        self.packet_type().required_flags().unwrap_or(0)
    }

    fn encode_body<B: BufMut>(&self, buf: &mut B) -> Result<()>;

    fn decode_body<B: Buf>(buf: &mut B, fixed_header: &FixedHeader) -> Result<Self>;

    fn encode<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        let mut body = BytesMut::new();
        self.encode_body(&mut body)?;
        let remaining_length =
            u32::try_from(body.len()).map_err(|_| MqttError::PacketTooLarge {
                size: body.len(),
                max: crate::constants::MAX_REMAINING_LENGTH as usize,
            })?;
        FixedHeader::new(self.packet_type(), self.flags(), remaining_length).encode(buf)?;
        buf.put_slice(&body);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Connect(Box<ConnectPacket>),
    ConnAck(ConnAckPacket),
    Publish(PublishPacket),
    PubAck(PubAckPacket),
    PubRec(PubRecPacket),
    PubRel(PubRelPacket),
    PubComp(PubCompPacket),
    Subscribe(SubscribePacket),
    SubAck(SubAckPacket),
    Unsubscribe(UnsubscribePacket),
    UnsubAck(UnsubAckPacket),
    PingReq,
    PingResp,
    Disconnect(DisconnectPacket),
    Auth(AuthPacket),
}

impl Packet {
    #[must_use]
    pub fn packet_type(&self) -> PacketType {
        match self {
            Self::Connect(_) => PacketType::Connect,
            Self::ConnAck(_) => PacketType::ConnAck,
            Self::Publish(_) => PacketType::Publish,
            Self::PubAck(_) => PacketType::PubAck,
            Self::PubRec(_) => PacketType::PubRec,
            Self::PubRel(_) => PacketType::PubRel,
            Self::PubComp(_) => PacketType::PubComp,
            Self::Subscribe(_) => PacketType::Subscribe,
            Self::SubAck(_) => PacketType::SubAck,
            Self::Unsubscribe(_) => PacketType::Unsubscribe,
            Self::UnsubAck(_) => PacketType::UnsubAck,
            Self::PingReq => PacketType::PingReq,
            Self::PingResp => PacketType::PingResp,
            Self::Disconnect(_) => PacketType::Disconnect,
            Self::Auth(_) => PacketType::Auth,
        }
    }

    /// Packet identifier of packets that carry one.
    #[must_use]
    pub fn packet_id(&self) -> Option<u16> {
        match self {
            Self::Publish(p) => p.packet_id,
            Self::PubAck(p) => Some(p.packet_id),
            Self::PubRec(p) => Some(p.packet_id),
            Self::PubRel(p) => Some(p.packet_id),
            Self::PubComp(p) => Some(p.packet_id),
            Self::Subscribe(p) => Some(p.packet_id),
            Self::SubAck(p) => Some(p.packet_id),
            Self::Unsubscribe(p) => Some(p.packet_id),
            Self::UnsubAck(p) => Some(p.packet_id),
            _ => None,
        }
    }

    pub fn encode<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        match self {
            Self::Connect(p) => p.encode(buf),
            Self::ConnAck(p) => p.encode(buf),
            Self::Publish(p) => p.encode(buf),
            Self::PubAck(p) => p.encode(buf),
            Self::PubRec(p) => p.encode(buf),
            Self::PubRel(p) => p.encode(buf),
            Self::PubComp(p) => p.encode(buf),
            Self::Subscribe(p) => p.encode(buf),
            Self::SubAck(p) => p.encode(buf),
            Self::Unsubscribe(p) => p.encode(buf),
            Self::UnsubAck(p) => p.encode(buf),
            Self::PingReq => FixedHeader::new(PacketType::PingReq, 0, 0).encode(buf),
            Self::PingResp => FixedHeader::new(PacketType::PingResp, 0, 0).encode(buf),
            Self::Disconnect(p) => p.encode(buf),
            Self::Auth(p) => p.encode(buf),
        }
    }

    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        self.encode(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Decodes one packet from the front of `buf`, leaving any following bytes.
    pub fn decode<B: Buf>(buf: &mut B) -> Result<Self> {
        let fixed_header = FixedHeader::decode(buf)?;
        let len = fixed_header.remaining_length as usize;
        if buf.remaining() < len {
            return Err(MqttError::MalformedPacket(format!(
                "Remaining length {len} exceeds available {} bytes",
                buf.remaining()
            )));
        }
        let mut body = buf.copy_to_bytes(len);
        let packet = Self::decode_body(&mut body, &fixed_header)?;
        if body.has_remaining() {
            return Err(MqttError::MalformedPacket(format!(
                "{} trailing bytes after {:?}",
                body.remaining(),
                fixed_header.packet_type
            )));
        }
        Ok(packet)
    }

    fn decode_body(body: &mut Bytes, fixed_header: &FixedHeader) -> Result<Self> {
        let packet = match fixed_header.packet_type {
            PacketType::Connect => {
                Self::Connect(Box::new(ConnectPacket::decode_body(body, fixed_header)?))
            }
            PacketType::ConnAck => Self::ConnAck(ConnAckPacket::decode_body(body, fixed_header)?),
            PacketType::Publish => Self::Publish(PublishPacket::decode_body(body, fixed_header)?),
            PacketType::PubAck => Self::PubAck(PubAckPacket::decode_body(body, fixed_header)?),
            PacketType::PubRec => Self::PubRec(PubRecPacket::decode_body(body, fixed_header)?),
            PacketType::PubRel => Self::PubRel(PubRelPacket::decode_body(body, fixed_header)?),
            PacketType::PubComp => Self::PubComp(PubCompPacket::decode_body(body, fixed_header)?),
            PacketType::Subscribe => {
                Self::Subscribe(SubscribePacket::decode_body(body, fixed_header)?)
            }
            PacketType::SubAck => Self::SubAck(SubAckPacket::decode_body(body, fixed_header)?),
            PacketType::Unsubscribe => {
                Self::Unsubscribe(UnsubscribePacket::decode_body(body, fixed_header)?)
            }
            PacketType::UnsubAck => {
                Self::UnsubAck(UnsubAckPacket::decode_body(body, fixed_header)?)
            }
            PacketType::PingReq => Self::PingReq,
            PacketType::PingResp => Self::PingResp,
            PacketType::Disconnect => {
                Self::Disconnect(DisconnectPacket::decode_body(body, fixed_header)?)
            }
            PacketType::Auth => Self::Auth(AuthPacket::decode_body(body, fixed_header)?),
        };
        Ok(packet)
    }
}

pub(crate) fn decode_packet_id<B: Buf>(buf: &mut B) -> Result<u16> {
    if buf.remaining() < 2 {
        return Err(MqttError::MalformedPacket(
            "Missing packet identifier".to_string(),
        ));
    }
    match buf.get_u16() {
        0 => Err(MqttError::MalformedPacket(
            "Packet identifier must be non-zero".to_string(),
        )),
        id => Ok(id),
    }
}
