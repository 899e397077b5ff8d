use crate::constants::{PROTOCOL_LEVEL_V5, PROTOCOL_NAME};
use crate::encoding::{decode_binary, decode_string, encode_binary, encode_string};
use crate::error::{MqttError, Result};
use crate::packet::{FixedHeader, MqttPacket, PacketType};
use crate::protocol::v5::properties::Properties;
use crate::types::{ConnectOptions, QoS, WillMessage, WillProperties};
use bytes::{Buf, BufMut, Bytes};

const FLAG_CLEAN_START: u8 = 0x02;
const FLAG_WILL: u8 = 0x04;
const FLAG_WILL_RETAIN: u8 = 0x20;
const FLAG_PASSWORD: u8 = 0x80;
const FLAG_USERNAME: u8 = 0x40;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectPacket {
    pub client_id: String,
    pub keep_alive: u16,
    pub clean_start: bool,
    pub username: Option<String>,
    pub password: Option<Bytes>,
    pub will: Option<WillMessage>,
    pub properties: Properties,
}

impl ConnectPacket {
    #[must_use]
    pub fn new(options: &ConnectOptions) -> Self {
        Self {
            client_id: options.client_id.clone(),
            keep_alive: options.keep_alive_secs(),
            clean_start: options.clean_start,
            username: options.username.clone(),
            password: options.password.clone(),
            will: options.will.clone(),
            properties: Properties::from(&options.properties),
        }
    }

    fn connect_flags(&self) -> u8 {
        let mut flags = 0;
        if self.clean_start {
            flags |= FLAG_CLEAN_START;
        }
        if let Some(ref will) = self.will {
            flags |= FLAG_WILL | (u8::from(will.qos) << 3);
            if will.retain {
                flags |= FLAG_WILL_RETAIN;
            }
        }
        if self.username.is_some() {
            flags |= FLAG_USERNAME;
        }
        if self.password.is_some() {
            flags |= FLAG_PASSWORD;
        }
        flags
    }
}

impl MqttPacket for ConnectPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::Connect
    }

    fn encode_body<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        encode_string(buf, PROTOCOL_NAME)?;
        buf.put_u8(PROTOCOL_LEVEL_V5);
        buf.put_u8(self.connect_flags());
        buf.put_u16(self.keep_alive);
        self.properties.encode(buf)?;

        encode_string(buf, &self.client_id)?;
        if let Some(ref will) = self.will {
            Properties::from(&will.properties).encode(buf)?;
            encode_string(buf, &will.topic)?;
            encode_binary(buf, &will.payload)?;
        }
        if let Some(ref username) = self.username {
            encode_string(buf, username)?;
        }
        if let Some(ref password) = self.password {
            encode_binary(buf, password)?;
        }
        Ok(())
    }

    fn decode_body<B: Buf>(buf: &mut B, _fixed_header: &FixedHeader) -> Result<Self> {
        let name = decode_string(buf)?;
        if name != PROTOCOL_NAME {
            return Err(MqttError::ProtocolError(format!(
                "Unexpected protocol name {name:?}"
            )));
        }
        if buf.remaining() < 4 {
            return Err(MqttError::MalformedPacket(
                "Truncated CONNECT variable header".to_string(),
            ));
        }
        let level = buf.get_u8();
        if level != PROTOCOL_LEVEL_V5 {
            return Err(MqttError::ProtocolError(format!(
                "Unsupported protocol level {level}"
            )));
        }
        let flags = buf.get_u8();
        if flags & 0x01 != 0 {
            return Err(MqttError::MalformedPacket(
                "CONNECT reserved flag set".to_string(),
            ));
        }
        let keep_alive = buf.get_u16();
        let properties = Properties::decode(buf)?;
        let client_id = decode_string(buf)?;

        let will = if flags & FLAG_WILL == 0 {
            if flags & (FLAG_WILL_RETAIN | 0x18) != 0 {
                return Err(MqttError::MalformedPacket(
                    "Will QoS or retain set without will flag".to_string(),
                ));
            }
            None
        } else {
            let will_properties = Properties::decode(buf)?;
            let topic = decode_string(buf)?;
            let payload = decode_binary(buf)?;
            Some(WillMessage {
                topic,
                payload: payload.to_vec(),
                qos: QoS::from_wire((flags >> 3) & 0x03)?,
                retain: flags & FLAG_WILL_RETAIN != 0,
                properties: WillProperties::from(&will_properties),
            })
        };

        let username = if flags & FLAG_USERNAME == 0 {
            None
        } else {
            Some(decode_string(buf)?)
        };
        let password = if flags & FLAG_PASSWORD == 0 {
            None
        } else {
            Some(decode_binary(buf)?)
        };

        Ok(Self {
            client_id,
            keep_alive,
            clean_start: flags & FLAG_CLEAN_START != 0,
            username,
            password,
            will,
            properties,
        })
    }
}
