mod accessors;
mod codec;

use crate::error::{MqttError, Result};
use bytes::Bytes;

macro_rules! property_ids {
    ($($name:ident = $code:literal => $kind:ident,)*) => {
        /// Identifier byte of an MQTT v5.0 property.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum PropertyId {
            $($name = $code,)*
        }

        impl PropertyId {
            #[must_use]
            pub fn from_u8(value: u8) -> Option<Self> {
                match value {
                    $($code => Some(Self::$name),)*
                    _ => None,
                }
            }

            #[must_use]
            pub fn value_type(&self) -> PropertyValueType {
                match self {
                    $(Self::$name => PropertyValueType::$kind,)*
                }
            }
        }
    };
}

property_ids! {
    PayloadFormatIndicator = 0x01 => Byte,
    MessageExpiryInterval = 0x02 => FourByteInteger,
    ContentType = 0x03 => Utf8String,
    ResponseTopic = 0x08 => Utf8String,
    CorrelationData = 0x09 => BinaryData,
    SubscriptionIdentifier = 0x0B => VariableByteInteger,
    SessionExpiryInterval = 0x11 => FourByteInteger,
    AssignedClientIdentifier = 0x12 => Utf8String,
    ServerKeepAlive = 0x13 => TwoByteInteger,
    AuthenticationMethod = 0x15 => Utf8String,
    AuthenticationData = 0x16 => BinaryData,
    RequestProblemInformation = 0x17 => Byte,
    WillDelayInterval = 0x18 => FourByteInteger,
    RequestResponseInformation = 0x19 => Byte,
    ResponseInformation = 0x1A => Utf8String,
    ServerReference = 0x1C => Utf8String,
    ReasonString = 0x1F => Utf8String,
    ReceiveMaximum = 0x21 => TwoByteInteger,
    TopicAliasMaximum = 0x22 => TwoByteInteger,
    TopicAlias = 0x23 => TwoByteInteger,
    MaximumQoS = 0x24 => Byte,
    RetainAvailable = 0x25 => Byte,
    UserProperty = 0x26 => Utf8StringPair,
    MaximumPacketSize = 0x27 => FourByteInteger,
    WildcardSubscriptionAvailable = 0x28 => Byte,
    SubscriptionIdentifierAvailable = 0x29 => Byte,
    SharedSubscriptionAvailable = 0x2A => Byte,
}

impl PropertyId {
    #[must_use]
    pub fn allows_multiple(&self) -> bool {
        matches!(self, Self::UserProperty | Self::SubscriptionIdentifier)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyValueType {
    Byte,
    TwoByteInteger,
    FourByteInteger,
    VariableByteInteger,
    BinaryData,
    Utf8String,
    Utf8StringPair,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    Byte(u8),
    TwoByteInteger(u16),
    FourByteInteger(u32),
    VariableByteInteger(u32),
    BinaryData(Bytes),
    Utf8String(String),
    Utf8StringPair(String, String),
}

impl PropertyValue {
    #[must_use]
    pub fn value_type(&self) -> PropertyValueType {
        match self {
            Self::Byte(_) => PropertyValueType::Byte,
            Self::TwoByteInteger(_) => PropertyValueType::TwoByteInteger,
            Self::FourByteInteger(_) => PropertyValueType::FourByteInteger,
            Self::VariableByteInteger(_) => PropertyValueType::VariableByteInteger,
            Self::BinaryData(_) => PropertyValueType::BinaryData,
            Self::Utf8String(_) => PropertyValueType::Utf8String,
            Self::Utf8StringPair(_, _) => PropertyValueType::Utf8StringPair,
        }
    }
}

/// Property list of a packet, kept in insertion order so encoding is stable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    entries: Vec<(PropertyId, PropertyValue)>,
}

impl Properties {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a property, rejecting a mismatched value type or a second
    /// occurrence of a single-valued property.
    pub fn add(&mut self, id: PropertyId, value: PropertyValue) -> Result<()> {
        if value.value_type() != id.value_type() {
            return Err(MqttError::ProtocolError(format!(
                "Property {id:?} expects {:?}, got {:?}",
                id.value_type(),
                value.value_type()
            )));
        }
        if !id.allows_multiple() && self.contains(id) {
            return Err(MqttError::DuplicatePropertyId(id as u8));
        }
        self.entries.push((id, value));
        Ok(())
    }

    /// Replaces every value of `id` with `value`.
    pub(crate) fn set(&mut self, id: PropertyId, value: PropertyValue) {
        debug_assert_eq!(value.value_type(), id.value_type());
        self.remove(id);
        self.entries.push((id, value));
    }

    pub fn remove(&mut self, id: PropertyId) {
        self.entries.retain(|(existing, _)| *existing != id);
    }

    #[must_use]
    pub fn get(&self, id: PropertyId) -> Option<&PropertyValue> {
        self.entries
            .iter()
            .find(|(existing, _)| *existing == id)
            .map(|(_, value)| value)
    }

    pub fn get_all(&self, id: PropertyId) -> impl Iterator<Item = &PropertyValue> + '_ {
        self.entries
            .iter()
            .filter(move |(existing, _)| *existing == id)
            .map(|(_, value)| value)
    }

    #[must_use]
    pub fn contains(&self, id: PropertyId) -> bool {
        self.entries.iter().any(|(existing, _)| *existing == id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (PropertyId, &PropertyValue)> + '_ {
        self.entries.iter().map(|(id, value)| (*id, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_id_lookup() {
        assert_eq!(
            PropertyId::from_u8(0x21),
            Some(PropertyId::ReceiveMaximum)
        );
        assert_eq!(
            PropertyId::from_u8(0x2A),
            Some(PropertyId::SharedSubscriptionAvailable)
        );
        assert_eq!(PropertyId::from_u8(0x00), None);
        assert_eq!(PropertyId::from_u8(0x04), None);
        assert_eq!(
            PropertyId::SubscriptionIdentifier.value_type(),
            PropertyValueType::VariableByteInteger
        );
        assert_eq!(
            PropertyId::UserProperty.value_type(),
            PropertyValueType::Utf8StringPair
        );
    }

    #[test]
    fn test_add_rejects_type_mismatch() {
        let mut props = Properties::new();
        let result = props.add(
            PropertyId::SessionExpiryInterval,
            PropertyValue::TwoByteInteger(10),
        );
        assert!(matches!(result, Err(MqttError::ProtocolError(_))));
        assert!(props.is_empty());
    }

    #[test]
    fn test_add_rejects_duplicate_single_value() {
        let mut props = Properties::new();
        props
            .add(PropertyId::TopicAlias, PropertyValue::TwoByteInteger(1))
            .unwrap();
        assert!(matches!(
            props.add(PropertyId::TopicAlias, PropertyValue::TwoByteInteger(2)),
            Err(MqttError::DuplicatePropertyId(0x23))
        ));
    }

    #[test]
    fn test_multi_valued_properties_keep_order() {
        let mut props = Properties::new();
        for (k, v) in [("region", "eu"), ("rack", "7"), ("region", "us")] {
            props
                .add(
                    PropertyId::UserProperty,
                    PropertyValue::Utf8StringPair(k.into(), v.into()),
                )
                .unwrap();
        }
        let pairs: Vec<_> = props
            .get_all(PropertyId::UserProperty)
            .map(|v| match v {
                PropertyValue::Utf8StringPair(k, v) => format!("{k}={v}"),
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(pairs, vec!["region=eu", "rack=7", "region=us"]);
    }

    #[test]
    fn test_set_replaces_existing() {
        let mut props = Properties::new();
        props.set(PropertyId::ReceiveMaximum, PropertyValue::TwoByteInteger(10));
        props.set(PropertyId::ReceiveMaximum, PropertyValue::TwoByteInteger(20));
        assert_eq!(props.len(), 1);
        assert_eq!(
            props.get(PropertyId::ReceiveMaximum),
            Some(&PropertyValue::TwoByteInteger(20))
        );
        props.remove(PropertyId::ReceiveMaximum);
        assert!(!props.contains(PropertyId::ReceiveMaximum));
    }
}
