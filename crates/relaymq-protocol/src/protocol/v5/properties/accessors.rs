use super::{Properties, PropertyId, PropertyValue};
use bytes::Bytes;

macro_rules! scalar_accessors {
    ($($set:ident / $get:ident: $id:ident, $variant:ident($ty:ty);)*) => {
        impl Properties {
            $(
                pub fn $set(&mut self, value: $ty) {
                    self.set(PropertyId::$id, PropertyValue::$variant(value));
                }

                #[must_use]
                pub fn $get(&self) -> Option<$ty> {
                    match self.get(PropertyId::$id) {
                        Some(PropertyValue::$variant(value)) => Some(*value),
                        _ => None,
                    }
                }
            )*
        }
    };
}

macro_rules! flag_accessors {
    ($($set:ident / $get:ident: $id:ident;)*) => {
        impl Properties {
            $(
                pub fn $set(&mut self, value: bool) {
                    self.set(PropertyId::$id, PropertyValue::Byte(u8::from(value)));
                }

                #[must_use]
                pub fn $get(&self) -> Option<bool> {
                    match self.get(PropertyId::$id) {
                        Some(PropertyValue::Byte(value)) => Some(*value != 0),
                        _ => None,
                    }
                }
            )*
        }
    };
}

macro_rules! string_accessors {
    ($($set:ident / $get:ident: $id:ident;)*) => {
        impl Properties {
            $(
                pub fn $set(&mut self, value: impl Into<String>) {
                    self.set(PropertyId::$id, PropertyValue::Utf8String(value.into()));
                }

                #[must_use]
                pub fn $get(&self) -> Option<&str> {
                    match self.get(PropertyId::$id) {
                        Some(PropertyValue::Utf8String(value)) => Some(value.as_str()),
                        _ => None,
                    }
                }
            )*
        }
    };
}

scalar_accessors! {
    set_message_expiry_interval / get_message_expiry_interval: MessageExpiryInterval, FourByteInteger(u32);
    set_session_expiry_interval / get_session_expiry_interval: SessionExpiryInterval, FourByteInteger(u32);
    set_will_delay_interval / get_will_delay_interval: WillDelayInterval, FourByteInteger(u32);
    set_maximum_packet_size / get_maximum_packet_size: MaximumPacketSize, FourByteInteger(u32);
    set_server_keep_alive / get_server_keep_alive: ServerKeepAlive, TwoByteInteger(u16);
    set_receive_maximum / get_receive_maximum: ReceiveMaximum, TwoByteInteger(u16);
    set_topic_alias_maximum / get_topic_alias_maximum: TopicAliasMaximum, TwoByteInteger(u16);
    set_topic_alias / get_topic_alias: TopicAlias, TwoByteInteger(u16);
    set_maximum_qos / get_maximum_qos: MaximumQoS, Byte(u8);
}

flag_accessors! {
    set_payload_format_indicator / get_payload_format_indicator: PayloadFormatIndicator;
    set_request_problem_information / get_request_problem_information: RequestProblemInformation;
    set_request_response_information / get_request_response_information: RequestResponseInformation;
    set_retain_available / get_retain_available: RetainAvailable;
    set_wildcard_subscription_available / get_wildcard_subscription_available: WildcardSubscriptionAvailable;
    set_subscription_identifier_available / get_subscription_identifier_available: SubscriptionIdentifierAvailable;
    set_shared_subscription_available / get_shared_subscription_available: SharedSubscriptionAvailable;
}

string_accessors! {
    set_content_type / get_content_type: ContentType;
    set_response_topic / get_response_topic: ResponseTopic;
    set_assigned_client_identifier / get_assigned_client_identifier: AssignedClientIdentifier;
    set_authentication_method / get_authentication_method: AuthenticationMethod;
    set_response_information / get_response_information: ResponseInformation;
    set_server_reference / get_server_reference: ServerReference;
    set_reason_string / get_reason_string: ReasonString;
}

impl Properties {
    pub fn set_correlation_data(&mut self, data: Bytes) {
        self.set(PropertyId::CorrelationData, PropertyValue::BinaryData(data));
    }

    #[must_use]
    pub fn get_correlation_data(&self) -> Option<&Bytes> {
        match self.get(PropertyId::CorrelationData) {
            Some(PropertyValue::BinaryData(data)) => Some(data),
            _ => None,
        }
    }

    pub fn set_authentication_data(&mut self, data: Bytes) {
        self.set(PropertyId::AuthenticationData, PropertyValue::BinaryData(data));
    }

    #[must_use]
    pub fn get_authentication_data(&self) -> Option<&Bytes> {
        match self.get(PropertyId::AuthenticationData) {
            Some(PropertyValue::BinaryData(data)) => Some(data),
            _ => None,
        }
    }

    pub fn add_subscription_identifier(&mut self, id: u32) {
        self.entries.push((
            PropertyId::SubscriptionIdentifier,
            PropertyValue::VariableByteInteger(id),
        ));
    }

    pub fn subscription_identifiers(&self) -> impl Iterator<Item = u32> + '_ {
        self.get_all(PropertyId::SubscriptionIdentifier)
            .filter_map(|value| match value {
                PropertyValue::VariableByteInteger(id) => Some(*id),
                _ => None,
            })
    }

    pub fn add_user_property(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.push((
            PropertyId::UserProperty,
            PropertyValue::Utf8StringPair(key.into(), value.into()),
        ));
    }

    pub fn user_properties(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.get_all(PropertyId::UserProperty)
            .filter_map(|value| match value {
                PropertyValue::Utf8StringPair(k, v) => Some((k.as_str(), v.as_str())),
                _ => None,
            })
    }
}
