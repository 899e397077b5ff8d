use crate::token::Token;
use crate::types::ConnectOptions;
use relaymq_protocol::packet::{AuthPacket, PublishPacket, SubscribePacket, UnsubscribePacket};
use relaymq_protocol::{Properties, ReasonCode};
use std::time::Duration;

/// Requests from client handles to the engine task.
#[derive(Debug)]
pub(crate) enum Command {
    Connect {
        options: Box<ConnectOptions>,
        token: Token,
    },
    Disconnect {
        quiesce: Duration,
        reason: ReasonCode,
        properties: Properties,
        token: Token,
    },
    /// QoS 1 and 2 packets already carry their identifier.
    Publish {
        packet: PublishPacket,
        token: Token,
    },
    Subscribe {
        packet: SubscribePacket,
        token: Token,
    },
    Unsubscribe {
        packet: UnsubscribePacket,
        token: Token,
    },
    Authenticate {
        packet: AuthPacket,
        token: Token,
    },
    Reconnect,
    Close {
        token: Token,
    },
}
