use std::net::SocketAddr;

use bincode::{Decode, Encode};
use bytes::Bytes;

use swim_core::ext::{decode_bytes, encode_bytes};

use crate::member::MemberDelta;

/// Datagram messages, every one of them can carry gossip.
#[derive(Debug, Clone, Eq, PartialEq, Encode, Decode)]
pub(crate) enum Message {
    Ping {
        seq: u32,
        from: String,
        target: String,
        gossip: Vec<MemberDelta>,
    },
    /// Asks the receiver to probe `target` and relay the ack back under `seq`.
    IndirectPing {
        seq: u32,
        from: String,
        target: String,
        target_addr: SocketAddr,
        gossip: Vec<MemberDelta>,
    },
    Ack {
        seq: u32,
        from: String,
        incarnation: u64,
        gossip: Vec<MemberDelta>,
    },
    Gossip {
        from: String,
        gossip: Vec<MemberDelta>,
    },
}

impl Message {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Message::Ping { .. } => "ping",
            Message::IndirectPing { .. } => "indirect-ping",
            Message::Ack { .. } => "ack",
            Message::Gossip { .. } => "gossip",
        }
    }

    pub(crate) fn encode(&self) -> anyhow::Result<Bytes> {
        encode_bytes(self).map(Bytes::from)
    }

    pub(crate) fn decode(bytes: &[u8]) -> anyhow::Result<Self> {
        decode_bytes(bytes)
    }
}

/// Request and reply bodies of the stream channel.
#[derive(Debug, Clone, Eq, PartialEq, Encode, Decode)]
pub(crate) enum StreamMessage {
    PushPull {
        from: String,
        join: bool,
        states: Vec<MemberDelta>,
    },
    PushPullReply {
        states: Vec<MemberDelta>,
        /// Set when the sender's name is covered by a tombstone at this
        /// incarnation, the sender has to come back above it.
        rejoin_above: Option<u64>,
    },
    JoinRejected {
        reason: String,
    },
}

impl StreamMessage {
    pub(crate) fn encode(&self) -> anyhow::Result<Bytes> {
        encode_bytes(self).map(Bytes::from)
    }

    pub(crate) fn decode(bytes: &[u8]) -> anyhow::Result<Self> {
        decode_bytes(bytes)
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use crate::member::{MemberDelta, MemberStatus};
    use crate::message::{Message, StreamMessage};

    #[test]
    fn ack_survives_the_wire() -> anyhow::Result<()> {
        let ack = Message::Ack {
            seq: 42,
            from: "b".to_string(),
            incarnation: 7,
            gossip: vec![MemberDelta::new(
                "c",
                SocketAddr::from(([10, 0, 0, 3], 7946)),
                MemberStatus::Suspect,
                2,
                "b",
            )],
        };
        let bytes = ack.encode()?;
        assert_eq!(Message::decode(&bytes)?, ack);
        Ok(())
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(Message::decode(&[0xff, 0x01, 0x02]).is_err());
        assert!(StreamMessage::decode(&[]).is_err());
    }

    #[test]
    fn truncated_stream_message_is_rejected() -> anyhow::Result<()> {
        let reply = StreamMessage::JoinRejected {
            reason: "name in use".to_string(),
        };
        let bytes = reply.encode()?;
        assert!(StreamMessage::decode(&bytes[..bytes.len() - 1]).is_err());
        Ok(())
    }
}
