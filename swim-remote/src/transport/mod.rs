use std::fmt::Debug;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::codec::PacketCodecError;

pub mod memory;
pub mod net;

/// Largest payload accepted by `send_packet`, the IPv4 UDP payload limit.
pub const MAX_PACKET_SIZE: usize = 65_507;

pub const INCOMING_BUFFER: usize = 1024;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport is shut down")]
    Shutdown,
    #[error("{0} is unreachable")]
    Unreachable(SocketAddr),
    #[error("stream to {0} timed out")]
    Timeout(SocketAddr),
    #[error("{0} closed the stream without a reply")]
    NoReply(SocketAddr),
    #[error("packet of {0} bytes exceeds the limit of {} bytes", MAX_PACKET_SIZE)]
    PacketTooLarge(usize),
    #[error("address {0} already in use")]
    AddrInUse(SocketAddr),
    #[error("codec error {0}")]
    Codec(#[from] PacketCodecError),
    #[error("io error {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct InboundPacket {
    pub from: SocketAddr,
    pub payload: Bytes,
}

/// A stream request waiting for exactly one reply. Dropping it without
/// calling [`StreamRequest::respond`] closes the stream on the remote side.
#[derive(Debug)]
pub struct StreamRequest {
    pub from: SocketAddr,
    pub payload: Bytes,
    reply: oneshot::Sender<Bytes>,
}

impl StreamRequest {
    pub fn new(from: SocketAddr, payload: Bytes) -> (Self, oneshot::Receiver<Bytes>) {
        let (reply, rx) = oneshot::channel();
        let request = Self {
            from,
            payload,
            reply,
        };
        (request, rx)
    }

    pub fn respond(self, payload: Bytes) -> bool {
        self.reply.send(payload).is_ok()
    }
}

/// Inbound channels of a transport, one receiver loop is expected per channel.
#[derive(Debug)]
pub struct Incoming {
    pub packets: mpsc::Receiver<InboundPacket>,
    pub streams: mpsc::Receiver<StreamRequest>,
}

#[derive(Debug)]
pub(crate) struct IncomingSenders {
    pub(crate) packets: mpsc::Sender<InboundPacket>,
    pub(crate) streams: mpsc::Sender<StreamRequest>,
}

pub(crate) fn incoming_channels() -> (IncomingSenders, Incoming) {
    let (packets_tx, packets_rx) = mpsc::channel(INCOMING_BUFFER);
    let (streams_tx, streams_rx) = mpsc::channel(INCOMING_BUFFER);
    let senders = IncomingSenders {
        packets: packets_tx,
        streams: streams_tx,
    };
    let incoming = Incoming {
        packets: packets_rx,
        streams: streams_rx,
    };
    (senders, incoming)
}

/// Best effort network primitives. Packets may be dropped, delayed or
/// duplicated; a stream call is a single request/reply exchange.
#[async_trait]
pub trait Transport: Debug + Send + Sync {
    fn local_addr(&self) -> SocketAddr;

    /// Hands out the inbound channels, only the first call returns them.
    fn incoming(&self) -> Option<Incoming>;

    async fn send_packet(&self, to: SocketAddr, payload: Bytes) -> Result<(), TransportError>;

    async fn send_stream(
        &self,
        to: SocketAddr,
        payload: Bytes,
        timeout: Duration,
    ) -> Result<Bytes, TransportError>;

    async fn shutdown(&self);
}
