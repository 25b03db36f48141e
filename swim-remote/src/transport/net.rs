use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::codec::{Packet, PacketCodec};
use crate::transport::{
    incoming_channels, InboundPacket, Incoming, StreamRequest, Transport, TransportError,
    MAX_PACKET_SIZE,
};

/// UDP for packets and TCP for stream exchanges, both bound to the same port.
#[derive(Debug)]
pub struct NetTransport {
    local_addr: SocketAddr,
    udp: Arc<UdpSocket>,
    incoming: Mutex<Option<Incoming>>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl NetTransport {
    pub async fn bind(addr: SocketAddr, stream_timeout: Duration) -> Result<Self, TransportError> {
        info!("start bind tcp and udp addr {}", addr);
        let tcp_listener = TcpListener::bind(addr).await?;
        let local_addr = tcp_listener.local_addr()?;
        let udp = Arc::new(UdpSocket::bind(local_addr).await?);
        let (senders, incoming) = incoming_channels();
        let cancel = CancellationToken::new();
        let udp_listener = tokio::spawn(Self::udp_listener(
            udp.clone(),
            senders.packets,
            cancel.clone(),
        ));
        let tcp_listener = tokio::spawn(Self::tcp_listener(
            tcp_listener,
            senders.streams,
            stream_timeout,
            cancel.clone(),
        ));
        let transport = Self {
            local_addr,
            udp,
            incoming: Mutex::new(Some(incoming)),
            cancel,
            tasks: Mutex::new(vec![udp_listener, tcp_listener]),
        };
        Ok(transport)
    }

    async fn udp_listener(
        udp: Arc<UdpSocket>,
        packets: mpsc::Sender<InboundPacket>,
        cancel: CancellationToken,
    ) {
        let mut buf = vec![0u8; MAX_PACKET_SIZE];
        loop {
            let received = tokio::select! {
                _ = cancel.cancelled() => break,
                received = udp.recv_from(&mut buf) => received,
            };
            match received {
                Ok((len, from)) => {
                    trace!("recv {} bytes packet from {}", len, from);
                    let packet = InboundPacket {
                        from,
                        payload: Bytes::copy_from_slice(&buf[..len]),
                    };
                    if packets.send(packet).await.is_err() {
                        debug!("packet receiver closed, stop udp listener");
                        break;
                    }
                }
                Err(error) => {
                    warn!("udp recv error {:?}", error);
                }
            }
        }
    }

    async fn tcp_listener(
        listener: TcpListener,
        streams: mpsc::Sender<StreamRequest>,
        stream_timeout: Duration,
        cancel: CancellationToken,
    ) {
        loop {
            let accepted = tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = listener.accept() => accepted,
            };
            match accepted {
                Ok((stream, peer_addr)) => {
                    let streams = streams.clone();
                    let cancel = cancel.clone();
                    tokio::spawn(async move {
                        let exchange = Self::accept_inbound_stream(stream, peer_addr, streams);
                        tokio::select! {
                            _ = cancel.cancelled() => {}
                            result = tokio::time::timeout(stream_timeout, exchange) => {
                                if result.is_err() {
                                    warn!("{} inbound stream timed out", peer_addr);
                                }
                            }
                        }
                    });
                }
                Err(error) => {
                    warn!("accept connection error {:?}", error);
                }
            }
        }
    }

    async fn accept_inbound_stream(
        stream: TcpStream,
        addr: SocketAddr,
        streams: mpsc::Sender<StreamRequest>,
    ) {
        let mut framed = Framed::new(stream, PacketCodec::default());
        let packet = match framed.next().await {
            Some(Ok(packet)) => packet,
            Some(Err(error)) => {
                warn!("{} codec error {:?}", addr, error);
                return;
            }
            None => return,
        };
        let (request, reply) = StreamRequest::new(addr, packet.body);
        if streams.send(request).await.is_err() {
            debug!("stream receiver closed, drop inbound stream from {}", addr);
            return;
        }
        match reply.await {
            Ok(payload) => {
                if let Err(error) = framed.send(Packet::new(payload)).await {
                    warn!("{} reply error {:?}", addr, error);
                }
            }
            Err(_) => {
                trace!("no reply for inbound stream from {}", addr);
            }
        }
    }

    async fn exchange(to: SocketAddr, payload: Bytes) -> Result<Bytes, TransportError> {
        let stream = TcpStream::connect(to).await?;
        stream.set_nodelay(true)?;
        let mut framed = Framed::new(stream, PacketCodec::default());
        framed.send(Packet::new(payload)).await?;
        match framed.next().await {
            Some(Ok(packet)) => Ok(packet.body),
            Some(Err(error)) => Err(error.into()),
            None => Err(TransportError::NoReply(to)),
        }
    }
}

#[async_trait]
impl Transport for NetTransport {
    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn incoming(&self) -> Option<Incoming> {
        self.incoming.lock().take()
    }

    async fn send_packet(&self, to: SocketAddr, payload: Bytes) -> Result<(), TransportError> {
        if self.cancel.is_cancelled() {
            return Err(TransportError::Shutdown);
        }
        if payload.len() > MAX_PACKET_SIZE {
            return Err(TransportError::PacketTooLarge(payload.len()));
        }
        self.udp.send_to(&payload, to).await?;
        Ok(())
    }

    async fn send_stream(
        &self,
        to: SocketAddr,
        payload: Bytes,
        timeout: Duration,
    ) -> Result<Bytes, TransportError> {
        if self.cancel.is_cancelled() {
            return Err(TransportError::Shutdown);
        }
        tokio::time::timeout(timeout, Self::exchange(to, payload))
            .await
            .map_err(|_| TransportError::Timeout(to))?
    }

    async fn shutdown(&self) {
        self.cancel.cancel();
        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(error) = task.await {
                debug!("transport task ended with {:?}", error);
            }
        }
        info!("transport {} shut down", self.local_addr);
    }
}
