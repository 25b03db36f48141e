use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use ahash::{HashMap, HashSet};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tracing::trace;

use crate::transport::{
    incoming_channels, InboundPacket, Incoming, IncomingSenders, StreamRequest, Transport,
    TransportError, MAX_PACKET_SIZE,
};

/// An in-process network for simulation. Every bound [`MemoryTransport`] is
/// reachable by address until it is isolated or shut down; packets to an
/// unreachable address vanish the way UDP datagrams do.
#[derive(Debug, Clone, Default)]
pub struct MemoryNetwork {
    state: Arc<Mutex<NetworkState>>,
}

#[derive(Debug, Default)]
struct NetworkState {
    endpoints: HashMap<SocketAddr, Arc<IncomingSenders>>,
    isolated: HashSet<SocketAddr>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&self, addr: SocketAddr) -> Result<MemoryTransport, TransportError> {
        let mut state = self.state.lock();
        if state.endpoints.contains_key(&addr) {
            return Err(TransportError::AddrInUse(addr));
        }
        let (senders, incoming) = incoming_channels();
        state.endpoints.insert(addr, Arc::new(senders));
        let transport = MemoryTransport {
            addr,
            network: self.clone(),
            incoming: Mutex::new(Some(incoming)),
        };
        Ok(transport)
    }

    /// Cuts every link to and from `addr` while keeping the endpoint bound.
    pub fn isolate(&self, addr: SocketAddr) {
        self.state.lock().isolated.insert(addr);
    }

    pub fn heal(&self, addr: SocketAddr) {
        self.state.lock().isolated.remove(&addr);
    }

    fn route(&self, from: SocketAddr, to: SocketAddr) -> Option<Arc<IncomingSenders>> {
        let state = self.state.lock();
        if state.isolated.contains(&from) || state.isolated.contains(&to) {
            None
        } else {
            state.endpoints.get(&to).cloned()
        }
    }

    fn unbind(&self, addr: &SocketAddr) {
        self.state.lock().endpoints.remove(addr);
    }
}

#[derive(Debug)]
pub struct MemoryTransport {
    addr: SocketAddr,
    network: MemoryNetwork,
    incoming: Mutex<Option<Incoming>>,
}

#[async_trait]
impl Transport for MemoryTransport {
    fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    fn incoming(&self) -> Option<Incoming> {
        self.incoming.lock().take()
    }

    async fn send_packet(&self, to: SocketAddr, payload: Bytes) -> Result<(), TransportError> {
        if payload.len() > MAX_PACKET_SIZE {
            return Err(TransportError::PacketTooLarge(payload.len()));
        }
        match self.network.route(self.addr, to) {
            Some(endpoint) => {
                let packet = InboundPacket {
                    from: self.addr,
                    payload,
                };
                if endpoint.packets.try_send(packet).is_err() {
                    trace!("{} inbound queue full or closed, drop packet from {}", to, self.addr);
                }
            }
            None => {
                trace!("{} unreachable from {}, drop packet", to, self.addr);
            }
        }
        Ok(())
    }

    async fn send_stream(
        &self,
        to: SocketAddr,
        payload: Bytes,
        timeout: Duration,
    ) -> Result<Bytes, TransportError> {
        let endpoint = self
            .network
            .route(self.addr, to)
            .ok_or(TransportError::Unreachable(to))?;
        let (request, reply) = StreamRequest::new(self.addr, payload);
        let exchange = async move {
            endpoint
                .streams
                .send(request)
                .await
                .map_err(|_| TransportError::Unreachable(to))?;
            reply.await.map_err(|_| TransportError::NoReply(to))
        };
        tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| TransportError::Timeout(to))?
    }

    async fn shutdown(&self) {
        self.network.unbind(&self.addr);
    }
}
