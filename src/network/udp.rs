use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use bytes::{BufMut, Bytes, BytesMut};
use futures::StreamExt;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{Decoder, Encoder};
use tokio_util::udp::UdpFramed;
use tracing::{debug, warn};

use crate::core::{Error, MacAddress, Result, TransportError};
use super::{SendStatus, Transport, TransportCallbacks, TransportEvent};

const ADDRESS_LEN: usize = 6;

/// Socket settings for the UDP radio emulation
#[derive(Debug, Clone, Copy)]
pub struct UdpConfig {
    /// Local socket address
    pub bind_addr: SocketAddr,
    /// Where broadcast frames are sent, usually the subnet broadcast address
    pub broadcast_addr: SocketAddr,
}

/// Datagram framing: the sender's hardware address followed by the frame
#[derive(Clone, Copy, Debug, Default)]
pub struct DatagramCodec;

impl Decoder for DatagramCodec {
    type Item = (MacAddress, Bytes);
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> std::result::Result<Option<Self::Item>, Self::Error> {
        if src.len() < ADDRESS_LEN {
            return Ok(None);
        }
        let mut address = [0u8; ADDRESS_LEN];
        address.copy_from_slice(&src[..ADDRESS_LEN]);
        let datagram = src.split();
        Ok(Some((MacAddress(address), datagram.freeze().slice(ADDRESS_LEN..))))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> std::result::Result<Option<Self::Item>, Self::Error> {
        let item = self.decode(src)?;
        // A datagram too short to carry an address is dropped whole
        src.clear();
        Ok(item)
    }
}

impl Encoder<(MacAddress, Bytes)> for DatagramCodec {
    type Error = Error;

    fn encode(&mut self, item: (MacAddress, Bytes), dst: &mut BytesMut) -> std::result::Result<(), Self::Error> {
        let (source, frame) = item;
        dst.reserve(ADDRESS_LEN + frame.len());
        dst.put_slice(&source.octets());
        dst.put_slice(&frame);
        Ok(())
    }
}

/// Radio emulation over UDP
///
/// Each datagram carries the sender's hardware address, so directed sends can
/// reuse the socket address a peer was last heard from.
pub struct UdpTransport {
    address: MacAddress,
    socket: Arc<UdpSocket>,
    broadcast_addr: SocketAddr,
    routes: Arc<Mutex<HashMap<MacAddress, SocketAddr>>>,
    outbound: mpsc::Sender<Outbound>,
    receiver: JoinHandle<()>,
    sender: JoinHandle<()>,
}

/// A datagram waiting for the send task
struct Outbound {
    destination: MacAddress,
    target: SocketAddr,
    datagram: Bytes,
}

impl UdpTransport {
    /// Binds the socket and starts the receive and send tasks
    ///
    /// `queue` bounds both the event queue and the outbound queue.
    pub async fn bind(
        address: MacAddress,
        config: UdpConfig,
        queue: usize,
    ) -> Result<(Self, mpsc::Receiver<TransportEvent>)> {
        let socket = Socket::new(
            Domain::for_address(config.bind_addr),
            Type::DGRAM,
            Some(Protocol::UDP),
        )?;
        socket.set_reuse_address(true)?;
        socket.set_broadcast(true)?;
        socket.set_nonblocking(true)?;
        socket.bind(&config.bind_addr.into())?;
        let socket = Arc::new(UdpSocket::from_std(socket.into())?);

        let (callbacks, events) = TransportCallbacks::channel(queue);
        let routes = Arc::new(Mutex::new(HashMap::new()));

        let (outbound, outbound_rx) = mpsc::channel(queue.max(1));

        let receiver = tokio::spawn(receive_loop(
            address,
            Arc::clone(&socket),
            Arc::clone(&routes),
            callbacks.clone(),
        ));
        let sender = tokio::spawn(send_loop(Arc::clone(&socket), outbound_rx, callbacks));

        let transport = UdpTransport {
            address,
            socket,
            broadcast_addr: config.broadcast_addr,
            routes,
            outbound,
            receiver,
            sender,
        };
        Ok((transport, events))
    }

    /// Records where frames for `address` should go
    pub fn add_route(&self, address: MacAddress, socket_addr: SocketAddr) {
        lock(&self.routes).insert(address, socket_addr);
    }

    /// Socket address the hardware address was last heard from
    pub fn route(&self, address: &MacAddress) -> Option<SocketAddr> {
        lock(&self.routes).get(address).copied()
    }

    /// Returns the local socket address
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}

impl Transport for UdpTransport {
    fn local_address(&self) -> MacAddress {
        self.address
    }

    fn send(&self, destination: &MacAddress, frame: Bytes) -> std::result::Result<(), TransportError> {
        let target = if destination.is_broadcast() {
            self.broadcast_addr
        } else {
            self.route(destination)
                .ok_or(TransportError::Unreachable(*destination))?
        };

        let mut datagram = BytesMut::new();
        DatagramCodec
            .encode((self.address, frame), &mut datagram)
            .map_err(|e| TransportError::send_failed(*destination, e.to_string()))?;

        let outbound = Outbound {
            destination: *destination,
            target,
            datagram: datagram.freeze(),
        };
        match self.outbound.try_send(outbound) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                Err(TransportError::send_failed(*destination, "send queue full"))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(TransportError::Closed),
        }
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        self.receiver.abort();
        self.sender.abort();
    }
}

async fn send_loop(
    socket: Arc<UdpSocket>,
    mut outbound: mpsc::Receiver<Outbound>,
    callbacks: TransportCallbacks,
) {
    while let Some(item) = outbound.recv().await {
        let status = match socket.send_to(&item.datagram, item.target).await {
            Ok(_) => SendStatus::Success,
            Err(e) => {
                warn!(destination = %item.destination, target = %item.target, error = %e, "udp send failed");
                SendStatus::Failure
            }
        };
        callbacks.on_send_complete(Some(item.destination), status);
    }
}

async fn receive_loop(
    local: MacAddress,
    socket: Arc<UdpSocket>,
    routes: Arc<Mutex<HashMap<MacAddress, SocketAddr>>>,
    callbacks: TransportCallbacks,
) {
    let mut framed = UdpFramed::new(socket, DatagramCodec);

    while let Some(item) = framed.next().await {
        match item {
            Ok(((source, frame), peer_addr)) => {
                // Our own broadcasts come back on the shared port
                if source == local {
                    continue;
                }
                lock(&routes).insert(source, peer_addr);
                let len = i32::try_from(frame.len()).unwrap_or(i32::MAX);
                callbacks.on_receive(Some(source), &frame, len);
            }
            Err(e) => {
                warn!(error = %e, "udp receive failed");
            }
        }
    }
    debug!(%local, "udp receive loop finished");
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    const A: MacAddress = MacAddress::new([0x02, 0, 0, 0, 0, 0x0A]);
    const B: MacAddress = MacAddress::new([0x02, 0, 0, 0, 0, 0x0B]);

    fn loopback() -> UdpConfig {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        UdpConfig {
            bind_addr: addr,
            broadcast_addr: addr,
        }
    }

    #[test]
    fn test_datagram_codec() {
        let mut codec = DatagramCodec;
        let mut buf = BytesMut::new();
        codec.encode((A, Bytes::from_static(b"frame")), &mut buf).unwrap();
        assert_eq!(buf.len(), ADDRESS_LEN + 5);

        let (source, frame) = codec.decode_eof(&mut buf).unwrap().unwrap();
        assert_eq!(source, A);
        assert_eq!(&frame[..], b"frame");
        assert!(buf.is_empty());

        let mut runt = BytesMut::from(&b"abc"[..]);
        assert!(codec.decode_eof(&mut runt).unwrap().is_none());
        assert!(runt.is_empty());
    }

    #[tokio::test]
    async fn test_directed_exchange() {
        let (a, mut a_rx) = UdpTransport::bind(A, loopback(), 8).await.unwrap();
        let (b, mut b_rx) = UdpTransport::bind(B, loopback(), 8).await.unwrap();

        // First send right after bind, before the socket has seen write readiness
        a.add_route(B, b.local_addr().unwrap());
        a.send(&B, Bytes::from_static(b"command")).unwrap();

        let completion = timeout(Duration::from_secs(2), a_rx.recv()).await.unwrap();
        assert_eq!(
            completion,
            Some(TransportEvent::SendComplete {
                destination: Some(B),
                status: SendStatus::Success,
            })
        );

        let event = timeout(Duration::from_secs(2), b_rx.recv()).await.unwrap();
        assert_eq!(
            event,
            Some(TransportEvent::Received {
                source: Some(A),
                data: Bytes::from_static(b"command"),
            })
        );

        // B learned where A lives and can answer
        assert_eq!(b.route(&A), Some(a.local_addr().unwrap()));
        b.send(&A, Bytes::from_static(b"reply")).unwrap();
        let event = timeout(Duration::from_secs(2), a_rx.recv()).await.unwrap();
        assert!(matches!(
            event,
            Some(TransportEvent::Received { source: Some(B), .. })
        ));
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let (a, _a_rx) = UdpTransport::bind(A, loopback(), 8).await.unwrap();
        assert_eq!(
            a.send(&B, Bytes::from_static(b"x")),
            Err(TransportError::Unreachable(B))
        );
    }

    #[tokio::test]
    async fn test_broadcast_target() {
        let (b, mut b_rx) = UdpTransport::bind(B, loopback(), 8).await.unwrap();
        let config = UdpConfig {
            broadcast_addr: b.local_addr().unwrap(),
            ..loopback()
        };
        let (a, mut a_rx) = UdpTransport::bind(A, config, 8).await.unwrap();

        a.send(&MacAddress::BROADCAST, Bytes::from_static(b"all")).unwrap();
        let event = timeout(Duration::from_secs(2), b_rx.recv()).await.unwrap();
        assert!(matches!(
            event,
            Some(TransportEvent::Received { source: Some(A), .. })
        ));

        let completion = timeout(Duration::from_secs(2), a_rx.recv()).await.unwrap();
        assert_eq!(
            completion,
            Some(TransportEvent::SendComplete {
                destination: Some(MacAddress::BROADCAST),
                status: SendStatus::Success,
            })
        );
    }

    #[tokio::test]
    async fn test_burst_of_sends_all_complete() {
        let (b, mut b_rx) = UdpTransport::bind(B, loopback(), 16).await.unwrap();
        let (a, mut a_rx) = UdpTransport::bind(A, loopback(), 16).await.unwrap();
        a.add_route(B, b.local_addr().unwrap());

        for _ in 0..4 {
            a.send(&B, Bytes::from_static(b"frame")).unwrap();
        }
        for _ in 0..4 {
            let completion = timeout(Duration::from_secs(2), a_rx.recv()).await.unwrap();
            assert!(matches!(
                completion,
                Some(TransportEvent::SendComplete { status: SendStatus::Success, .. })
            ));
            let event = timeout(Duration::from_secs(2), b_rx.recv()).await.unwrap();
            assert!(matches!(event, Some(TransportEvent::Received { source: Some(A), .. })));
        }
    }
}
