//! UDP transport with a static route table.
//!
//! Each datagram carries one [`codec`](super::codec) frame. Outbound messages
//! fan out to every endpoint of the matching routes; inbound datagrams are
//! drained without blocking, up to a batch limit per call.

use super::codec::{self, Frame};
use super::transport::{InboundMessage, OutboundMessage, ReplyHandle, Transport, TransportError};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::io;
use std::net::{SocketAddr, UdpSocket};

/// Largest datagram accepted.
const MAX_DATAGRAM: usize = 65_535;

/// Routing key used on replies, which are addressed by source endpoint.
const REPLY_ROUTING_KEY: i64 = -1;

/// One route: a message type, an optional routing key, and its endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub message_type: i32,
    /// Exact routing key; `None` matches any key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing_key: Option<i64>,
    pub endpoints: Vec<SocketAddr>,
}

/// Static route table.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn new(routes: Vec<Route>) -> Self {
        Self { routes }
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Endpoints for a message. Exact routing-key routes win over wildcards.
    pub fn resolve(&self, message_type: i32, routing_key: i64) -> Vec<SocketAddr> {
        let for_type = || self.routes.iter().filter(move |r| r.message_type == message_type);

        let exact: Vec<SocketAddr> = for_type()
            .filter(|r| r.routing_key == Some(routing_key))
            .flat_map(|r| r.endpoints.iter().copied())
            .collect();
        if !exact.is_empty() {
            return exact;
        }
        for_type()
            .filter(|r| r.routing_key.is_none())
            .flat_map(|r| r.endpoints.iter().copied())
            .collect()
    }
}

/// Datagram transport.
pub struct UdpTransport {
    socket: UdpSocket,
    routes: RouteTable,
    max_receive_batch: usize,
}

impl UdpTransport {
    /// Bind a non-blocking socket.
    pub fn bind(addr: SocketAddr, routes: RouteTable, max_receive_batch: usize) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_nonblocking(true)?;
        tracing::info!(
            addr = %socket.local_addr()?,
            routes = routes.len(),
            "udp transport bound"
        );
        Ok(Self {
            socket,
            routes,
            max_receive_batch: max_receive_batch.max(1),
        })
    }

    /// Address the socket is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    fn send_frame(&self, frame: &Frame, target: SocketAddr) -> Result<(), TransportError> {
        let datagram = codec::encode(frame);
        self.socket
            .send_to(&datagram, target)
            .map(|_| ())
            .map_err(|e| TransportError::SendFailed(format!("{target}: {e}")))
    }
}

impl Transport for UdpTransport {
    fn send(&self, message: &OutboundMessage) -> Result<(), TransportError> {
        let endpoints = self.routes.resolve(message.message_type, message.routing_key);
        if endpoints.is_empty() {
            return Err(TransportError::NoRoute {
                message_type: message.message_type,
                routing_key: message.routing_key,
            });
        }

        let frame = Frame {
            message_type: message.message_type,
            routing_key: message.routing_key,
            payload: message.payload.clone(),
        };
        let failures: Vec<String> = endpoints
            .into_iter()
            .filter_map(|ep| self.send_frame(&frame, ep).err())
            .map(|e| e.to_string())
            .collect();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(TransportError::SendFailed(failures.join("; ")))
        }
    }

    fn receive_all(&self) -> Vec<InboundMessage> {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        let mut received = Vec::new();

        while received.len() < self.max_receive_batch {
            match self.socket.recv_from(&mut buf) {
                Ok((len, source)) => match codec::decode(&buf[..len]) {
                    Ok(frame) => received.push(InboundMessage {
                        message_type: frame.message_type,
                        payload: frame.payload,
                        reply: ReplyHandle::new(source.to_string()),
                    }),
                    Err(e) => {
                        tracing::warn!(source = %source, error = %e, "dropping undecodable datagram");
                    }
                },
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::warn!(error = %e, "udp receive failed");
                    break;
                }
            }
        }
        received
    }

    fn reply(
        &self,
        handle: &ReplyHandle,
        message_type: i32,
        payload: Bytes,
    ) -> Result<(), TransportError> {
        let target: SocketAddr = handle
            .endpoint()
            .parse()
            .map_err(|_| TransportError::InvalidReplyHandle(handle.to_string()))?;
        let frame = Frame {
            message_type,
            routing_key: REPLY_ROUTING_KEY,
            payload,
        };
        self.send_frame(&frame, target)
    }

    fn name(&self) -> &'static str {
        "udp"
    }
}
