//! Messaging with policy handlers.
//!
//! - [`message`] - Message type ids and JSON bodies
//! - [`transport`] - The [`Transport`] contract
//! - [`loopback`] - In-process transport
//! - [`udp`] - Datagram transport with a static route table
//! - [`codec`] - Datagram framing

pub mod codec;
pub mod loopback;
pub mod message;
pub mod transport;
pub mod udp;

pub use loopback::LoopbackTransport;
pub use message::{HandlerRequest, Operation, A1_POLICY_QUERY, A1_POLICY_REQUEST, A1_POLICY_RESPONSE};
pub use transport::{InboundMessage, OutboundMessage, ReplyHandle, Transport, TransportError};
pub use udp::{Route, RouteTable, UdpTransport};
