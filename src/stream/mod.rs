//! Frame transport
//!
//! # Components
//!
//! - `codec` - Role token and length-prefixed framing
//! - `StreamingClient` - Reconnecting sender used by the pipeline
//! - `FrameReceiver` - Listening end, used by `camlink receive`

pub mod client;
pub mod codec;
pub mod receiver;

#[cfg(test)]
pub(crate) mod mock;

pub use client::{
    ClientStats, ConnectionState, Connector, DropReason, SendOutcome, StreamingClient,
    TcpConnector,
};
pub use receiver::{FrameReceiver, ReceivedFrame, ReceiverStats};
