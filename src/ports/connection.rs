//! Connection port - a ready, message-oriented duplex channel.
//!
//! The upgrade step (an HTTP WebSocket upgrade in production, an in-memory
//! pair in tests) produces something that is both a [`Stream`] of inbound
//! [`Frame`]s and a [`Sink`] of outbound ones. The pump splits it so the
//! read half and the write half can be driven by independent tasks.
//!
//! Write sessions map onto the sink protocol: `feed` adds a frame to the
//! open session, `flush` closes the session and puts it on the wire.

use futures::{Sink, Stream};
use thiserror::Error;

/// One discrete unit of data on a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    /// Liveness probe; the relay always sends it empty.
    Ping(Vec<u8>),
    /// Liveness acknowledgement; the payload is opaque and ignored.
    Pong(Vec<u8>),
    Close,
}

impl Frame {
    /// Application payload, if this is a data frame.
    pub fn data(&self) -> Option<&[u8]> {
        match self {
            Frame::Text(text) => Some(text.as_bytes()),
            Frame::Binary(data) => Some(data),
            _ => None,
        }
    }
}

/// Transport-level failures. Every variant is fatal for the loop that sees it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    #[error("read deadline elapsed")]
    ReadTimeout,

    #[error("write deadline elapsed")]
    WriteTimeout,

    #[error("frame of {size} bytes exceeds read limit of {limit} bytes")]
    FrameTooLarge { size: usize, limit: usize },

    #[error("connection closed")]
    Closed,

    #[error("transport error: {0}")]
    Transport(String),
}

/// A duplex frame channel the pump can own.
///
/// A stream that ends (`None`) means the peer went away.
pub trait Connection:
    Stream<Item = Result<Frame, ConnectionError>>
    + Sink<Frame, Error = ConnectionError>
    + Send
    + Unpin
    + 'static
{
}

impl<T> Connection for T where
    T: Stream<Item = Result<Frame, ConnectionError>>
        + Sink<Frame, Error = ConnectionError>
        + Send
        + Unpin
        + 'static
{
}
