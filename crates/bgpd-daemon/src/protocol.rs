//! Protocol handler (spec section 4.4): owns the TCP stream for one peer connection, frames
//! raw bytes into/out of [`BgpMessage`]s, and bounds how much unsent traffic can pile up behind
//! a slow peer. Reads and writes are both non-blocking so a peer's turn in the reactor (spec
//! section 4.5) never stalls waiting on one connection's socket.

use crate::errors::ReactorError;
use bgpd_wire::context::Context;
use bgpd_wire::errors::Diagnostics;
use bgpd_wire::{
    BgpMessage,
    MessageHeader,
};
use std::collections::VecDeque;
use std::io;
use std::net::IpAddr;
use tokio::net::TcpStream;

/// Maximum number of encoded-but-unsent messages a handler will hold for one peer (spec
/// section 5 "Shared resources"). Exceeding it is treated the same as a dead connection: the
/// FSM tears the session down rather than growing memory unbounded for a peer that never
/// drains its TCP receive window.
pub const MAX_WRITE_BACKLOG: usize = 15_000;

pub struct ProtocolHandler {
    stream: TcpStream,
    peer: IpAddr,
    read_buffer: Vec<u8>,
    write_backlog: VecDeque<Vec<u8>>,
}

impl ProtocolHandler {
    pub fn new(stream: TcpStream, peer: IpAddr) -> Self {
        Self { stream, peer, read_buffer: Vec::new(), write_backlog: VecDeque::new() }
    }

    pub fn peer_addr(&self) -> IpAddr {
        self.peer
    }

    /// Drains whatever bytes the socket has ready without blocking the peer's turn (spec
    /// section 4.5 "I/O readiness"). Returns the number of bytes pulled into the read buffer;
    /// `Ok(0)` means nothing was ready this turn, not that the connection is idle.
    fn poll_fill_read_buffer(&mut self) -> Result<usize, ReactorError> {
        let mut chunk = [0u8; 4096];
        let mut total = 0;
        loop {
            match self.stream.try_read(&mut chunk) {
                Ok(0) => {
                    return Err(ReactorError::Io {
                        peer: self.peer,
                        source: io::Error::new(io::ErrorKind::UnexpectedEof, "peer closed the connection"),
                    });
                }
                Ok(n) => {
                    self.read_buffer.extend_from_slice(&chunk[..n]);
                    total += n;
                }
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => return Ok(total),
                Err(source) => return Err(ReactorError::Io { peer: self.peer, source }),
            }
        }
    }

    /// Parses at most one fully-buffered message out of `read_buffer` (RFC 4271 section 4.1
    /// framing: the 19-byte header's `length` field says exactly how much to take). Returns
    /// `Ok(None)` rather than blocking when fewer bytes than the declared length have arrived.
    fn try_take_message(&mut self, context: &Context) -> Result<Option<(BgpMessage, Diagnostics)>, ReactorError> {
        if self.read_buffer.len() < MessageHeader::LENGTH {
            return Ok(None);
        }
        let declared_length = u16::from_be_bytes([self.read_buffer[16], self.read_buffer[17]]) as usize;
        if self.read_buffer.len() < declared_length {
            return Ok(None);
        }
        let frame: Vec<u8> = self.read_buffer.drain(..declared_length).collect();
        let (_, message, diagnostics) = BgpMessage::decode(&frame, context)
            .map_err(|source| ReactorError::Decode { peer: self.peer, source })?;
        Ok(Some((message, diagnostics)))
    }

    /// One non-blocking attempt at producing the next message for this peer: pulls whatever
    /// bytes are ready off the wire, then parses as many complete frames as are buffered,
    /// returning the first. Call again on a later turn once more bytes arrive.
    pub fn poll_read_message(&mut self, context: &Context) -> Result<Option<(BgpMessage, Diagnostics)>, ReactorError> {
        if let Some(message) = self.try_take_message(context)? {
            return Ok(Some(message));
        }
        self.poll_fill_read_buffer()?;
        self.try_take_message(context)
    }

    /// Queues an already-encoded message for the next flush (spec section 4.4 `write_message`).
    pub fn write_message(&mut self, bytes: Vec<u8>) -> Result<(), ReactorError> {
        if self.write_backlog.len() >= MAX_WRITE_BACKLOG {
            return Err(ReactorError::BacklogFull { peer: self.peer });
        }
        self.write_backlog.push_back(bytes);
        Ok(())
    }

    pub fn has_pending_writes(&self) -> bool {
        !self.write_backlog.is_empty()
    }

    /// Drains as much of the write backlog as the socket accepts without blocking (spec
    /// section 4.5 step 4 "flush API writes" applies the same pattern to peer sockets).
    /// A partially-accepted message is requeued at the front so the next flush resumes it.
    pub fn flush(&mut self) -> Result<(), ReactorError> {
        while let Some(mut bytes) = self.write_backlog.pop_front() {
            match self.stream.try_write(&bytes) {
                Ok(written) if written == bytes.len() => continue,
                Ok(written) => {
                    bytes.drain(..written);
                    self.write_backlog.push_front(bytes);
                    return Ok(());
                }
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => {
                    self.write_backlog.push_front(bytes);
                    return Ok(());
                }
                Err(source) => return Err(ReactorError::Io { peer: self.peer, source }),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn loopback_pair() -> (ProtocolHandler, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connect = TcpStream::connect(addr);
        let accept = listener.accept();
        let (client, (server, _)) = tokio::join!(connect, accept);
        (ProtocolHandler::new(client.unwrap(), addr.ip()), server.unwrap())
    }

    #[tokio::test]
    async fn write_backlog_is_bounded() {
        let (mut handler, _server) = loopback_pair().await;
        for _ in 0..MAX_WRITE_BACKLOG {
            handler.write_message(vec![0]).unwrap();
        }
        assert!(matches!(handler.write_message(vec![0]), Err(ReactorError::BacklogFull { .. })));
    }

    #[tokio::test]
    async fn reads_a_full_keepalive_frame_once_buffered() {
        use tokio::io::AsyncWriteExt;
        let (mut handler, mut server) = loopback_pair().await;
        let context = Context::legacy();
        let keepalive = BgpMessage::KeepAlive.encode(&context);
        server.write_all(&keepalive).await.unwrap();

        // Give the writer a chance to land in the client's receive buffer before polling.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let message = loop {
            if let Some(message) = handler.poll_read_message(&context).unwrap() {
                break message;
            }
        };
        assert!(matches!(message.0, BgpMessage::KeepAlive));
    }
}
