//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Line-framed connection
//!
//! Wraps any byte stream in a [`LinesCodec`] so the rest of the broker only
//! deals in whole lines. Owned by a single connection worker; no locking.

use crate::protocol::{MAX_LINE_LENGTH, ServerReply};
use crate::{Result, SessionError};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::codec::{Framed, LinesCodec};
use tracing::{debug, instrument, trace};

/// A newline-delimited text connection
pub struct LineConnection<S> {
    framed: Framed<S, LinesCodec>,
    peer_addr: SocketAddr,
    write_timeout: Duration,
    lines_sent: u64,
    lines_received: u64,
}

impl LineConnection<TcpStream> {
    /// Wrap an accepted TCP socket
    pub fn wrap(socket: TcpStream, write_timeout: Duration) -> Result<Self> {
        let peer_addr = socket.peer_addr()?;
        socket.set_nodelay(true)?;
        Ok(Self::new(socket, peer_addr, write_timeout))
    }
}

impl<S> LineConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap an arbitrary stream; `peer_addr` is used for reporting only
    pub fn new(stream: S, peer_addr: SocketAddr, write_timeout: Duration) -> Self {
        Self {
            framed: Framed::new(stream, LinesCodec::new_with_max_length(MAX_LINE_LENGTH)),
            peer_addr,
            write_timeout,
            lines_sent: 0,
            lines_received: 0,
        }
    }

    /// Get the peer address
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Lines written so far
    pub fn lines_sent(&self) -> u64 {
        self.lines_sent
    }

    /// Lines read so far
    pub fn lines_received(&self) -> u64 {
        self.lines_received
    }

    /// Read the next line, without its terminator
    ///
    /// Returns `Ok(None)` on clean end of stream. Cancel safe.
    pub async fn read_line(&mut self) -> Result<Option<String>> {
        match self.framed.next().await {
            Some(Ok(line)) => {
                self.lines_received += 1;
                trace!(peer_addr = %self.peer_addr, line = %line, "Received line");
                Ok(Some(line))
            }
            Some(Err(e)) => Err(SessionError::from(e)),
            None => Ok(None),
        }
    }

    /// Write one line, bounded by the write timeout
    #[instrument(skip(self), fields(peer_addr = %self.peer_addr))]
    pub async fn write_line(&mut self, line: &str) -> Result<()> {
        match timeout(self.write_timeout, self.framed.send(line)).await {
            Ok(Ok(())) => {
                self.lines_sent += 1;
                Ok(())
            }
            Ok(Err(e)) => Err(SessionError::from(e)),
            Err(_) => Err(SessionError::Timeout),
        }
    }

    /// Write a server reply
    pub async fn send(&mut self, reply: &ServerReply) -> Result<()> {
        self.write_line(&reply.to_string()).await
    }

    /// Flush and shut down the write half. Best effort.
    pub async fn close(&mut self) {
        let close = SinkExt::<&str>::close(&mut self.framed);
        if let Err(e) = timeout(self.write_timeout, close).await {
            debug!(peer_addr = %self.peer_addr, error = ?e, "Close timed out");
        }
    }
}

impl<S> std::fmt::Debug for LineConnection<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineConnection")
            .field("peer_addr", &self.peer_addr)
            .field("lines_sent", &self.lines_sent)
            .field("lines_received", &self.lines_received)
            .finish()
    }
}
