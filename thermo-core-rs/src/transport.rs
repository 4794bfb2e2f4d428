//! Line-framed transport for protocol messages
//!
//! A [`Connection`] wraps any ordered byte stream (TCP in production,
//! in-memory pipes in tests) and exchanges one [`Message`] per line.

use crate::error::{Error, Result};
use crate::types::{Message, MAX_LINE_LEN};
use std::future::Future;
use std::time::Duration;
use tokio::io::{
    split, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
    ReadHalf, WriteHalf,
};
use tokio::net::{TcpListener, TcpStream};
use tracing::debug;

/// One peer's bidirectional line channel
pub struct Connection<S> {
    reader: BufReader<ReadHalf<S>>,
    writer: WriteHalf<S>,
    peer: String,
    line: String,
}

impl Connection<TcpStream> {
    /// Connect to a coordinator
    pub async fn connect(host: &str, port: u16) -> Result<Self> {
        let stream = TcpStream::connect((host, port)).await?;
        Self::from_tcp(stream)
    }

    /// Accept the next peer on a listening socket
    pub async fn accept(listener: &TcpListener) -> Result<Self> {
        let (stream, addr) = listener.accept().await?;
        stream.set_nodelay(true)?;
        debug!("Accepted connection from {}", addr);
        Ok(Self::new(stream, addr.to_string()))
    }

    /// Wrap an established TCP stream
    pub fn from_tcp(stream: TcpStream) -> Result<Self> {
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr()?.to_string();
        Ok(Self::new(stream, peer))
    }
}

impl<S: AsyncRead + AsyncWrite> Connection<S> {
    /// Wrap a stream; `peer` is only used in diagnostics
    pub fn new(stream: S, peer: impl Into<String>) -> Self {
        let (reader, writer) = split(stream);
        Self {
            reader: BufReader::new(reader),
            writer,
            peer: peer.into(),
            line: String::with_capacity(MAX_LINE_LEN),
        }
    }

    /// Label of the remote end
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Send one message followed by the line delimiter
    pub async fn send(&mut self, msg: &Message) -> Result<()> {
        let mut line = msg.encode();
        debug!("Sending {:?} to {}", line, self.peer);
        line.push('\n');
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Receive one raw line with the delimiter stripped
    pub async fn recv_line(&mut self) -> Result<String> {
        self.line.clear();
        let read = (&mut self.reader)
            .take(MAX_LINE_LEN as u64)
            .read_line(&mut self.line)
            .await;

        let n = match read {
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                return Err(Error::Malformed {
                    peer: self.peer.clone(),
                    line: String::new(),
                    source: crate::types::DecodeError::Encoding,
                });
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(stripped) = self.line.strip_suffix('\n') {
            let stripped = stripped.strip_suffix('\r').unwrap_or(stripped);
            debug!("Received {:?} from {}", stripped, self.peer);
            return Ok(stripped.to_string());
        }

        if n >= MAX_LINE_LEN {
            Err(Error::LineTooLong {
                peer: self.peer.clone(),
                max: MAX_LINE_LEN,
            })
        } else {
            // EOF, either between lines or part-way through one
            Err(Error::ConnectionClosed(self.peer.clone()))
        }
    }

    /// Receive and strictly decode one message
    pub async fn recv(&mut self) -> Result<Message> {
        let line = self.recv_line().await?;
        Message::decode(&line).map_err(|source| Error::Malformed {
            peer: self.peer.clone(),
            line,
            source,
        })
    }

    /// Receive one message, failing with [`Error::Timeout`] once `deadline` elapses
    pub async fn recv_within(&mut self, deadline: Option<Duration>) -> Result<Message> {
        within(deadline, self.recv()).await
    }

    /// Flush and close the write side
    pub async fn shutdown(&mut self) -> Result<()> {
        self.writer.shutdown().await?;
        Ok(())
    }
}

/// Run `fut` to completion, or fail with [`Error::Timeout`] once `deadline` elapses
pub async fn within<F, T>(deadline: Option<Duration>, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match deadline {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| Error::Timeout(limit))?,
        None => fut.await,
    }
}

/// Bind the coordinator's listening socket
pub async fn bind(addr: &str, port: u16) -> Result<TcpListener> {
    let listener = TcpListener::bind((addr, port)).await?;
    Ok(listener)
}
