//! Byte-stream transports.
//!
//! A [`Network`] opens and accepts ordered, reliable byte streams. Each
//! stream is wrapped in a [`StreamTransport`], which runs a reader task and a
//! writer task. The reader reports every chunk it receives as a
//! [`TransportEvent`] through a sink closure; the writer drains an unbounded
//! queue of outgoing frames, so `write` never blocks the pool.
//!
//! [`TcpNetwork`] is the production implementation. Tests substitute an
//! in-memory network.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::NetworkError;

/// Read buffer size for a single `read` call.
const READ_CHUNK: usize = 64 * 1024;

/// Something observed on a stream by its reader task.
#[derive(Debug)]
pub enum TransportEvent {
    /// A chunk of bytes, in stream order.
    Data(Vec<u8>),
    /// The remote end closed the stream.
    Close,
    /// The stream failed.
    Error(String),
}

/// Write side of a connected peer, as seen by the peer state machine.
pub trait Transport: Send {
    /// Queue one frame for writing.
    fn write(&mut self, frame: Vec<u8>) -> Result<(), NetworkError>;

    /// Tear the stream down. Idempotent.
    fn destroy(&mut self);
}

/// Accepts inbound streams.
pub trait Listener: Send + 'static {
    type Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    fn accept(&mut self) -> impl Future<Output = io::Result<(Self::Stream, SocketAddr)>> + Send;

    fn local_addr(&self) -> io::Result<SocketAddr>;
}

/// Opens outbound streams and binds listeners.
pub trait Network: Send + Sync + 'static {
    type Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static;
    type Listener: Listener<Stream = Self::Stream>;

    fn connect(&self, host: &str, port: u16)
        -> impl Future<Output = io::Result<Self::Stream>> + Send;

    fn bind(&self, host: &str, port: u16)
        -> impl Future<Output = io::Result<Self::Listener>> + Send;
}

/// Plain TCP.
#[derive(Clone, Copy, Debug, Default)]
pub struct TcpNetwork;

impl Network for TcpNetwork {
    type Stream = TcpStream;
    type Listener = TcpListener;

    fn connect(&self, host: &str, port: u16) -> impl Future<Output = io::Result<TcpStream>> + Send {
        let host = host.to_string();
        async move {
            let stream = TcpStream::connect((host.as_str(), port)).await?;
            stream.set_nodelay(true)?;
            Ok(stream)
        }
    }

    fn bind(&self, host: &str, port: u16) -> impl Future<Output = io::Result<TcpListener>> + Send {
        let host = host.to_string();
        async move { TcpListener::bind((host.as_str(), port)).await }
    }
}

impl Listener for TcpListener {
    type Stream = TcpStream;

    fn accept(&mut self) -> impl Future<Output = io::Result<(TcpStream, SocketAddr)>> + Send {
        async move {
            let (stream, addr) = TcpListener::accept(self).await?;
            stream.set_nodelay(true)?;
            Ok((stream, addr))
        }
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        TcpListener::local_addr(self)
    }
}

/// A stream driven by a reader task and a writer task.
pub struct StreamTransport {
    outbound: Option<mpsc::UnboundedSender<Vec<u8>>>,
    reader: JoinHandle<()>,
}

impl StreamTransport {
    /// Split `stream` and start its I/O tasks.
    ///
    /// `sink` receives every event from the reader task, and a write failure
    /// from the writer task. It returns `false` once nobody is listening,
    /// which stops the reader.
    pub fn spawn<S, F>(stream: S, sink: F) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
        F: Fn(TransportEvent) -> bool + Send + Sync + 'static,
    {
        let (mut read_half, mut write_half) = tokio::io::split(stream);
        let sink = Arc::new(sink);

        let read_sink = Arc::clone(&sink);
        let reader = tokio::spawn(async move {
            let mut buf = vec![0u8; READ_CHUNK];
            loop {
                match read_half.read(&mut buf).await {
                    Ok(0) => {
                        read_sink(TransportEvent::Close);
                        break;
                    }
                    Ok(n) => {
                        if !read_sink(TransportEvent::Data(buf[..n].to_vec())) {
                            break;
                        }
                    }
                    Err(e) => {
                        read_sink(TransportEvent::Error(e.to_string()));
                        break;
                    }
                }
            }
        });

        let (outbound, mut frames) = mpsc::unbounded_channel::<Vec<u8>>();
        tokio::spawn(async move {
            while let Some(frame) = frames.recv().await {
                if let Err(e) = write_half.write_all(&frame).await {
                    tracing::debug!(error = %e, "stream write failed");
                    sink(TransportEvent::Error(e.to_string()));
                    return;
                }
            }
            let _ = write_half.shutdown().await;
        });

        Self {
            outbound: Some(outbound),
            reader,
        }
    }
}

impl Transport for StreamTransport {
    fn write(&mut self, frame: Vec<u8>) -> Result<(), NetworkError> {
        let outbound = self.outbound.as_ref().ok_or(NetworkError::NotConnected)?;
        outbound
            .send(frame)
            .map_err(|_| NetworkError::Io("writer task has stopped".into()))
    }

    fn destroy(&mut self) {
        // Dropping the sender lets the writer flush what is queued, then
        // shut the write half down.
        self.outbound = None;
        self.reader.abort();
    }
}

impl Drop for StreamTransport {
    fn drop(&mut self) {
        self.destroy();
    }
}
