//! Nullable network — in-memory streams instead of sockets.
//!
//! Every [`NullNetwork`] clone shares one registry of bound ports. Dialing a
//! bound port creates a `tokio::io::duplex` pipe and hands one end to the
//! listener; dialing an unbound port fails with `ConnectionRefused`.

use std::collections::HashMap;
use std::future::{self, Future};
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::io::DuplexStream;
use tokio::sync::mpsc;

use murmur_network::{Listener, Network};

/// First port handed out for port-0 binds and client ends.
const FIRST_EPHEMERAL_PORT: u16 = 40_000;

/// Bytes buffered in each direction of a pipe.
const PIPE_CAPACITY: usize = 256 * 1024;

type Incoming = (DuplexStream, SocketAddr);

#[derive(Default)]
struct Registry {
    listeners: HashMap<u16, mpsc::UnboundedSender<Incoming>>,
    next_port: u16,
    dials: Vec<u16>,
}

impl Registry {
    fn allocate_port(&mut self) -> u16 {
        loop {
            if self.next_port < FIRST_EPHEMERAL_PORT {
                self.next_port = FIRST_EPHEMERAL_PORT;
            }
            let port = self.next_port;
            self.next_port = self.next_port.wrapping_add(1);
            if !self.listeners.contains_key(&port) {
                return port;
            }
        }
    }
}

fn local(port: u16) -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, port))
}

/// A test network whose connections never leave the process.
#[derive(Clone, Default)]
pub struct NullNetwork {
    registry: Arc<Mutex<Registry>>,
}

impl NullNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a stream to `port` the way a foreign client would.
    pub fn connect_raw(&self, port: u16) -> io::Result<DuplexStream> {
        self.dial(port)
    }

    /// Every port dialed so far, in order.
    pub fn dials(&self) -> Vec<u16> {
        self.lock().dials.clone()
    }

    /// Number of dials made to `port`.
    pub fn dial_count(&self, port: u16) -> usize {
        self.lock().dials.iter().filter(|&&p| p == port).count()
    }

    pub fn is_listening(&self, port: u16) -> bool {
        self.lock().listeners.contains_key(&port)
    }

    fn dial(&self, port: u16) -> io::Result<DuplexStream> {
        let mut registry = self.lock();
        registry.dials.push(port);

        let refused = || io::Error::new(io::ErrorKind::ConnectionRefused, format!("nothing listening on {port}"));
        if !registry.listeners.contains_key(&port) {
            return Err(refused());
        }

        let client_port = registry.allocate_port();
        let (client, server) = tokio::io::duplex(PIPE_CAPACITY);
        let delivered = registry
            .listeners
            .get(&port)
            .is_some_and(|listener| listener.send((server, local(client_port))).is_ok());
        if !delivered {
            registry.listeners.remove(&port);
            return Err(refused());
        }
        Ok(client)
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Network for NullNetwork {
    type Stream = DuplexStream;
    type Listener = NullListener;

    fn connect(&self, _host: &str, port: u16) -> impl Future<Output = io::Result<DuplexStream>> + Send {
        future::ready(self.dial(port))
    }

    fn bind(&self, _host: &str, port: u16) -> impl Future<Output = io::Result<NullListener>> + Send {
        let result = {
            let mut registry = self.lock();
            let port = if port == 0 {
                Ok(registry.allocate_port())
            } else if registry.listeners.contains_key(&port) {
                Err(io::Error::new(io::ErrorKind::AddrInUse, format!("port {port} already bound")))
            } else {
                Ok(port)
            };
            port.map(|port| {
                let (tx, rx) = mpsc::unbounded_channel();
                registry.listeners.insert(port, tx);
                NullListener {
                    port,
                    incoming: rx,
                    registry: Arc::clone(&self.registry),
                }
            })
        };
        future::ready(result)
    }
}

/// Bound port of a [`NullNetwork`]. Dropping it unbinds the port.
pub struct NullListener {
    port: u16,
    incoming: mpsc::UnboundedReceiver<Incoming>,
    registry: Arc<Mutex<Registry>>,
}

impl Listener for NullListener {
    type Stream = DuplexStream;

    fn accept(&mut self) -> impl Future<Output = io::Result<(DuplexStream, SocketAddr)>> + Send {
        async move {
            self.incoming
                .recv()
                .await
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "listener unbound"))
        }
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(local(self.port))
    }
}

impl Drop for NullListener {
    fn drop(&mut self) {
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        registry.listeners.remove(&self.port);
    }
}
