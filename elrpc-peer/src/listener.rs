// TCP acceptor and connector. The bootstrap protocol is one line: a
// listener bound to an ephemeral port prints `<port>\n` on stdout as its
// first output, the parent reads it and dials loopback.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info};

use crate::method::Method;
use crate::peer::Peer;

/// Accepts incoming transports and wraps each one in a peer carrying
/// the registered method set.
pub struct Listener {
    inner: TcpListener,
    methods: Vec<Method>,
    accepted: AtomicU64,
}

impl Listener {
    /// Bind on loopback. Port 0 selects a free ephemeral port; the
    /// chosen port is printed to stdout either way, as the first line of
    /// output, for a parent process to read.
    pub async fn bind(port: u16, methods: Vec<Method>) -> io::Result<Listener> {
        let inner = TcpListener::bind(("127.0.0.1", port)).await?;
        let actual = inner.local_addr()?.port();
        println!("{}", actual);
        info!(port = actual, "epc listener bound");
        Ok(Listener {
            inner,
            methods,
            accepted: AtomicU64::new(0),
        })
    }

    pub fn local_port(&self) -> io::Result<u16> {
        Ok(self.inner.local_addr()?.port())
    }

    /// Add a method served to every connection accepted from now on.
    pub fn register_method(&mut self, method: Method) {
        self.methods.push(method);
    }

    /// Block until a connection arrives and start a peer on it.
    pub async fn accept(&self) -> io::Result<Peer> {
        let (stream, remote) = self.inner.accept().await?;
        stream.set_nodelay(true)?;
        let n = self.accepted.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(%remote, "incoming connection");
        Ok(Peer::start(format!("SS{}", n), stream, self.methods.clone()))
    }

    /// Accept a single connection and block until that peer shuts down.
    pub async fn serve_once(&self) -> io::Result<()> {
        let peer = self.accept().await?;
        peer.wait().await;
        Ok(())
    }
}

/// Dial a listening peer on loopback.
pub async fn connect(port: u16, methods: Vec<Method>) -> io::Result<Peer> {
    let addr = format!("127.0.0.1:{}", port);
    let stream = TcpStream::connect(&addr).await?;
    stream.set_nodelay(true)?;
    debug!(%addr, "connected");
    Ok(Peer::start(format!("CL:{}", addr), stream, methods))
}
