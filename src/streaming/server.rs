//! Relay listener
//!
//! Binds the operator-facing TCP socket (dual-stack when the address is the
//! IPv6 wildcard) and runs the accept loop. Every accepted connection becomes
//! the active session; the previous one is taken over.

use super::session::{Session, SessionContext, SessionSlot};
use crate::config::NetworkConfig;
use crate::error::{Error, Result};
use socket2::{Domain, Protocol, Socket, Type};
use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

/// Pause between accept polls when nothing is pending
const ACCEPT_POLL: Duration = Duration::from_millis(10);

/// Listen backlog
const BACKLOG: i32 = 16;

fn open_listener(addr: SocketAddr, dual_stack: bool) -> Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    if addr.is_ipv6() {
        socket.set_only_v6(!dual_stack)?;
    }
    socket.bind(&addr.into())?;
    socket.listen(BACKLOG)?;
    Ok(socket.into())
}

/// Bind the listen socket
///
/// An IPv6 wildcard bind that fails (IPv6 disabled on the host) falls back to
/// the IPv4 wildcard on the same port.
pub fn bind_listener(addr: SocketAddr, dual_stack: bool) -> Result<TcpListener> {
    match open_listener(addr, dual_stack) {
        Ok(listener) => Ok(listener),
        Err(e) if addr.is_ipv6() && addr.ip().is_unspecified() => {
            let fallback = SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), addr.port());
            log::warn!("IPv6 bind on {} failed ({}), falling back to {}", addr, e, fallback);
            open_listener(fallback, false)
        }
        Err(e) => Err(Error::Other(format!("Failed to bind to {}: {}", addr, e))),
    }
}

/// Accept loop plus the active-session slot
pub struct RelayServer {
    listener: TcpListener,
    slot: SessionSlot,
    ctx: SessionContext,
    network: NetworkConfig,
    next_id: u64,
}

impl RelayServer {
    /// Bind according to `network` and prepare the accept loop
    pub fn bind(network: &NetworkConfig, addr: SocketAddr, ctx: SessionContext) -> Result<Self> {
        let listener = bind_listener(addr, network.dual_stack)?;
        listener.set_nonblocking(true)?;

        log::info!("Relay listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            slot: SessionSlot::new(),
            ctx,
            network: network.clone(),
            next_id: 1,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Handle to the active-session slot (capture loop, shutdown)
    pub fn slot(&self) -> SessionSlot {
        self.slot.clone()
    }

    /// Accept until the running flag clears; the listener closes on return
    pub fn run(mut self) -> SessionSlot {
        while self.ctx.running.load(Ordering::Relaxed) {
            match self.listener.accept() {
                Ok((stream, addr)) => {
                    log::info!("Client connected: {}", addr);
                    if let Err(e) = self.start_session(stream) {
                        log::error!("Failed to start session for {}: {}", addr, e);
                    }
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL);
                }
                Err(e) => {
                    log::error!("Accept error: {}", e);
                    thread::sleep(ACCEPT_POLL);
                }
            }
        }

        log::info!("Relay stopped accepting connections");
        self.slot
    }

    fn start_session(&mut self, stream: TcpStream) -> Result<()> {
        // Accepted sockets may inherit non-blocking mode from the listener
        stream.set_nonblocking(false)?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(self.network.read_timeout()))?;
        stream.set_write_timeout(Some(self.network.write_timeout()))?;

        let id = self.next_id;
        self.next_id += 1;

        let session = Session::new(id, stream, self.ctx.clone())?;
        self.slot.install(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_ephemeral_v4() {
        let listener = bind_listener("127.0.0.1:0".parse().unwrap(), false).unwrap();
        let addr = listener.local_addr().unwrap();
        assert!(addr.port() > 0);
        assert!(TcpStream::connect(addr).is_ok());
    }

    #[test]
    fn test_wildcard_bind_accepts_ipv4() {
        // Falls back to 0.0.0.0 on hosts without IPv6
        let listener = bind_listener("[::]:0".parse().unwrap(), true).unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(TcpStream::connect(("127.0.0.1", port)).is_ok());
    }
}
