//! Datagram plumbing: the ATM's request/reply link and the router's relay.
//!
//! One frame is exactly one datagram. Nothing here looks inside a frame.

use std::{
    io,
    net::{SocketAddr, UdpSocket},
    sync::atomic::{AtomicBool, Ordering},
    time::{Duration, Instant},
};

use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{Error, Result};

/// Large enough for any UDP payload, so oversized frames arrive whole and
/// fail decoding instead of being silently truncated.
pub const RECV_BUFFER_SIZE: usize = 65536;

/// Poll interval for loops that must notice a shutdown flag.
const SHUTDOWN_POLL: Duration = Duration::from_millis(200);

/// A request/reply exchange with the Bank.
pub trait Transport {
    /// Send one datagram and return the matching reply datagram.
    fn round_trip(&mut self, request: &[u8]) -> Result<Vec<u8>>;
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

/// UDP link from the ATM to the router.
#[derive(Debug)]
pub struct DatagramLink {
    socket: UdpSocket,
    peer: SocketAddr,
    timeout: Duration,
    max_retries: u32,
}

impl DatagramLink {
    pub fn bind(local: SocketAddr, peer: SocketAddr, timeout: Duration, max_retries: u32) -> Result<Self> {
        let socket = UdpSocket::bind(local)?;
        Ok(Self {
            socket,
            peer,
            timeout,
            max_retries,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::bind(
            config.atm_addr,
            config.router_addr,
            config.request_timeout(),
            config.max_retries,
        )
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Discard replies to earlier requests that arrived after we gave up.
    fn drain(&self) -> Result<()> {
        let mut buf = vec![0u8; RECV_BUFFER_SIZE];
        self.socket.set_nonblocking(true)?;
        let result = loop {
            match self.socket.recv_from(&mut buf) {
                Ok((n, src)) => debug!(bytes = n, %src, "discarding stale datagram"),
                Err(e) if is_timeout(&e) => break Ok(()),
                Err(e) => break Err(Error::Io(e)),
            }
        };
        self.socket.set_nonblocking(false)?;
        result
    }

    /// Wait up to one timeout for a datagram from the peer.
    fn await_reply(&self, buf: &mut [u8]) -> Result<Option<usize>> {
        let deadline = Instant::now() + self.timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            self.socket.set_read_timeout(Some(remaining))?;
            match self.socket.recv_from(buf) {
                Ok((n, src)) if src == self.peer => return Ok(Some(n)),
                Ok((n, src)) => debug!(bytes = n, %src, "ignoring datagram from unknown source"),
                Err(e) if is_timeout(&e) => return Ok(None),
                Err(e) => return Err(Error::Io(e)),
            }
        }
    }
}

impl Transport for DatagramLink {
    /// Resends the identical datagram on timeout. The Bank recognizes a
    /// resend of its last request and repeats the reply, so a resend never
    /// executes a command twice.
    fn round_trip(&mut self, request: &[u8]) -> Result<Vec<u8>> {
        self.drain()?;

        let mut buf = vec![0u8; RECV_BUFFER_SIZE];
        let attempts = self.max_retries + 1;
        for attempt in 1..=attempts {
            self.socket.send_to(request, self.peer)?;
            if let Some(n) = self.await_reply(&mut buf)? {
                buf.truncate(n);
                return Ok(buf);
            }
            warn!(attempt, attempts, "no reply from bank");
        }
        Err(Error::Timeout(attempts))
    }
}

/// Store-and-forward relay between one ATM and one Bank.
#[derive(Debug)]
pub struct Relay {
    socket: UdpSocket,
    atm: SocketAddr,
    bank: SocketAddr,
}

impl Relay {
    pub fn bind(listen: SocketAddr, atm: SocketAddr, bank: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(listen)?;
        socket.set_read_timeout(Some(SHUTDOWN_POLL))?;
        Ok(Self { socket, atm, bank })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::bind(config.router_addr, config.atm_addr, config.bank_addr)
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Where a datagram from `src` goes, if anywhere.
    pub fn route(&self, src: SocketAddr) -> Option<SocketAddr> {
        if src == self.atm {
            Some(self.bank)
        } else if src == self.bank {
            Some(self.atm)
        } else {
            None
        }
    }

    /// Relay at most one datagram. Returns the destination it was sent to.
    pub fn forward_one(&self, buf: &mut [u8]) -> Result<Option<SocketAddr>> {
        let (n, src) = match self.socket.recv_from(buf) {
            Ok(received) => received,
            Err(e) if is_timeout(&e) => return Ok(None),
            Err(e) => return Err(Error::Io(e)),
        };
        match self.route(src) {
            Some(dst) => {
                self.socket.send_to(&buf[..n], dst)?;
                debug!(bytes = n, %src, %dst, "forwarded");
                Ok(Some(dst))
            }
            None => {
                warn!(bytes = n, %src, "dropping datagram from unknown source");
                Ok(None)
            }
        }
    }

    /// Forward until `running` goes false.
    pub fn run(&self, running: &AtomicBool) -> Result<()> {
        let mut buf = vec![0u8; RECV_BUFFER_SIZE];
        while running.load(Ordering::SeqCst) {
            self.forward_one(&mut buf)?;
        }
        Ok(())
    }
}
