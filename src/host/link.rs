//! Socket slot shared by the writer and the connection supervisor
//!
//! The supervisor attaches a freshly connected stream and probes it for a
//! closed peer; the writer is the only one that writes to it. Both sides take
//! the same lock, so a probe never toggles blocking mode under a write.

use parking_lot::Mutex;
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;
use tracing::{debug, trace};

/// Upper bound on a single blocking write
const WRITE_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Default)]
pub struct HostLink {
    stream: Mutex<Option<TcpStream>>,
}

impl HostLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a connected stream, replacing any previous one
    pub fn attach(&self, stream: TcpStream) -> io::Result<()> {
        stream.set_nonblocking(false)?;
        stream.set_nodelay(true)?;
        stream.set_write_timeout(Some(WRITE_TIMEOUT))?;
        if let Some(old) = self.stream.lock().replace(stream) {
            let _ = old.shutdown(Shutdown::Both);
        }
        Ok(())
    }

    pub fn is_attached(&self) -> bool {
        self.stream.lock().is_some()
    }

    /// Check whether the peer is still there
    ///
    /// Anything the host sends is read and discarded. A stream busy in a
    /// write is reported alive.
    pub fn probe(&self) -> bool {
        let Some(mut guard) = self.stream.try_lock() else {
            return true;
        };
        let Some(stream) = guard.as_mut() else {
            return false;
        };
        let alive = poll_open(stream);
        if !alive {
            debug!("Host closed the connection");
            *guard = None;
        }
        alive
    }

    /// Write one line
    ///
    /// `Ok(false)` means there is no connection and the line was dropped. A
    /// failed write detaches the stream.
    pub fn write_line(&self, line: &str) -> io::Result<bool> {
        let mut guard = self.stream.lock();
        let Some(stream) = guard.as_mut() else {
            return Ok(false);
        };
        match stream.write_all(line.as_bytes()).and_then(|_| stream.flush()) {
            Ok(()) => Ok(true),
            Err(e) => {
                *guard = None;
                Err(e)
            }
        }
    }

    /// Drop the stream, if any
    pub fn close(&self) {
        if let Some(stream) = self.stream.lock().take() {
            let _ = stream.shutdown(Shutdown::Both);
            debug!("Host socket closed");
        }
    }
}

/// Drain pending input without blocking; false once the peer has closed
fn poll_open(stream: &mut TcpStream) -> bool {
    if stream.set_nonblocking(true).is_err() {
        return false;
    }
    let mut scratch = [0u8; 256];
    let open = loop {
        match stream.read(&mut scratch) {
            Ok(0) => break false,
            Ok(n) => trace!("Discarded {} bytes from host", n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => break true,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(_) => break false,
        }
    };
    open && stream.set_nonblocking(false).is_ok()
}
