use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;

use tracing::debug;

use crate::error::{Result, TransportError};

/// A connected gateway socket — implements Read + Write.
///
/// This is the fundamental I/O type returned by transport operations.
/// Cloning (via [`GatewayStream::try_clone`]) yields a second handle to the
/// same underlying socket, which is how the read and write halves of a
/// channel are split across threads.
pub struct GatewayStream {
    inner: TcpStream,
}

impl GatewayStream {
    /// Connect to a gateway listener with a connect timeout (blocking).
    ///
    /// TCP keepalive is enabled on the connected socket so the kernel
    /// answers the gateway's liveness probes; failure to enable it is
    /// logged and tolerated.
    pub fn connect(addr: SocketAddr, timeout: Duration) -> Result<Self> {
        let stream =
            TcpStream::connect_timeout(&addr, timeout).map_err(|e| TransportError::Connect {
                addr,
                source: e,
            })?;

        if let Err(err) = stream.set_nodelay(true) {
            debug!(%addr, %err, "failed to set TCP_NODELAY");
        }
        if let Err(err) = enable_keepalive(&stream) {
            debug!(%addr, %err, "failed to enable TCP keepalive");
        }

        debug!(%addr, "connected to gateway");
        Ok(Self { inner: stream })
    }

    /// Set read timeout on the underlying stream.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.inner.set_read_timeout(timeout).map_err(Into::into)
    }

    /// Set write timeout on the underlying stream.
    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.inner.set_write_timeout(timeout).map_err(Into::into)
    }

    /// Try to clone this stream (creates a new file descriptor).
    pub fn try_clone(&self) -> Result<Self> {
        let cloned = self.inner.try_clone()?;
        Ok(Self { inner: cloned })
    }

    /// Shut down both directions of the socket.
    ///
    /// Unblocks any thread parked in a read or write on another clone.
    pub fn shutdown(&self) -> Result<()> {
        self.inner.shutdown(Shutdown::Both).map_err(Into::into)
    }

    /// Address of the gateway listener this stream is connected to.
    pub fn peer_addr(&self) -> Result<SocketAddr> {
        self.inner.peer_addr().map_err(Into::into)
    }
}

impl Read for GatewayStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Write for GatewayStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

impl std::fmt::Debug for GatewayStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayStream")
            .field("peer", &self.inner.peer_addr().ok())
            .finish()
    }
}

#[cfg(unix)]
fn enable_keepalive(stream: &TcpStream) -> std::io::Result<()> {
    use std::os::fd::AsRawFd;

    let fd = stream.as_raw_fd();
    let enabled: libc::c_int = 1;

    // SAFETY: `fd` is an open socket descriptor owned by this process and
    // `enabled` is a valid c_int for the duration of the call.
    let rc = unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_KEEPALIVE,
            (&enabled as *const libc::c_int).cast::<libc::c_void>(),
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };

    if rc == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn enable_keepalive(_stream: &TcpStream) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn connect_read_write_roundtrip() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 5];
            stream.read_exact(&mut buf).unwrap();
            assert_eq!(&buf, b"hello");
            stream.write_all(b"world").unwrap();
        });

        let mut client = GatewayStream::connect(addr, Duration::from_secs(1)).unwrap();
        client.write_all(b"hello").unwrap();
        let mut buf = [0u8; 5];
        client.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"world");

        server.join().unwrap();
    }

    #[test]
    fn connect_refused_is_a_connect_error() {
        // Bind then drop to get a port nothing is listening on.
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = GatewayStream::connect(addr, Duration::from_millis(200));
        assert!(matches!(result, Err(TransportError::Connect { .. })));
    }

    #[test]
    fn shutdown_unblocks_cloned_reader() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            // Hold the connection open until the client side is done.
            std::thread::sleep(Duration::from_millis(200));
            drop(stream);
        });

        let client = GatewayStream::connect(addr, Duration::from_secs(1)).unwrap();
        let mut reader = client.try_clone().unwrap();

        let read_thread = std::thread::spawn(move || {
            let mut buf = [0u8; 1];
            reader.read(&mut buf)
        });

        client.shutdown().unwrap();
        let read_result = read_thread.join().unwrap();
        // Either EOF (Ok(0)) or a NotConnected-style error; never a hang.
        match read_result {
            Ok(n) => assert_eq!(n, 0),
            Err(_) => {}
        }

        server.join().unwrap();
    }
}
