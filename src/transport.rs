//! Transport abstraction
//!
//! Owns a bidirectional byte stream on behalf of an association: blocking
//! `read_exact`/`write_all`, idle timeout, and half-close detection
//! (spec.md §4.1). [`TcpTransport`] is the default implementation; `rustls`
//! (behind the `sync-tls` feature, matching the teacher's gating of TLS) can
//! implement the same trait over a `TcpStream`.

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use snafu::{ResultExt, Snafu};

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("connection closed while reading {} bytes", expected))]
    Closed { expected: usize },

    #[snafu(display("timed out waiting for {} bytes", expected))]
    Timeout { expected: usize },

    #[snafu(display("transport I/O error"))]
    Io { source: io::Error },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Contract for the byte-stream underlying an association (spec.md §4.1).
pub trait Transport {
    /// Read exactly `n` bytes, blocking until they are available.
    ///
    /// Must fail with [`Error::Closed`] if the peer half-closes the
    /// connection before `n` bytes have been read.
    fn read_exact(&mut self, n: usize) -> Result<Vec<u8>>;

    /// Write the entire buffer to the stream.
    fn write_all(&mut self, bytes: &[u8]) -> Result<()>;

    /// Set the read timeout; `None` disables it.
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<()>;

    /// Shut down both halves of the connection.
    fn close(&mut self) -> Result<()>;
}

/// A [`Transport`] backed by a plain [`TcpStream`].
#[derive(Debug)]
pub struct TcpTransport {
    socket: TcpStream,
}

impl TcpTransport {
    pub fn new(socket: TcpStream) -> Self {
        TcpTransport { socket }
    }

    pub fn into_inner(self) -> TcpStream {
        self.socket
    }

    pub fn inner_mut(&mut self) -> &mut TcpStream {
        &mut self.socket
    }
}

impl Transport for TcpTransport {
    fn read_exact(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; n];
        match self.socket.read_exact(&mut buf) {
            Ok(()) => Ok(buf),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => ClosedSnafu { expected: n }.fail(),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::TimedOut => {
                TimeoutSnafu { expected: n }.fail()
            }
            Err(e) => Err(e).context(IoSnafu),
        }
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.socket.write_all(bytes).context(IoSnafu)
    }

    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        self.socket.set_read_timeout(timeout).context(IoSnafu)
    }

    fn close(&mut self) -> Result<()> {
        // a connection reset by the peer while shutting down is not
        // actionable; ignore it the way a final cleanup step normally would.
        let _ = self.socket.shutdown(std::net::Shutdown::Both);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn reads_exact_bytes() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            stream.write_all(&[1, 2, 3, 4]).unwrap();
        });

        let client = TcpStream::connect(addr).unwrap();
        let mut transport = TcpTransport::new(client);
        let data = transport.read_exact(4).unwrap();
        assert_eq!(data, vec![1, 2, 3, 4]);

        handle.join().unwrap();
    }

    #[test]
    fn reports_closed_on_short_read() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            drop(stream);
        });

        let client = TcpStream::connect(addr).unwrap();
        let mut transport = TcpTransport::new(client);
        let err = transport.read_exact(4).unwrap_err();
        assert!(matches!(err, Error::Closed { expected: 4 }));

        handle.join().unwrap();
    }
}
