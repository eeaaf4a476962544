//! Association listener
//!
//! Wraps a `TcpListener` accept loop that spawns a fresh acceptor
//! association per incoming connection, each driven to completion on its
//! own thread (spec.md §2, "owns the reactor thread"). This generalizes
//! the sequential `listener.incoming()` loop used by the teacher's
//! `storescp` binary into a concurrent one, since a DICOM SCP is expected
//! to serve more than one SCU at a time.

use std::net::{TcpListener, TcpStream};
use std::thread::JoinHandle;

use snafu::{ResultExt, Snafu};

use crate::association::server::{self, ServerAssociationOptions};

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("failed to bind listener to {}", addr))]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[snafu(display("failed to accept an incoming connection"))]
    Accept { source: std::io::Error },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Runs [`ServerAssociationOptions::establish`] plus a caller-supplied
/// service loop for each accepted connection.
///
/// `handler` receives the negotiated [`server::ServerAssociation`] and is
/// responsible for driving the DIMSE exchange and eventually releasing or
/// aborting it; a handler that returns an `Err` is logged and does not
/// bring the listener down.
pub struct Listener<A> {
    options: ServerAssociationOptions<'static, A>,
    listener: TcpListener,
}

impl<A> Listener<A>
where
    A: crate::association::server::AccessControl + Clone + Send + 'static,
{
    /// Bind a new listener at `addr` using the given association options.
    pub fn bind(addr: &str, options: ServerAssociationOptions<'static, A>) -> Result<Self> {
        let listener = TcpListener::bind(addr).context(BindSnafu { addr })?;
        Ok(Listener { options, listener })
    }

    /// The address this listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept one incoming connection, negotiate the association, and hand
    /// it to `handler` on a dedicated thread. Returns the thread's join
    /// handle so callers can wait for a single connection to finish (handy
    /// in tests); a long-running server instead calls [`Listener::serve`].
    pub fn accept_one<H>(&self, handler: H) -> Result<JoinHandle<()>>
    where
        H: FnOnce(server::ServerAssociation) + Send + 'static,
    {
        let (stream, peer) = self.listener.accept().context(AcceptSnafu)?;
        Ok(spawn_acceptor(self.options.clone(), stream, peer, handler))
    }

    /// Accept connections forever, spawning a new thread per association.
    /// Returns only on an accept error; per-connection errors are logged
    /// and do not stop the loop (mirroring the teacher's `storescp`
    /// accept loop, generalized to run each connection concurrently).
    pub fn serve<H>(&self, mut handler: H) -> Result<()>
    where
        H: FnMut(server::ServerAssociation) + Clone + Send + 'static,
    {
        for stream in self.listener.incoming() {
            let stream = stream.context(AcceptSnafu)?;
            let peer = stream
                .peer_addr()
                .map(|a| a.to_string())
                .unwrap_or_else(|_| "<unknown>".to_string());
            let handler = handler.clone();
            spawn_acceptor(self.options.clone(), stream, peer, move |assoc| handler(assoc));
        }
        Ok(())
    }
}

fn spawn_acceptor<A, H>(
    options: ServerAssociationOptions<'static, A>,
    stream: TcpStream,
    peer: impl std::fmt::Display + Send + 'static,
    handler: H,
) -> JoinHandle<()>
where
    A: crate::association::server::AccessControl + Send + 'static,
    H: FnOnce(server::ServerAssociation) + Send + 'static,
{
    std::thread::spawn(move || match options.establish(stream) {
        Ok(assoc) => {
            tracing::info!("accepted association from {}", peer);
            handler(assoc);
        }
        Err(e) => {
            tracing::warn!("failed to negotiate association from {}: {}", peer, e);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpStream as ClientStream;
    use std::sync::mpsc::channel;

    #[test]
    fn accepts_and_negotiates_one_connection() {
        let options = ServerAssociationOptions::new()
            .accept_any()
            .with_abstract_syntax("1.2.840.10008.1.1")
            .with_transfer_syntax("1.2.840.10008.1.2");

        let listener = Listener::bind("127.0.0.1:0", options).unwrap();
        let addr = listener.local_addr().unwrap();

        let (tx, rx) = channel();
        let accept_handle = std::thread::spawn(move || {
            let join = listener.accept_one(move |assoc| {
                tx.send(assoc.peer_ae_title().to_string()).unwrap();
            }).unwrap();
            join.join().unwrap();
        });

        let client = ClientStream::connect(addr).unwrap();
        drop(client);
        accept_handle.join().unwrap();

        // the bare TCP connection above never sends a valid A-ASSOCIATE-RQ,
        // so negotiation fails and the handler never runs; this just
        // exercises bind/accept plumbing without a full PDU round trip.
        assert!(rx.try_recv().is_err());
    }
}
