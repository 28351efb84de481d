//! In-process transport built on Tokio channels.
//!
//! [`pair`] returns two connected ends. Whatever one end sends, the other
//! receives, in order. Closing either end makes the peer's `recv` return
//! `Ok(None)`, which is how a session observes a router hanging up.
//!
//! ```rust
//! use wampkit_transport::{memory, Connection};
//!
//! # tokio_test_block(async {
//! let (client, router) = memory::pair();
//! client.send(b"[1,\"realm1\",{}]").await.unwrap();
//! assert_eq!(router.recv().await.unwrap().unwrap(), b"[1,\"realm1\",{}]");
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

use std::sync::Mutex as StdMutex;

use tokio::sync::{mpsc, Mutex};

use crate::{next_connection_id, Connection, ConnectionId, Transport, TransportError};

/// Creates two connected in-memory endpoints.
pub fn pair() -> (MemoryConnection, MemoryConnection) {
    let (a_tx, a_rx) = mpsc::unbounded_channel();
    let (b_tx, b_rx) = mpsc::unbounded_channel();
    (
        MemoryConnection::new(a_tx, b_rx),
        MemoryConnection::new(b_tx, a_rx),
    )
}

/// One end of an in-memory connection.
pub struct MemoryConnection {
    id: ConnectionId,
    /// `None` once this end has been closed.
    tx: StdMutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    rx: Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
}

impl MemoryConnection {
    fn new(
        tx: mpsc::UnboundedSender<Vec<u8>>,
        rx: mpsc::UnboundedReceiver<Vec<u8>>,
    ) -> Self {
        Self {
            id: next_connection_id(),
            tx: StdMutex::new(Some(tx)),
            rx: Mutex::new(rx),
        }
    }

    fn sender(&self) -> Option<mpsc::UnboundedSender<Vec<u8>>> {
        self.tx
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl Connection for MemoryConnection {
    type Error = TransportError;

    async fn send(&self, data: &[u8]) -> Result<(), Self::Error> {
        let tx = self.sender().ok_or_else(|| {
            TransportError::ConnectionClosed("local end closed".into())
        })?;
        tx.send(data.to_vec()).map_err(|_| {
            TransportError::ConnectionClosed("peer dropped".into())
        })
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error> {
        Ok(self.rx.lock().await.recv().await)
    }

    async fn close(&self) -> Result<(), Self::Error> {
        self.tx
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        tracing::debug!(id = %self.id, "memory connection closed");
        Ok(())
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}

/// A [`Transport`] that hands out one pre-built [`MemoryConnection`].
///
/// The second `connect` fails: like a socket, a memory connection can only
/// be opened once.
pub struct MemoryTransport {
    conn: StdMutex<Option<MemoryConnection>>,
}

impl MemoryTransport {
    /// Wraps the client end of a [`pair`].
    pub fn new(conn: MemoryConnection) -> Self {
        Self {
            conn: StdMutex::new(Some(conn)),
        }
    }
}

impl Transport for MemoryTransport {
    type Connection = MemoryConnection;
    type Error = TransportError;

    async fn connect(&self) -> Result<Self::Connection, Self::Error> {
        self.conn
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()
            .ok_or_else(|| {
                TransportError::ConnectionClosed(
                    "memory connection already taken".into(),
                )
            })
    }
}
