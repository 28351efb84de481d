//! Correlation table: outstanding requests waiting for the router's reply.
//!
//! Every correlated request (CALL, REGISTER, SUBSCRIBE, acknowledged
//! PUBLISH, ...) gets an entry keyed by its request id. The receiver loop
//! resolves entries as responses arrive; the task that sent the request
//! waits on its entry with a timeout.
//!
//! ```text
//! caller task                      receiver loop
//! ───────────                      ─────────────
//! allocate()  → id
//! send(CALL id)
//! await_response(id) ──┐
//!                      │           RESULT id arrives
//!                      │  ←─────── resolve(id, RESULT)
//!          Ok(RESULT) ←┘
//! ```

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::oneshot;
use wampkit_protocol::{Message, RequestId, MAX_ID};

use crate::{RemoteError, SessionError};

type Resolution = Result<Message, SessionError>;

struct Entry {
    created_at: Instant,
    tx: Option<oneshot::Sender<Resolution>>,
    rx: Option<oneshot::Receiver<Resolution>>,
}

struct Table {
    entries: HashMap<RequestId, Entry>,
    next_id: u64,
    closed: bool,
}

impl Table {
    fn next_free_id(&mut self) -> RequestId {
        loop {
            let id = RequestId(self.next_id);
            self.next_id = if self.next_id + 1 >= MAX_ID {
                1
            } else {
                self.next_id + 1
            };
            if !self.entries.contains_key(&id) {
                return id;
            }
        }
    }
}

/// The table of outstanding requests of one session.
///
/// Any number of tasks may `allocate` and `await_response` concurrently.
/// Only the receiver loop calls `resolve`.
pub struct PendingRequests {
    table: Mutex<Table>,
}

impl Default for PendingRequests {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingRequests {
    pub fn new() -> Self {
        Self {
            table: Mutex::new(Table {
                entries: HashMap::new(),
                next_id: 1,
                closed: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocates a request id and creates its entry.
    ///
    /// Ids count up from 1 and wrap below 2^53, skipping any id that still
    /// has an entry.
    ///
    /// # Errors
    /// `SessionClosed` once the table has been closed.
    pub fn allocate(&self) -> Result<RequestId, SessionError> {
        let mut table = self.lock();
        if table.closed {
            return Err(SessionError::SessionClosed);
        }
        let id = table.next_free_id();
        let (tx, rx) = oneshot::channel();
        table.entries.insert(
            id,
            Entry {
                created_at: Instant::now(),
                tx: Some(tx),
                rx: Some(rx),
            },
        );
        Ok(id)
    }

    /// An id that does not collide with any outstanding entry, without
    /// creating one. Used for fire-and-forget publishes.
    pub fn fresh_id(&self) -> RequestId {
        self.lock().next_free_id()
    }

    /// Waits until `id` is resolved or `timeout` elapses.
    ///
    /// The entry is removed when this returns or when the future is
    /// dropped, so a late reply is logged and ignored.
    ///
    /// # Errors
    /// - `Remote` if the router answered with ERROR
    /// - `Timeout` on expiry, or immediately if `id` has no entry
    /// - `SessionClosed` if the session closed first
    pub async fn await_response(
        &self,
        id: RequestId,
        timeout: Duration,
    ) -> Result<Message, SessionError> {
        let rx = {
            let mut table = self.lock();
            if table.closed {
                return Err(SessionError::SessionClosed);
            }
            table.entries.get_mut(&id).and_then(|entry| entry.rx.take())
        };
        let Some(rx) = rx else {
            return Err(SessionError::Timeout {
                request_id: id,
                after: Duration::ZERO,
            });
        };

        let _guard = RemoveOnDrop { pending: self, id };
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(resolution)) => resolution,
            Ok(Err(_)) => Err(SessionError::SessionClosed),
            Err(_) => {
                tracing::debug!(request_id = %id, ?timeout, "request timed out");
                Err(SessionError::Timeout {
                    request_id: id,
                    after: timeout,
                })
            }
        }
    }

    /// Delivers a response to the waiter of `id`. ERROR messages resolve
    /// to `SessionError::Remote`.
    ///
    /// A response with no matching entry (late, duplicate or never
    /// requested) is logged and dropped.
    pub fn resolve(&self, id: RequestId, message: Message) {
        let mut table = self.lock();
        let Some(entry) = table.entries.get_mut(&id) else {
            tracing::warn!(
                request_id = %id,
                kind = %message.kind(),
                "response for unknown request, dropping"
            );
            return;
        };
        let Some(tx) = entry.tx.take() else {
            tracing::warn!(request_id = %id, "duplicate response, dropping");
            return;
        };
        tracing::debug!(
            request_id = %id,
            kind = %message.kind(),
            elapsed = ?entry.created_at.elapsed(),
            "request resolved"
        );
        // A waiter that has not taken its receiver yet finds the answer
        // already queued; the entry goes away once it is read.
        if entry.rx.is_none() {
            table.entries.remove(&id);
        }

        let resolution = match message {
            Message::Error {
                details,
                error,
                payload,
                ..
            } => Err(SessionError::Remote(RemoteError {
                error,
                details,
                payload,
            })),
            other => Ok(other),
        };
        let _ = tx.send(resolution);
    }

    /// Drops the entry for `id`, e.g. when its request could not be sent.
    pub fn cancel(&self, id: RequestId) {
        self.lock().entries.remove(&id);
    }

    /// Fails every outstanding entry with `SessionClosed` and refuses
    /// further allocation until [`reopen`](Self::reopen).
    pub fn close(&self) {
        let mut table = self.lock();
        table.closed = true;
        let drained: Vec<_> = table.entries.drain().collect();
        drop(table);

        if !drained.is_empty() {
            tracing::debug!(count = drained.len(), "failing pending requests");
        }
        for (_, mut entry) in drained {
            if let Some(tx) = entry.tx.take() {
                let _ = tx.send(Err(SessionError::SessionClosed));
            }
        }
    }

    /// Accepts allocations again after a failed handshake.
    pub fn reopen(&self) {
        self.lock().closed = false;
    }

    /// Number of outstanding entries.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: RequestId) -> bool {
        self.lock().entries.contains_key(&id)
    }
}

struct RemoveOnDrop<'a> {
    pending: &'a PendingRequests,
    id: RequestId,
}

impl Drop for RemoveOnDrop<'_> {
    fn drop(&mut self) {
        self.pending.cancel(self.id);
    }
}
