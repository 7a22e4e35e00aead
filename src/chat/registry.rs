//! Connection registry
//!
//! Tracks live chat connections and the party each one is bound to. The
//! registry is a multimap: one party may hold several connections (phone and
//! tablet), and `send` fans out to all of them.
//!
//! Each connection is represented only by the sender half of its outbound
//! channel; the WebSocket writer task owns the socket. A closed channel means
//! the transport is gone, and sending to it is a silent no-op.

use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::types::{Party, ServerFrame};

/// Opaque id of a registered connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionHandle(u64);

impl std::fmt::Display for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

pub type FrameSender = mpsc::UnboundedSender<ServerFrame>;

struct ConnectionEntry {
    sender: FrameSender,
    party: Option<Party>,
}

#[derive(Default)]
pub struct ConnectionRegistry {
    next_id: AtomicU64,
    connections: DashMap<ConnectionHandle, ConnectionEntry>,
    parties: DashMap<Party, HashSet<ConnectionHandle>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an unauthenticated connection
    pub fn register(&self, sender: FrameSender) -> ConnectionHandle {
        let handle = ConnectionHandle(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.connections.insert(
            handle,
            ConnectionEntry {
                sender,
                party: None,
            },
        );
        debug!(%handle, "Connection registered");
        handle
    }

    /// Bind a connection to a party. Returns false if the handle is unknown
    /// or already bound (handshakes are not repeated).
    pub fn bind(&self, handle: ConnectionHandle, party: Party) -> bool {
        {
            let Some(mut entry) = self.connections.get_mut(&handle) else {
                return false;
            };
            if entry.party.is_some() {
                return false;
            }
            entry.party = Some(party.clone());
        }
        self.parties.entry(party.clone()).or_default().insert(handle);
        debug!(%handle, %party, "Connection bound");
        true
    }

    /// Deliver a frame to every live connection bound to `party`.
    ///
    /// Returns how many connections accepted it; zero is not an error.
    pub fn send(&self, party: &Party, frame: &ServerFrame) -> usize {
        let handles: Vec<ConnectionHandle> = match self.parties.get(party) {
            Some(set) => set.iter().copied().collect(),
            None => {
                trace!(%party, "No live connection for party");
                return 0;
            }
        };

        handles
            .into_iter()
            .filter(|handle| self.send_to(*handle, frame.clone()))
            .count()
    }

    /// Deliver a frame to one connection
    pub fn send_to(&self, handle: ConnectionHandle, frame: ServerFrame) -> bool {
        match self.connections.get(&handle) {
            Some(entry) => entry.sender.send(frame).is_ok(),
            None => false,
        }
    }

    /// Remove a connection. Unknown handles are ignored.
    pub fn unregister(&self, handle: ConnectionHandle) {
        let Some((_, entry)) = self.connections.remove(&handle) else {
            return;
        };
        if let Some(party) = entry.party {
            if let Some(mut set) = self.parties.get_mut(&party) {
                set.remove(&handle);
            }
            self.parties.remove_if(&party, |_, set| set.is_empty());
            debug!(%handle, %party, "Connection unregistered");
        }
    }

    pub fn party_of(&self, handle: ConnectionHandle) -> Option<Party> {
        self.connections
            .get(&handle)
            .and_then(|entry| entry.party.clone())
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn party_connection_count(&self, party: &Party) -> usize {
        self.parties.get(party).map(|set| set.len()).unwrap_or(0)
    }
}
