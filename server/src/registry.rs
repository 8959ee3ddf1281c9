//! Connection membership and seat assignment
//!
//! The registry is the single source of truth for who is connected. It
//! hands out the two player seats first-come-first-served, turns every
//! further connection into an observer, and frees a seat when its holder
//! leaves so the next connection can claim it.
//!
//! The game loop iterates the registry once per tick while connection
//! tasks insert and remove entries, so it is shared as
//! `Arc<RwLock<SessionRegistry>>`. The broadcaster walks it under the read
//! lock with non-blocking sends only; removals queue behind that walk.
//!
//! Removal is not always initiated by the connection itself: the
//! broadcaster drops connections that stop keeping up. Every entry carries a
//! removal signal so the owning connection task learns that its seat is
//! gone and stops forwarding input.

use log::info;
use shared::Role;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch, RwLock};
use tokio_tungstenite::tungstenite::Message;

pub type ConnectionId = u32;
pub type SharedRegistry = Arc<RwLock<SessionRegistry>>;

/// One live transport connection.
///
/// `sender` feeds the connection's writer task; cloning an entry shares the
/// same outbound queue.
#[derive(Debug, Clone)]
pub struct ConnectionEntry {
    pub id: ConnectionId,
    pub role: Role,
    pub addr: SocketAddr,
    pub connected_at: Instant,
    pub sender: mpsc::Sender<Message>,
    /// Flipped to true when the entry leaves the registry.
    removed: Arc<watch::Sender<bool>>,
}

/// Tracks every connected client and which of them hold the two paddles.
///
/// Connection ids are handed out in increasing order and never reused while
/// the server runs, so a stale id can never name a newer connection.
#[derive(Debug)]
pub struct SessionRegistry {
    entries: BTreeMap<ConnectionId, ConnectionEntry>,
    /// Seat 0 is the left paddle, seat 1 the right.
    seats: [Option<ConnectionId>; 2],
    next_id: ConnectionId,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    /// Creates an empty registry with both seats free.
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            seats: [None, None],
            next_id: 1,
        }
    }

    /// Creates an empty registry ready to be shared between tasks.
    pub fn shared() -> SharedRegistry {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Adds a connection and assigns it the first free seat, or observer.
    ///
    /// The left seat is preferred over the right, so a freed left seat is
    /// always the next one handed out.
    pub fn register(
        &mut self,
        addr: SocketAddr,
        sender: mpsc::Sender<Message>,
    ) -> (ConnectionId, Role) {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1).max(1);

        let role = match self.seats.iter().position(Option::is_none) {
            Some(0) => Role::PlayerLeft,
            Some(_) => Role::PlayerRight,
            None => Role::Observer,
        };
        if let Some(seat) = Self::seat_index(role) {
            self.seats[seat] = Some(id);
        }

        self.entries.insert(
            id,
            ConnectionEntry {
                id,
                role,
                addr,
                connected_at: Instant::now(),
                sender,
                removed: Arc::new(watch::channel(false).0),
            },
        );
        info!("Connection {} from {} joined as {}", id, addr, role);

        (id, role)
    }

    /// Removes a connection, freeing its seat if it held one.
    ///
    /// The connection's removal signal fires before this returns, so its
    /// task stops forwarding input before the freed seat can be reassigned.
    /// Returns the removed entry, or None if it was already gone.
    pub fn unregister(&mut self, id: ConnectionId) -> Option<ConnectionEntry> {
        let entry = self.entries.remove(&id)?;
        entry.removed.send_replace(true);
        if let Some(seat) = Self::seat_index(entry.role) {
            if self.seats[seat] == Some(id) {
                self.seats[seat] = None;
            }
        }
        info!(
            "Connection {} ({}) left after {:.1}s",
            id,
            entry.role,
            entry.connected_at.elapsed().as_secs_f32()
        );
        Some(entry)
    }

    fn seat_index(role: Role) -> Option<usize> {
        match role {
            Role::PlayerLeft => Some(0),
            Role::PlayerRight => Some(1),
            Role::Observer => None,
        }
    }

    /// Subscribes to the removal signal of a registered connection.
    ///
    /// The receiver reads true once `unregister` has run for `id`. Returns
    /// None if `id` is not registered.
    pub fn removal_signal(&self, id: ConnectionId) -> Option<watch::Receiver<bool>> {
        self.entries.get(&id).map(|entry| entry.removed.subscribe())
    }

    /// Role held by a connection, or None if it is not registered.
    pub fn role_of(&self, id: ConnectionId) -> Option<Role> {
        self.entries.get(&id).map(|entry| entry.role)
    }

    /// Whether `id` is still registered.
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Applies `f` to every current entry in connection id order.
    ///
    /// Runs under whatever lock the caller holds, so `f` must not block.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&ConnectionEntry),
    {
        for entry in self.entries.values() {
            f(entry);
        }
    }

    /// Number of occupied player seats.
    pub fn players(&self) -> usize {
        self.seats.iter().filter(|seat| seat.is_some()).count()
    }

    /// Number of registered connections, players and observers together.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nobody is connected.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
