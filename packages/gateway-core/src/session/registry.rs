//! Dual-indexed session registry: by connection id (datagram routing) and
//! by MAC (control-plane routing and the "one live session per device" rule).

use std::sync::Arc;

use dashmap::DashMap;

use crate::device::Mac;
use crate::session::session::Session;
use crate::utils::random_nonzero_u32;

/// Owns both indexes; callers must not construct either map independently,
/// since the invariant is that they are updated atomically together.
pub struct SessionRegistry {
    by_connection_id: DashMap<u32, Arc<Session>>,
    by_mac: DashMap<Mac, u32>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self { by_connection_id: DashMap::new(), by_mac: DashMap::new() }
    }

    /// Picks a random non-zero connection id unused by any live session,
    /// retrying on collision.
    pub fn allocate_connection_id(&self) -> u32 {
        loop {
            let candidate = random_nonzero_u32();
            if !self.by_connection_id.contains_key(&candidate) {
                return candidate;
            }
        }
    }

    /// Inserts `session`, evicting and returning any prior session for the
    /// same MAC (the "new hello evicts prior session" rule, §4.9).
    pub fn insert(&self, session: Arc<Session>) -> Option<Arc<Session>> {
        let mac = session.mac;
        let connection_id = session.connection_id;

        let evicted = self
            .by_mac
            .insert(mac, connection_id)
            .and_then(|old_connection_id| self.by_connection_id.remove(&old_connection_id))
            .map(|(_, session)| session);

        self.by_connection_id.insert(connection_id, session);
        evicted
    }

    pub fn get_by_connection_id(&self, connection_id: u32) -> Option<Arc<Session>> {
        self.by_connection_id.get(&connection_id).map(|r| r.value().clone())
    }

    pub fn get_by_mac(&self, mac: &Mac) -> Option<Arc<Session>> {
        let connection_id = *self.by_mac.get(mac)?;
        self.get_by_connection_id(connection_id)
    }

    /// Removes a session from both indexes. Only removes the mac entry if
    /// it still points at `connection_id` — a newer session for the same
    /// MAC must not be evicted by a deferred removal of the old one.
    pub fn remove(&self, connection_id: u32) -> Option<Arc<Session>> {
        let (_, session) = self.by_connection_id.remove(&connection_id)?;
        self.by_mac.remove_if(&session.mac, |_, v| *v == connection_id);
        Some(session)
    }

    pub fn len(&self) -> usize {
        self.by_connection_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_connection_id.is_empty()
    }

    pub fn all_sessions(&self) -> Vec<Arc<Session>> {
        self.by_connection_id.iter().map(|r| r.value().clone()).collect()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::session::RoomType;

    fn session(connection_id: u32, mac: &str) -> Arc<Session> {
        Arc::new(Session::new(
            connection_id,
            mac.parse().unwrap(),
            "u1".to_string(),
            format!("g@@@{mac}@@@u1"),
            format!("u1_{mac}_conversation"),
            RoomType::Conversation,
            [0u8; 16],
            [1u8; 16],
        ))
    }

    #[test]
    fn insert_and_lookup_both_indexes() {
        let registry = SessionRegistry::new();
        let s = session(1, "aa:bb:cc:dd:ee:ff");
        let mac = s.mac;
        registry.insert(s);

        assert!(registry.get_by_connection_id(1).is_some());
        assert!(registry.get_by_mac(&mac).is_some());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn new_hello_evicts_prior_session_for_same_mac() {
        let registry = SessionRegistry::new();
        let mac = "aa:bb:cc:dd:ee:ff";
        registry.insert(session(1, mac));
        let evicted = registry.insert(session(2, mac));

        assert!(evicted.is_some());
        assert_eq!(evicted.unwrap().connection_id, 1);
        assert!(registry.get_by_connection_id(1).is_none());
        assert_eq!(registry.get_by_mac(&mac.parse().unwrap()).unwrap().connection_id, 2);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn allocate_connection_id_avoids_collision() {
        let registry = SessionRegistry::new();
        let s = session(registry.allocate_connection_id(), "aa:bb:cc:dd:ee:ff");
        let id = s.connection_id;
        registry.insert(s);
        let next = registry.allocate_connection_id();
        assert_ne!(next, id);
    }

    #[test]
    fn stale_removal_does_not_evict_newer_session() {
        let registry = SessionRegistry::new();
        let mac = "aa:bb:cc:dd:ee:ff";
        registry.insert(session(1, mac));
        registry.insert(session(2, mac));
        registry.remove(1);
        assert!(registry.get_by_mac(&mac.parse().unwrap()).is_some());
    }
}
