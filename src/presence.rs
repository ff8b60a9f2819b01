use std::collections::HashMap;

use crate::events::UserId;

pub type ConnId = u64;

/// Maps each user to the one connection currently speaking for them.
#[derive(Debug, Default)]
pub struct Presence {
    entries: HashMap<UserId, ConnId>,
}

impl Presence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last connection wins. Returns the connection it displaced, if any.
    pub fn register(&mut self, user_id: UserId, conn_id: ConnId) -> Option<ConnId> {
        self.entries
            .insert(user_id, conn_id)
            .filter(|previous| *previous != conn_id)
    }

    /// Removes the entry only when `conn_id` still holds it.
    pub fn unregister(&mut self, user_id: &str, conn_id: ConnId) -> bool {
        match self.entries.get(user_id) {
            Some(current) if *current == conn_id => {
                self.entries.remove(user_id);
                true
            }
            _ => false,
        }
    }

    pub fn lookup(&self, user_id: &str) -> Option<ConnId> {
        self.entries.get(user_id).copied()
    }

    pub fn users(&self) -> impl Iterator<Item = &UserId> {
        self.entries.keys()
    }

    pub fn connections(&self) -> impl Iterator<Item = ConnId> + '_ {
        self.entries.values().copied()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newer_connection_replaces_older() {
        let mut presence = Presence::new();
        assert_eq!(presence.register("ada".to_string(), 1), None);
        assert_eq!(presence.register("ada".to_string(), 2), Some(1));
        assert_eq!(presence.lookup("ada"), Some(2));
        assert_eq!(presence.len(), 1);
    }

    #[test]
    fn re_registering_same_connection_displaces_nothing() {
        let mut presence = Presence::new();
        presence.register("ada".to_string(), 1);
        assert_eq!(presence.register("ada".to_string(), 1), None);
    }

    #[test]
    fn stale_disconnect_keeps_newer_entry() {
        let mut presence = Presence::new();
        presence.register("ada".to_string(), 1);
        presence.register("ada".to_string(), 2);

        assert!(!presence.unregister("ada", 1));
        assert_eq!(presence.lookup("ada"), Some(2));

        assert!(presence.unregister("ada", 2));
        assert_eq!(presence.lookup("ada"), None);
        assert_eq!(presence.len(), 0);
    }

    #[test]
    fn unregister_touches_only_the_given_user() {
        let mut presence = Presence::new();
        presence.register("ada".to_string(), 1);
        presence.register("bob".to_string(), 2);

        assert!(presence.unregister("ada", 1));
        assert!(!presence.unregister("bob", 1));
        assert_eq!(presence.lookup("bob"), Some(2));
        assert_eq!(presence.users().collect::<Vec<_>>(), vec!["bob"]);
    }
}
